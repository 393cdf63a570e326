pub mod auth;
pub mod handlers;

pub use auth::{AdminAuth, AuthOutcome, AuthSettings};

pub mod analysis;
pub mod document;
pub mod request;

pub use analysis::AnalysisResult;
pub use document::{ConversionMethod, Document, DocumentType};
pub use request::{Request, RequestStatus};

use std::sync::Arc;

use crate::admin::AdminAuth;
use crate::config::Config;
use crate::file_fetch::FileFetcher;
use crate::requests::RequestManager;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub manager: RequestManager,
    pub auth: Arc<AdminAuth>,
    /// `None` when no bucket is configured; fetch-by-reference is then rejected.
    pub file_fetcher: Option<Arc<dyn FileFetcher>>,
    pub config: Config,
}

// Route table for the /gd surface.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::service::DownloadService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DownloadService>,
}

pub fn router(service: Arc<DownloadService>) -> Router {
    Router::new()
        .route("/gd/download", post(handlers::download))
        .route("/gd/progress/:id", get(handlers::progress))
        .route("/gd/choose-dir", get(handlers::choose_dir))
        .route("/gd/open-dir", get(handlers::open_dir))
        .with_state(AppState { service })
}

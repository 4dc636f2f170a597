use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use quinico_store::StoreError;
use thiserror::Error;

use crate::templates;

/// Failures that end a request with HTTP 500. Validation problems and
/// missing data are rendered as regular pages instead.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            templates::server_error(),
        )
            .into_response()
    }
}

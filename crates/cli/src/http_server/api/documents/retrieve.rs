use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use common::error::{Categorize, ErrorKind};
use common::storage::{Locator, StorageError};

use crate::http_server::api::{error_response, status_for};
use crate::http_server::ServerState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrieveQuery {
    /// Locator returned by an upload
    pub cid: Option<String>,
}

/// Stored bytes as they are, sealed envelopes included
#[axum::debug_handler]
pub async fn handler(
    State(state): State<ServerState>,
    Query(query): Query<RetrieveQuery>,
) -> Result<impl IntoResponse, RetrieveError> {
    let locator = match query.cid.as_deref().map(str::trim) {
        Some(cid) if !cid.is_empty() => Locator::new(cid),
        _ => return Err(RetrieveError::MissingCid),
    };

    let content = state.store.fetch(&locator).await?;
    tracing::info!(%locator, len = content.len(), "retrieved document");

    let disposition = format!("attachment; filename=\"{}\"", locator);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    #[error("cid parameter is required")]
    MissingCid,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl IntoResponse for RetrieveError {
    fn into_response(self) -> Response {
        match &self {
            RetrieveError::MissingCid => {
                error_response(StatusCode::BAD_REQUEST, ErrorKind::Config, self.to_string())
            }
            RetrieveError::Storage(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::error!(error = %e, "retrieval failed");
                }
                error_response(status_for(e.kind()), e.kind(), self.to_string())
            }
        }
    }
}

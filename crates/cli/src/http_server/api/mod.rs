use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use common::error::ErrorKind;

pub mod documents;

use super::{health, ServerState};

pub fn router(state: ServerState) -> Router<ServerState> {
    Router::new()
        .route("/health", get(health::handler))
        .nest("/documents", documents::router(state.clone()))
        .with_state(state)
}

pub(crate) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Config => StatusCode::BAD_REQUEST,
        ErrorKind::Integrity | ErrorKind::MalformedEnvelope => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Io => StatusCode::BAD_GATEWAY,
        ErrorKind::Crypto => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// JSON error body carrying the failure category
pub(crate) fn error_response(status: StatusCode, kind: ErrorKind, msg: String) -> Response {
    let body = serde_json::json!({"msg": msg, "kind": kind.as_str()});
    (status, Json(body)).into_response()
}

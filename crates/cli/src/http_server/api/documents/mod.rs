use axum::routing::{get, post};
use axum::Router;

pub mod retrieve;
pub mod upload;
pub mod verify;

use crate::http_server::ServerState;

pub fn router(state: ServerState) -> Router<ServerState> {
    Router::new()
        .route("/", post(upload::handler))
        .route("/retrieve", get(retrieve::handler))
        .route("/:hash/verify", get(verify::handler))
        .with_state(state)
}

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::Method;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;

use common::ledger::Ledger;
use common::pipeline::{Registrar, Signer, VerificationPipeline};
use common::storage::ContentStore;

use crate::{AppState, StateError};

pub mod api;
mod handlers;
mod health;

const API_PREFIX: &str = "/api";

/// Maximum upload size in bytes (10 MB)
pub const MAX_UPLOAD_SIZE_BYTES: usize = 10 * 1024 * 1024;

/// Everything the handlers need, cheap to clone per request
#[derive(Debug, Clone)]
pub struct ServerState {
    pub registrar: Registrar,
    pub pipeline: VerificationPipeline,
    pub store: Arc<dyn ContentStore>,
    pub ledger: Arc<dyn Ledger>,
    /// Key that signs uploads and checks their signatures; uploads stay unsigned without one
    pub signer: Option<Signer>,
}

impl ServerState {
    pub async fn open(app: &AppState, signer: Option<Signer>) -> Result<Self, StateError> {
        let ledger: Arc<dyn Ledger> = Arc::new(app.ledger().await?);
        let (registrar, pipeline) = app.pipelines_on(ledger.clone())?;
        Ok(Self {
            registrar,
            pipeline,
            store: app.store()?,
            ledger,
            signer,
        })
    }
}

pub fn router(state: ServerState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(tracing::Level::INFO)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    let cors = CorsLayer::new()
        .allow_methods(vec![Method::GET, Method::POST])
        .allow_headers(vec![ACCEPT, CONTENT_TYPE])
        .allow_origin(Any)
        .allow_credentials(false);

    Router::new()
        .nest(API_PREFIX, api::router(state.clone()))
        .fallback(handlers::not_found_handler)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE_BYTES))
        .with_state(state)
        .layer(cors)
        .layer(trace_layer)
}

/// Bind `listen_addr` and serve until `shutdown_rx` fires
pub async fn run(
    listen_addr: SocketAddr,
    state: ServerState,
    shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let listener = TcpListener::bind(listen_addr).await?;
    serve(listener, state, shutdown_rx).await
}

/// Serve on an already bound listener
pub async fn serve(
    listener: TcpListener,
    state: ServerState,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    tracing::info!(addr = ?listener.local_addr()?, "API server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
}

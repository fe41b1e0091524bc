use std::net::SocketAddr;

use clap::Args;
use tokio::sync::watch;

use common::error::{Categorize, ErrorKind};
use qdv_cli::http_server::{self, HttpServerError, ServerState};
use qdv_cli::state::DEFAULT_KEY_NAME;
use qdv_cli::StateError;

/// Serve the document HTTP API until interrupted
#[derive(Args, Debug, Clone)]
pub struct Serve {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// Key pair that signs uploads and checks their signatures
    #[arg(long, default_value = DEFAULT_KEY_NAME)]
    pub key: String,

    /// Register uploads without signing them
    #[arg(long)]
    pub no_sign: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Server(#[from] HttpServerError),
}

impl Categorize for ServeError {
    fn kind(&self) -> ErrorKind {
        match self {
            ServeError::State(e) => e.kind(),
            ServeError::Server(_) => ErrorKind::Io,
        }
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Serve {
    type Error = ServeError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let signer = if self.no_sign {
            None
        } else {
            Some(state.load_signer(&self.key)?)
        };
        let server_state = ServerState::open(&state, signer).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl+c");
                return;
            }
            tracing::info!("received shutdown signal");
            let _ = shutdown_tx.send(());
        });

        http_server::run(self.listen, server_state, shutdown_rx).await?;
        Ok("server stopped".to_string())
    }
}

use clap::Args;

use common::crypto::{require_scheme, CryptoError};
use common::error::{Categorize, ErrorKind};
use qdv_cli::state::DEFAULT_KEY_NAME;
use qdv_cli::StateError;

/// Generate a signing key pair
#[derive(Args, Debug, Clone)]
pub struct Keygen {
    /// Name to store the key pair under
    #[arg(long, default_value = DEFAULT_KEY_NAME)]
    pub name: String,

    /// Signature scheme (defaults to the configured one)
    #[arg(long)]
    pub scheme: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum KeygenError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl Categorize for KeygenError {
    fn kind(&self) -> ErrorKind {
        match self {
            KeygenError::State(e) => e.kind(),
            KeygenError::Crypto(e) => e.kind(),
        }
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Keygen {
    type Error = KeygenError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let scheme_name = self
            .scheme
            .as_deref()
            .unwrap_or(&state.config.signature_scheme);
        let scheme = require_scheme(scheme_name)?;

        let keypair = scheme.generate_keypair()?;
        let (public_path, private_path) = state.save_keypair(
            &self.name,
            scheme.name(),
            &keypair.public_key,
            &keypair.private_key,
        )?;
        tracing::info!(name = %self.name, scheme = scheme.name(), "generated key pair");

        Ok(format!(
            "Generated {} key pair '{}'\n  signer:      {}\n  public key:  {}\n  private key: {}",
            scheme.name(),
            self.name,
            keypair.public_key.signer_id(),
            public_path.display(),
            private_path.display()
        ))
    }
}

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use url::Url;

use common::crypto::{Aes256GcmCipher, MlDsa44};
use common::error::{Categorize, ErrorKind};
use common::ledger::{JournalLedger, LedgerError};
use common::storage::DEFAULT_IPFS_API;
use qdv_cli::{AppConfig, AppState, StateError, StorageConfig};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Ipfs,
    Filesystem,
}

/// Initialize the config directory and provision the ledger journal
#[derive(Args, Debug, Clone)]
pub struct Deploy {
    /// Label recorded in the genesis record
    #[arg(long, default_value = "quantum-doc-verify")]
    pub label: String,

    /// Where document bytes are stored
    #[arg(long, value_enum, default_value_t = StorageKind::Ipfs)]
    pub storage: StorageKind,

    /// IPFS HTTP API root
    #[arg(long, default_value = DEFAULT_IPFS_API)]
    pub ipfs_api: Url,

    /// Filesystem store directory (defaults to <config>/blobs)
    #[arg(long)]
    pub blobs_path: Option<PathBuf>,

    /// Signature scheme for new key pairs
    #[arg(long, default_value = MlDsa44::NAME)]
    pub scheme: String,

    /// AEAD for sealed documents
    #[arg(long, default_value = Aes256GcmCipher::NAME)]
    pub cipher: String,

    /// Concurrent pipelines in batch mode
    #[arg(long)]
    pub concurrency: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("failed to deploy ledger: {0}")]
    Ledger(#[from] LedgerError),
}

impl Categorize for DeployError {
    fn kind(&self) -> ErrorKind {
        match self {
            DeployError::State(e) => e.kind(),
            DeployError::Ledger(e) => e.kind(),
        }
    }
}

impl Deploy {
    fn config(&self) -> AppConfig {
        let storage = match self.storage {
            StorageKind::Ipfs => StorageConfig::Ipfs {
                api_url: self.ipfs_api.clone(),
            },
            StorageKind::Filesystem => StorageConfig::Filesystem {
                path: self.blobs_path.clone(),
            },
        };
        let defaults = AppConfig::default();
        AppConfig {
            storage,
            signature_scheme: self.scheme.clone(),
            cipher: self.cipher.clone(),
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
            ..defaults
        }
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Deploy {
    type Error = DeployError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::init(ctx.config_path.clone(), self.config())?;
        let ledger = match JournalLedger::deploy(&state.ledger_path, &self.label).await {
            Ok(ledger) => ledger,
            Err(e) => {
                // leave the directory uninitialized so deploy can be rerun
                if let Err(remove) = std::fs::remove_file(&state.config_path) {
                    tracing::warn!(error = %remove, path = %state.config_path.display(), "failed to remove config after ledger deploy failed");
                }
                return Err(e.into());
            }
        };
        let reference = ledger
            .genesis()
            .await
            .map(|record| record.reference.to_string())
            .unwrap_or_default();

        Ok(format!(
            "Deployed ledger {}\n  journal: {}\n  config:  {}",
            reference,
            state.ledger_path.display(),
            state.config_path.display()
        ))
    }
}

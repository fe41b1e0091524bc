use std::path::{Path, PathBuf};

use bytes::Bytes;
use clap::{ArgGroup, Args};

use common::crypto::{CryptoError, Fingerprint};
use common::error::{Categorize, ErrorKind};
use common::pipeline::{Registrar, RegistrarError, Registration, RegistrationOptions};
use common::storage::Locator;
use qdv_cli::state::DEFAULT_KEY_NAME;
use qdv_cli::{AppState, StateError};

use super::signature_path;

/// Register a document, or bind a fingerprint to content that is already stored
#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("source").required(true).args(["file", "hash"])))]
pub struct Register {
    /// Document to hash, sign, store and register
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Fingerprint of an already stored document (hex)
    #[arg(long, requires = "locator")]
    pub hash: Option<Fingerprint>,

    /// Where the document given by --hash is stored
    #[arg(long, requires = "hash")]
    pub locator: Option<Locator>,

    /// Key pair to sign (and seal) with
    #[arg(long, default_value = DEFAULT_KEY_NAME)]
    pub key: String,

    /// Register without signing the document
    #[arg(long)]
    pub no_sign: bool,

    /// Store the document sealed in an envelope only the key owner can open
    #[arg(long, conflicts_with = "hash")]
    pub encrypt: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Registrar(#[from] RegistrarError),
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("either --file or --hash with --locator is required")]
    MissingSource,
}

impl Categorize for RegisterError {
    fn kind(&self) -> ErrorKind {
        match self {
            RegisterError::State(e) => e.kind(),
            RegisterError::Crypto(e) => e.kind(),
            RegisterError::Registrar(e) => e.kind(),
            RegisterError::Read { .. } | RegisterError::Write { .. } => ErrorKind::Io,
            RegisterError::MissingSource => ErrorKind::Config,
        }
    }
}

impl Register {
    fn options(&self, state: &AppState) -> Result<RegistrationOptions, RegisterError> {
        if self.no_sign && !self.encrypt {
            return Ok(RegistrationOptions::default());
        }
        let signer = state.load_signer(&self.key)?;
        let envelope = if self.encrypt {
            Some(signer.recipient()?)
        } else {
            None
        };
        Ok(RegistrationOptions {
            signer: (!self.no_sign).then_some(signer),
            envelope,
        })
    }

    async fn register_file(
        &self,
        state: &AppState,
        registrar: &Registrar,
        path: &Path,
    ) -> Result<String, RegisterError> {
        let document = tokio::fs::read(path)
            .await
            .map_err(|source| RegisterError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let options = self.options(state)?;
        let registration = registrar
            .register(Bytes::from(document), &options)
            .await?;

        let mut output = describe(&registration);
        if let Some(signature) = &registration.signature {
            let sig_path = signature_path(path);
            tokio::fs::write(&sig_path, signature.to_hex())
                .await
                .map_err(|source| RegisterError::Write {
                    path: sig_path.clone(),
                    source,
                })?;
            output.push_str(&format!("\n  signature:  {}", sig_path.display()));
        }
        if self.encrypt {
            output.push_str(&format!("\n  sealed for: {}", self.key));
        }
        Ok(output)
    }
}

fn describe(registration: &Registration) -> String {
    let entry = &registration.entry;
    let mut output = format!(
        "{}\n  fingerprint: {}\n  locator:     {}",
        if registration.existing {
            "Already registered"
        } else {
            "Registered"
        },
        entry.fingerprint,
        entry.locator
    );
    if let Some(reference) = &entry.ledger_reference {
        output.push_str(&format!("\n  ledger ref:  {}", reference));
    }
    if let Some(signer) = &registration.signer {
        output.push_str(&format!("\n  signer:      {}", signer));
    }
    output
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Register {
    type Error = RegisterError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let (registrar, _) = state.pipelines().await?;

        match (&self.file, &self.hash, &self.locator) {
            (Some(path), _, _) => self.register_file(&state, &registrar, path).await,
            (None, Some(fingerprint), Some(locator)) => {
                let registration = registrar
                    .register_stored(*fingerprint, locator.clone())
                    .await?;
                Ok(describe(&registration))
            }
            _ => Err(RegisterError::MissingSource),
        }
    }
}

use std::path::{Path, PathBuf};

use clap::{ArgGroup, Args};

use common::crypto::{hash, require_scheme, CryptoError, Fingerprint, KeyError, Signature};
use common::error::{Categorize, ErrorKind};
use common::pipeline::{
    Provenance, RegistrarError, SignatureCheck, Verdict, VerificationFailure,
    VerificationRequest,
};
use common::storage::Locator;
use qdv_cli::state::{read_public_key, DEFAULT_KEY_NAME};
use qdv_cli::{AppState, StateError};

use super::signature_path;

/// Verify a document against its registration
#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("claim").required(true).args(["hash", "file"])))]
pub struct Verify {
    /// Claimed fingerprint (hex)
    #[arg(long)]
    pub hash: Option<Fingerprint>,

    /// Local copy of the document; its fingerprint is the claim
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Fetch from this locator instead of the registered one
    #[arg(long)]
    pub locator: Option<Locator>,

    /// Hex signature file (defaults to <file>.sig with --file)
    #[arg(long)]
    pub signature: Option<PathBuf>,

    /// Signer's public key PEM (defaults to the public half of --key)
    #[arg(long)]
    pub public_key: Option<PathBuf>,

    /// Local key pair that signed the document and owns sealed envelopes
    #[arg(long)]
    pub key: Option<String>,

    /// Verify without checking a signature
    #[arg(long, conflicts_with_all = ["signature", "public_key"])]
    pub skip_signature: bool,

    /// Open the stored bytes as an envelope sealed for the key owner
    #[arg(long)]
    pub decrypt: bool,

    /// Write the verified document to this path
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Record the outcome on the ledger
    #[arg(long)]
    pub record: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("invalid key material: {0}")]
    Key(#[from] KeyError),
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
    #[error("either --hash or --file is required")]
    MissingClaim,
    #[error("no signature given; pass --signature or --skip-signature")]
    MissingSignature,
    #[error(transparent)]
    Failed(#[from] VerificationFailure),
}

impl Categorize for VerifyError {
    fn kind(&self) -> ErrorKind {
        match self {
            VerifyError::State(e) => e.kind(),
            VerifyError::Key(e) => e.kind(),
            VerifyError::Crypto(e) => e.kind(),
            VerifyError::Registrar(e) => e.kind(),
            VerifyError::Read { .. } | VerifyError::Write { .. } => ErrorKind::Io,
            VerifyError::MissingClaim | VerifyError::MissingSignature => ErrorKind::Config,
            VerifyError::Failed(e) => e.kind(),
        }
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, VerifyError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| VerifyError::Read {
            path: path.to_path_buf(),
            source,
        })
}

impl Verify {
    fn key_name(&self) -> &str {
        self.key.as_deref().unwrap_or(DEFAULT_KEY_NAME)
    }

    async fn fingerprint(&self) -> Result<Fingerprint, VerifyError> {
        match (&self.hash, &self.file) {
            (Some(fingerprint), _) => Ok(*fingerprint),
            (None, Some(path)) => Ok(hash(&read(path).await?)),
            (None, None) => Err(VerifyError::MissingClaim),
        }
    }

    async fn signature_check(&self, state: &AppState) -> Result<SignatureCheck, VerifyError> {
        if self.skip_signature {
            return Ok(SignatureCheck::OptOut);
        }
        let sig_path = match (&self.signature, &self.file) {
            (Some(path), _) => path.clone(),
            (None, Some(file)) => signature_path(file),
            (None, None) => return Err(VerifyError::MissingSignature),
        };
        let hex = String::from_utf8_lossy(&read(&sig_path).await?).into_owned();
        let signature = Signature::from_hex(&hex)?;

        let (scheme, public_key) = match &self.public_key {
            Some(path) => {
                let (scheme, public_key) = read_public_key(path)?;
                (require_scheme(&scheme)?, public_key)
            }
            None => {
                let signer = state.load_signer(self.key_name())?;
                (signer.scheme().clone(), signer.public_key().clone())
            }
        };
        Ok(SignatureCheck::Verify {
            scheme,
            public_key,
            signature,
        })
    }

    async fn request(&self, state: &AppState) -> Result<VerificationRequest, VerifyError> {
        let mut request =
            VerificationRequest::new(self.fingerprint().await?, self.signature_check(state).await?);
        if let Some(locator) = &self.locator {
            request = request.at(locator.clone());
        }
        if self.decrypt {
            let owner = state.load_signer(self.key_name())?;
            request = request.sealed_for(owner.recipient()?);
        }
        Ok(request)
    }
}

fn describe(provenance: &Provenance) -> String {
    let mut output = format!(
        "Verified\n  fingerprint: {}\n  locator:     {}",
        provenance.fingerprint, provenance.locator
    );
    match &provenance.signer {
        Some(signer) => output.push_str(&format!("\n  signer:      {}", signer)),
        None => output.push_str("\n  signer:      (signature not checked)"),
    }
    if let Some(registered_at) = &provenance.registered_at {
        output.push_str(&format!("\n  registered:  {}", registered_at.to_rfc3339()));
    }
    if let Some(reference) = &provenance.ledger_reference {
        output.push_str(&format!("\n  ledger ref:  {}", reference));
    }
    output
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Verify {
    type Error = VerifyError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let request = self.request(&state).await?;
        let (registrar, pipeline) = state.pipelines().await?;

        let verdict = pipeline.verify(&request).await;

        if self.record {
            match registrar
                .record_verification(request.fingerprint, verdict.is_verified())
                .await
            {
                Ok(record) => tracing::info!(reference = %record.reference, "recorded verification"),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::warn!(fingerprint = %request.fingerprint, "not registered, outcome not recorded")
                }
                Err(e) => return Err(e.into()),
            }
        }

        let (provenance, document) = match verdict {
            Verdict::Verified {
                provenance,
                document,
            } => (provenance, document),
            Verdict::Failed(failure) => return Err(failure.into()),
        };

        let mut output = describe(&provenance);
        if let Some(out) = &self.out {
            tokio::fs::write(out, &document)
                .await
                .map_err(|source| VerifyError::Write {
                    path: out.clone(),
                    source,
                })?;
            output.push_str(&format!("\n  written to:  {}", out.display()));
        }
        Ok(output)
    }
}

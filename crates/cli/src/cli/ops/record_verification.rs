use clap::{ArgAction, Args};

use common::crypto::Fingerprint;
use common::error::{Categorize, ErrorKind};
use common::pipeline::RegistrarError;
use qdv_cli::StateError;

/// Record a verification outcome for a registered document
#[derive(Args, Debug, Clone)]
pub struct RecordVerification {
    /// Fingerprint of the registered document (hex)
    #[arg(long)]
    pub hash: Fingerprint,

    /// Outcome to record
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub verified: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RecordVerificationError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Registrar(#[from] RegistrarError),
}

impl Categorize for RecordVerificationError {
    fn kind(&self) -> ErrorKind {
        match self {
            RecordVerificationError::State(e) => e.kind(),
            RecordVerificationError::Registrar(e) => e.kind(),
        }
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for RecordVerification {
    type Error = RecordVerificationError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let (registrar, _) = state.pipelines().await?;
        let record = registrar
            .record_verification(self.hash, self.verified)
            .await?;
        Ok(format!(
            "Recorded verification ({}) for {}\n  ledger ref: {}",
            if self.verified { "passed" } else { "failed" },
            self.hash,
            record.reference
        ))
    }
}

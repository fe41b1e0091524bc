use clap::Args;

use common::crypto::Fingerprint;
use common::error::{Categorize, ErrorKind};
use common::ledger::{Claim, Ledger, LedgerError, LedgerRecord};
use common::registry::{RegistryEntry, RegistryError};
use qdv_cli::StateError;

/// Show a registration and its ledger history, or list every registration
#[derive(Args, Debug, Clone)]
pub struct Details {
    /// Fingerprint to show (hex); lists all registrations when omitted
    #[arg(long)]
    pub hash: Option<Fingerprint>,
}

#[derive(Debug, thiserror::Error)]
pub enum DetailsError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl Categorize for DetailsError {
    fn kind(&self) -> ErrorKind {
        match self {
            DetailsError::State(e) => e.kind(),
            DetailsError::Registry(e) => e.kind(),
            DetailsError::Ledger(e) => e.kind(),
        }
    }
}

fn entry_line(entry: &RegistryEntry) -> String {
    let registered = entry
        .registered_at
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "(imported)".to_string());
    format!("{}  {}  {}", entry.fingerprint, entry.locator, registered)
}

fn record_line(record: &LedgerRecord) -> String {
    let what = match &record.claim {
        Claim::Genesis { label } => format!("genesis '{}'", label),
        Claim::Registration(claim) => match &claim.signer {
            Some(signer) => format!("registered at {} by {}", claim.locator, signer),
            None => format!("registered at {} (unsigned)", claim.locator),
        },
        Claim::Verification { verified, .. } => {
            format!("verification {}", if *verified { "passed" } else { "failed" })
        }
    };
    format!(
        "  {}  {}  {}",
        record.recorded_at.to_rfc3339(),
        record.reference,
        what
    )
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Details {
    type Error = DetailsError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let registry = state.registry()?;

        let Some(fingerprint) = &self.hash else {
            let entries = registry.entries();
            let mut lines = vec![format!("{} registered document(s)", entries.len())];
            lines.extend(entries.iter().map(entry_line));
            return Ok(lines.join("\n"));
        };

        let entry = registry.lookup(fingerprint)?;
        let ledger = state.ledger().await?;
        let history = ledger.history(fingerprint).await?;

        let mut lines = vec![
            format!("fingerprint: {}", entry.fingerprint),
            format!("locator:     {}", entry.locator),
        ];
        if let Some(registered_at) = entry.registered_at {
            lines.push(format!("registered:  {}", registered_at.to_rfc3339()));
        }
        if let Some(reference) = &entry.ledger_reference {
            lines.push(format!("ledger ref:  {}", reference));
        }
        lines.push(format!("history ({} record(s)):", history.len()));
        lines.extend(history.iter().map(record_line));
        Ok(lines.join("\n"))
    }
}

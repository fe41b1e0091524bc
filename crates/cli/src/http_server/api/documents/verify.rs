use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::crypto::{Fingerprint, FingerprintError, KeyError, Signature, SignerId};
use common::error::{Categorize, ErrorKind};
use common::ledger::{Claim, LedgerError, LedgerReference, RegistrationClaim};
use common::pipeline::{SignatureCheck, Stage, Verdict, VerificationRequest};
use common::storage::Locator;

use crate::http_server::api::{error_response, status_for};
use crate::http_server::ServerState;

/// Outcome of verifying a registered document
///
/// Pipeline failures are reported with `verified: false` and a 200 status;
/// only malformed requests and backend errors map to error statuses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub verified: bool,
    pub hash: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<Locator>,
    /// Identity whose signature was checked; absent for unsigned registrations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<SignerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_reference: Option<LedgerReference>,
    /// Last stage reached before a failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// Failure category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VerifyResponse {
    fn failed(fingerprint: Fingerprint, kind: ErrorKind, message: String) -> Self {
        Self {
            hash: Some(fingerprint),
            kind: Some(kind.as_str().to_string()),
            message: Some(message),
            ..Self::default()
        }
    }
}

/// Signature stage input derived from the ledger's registration claim
///
/// Unsigned registrations verify without a signature check. A claim signed by
/// any key other than the server's cannot be checked here.
fn signature_check(
    state: &ServerState,
    claim: Option<RegistrationClaim>,
) -> Result<Result<SignatureCheck, String>, VerifyError> {
    let Some(RegistrationClaim {
        signer: claimed,
        signature: Some(signature),
        ..
    }) = claim
    else {
        return Ok(Ok(SignatureCheck::OptOut));
    };

    match &state.signer {
        Some(signer) if claimed == Some(signer.signer_id()) => Ok(Ok(SignatureCheck::Verify {
            scheme: signer.scheme().clone(),
            public_key: signer.public_key().clone(),
            signature: Signature::from_hex(&signature)?,
        })),
        _ => {
            let who = claimed
                .map(|id| id.to_string())
                .unwrap_or_else(|| "an unnamed key".to_string());
            Ok(Err(format!(
                "signed by {}, whose public key this server does not hold",
                who
            )))
        }
    }
}

#[axum::debug_handler]
pub async fn handler(
    State(state): State<ServerState>,
    Path(hash): Path<String>,
) -> Result<impl IntoResponse, VerifyError> {
    let fingerprint: Fingerprint = hash.parse()?;

    let claim = match state.ledger.registration(&fingerprint).await? {
        Some(record) => match record.claim {
            Claim::Registration(claim) => Some(claim),
            _ => None,
        },
        None => None,
    };
    let check = match signature_check(&state, claim)? {
        Ok(check) => check,
        Err(message) => {
            tracing::warn!(%fingerprint, %message, "cannot check signature");
            let response = VerifyResponse::failed(fingerprint, ErrorKind::Integrity, message);
            return Ok((StatusCode::OK, Json(response)));
        }
    };

    let request = VerificationRequest::new(fingerprint, check);
    let response = match state.pipeline.verify(&request).await {
        Verdict::Verified { provenance, .. } => VerifyResponse {
            verified: true,
            hash: Some(provenance.fingerprint),
            cid: Some(provenance.locator),
            signer: provenance.signer,
            registered_at: provenance.registered_at,
            ledger_reference: provenance.ledger_reference,
            ..VerifyResponse::default()
        },
        Verdict::Failed(failure) => VerifyResponse {
            stage: Some(failure.stage),
            ..VerifyResponse::failed(fingerprint, failure.kind(), failure.reason.to_string())
        },
    };
    Ok((StatusCode::OK, Json(response)))
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("invalid document hash: {0}")]
    InvalidHash(#[from] FingerprintError),
    #[error("stored signature is malformed: {0}")]
    StoredSignature(#[from] KeyError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl IntoResponse for VerifyError {
    fn into_response(self) -> Response {
        match &self {
            VerifyError::InvalidHash(_) => {
                error_response(StatusCode::BAD_REQUEST, ErrorKind::Config, self.to_string())
            }
            VerifyError::StoredSignature(e) => {
                tracing::error!(error = %e, "ledger holds a malformed signature");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    e.kind(),
                    self.to_string(),
                )
            }
            VerifyError::Ledger(e) => {
                tracing::error!(error = %e, "ledger lookup failed");
                error_response(status_for(e.kind()), e.kind(), self.to_string())
            }
        }
    }
}

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use common::crypto::{Fingerprint, Signature, SignerId};
use common::error::{Categorize, ErrorKind};
use common::ledger::LedgerReference;
use common::pipeline::{RegistrarError, RegistrationOptions};
use common::storage::Locator;

use crate::http_server::api::{error_response, status_for};
use crate::http_server::ServerState;

/// Multipart field carrying the document
pub const DOCUMENT_FIELD: &str = "document";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Fingerprint of the uploaded document
    pub hash: Fingerprint,
    /// Where the document is stored
    pub cid: Locator,
    pub ledger_reference: Option<LedgerReference>,
    pub signature: Option<Signature>,
    pub signer: Option<SignerId>,
    /// The document was already registered; nothing new was recorded
    pub existing: bool,
}

#[axum::debug_handler]
pub async fn handler(
    State(state): State<ServerState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, UploadError> {
    let mut document = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(DOCUMENT_FIELD) {
            document = Some(field.bytes().await?);
        }
    }
    let document = document.ok_or(UploadError::MissingDocument)?;
    tracing::info!(len = document.len(), "registering uploaded document");

    let options = RegistrationOptions {
        signer: state.signer.clone(),
        envelope: None,
    };
    let registration = state.registrar.register(document, &options).await?;

    let status = if registration.existing {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(UploadResponse {
            hash: registration.entry.fingerprint,
            cid: registration.entry.locator,
            ledger_reference: registration.entry.ledger_reference,
            signature: registration.signature,
            signer: registration.signer,
            existing: registration.existing,
        }),
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("missing multipart field 'document'")]
    MissingDocument,
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Registrar(#[from] RegistrarError),
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        match self {
            UploadError::MissingDocument => {
                error_response(StatusCode::BAD_REQUEST, ErrorKind::Config, self.to_string())
            }
            // carries its own status, 413 for oversized bodies
            UploadError::Multipart(e) => e.into_response(),
            UploadError::Registrar(e) => {
                tracing::error!(error = %e, "upload registration failed");
                error_response(status_for(e.kind()), e.kind(), e.to_string())
            }
        }
    }
}

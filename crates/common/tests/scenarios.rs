//! End-to-end registration and verification over the in-memory harness

use bytes::Bytes;

use common::crypto::{hash, MlDsa44, SignatureScheme};
use common::error::{Categorize, ErrorKind};
use common::ledger::{Claim, Ledger};
use common::pipeline::{
    FailureReason, RegistrationOptions, SignatureCheck, Stage, Verdict, VerificationFailure,
    VerificationRequest,
};
use common::storage::Locator;
use common::testkit::{generate_signer, Harness, Tamper};

fn failure(verdict: Verdict) -> VerificationFailure {
    match verdict {
        Verdict::Failed(failure) => failure,
        Verdict::Verified { .. } => panic!("expected a failed verdict"),
    }
}

#[tokio::test]
async fn test_happy_path_encrypted() {
    let harness = Harness::new().unwrap();
    let recipient = harness.signer.recipient().unwrap();
    let options = RegistrationOptions {
        signer: Some(harness.signer.clone()),
        envelope: Some(recipient.clone()),
    };
    let registration = harness
        .registrar
        .register(Bytes::from_static(b"hello-world"), &options)
        .await
        .unwrap();

    let request = VerificationRequest::new(
        hash(b"hello-world"),
        harness.signature_check(&registration).unwrap(),
    )
    .at(registration.entry.locator.clone())
    .sealed_for(recipient);

    match harness.pipeline.verify(&request).await {
        Verdict::Verified {
            provenance,
            document,
        } => {
            assert_eq!(document, &b"hello-world"[..]);
            assert_eq!(provenance.locator, registration.entry.locator);
            assert_eq!(provenance.signer, Some(harness.signer.signer_id()));
            assert_eq!(
                provenance.ledger_reference,
                registration.entry.ledger_reference
            );
            assert!(provenance.registered_at.is_some());
        }
        Verdict::Failed(failure) => panic!("verification failed: {}", failure),
    }
}

#[tokio::test]
async fn test_happy_path_resolves_locator_from_registry() {
    let harness = Harness::new().unwrap();
    let registration = harness.register_signed(b"hello-world").await.unwrap();

    let request = VerificationRequest::new(
        registration.entry.fingerprint,
        harness.signature_check(&registration).unwrap(),
    );
    let (provenance, _) = harness
        .pipeline
        .verify(&request)
        .await
        .into_result()
        .unwrap();
    assert_eq!(provenance.locator, registration.entry.locator);
}

#[tokio::test]
async fn test_tampered_content() {
    let harness = Harness::new().unwrap();
    let registration = harness.register_signed(b"hello-world").await.unwrap();
    harness.store.tamper(
        &registration.entry.locator,
        Tamper::Replace(Bytes::from_static(b"hello-w0rld")),
    );

    let failure = failure(harness.verify_signed(&registration).await.unwrap());
    assert_eq!(failure.stage, Stage::Fetched);
    assert_eq!(
        failure.reason,
        FailureReason::ContentTampered {
            expected: hash(b"hello-world"),
            actual: hash(b"hello-w0rld"),
        }
    );
    assert_eq!(failure.kind(), ErrorKind::Integrity);
}

#[tokio::test]
async fn test_tampered_envelope() {
    let harness = Harness::new().unwrap();
    let recipient = harness.signer.recipient().unwrap();
    let options = RegistrationOptions {
        signer: None,
        envelope: Some(recipient.clone()),
    };
    let registration = harness
        .registrar
        .register(Bytes::from_static(b"hello-world"), &options)
        .await
        .unwrap();
    // last byte belongs to the integrity tag
    harness
        .store
        .tamper(&registration.entry.locator, Tamper::FlipByte(usize::MAX));

    let request = VerificationRequest::new(hash(b"hello-world"), SignatureCheck::OptOut)
        .at(registration.entry.locator.clone())
        .sealed_for(recipient);
    let failure = failure(harness.pipeline.verify(&request).await);
    assert_eq!(failure.stage, Stage::Fetched);
    assert!(matches!(failure.reason, FailureReason::EnvelopeTampered(_)));
}

#[tokio::test]
async fn test_registry_mismatch() {
    let harness = Harness::new().unwrap();
    let registration = harness.register_signed(b"hello-world").await.unwrap();

    // an untracked copy of the same document somewhere else
    let loc_b = Locator::new("locB");
    harness
        .store
        .tamper(&loc_b, Tamper::Replace(Bytes::from_static(b"hello-world")));

    let request = VerificationRequest::new(
        registration.entry.fingerprint,
        harness.signature_check(&registration).unwrap(),
    )
    .at(loc_b.clone());
    let failure = failure(harness.pipeline.verify(&request).await);
    assert_eq!(failure.stage, Stage::SignatureVerified);
    assert_eq!(
        failure.reason,
        FailureReason::RegistryMismatch {
            registered: registration.entry.locator,
            fetched: loc_b,
        }
    );
}

#[tokio::test]
async fn test_signature_from_another_signer() {
    let harness = Harness::new().unwrap();
    let registration = harness.register_signed(b"hello-world").await.unwrap();
    let impostor = generate_signer().unwrap();

    let request = VerificationRequest::new(
        registration.entry.fingerprint,
        SignatureCheck::Verify {
            scheme: impostor.scheme().clone(),
            public_key: impostor.public_key().clone(),
            signature: registration.signature.clone().unwrap(),
        },
    );
    let failure = failure(harness.pipeline.verify(&request).await);
    assert_eq!(failure.stage, Stage::HashVerified);
    assert_eq!(failure.reason, FailureReason::SignatureInvalid);
}

#[tokio::test]
async fn test_unregistered_document() {
    let harness = Harness::new().unwrap();
    let request = VerificationRequest::new(hash(b"never stored"), SignatureCheck::OptOut);
    let failure = failure(harness.pipeline.verify(&request).await);
    assert_eq!(failure.stage, Stage::Start);
    assert_eq!(failure.reason, FailureReason::NotRegistered);
}

#[tokio::test]
async fn test_stored_but_unregistered_document() {
    let harness = Harness::new().unwrap();
    let loc = Locator::new("locA");
    harness
        .store
        .tamper(&loc, Tamper::Replace(Bytes::from_static(b"hello-world")));

    let request =
        VerificationRequest::new(hash(b"hello-world"), SignatureCheck::OptOut).at(loc);
    let failure = failure(harness.pipeline.verify(&request).await);
    assert_eq!(failure.stage, Stage::SignatureVerified);
    assert_eq!(failure.reason, FailureReason::NotRegistered);
}

#[tokio::test]
async fn test_storage_outage() {
    let harness = Harness::new().unwrap();
    let registration = harness.register_signed(b"hello-world").await.unwrap();
    harness
        .store
        .tamper(&registration.entry.locator, Tamper::Unavailable);

    let failure = failure(harness.verify_signed(&registration).await.unwrap());
    assert_eq!(failure.stage, Stage::Start);
    assert!(matches!(failure.reason, FailureReason::StorageUnavailable(_)));
    assert_eq!(failure.kind(), ErrorKind::Io);
}

#[tokio::test]
async fn test_verification_is_recorded_on_ledger() {
    let harness = Harness::new().unwrap();
    let registration = harness.register_signed(b"hello-world").await.unwrap();
    let verdict = harness.verify_signed(&registration).await.unwrap();

    harness
        .registrar
        .record_verification(registration.entry.fingerprint, verdict.is_verified())
        .await
        .unwrap();

    let history = harness
        .ledger
        .history(&registration.entry.fingerprint)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert!(matches!(history[0].claim, Claim::Registration(_)));
    assert!(matches!(
        history[1].claim,
        Claim::Verification { verified: true, .. }
    ));
    assert_eq!(history[1].previous, Some(history[0].reference.clone()));
}

#[tokio::test]
async fn test_signature_covers_plaintext_not_envelope() {
    let harness = Harness::new().unwrap();
    let options = RegistrationOptions {
        signer: Some(harness.signer.clone()),
        envelope: Some(harness.signer.recipient().unwrap()),
    };
    let registration = harness
        .registrar
        .register(Bytes::from_static(b"hello-world"), &options)
        .await
        .unwrap();
    assert!(MlDsa44
        .verify(
            harness.signer.public_key(),
            b"hello-world",
            registration.signature.as_ref().unwrap()
        )
        .unwrap());
}

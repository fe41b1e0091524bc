pub mod batch;
pub mod deploy;
pub mod details;
pub mod keygen;
pub mod record_verification;
pub mod register;
pub mod serve;
pub mod verify;
pub mod version;

pub use batch::Batch;
pub use deploy::Deploy;
pub use details::Details;
pub use keygen::Keygen;
pub use record_verification::RecordVerification;
pub use register::Register;
pub use serve::Serve;
pub use verify::Verify;
pub use version::Version;

use std::path::{Path, PathBuf};

/// `<document>.sig`, where register writes the hex signature of a document
pub fn signature_path(document: &Path) -> PathBuf {
    let mut path = document.as_os_str().to_owned();
    path.push(".sig");
    PathBuf::from(path)
}

#[cfg(test)]
mod test {
    use super::*;

    use common::error::{Categorize, ErrorKind};
    use common::pipeline::{FailureReason, Stage};
    use tempfile::TempDir;

    use crate::cli::op::{Op, OpContext};

    fn deploy_filesystem() -> Deploy {
        Deploy {
            label: "ops-test".to_string(),
            storage: deploy::StorageKind::Filesystem,
            ipfs_api: common::storage::DEFAULT_IPFS_API.parse().unwrap(),
            blobs_path: None,
            scheme: common::crypto::MlDsa44::NAME.to_string(),
            cipher: common::crypto::Aes256GcmCipher::NAME.to_string(),
            concurrency: Some(4),
        }
    }

    async fn deployed() -> (TempDir, OpContext) {
        let dir = TempDir::new().unwrap();
        let ctx = OpContext::new(Some(dir.path().join("qdv")));
        deploy_filesystem().execute(&ctx).await.unwrap();
        Keygen {
            name: "default".to_string(),
            scheme: None,
        }
        .execute(&ctx)
        .await
        .unwrap();
        (dir, ctx)
    }

    fn register_file(file: &Path) -> Register {
        Register {
            file: Some(file.to_path_buf()),
            hash: None,
            locator: None,
            key: "default".to_string(),
            no_sign: false,
            encrypt: false,
        }
    }

    fn verify_file(file: &Path) -> Verify {
        Verify {
            hash: None,
            file: Some(file.to_path_buf()),
            locator: None,
            signature: None,
            public_key: None,
            key: None,
            skip_signature: false,
            decrypt: false,
            out: None,
            record: false,
        }
    }

    #[tokio::test]
    async fn test_deploy_twice_fails() {
        let (_dir, ctx) = deployed().await;
        let err = deploy_filesystem().execute(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_failed_ledger_deploy_can_be_retried() {
        let dir = TempDir::new().unwrap();
        let qdv_dir = dir.path().join("qdv");
        let ctx = OpContext::new(Some(qdv_dir.clone()));

        // a directory where the journal should go makes the ledger deploy fail
        let journal = qdv_dir.join(qdv_cli::state::LEDGER_FILE_NAME);
        std::fs::create_dir_all(&journal).unwrap();
        assert!(deploy_filesystem().execute(&ctx).await.is_err());
        assert!(!qdv_dir.join(qdv_cli::state::CONFIG_FILE_NAME).exists());

        std::fs::remove_dir(&journal).unwrap();
        deploy_filesystem().execute(&ctx).await.unwrap();
        ctx.state().unwrap();
    }

    #[tokio::test]
    async fn test_ops_require_deploy() {
        let dir = TempDir::new().unwrap();
        let ctx = OpContext::new(Some(dir.path().join("missing")));
        let err = Details { hash: None }.execute(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("not initialized"));
    }

    #[tokio::test]
    async fn test_register_then_verify_file() {
        let (dir, ctx) = deployed().await;
        let file = dir.path().join("contract.txt");
        std::fs::write(&file, b"quarterly contract").unwrap();

        let output = register_file(&file).execute(&ctx).await.unwrap();
        assert!(output.starts_with("Registered"));
        assert!(signature_path(&file).exists());

        let again = register_file(&file).execute(&ctx).await.unwrap();
        assert!(again.starts_with("Already registered"));

        let out = dir.path().join("fetched.txt");
        let mut verify = verify_file(&file);
        verify.out = Some(out.clone());
        verify.record = true;
        let output = verify.execute(&ctx).await.unwrap();
        assert!(output.starts_with("Verified"));
        assert_eq!(std::fs::read(&out).unwrap(), b"quarterly contract");

        let fingerprint = common::crypto::hash(b"quarterly contract");
        let details = Details {
            hash: Some(fingerprint),
        }
        .execute(&ctx)
        .await
        .unwrap();
        assert!(details.contains("genesis 'ops-test'"));
        assert!(details.contains("verification passed"));
        assert!(details.contains("history (3 record(s))"));
    }

    #[tokio::test]
    async fn test_verify_detects_tampered_blob() {
        let (dir, ctx) = deployed().await;
        let file = dir.path().join("deed.txt");
        std::fs::write(&file, b"hello-world").unwrap();
        register_file(&file).execute(&ctx).await.unwrap();

        // overwrite the stored blob in place
        let state = ctx.state().unwrap();
        let entry = state
            .registry()
            .unwrap()
            .lookup(&common::crypto::hash(b"hello-world"))
            .unwrap();
        let blob = dir
            .path()
            .join("qdv")
            .join(qdv_cli::state::BLOBS_DIR_NAME)
            .join(entry.locator.as_str());
        std::fs::write(&blob, b"hello-w0rld").unwrap();

        let err = verify_file(&file).execute(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
        match err {
            verify::VerifyError::Failed(failure) => {
                assert_eq!(failure.stage, Stage::Fetched);
                assert!(matches!(
                    failure.reason,
                    FailureReason::ContentTampered { .. }
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_encrypted_register_needs_decrypt() {
        let (dir, ctx) = deployed().await;
        let file = dir.path().join("sealed.txt");
        std::fs::write(&file, b"for the owner only").unwrap();
        let mut register = register_file(&file);
        register.encrypt = true;
        register.execute(&ctx).await.unwrap();

        let err = verify_file(&file).execute(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);

        let mut verify = verify_file(&file);
        verify.decrypt = true;
        verify.execute(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_unregistered_hash() {
        let (_dir, ctx) = deployed().await;
        let mut verify = verify_file(Path::new("unused"));
        verify.file = None;
        verify.hash = Some(common::crypto::hash(b"never registered"));
        verify.skip_signature = true;
        let err = verify.execute(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_record_verification_requires_registration() {
        let (_dir, ctx) = deployed().await;
        let err = RecordVerification {
            hash: common::crypto::hash(b"unknown"),
            verified: false,
        }
        .execute(&ctx)
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_batch_synthetic_documents() {
        let (_dir, ctx) = deployed().await;
        let output = Batch {
            dir: None,
            count: Some(12),
            size_kb: 2,
            concurrency: Some(3),
            key: "default".to_string(),
            no_sign: false,
            encrypt: false,
            verify: true,
            json: false,
        }
        .execute(&ctx)
        .await
        .unwrap();
        assert!(output.contains("12 ok, 0 failed"));

        let listing = Details { hash: None }.execute(&ctx).await.unwrap();
        assert!(listing.starts_with("12 registered document(s)"));
    }

    #[tokio::test]
    async fn test_batch_empty_dir() {
        let (dir, ctx) = deployed().await;
        let empty = dir.path().join("empty");
        std::fs::create_dir(&empty).unwrap();
        let err = Batch {
            dir: Some(empty),
            count: None,
            size_kb: 1,
            concurrency: None,
            key: "default".to_string(),
            no_sign: true,
            encrypt: false,
            verify: false,
            json: false,
        }
        .execute(&ctx)
        .await
        .unwrap_err();
        assert!(matches!(err, batch::BatchError::Empty));
    }

    #[test]
    fn test_signature_path() {
        assert_eq!(
            signature_path(Path::new("/tmp/report.pdf")),
            PathBuf::from("/tmp/report.pdf.sig")
        );
    }
}

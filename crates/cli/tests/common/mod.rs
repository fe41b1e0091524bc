//! Shared helpers for app state integration tests
#![allow(dead_code)]

use tempfile::TempDir;

use common::crypto::require_scheme;
use common::ledger::JournalLedger;
use qdv_cli::{AppConfig, AppState, StorageConfig};

/// Initialized state with a filesystem store and one `default` key pair
pub struct Deployed {
    pub state: AppState,
    pub dir: TempDir,
}

pub async fn deploy_filesystem() -> Deployed {
    let dir = TempDir::new().unwrap();
    let config = AppConfig {
        storage: StorageConfig::Filesystem { path: None },
        concurrency: 4,
        ..AppConfig::default()
    };
    let state = AppState::init(Some(dir.path().join("qdv")), config).unwrap();
    JournalLedger::deploy(&state.ledger_path, "state-test")
        .await
        .unwrap();

    let scheme = require_scheme(&state.config.signature_scheme).unwrap();
    let keypair = scheme.generate_keypair().unwrap();
    state
        .save_keypair(
            "default",
            scheme.name(),
            &keypair.public_key,
            &keypair.private_key,
        )
        .unwrap();

    Deployed { state, dir }
}

//! Shared test utilities for pipeline integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Deserialize;
use tempfile::TempDir;
use url::Url;

use common::ledger::JournalLedger;
use common::pipeline::{Registrar, VerificationPipeline};
use common::registry::DocumentRegistry;
use common::storage::{content_cid, FsContentStore};

/// Filesystem-backed store, journal ledger and registry under one temp dir
pub struct FsEnv {
    pub store: FsContentStore,
    pub ledger: JournalLedger,
    pub registry: DocumentRegistry,
    pub registrar: Registrar,
    pub pipeline: VerificationPipeline,
    pub dir: TempDir,
}

pub async fn setup_fs_env() -> FsEnv {
    let dir = TempDir::new().unwrap();
    let store = FsContentStore::open(dir.path().join("blobs")).unwrap();
    let ledger = JournalLedger::deploy(dir.path().join("ledger.jsonl"), "test")
        .await
        .unwrap();
    let registry = DocumentRegistry::open(dir.path().join("registry.json")).unwrap();
    let registrar = Registrar::new(
        Arc::new(store.clone()),
        Arc::new(ledger.clone()),
        registry.clone(),
    );
    let pipeline = VerificationPipeline::new(Arc::new(store.clone()), registry.clone());
    FsEnv {
        store,
        ledger,
        registry,
        registrar,
        pipeline,
        dir,
    }
}

/// Minimal stand-in for the IPFS `add` and `cat` endpoints
#[derive(Clone, Default)]
pub struct MockIpfs {
    blocks: Arc<Mutex<HashMap<String, Bytes>>>,
    /// Requests answered with 503 before the node starts behaving
    failures_left: Arc<AtomicUsize>,
    pub requests: Arc<AtomicUsize>,
}

impl MockIpfs {
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Serve on an ephemeral port, returning the API root url
    pub async fn spawn(&self) -> Url {
        let app = Router::new()
            .route("/api/v0/add", post(add))
            .route("/api/v0/cat", post(cat))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{}/api/v0", addr)).unwrap()
    }
}

async fn add(State(node): State<MockIpfs>, mut multipart: Multipart) -> Response {
    if node.should_fail() {
        return (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response();
    }
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.unwrap();
        let hash = content_cid(&data).unwrap().to_string();
        let size = data.len().to_string();
        node.blocks.lock().insert(hash.clone(), data);
        return Json(serde_json::json!({ "Name": name, "Hash": hash, "Size": size }))
            .into_response();
    }
    (StatusCode::BAD_REQUEST, "missing file part").into_response()
}

#[derive(Deserialize)]
struct CatQuery {
    arg: String,
}

async fn cat(State(node): State<MockIpfs>, Query(query): Query<CatQuery>) -> Response {
    if node.should_fail() {
        return (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response();
    }
    match node.blocks.lock().get(&query.arg).cloned() {
        Some(data) => data.into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "block was not found locally (offline): ipld: could not find node",
        )
            .into_response(),
    }
}

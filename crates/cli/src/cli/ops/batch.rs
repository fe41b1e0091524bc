use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bytes::Bytes;
use clap::{ArgGroup, Args};

use common::crypto::{hash, CryptoError};
use common::error::{Categorize, ErrorKind};
use common::pipeline::{
    Registrar, RegistrationOptions, SignatureCheck, VerificationPipeline, VerificationRequest,
};
use qdv_cli::state::DEFAULT_KEY_NAME;
use qdv_cli::{AppState, LatencyReport, StateError};

/// Register (and optionally verify) many documents concurrently and report latencies
#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("input").required(true).args(["dir", "count"])))]
pub struct Batch {
    /// Register every regular file in this directory
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Generate this many synthetic documents instead
    #[arg(long)]
    pub count: Option<usize>,

    /// Size of synthetic documents in KB
    #[arg(long, default_value_t = 10)]
    pub size_kb: usize,

    /// Pipelines allowed to run at once (defaults to the configured value)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Key pair to sign (and seal) with
    #[arg(long, default_value = DEFAULT_KEY_NAME)]
    pub key: String,

    /// Register without signing
    #[arg(long)]
    pub no_sign: bool,

    /// Store documents sealed for the key owner
    #[arg(long)]
    pub encrypt: bool,

    /// Verify each document right after registering it
    #[arg(long)]
    pub verify: bool,

    /// Print the latency report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no documents to process")]
    Empty,
    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{} of {} documents failed; first failure: {first}\n{report}", .report.failed, .report.total())]
    Failures {
        kind: ErrorKind,
        first: String,
        report: LatencyReport,
    },
}

impl Categorize for BatchError {
    fn kind(&self) -> ErrorKind {
        match self {
            BatchError::State(e) => e.kind(),
            BatchError::Crypto(e) => e.kind(),
            BatchError::Read { .. } => ErrorKind::Io,
            BatchError::Empty => ErrorKind::Config,
            BatchError::Json(_) => ErrorKind::Io,
            BatchError::Failures { kind, .. } => *kind,
        }
    }
}

/// A failed job, keeping the category of the underlying error
type JobFailure = (ErrorKind, String);

fn failure(e: impl Categorize + std::fmt::Display) -> JobFailure {
    (e.kind(), e.to_string())
}

fn read_dir(dir: &Path) -> Result<Vec<(String, Bytes)>, BatchError> {
    let read_err = |source| BatchError::Read {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let document = std::fs::read(&path).map_err(|source| BatchError::Read {
                path: path.clone(),
                source,
            })?;
            Ok((path.display().to_string(), Bytes::from(document)))
        })
        .collect()
}

/// Random base content, made unique per document by an index prefix
fn synthetic(count: usize, size_kb: usize) -> Result<Vec<(String, Bytes)>, BatchError> {
    let size = (size_kb * 1024).max(8);
    let mut base = vec![0u8; size];
    getrandom::getrandom(&mut base)
        .map_err(|e| BatchError::Crypto(CryptoError::Random(e.to_string())))?;

    Ok((0..count)
        .map(|i| {
            let mut document = base.clone();
            document[..8].copy_from_slice(&(i as u64).to_le_bytes());
            (format!("synthetic-{}", i), Bytes::from(document))
        })
        .collect())
}

async fn run_job(
    registrar: Registrar,
    pipeline: VerificationPipeline,
    options: RegistrationOptions,
    verify: bool,
    document: Bytes,
) -> Result<Duration, JobFailure> {
    let started = Instant::now();
    let registration = registrar
        .register(document.clone(), &options)
        .await
        .map_err(failure)?;

    if verify {
        let check = match (&options.signer, registration.signature) {
            (Some(signer), Some(signature)) => SignatureCheck::Verify {
                scheme: signer.scheme().clone(),
                public_key: signer.public_key().clone(),
                signature,
            },
            _ => SignatureCheck::OptOut,
        };
        let mut request =
            VerificationRequest::new(hash(&document), check).at(registration.entry.locator);
        if let Some(recipient) = options.envelope {
            request = request.sealed_for(recipient);
        }
        pipeline
            .verify(&request)
            .await
            .into_result()
            .map_err(failure)?;
    }
    Ok(started.elapsed())
}

impl Batch {
    fn documents(&self) -> Result<Vec<(String, Bytes)>, BatchError> {
        match (&self.dir, self.count) {
            (Some(dir), _) => read_dir(dir),
            (None, Some(count)) => synthetic(count, self.size_kb),
            (None, None) => Ok(Vec::new()),
        }
    }

    fn options(&self, state: &AppState) -> Result<RegistrationOptions, BatchError> {
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
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Batch {
    type Error = BatchError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut state = ctx.state()?;
        if let Some(concurrency) = self.concurrency {
            state.config.concurrency = concurrency;
        }

        let documents = self.documents()?;
        if documents.is_empty() {
            return Err(BatchError::Empty);
        }
        let options = self.options(&state)?;
        let (registrar, pipeline) = state.pipelines().await?;
        let pool = state.pool();
        tracing::info!(
            documents = documents.len(),
            concurrency = pool.concurrency(),
            "starting batch"
        );

        let bytes: u64 = documents.iter().map(|(_, doc)| doc.len() as u64).sum();
        let labels: Vec<String> = documents.iter().map(|(label, _)| label.clone()).collect();
        let jobs = documents.into_iter().map(|(_, document)| {
            run_job(
                registrar.clone(),
                pipeline.clone(),
                options.clone(),
                self.verify,
                document,
            )
        });

        let started = Instant::now();
        let results = pool.run_all(jobs).await;
        let elapsed = started.elapsed();

        let mut samples = Vec::with_capacity(results.len());
        let mut failures: Vec<JobFailure> = Vec::new();
        for (label, result) in labels.iter().zip(results) {
            match result.map_err(failure).and_then(|job| job) {
                Ok(latency) => samples.push(latency),
                Err((kind, message)) => {
                    tracing::warn!(document = %label, %kind, %message, "batch job failed");
                    failures.push((kind, format!("{}: {}", label, message)));
                }
            }
        }

        let report = LatencyReport::new(samples, failures.len(), bytes, elapsed);
        match failures.into_iter().next() {
            None if self.json => Ok(serde_json::to_string_pretty(&report)?),
            None => Ok(report.to_string()),
            Some((kind, first)) => Err(BatchError::Failures {
                kind,
                first,
                report,
            }),
        }
    }
}

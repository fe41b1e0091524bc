use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use url::Url;

use super::{ContentStore, Locator, StorageError};

/// Default IPFS HTTP API root
pub const DEFAULT_IPFS_API: &str = "http://localhost:5001/api/v0";
/// Per-request timeout
pub const IPFS_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Attempts per request, including the first
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Backoff before the second attempt, doubled after each failure
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddResponse {
    #[allow(dead_code)]
    name: Option<String>,
    hash: String,
}

/// [`ContentStore`] over the IPFS HTTP API
///
/// Transient failures (connection errors, timeouts, 5xx) are retried with
/// exponential backoff. Nothing else is.
#[derive(Debug, Clone)]
pub struct IpfsClient {
    remote: Url,
    client: Client,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl IpfsClient {
    /// Client for the API rooted at `remote`, e.g. `http://localhost:5001/api/v0`
    pub fn new(remote: &Url) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(IPFS_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        Ok(Self {
            remote: remote.clone(),
            client,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        })
    }

    pub fn with_retry(mut self, max_attempts: u32, initial_backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.remote
    }

    fn endpoint(&self, command: &str) -> Result<Url, StorageError> {
        let base = self.remote.as_str().trim_end_matches('/');
        Url::parse(&format!("{}/{}", base, command))
            .map_err(|e| StorageError::Protocol(format!("invalid API url: {}", e)))
    }

    async fn with_retries<T, F, Fut>(&self, command: &str, mut attempt: F) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let mut backoff = self.initial_backoff;
        let mut tries = 1;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && tries < self.max_attempts => {
                    tracing::warn!(command, tries, error = %e, "transient IPFS failure, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    tries += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn check_status(response: Response) -> Result<Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StorageError::HttpStatus {
            status: status.as_u16(),
            body,
        })
    }
}

fn transport_error(e: reqwest::Error) -> StorageError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        StorageError::Unavailable(e.to_string())
    } else {
        StorageError::Protocol(e.to_string())
    }
}

/// IPFS answers a missing block on `cat` with a 500 and a "not found" message,
/// which must not be retried as a transient failure
fn is_missing_block(e: &StorageError) -> bool {
    matches!(e, StorageError::HttpStatus { status: 500, body } if body.contains("not found"))
}

#[async_trait]
impl ContentStore for IpfsClient {
    #[tracing::instrument(skip(self, content), fields(len = content.len()))]
    async fn store(&self, content: Bytes) -> Result<Locator, StorageError> {
        let url = self.endpoint("add")?;
        let added = self
            .with_retries("add", || {
                let form = Form::new().part(
                    "file",
                    Part::stream(content.clone()).file_name("document"),
                );
                let request = self.client.post(url.clone()).multipart(form);
                async move {
                    let response = request.send().await.map_err(transport_error)?;
                    let response = Self::check_status(response).await?;
                    response
                        .json::<AddResponse>()
                        .await
                        .map_err(|e| StorageError::Protocol(e.to_string()))
                }
            })
            .await?;

        if added.hash.is_empty() {
            return Err(StorageError::Protocol("add returned an empty hash".into()));
        }
        tracing::debug!(cid = %added.hash, "added to IPFS");
        Ok(Locator::new(added.hash))
    }

    #[tracing::instrument(skip(self))]
    async fn fetch(&self, locator: &Locator) -> Result<Bytes, StorageError> {
        let url = self.endpoint("cat")?;
        self.with_retries("cat", || {
            let request = self
                .client
                .post(url.clone())
                .query(&[("arg", locator.as_str())]);
            async move {
                let response = request.send().await.map_err(transport_error)?;
                let response = Self::check_status(response).await.map_err(|e| {
                    if is_missing_block(&e) {
                        StorageError::NotFound(locator.clone())
                    } else {
                        e
                    }
                })?;
                response.bytes().await.map_err(transport_error)
            }
        })
        .await
    }
}

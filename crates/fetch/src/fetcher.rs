//! The worker-pool HTTP fetcher.

use crate::error::{FetchError, FetchResult};
use crate::inflight::InflightSet;
use crate::limiter::RateLimiter;
use arkive_core::history::{self, BuildRecord};
use arkive_objects::{hash_from_etag, ObjectStore, ObjectWriter, StoreError};
use reqwest::header::{HeaderMap, ETAG};
use reqwest::StatusCode;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default worker pool size.
pub const DEFAULT_WORKERS: usize = 32;

/// What became of a response body in [`Fetcher::fetch_content`].
///
/// Only the call that reports [`ContentOutcome::Streamed`] owns the bytes
/// in its sink; every other outcome leaves the sink untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentOutcome {
    /// No sink was given, or the status was not a success; the body was
    /// discarded.
    Discarded,
    /// The body was streamed into the sink; this call owns the write.
    Streamed,
    /// Another worker holds the in-flight claim for this content hash.
    InFlight(String),
    /// An object with this hash is already present in the store.
    Stored(String),
}

/// Makes HTTP requests through a fixed worker pool and a shared rate
/// limiter. Clones share the pool.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    jobs: async_channel::Sender<Job>,
}

struct Job {
    request: reqwest::Request,
    cancel: CancellationToken,
    done: oneshot::Sender<FetchResult<reqwest::Response>>,
}

impl Fetcher {
    /// Create a fetcher with the given worker count (0 selects the
    /// default) and request rate (non-positive means unlimited).
    pub fn new(workers: usize, rate: f64) -> Self {
        Self::with_client(reqwest::Client::new(), workers, rate)
    }

    /// Create a fetcher over an existing client.
    pub fn with_client(client: reqwest::Client, workers: usize, rate: f64) -> Self {
        let workers = if workers == 0 { DEFAULT_WORKERS } else { workers };
        let (jobs, queue) = async_channel::bounded::<Job>(workers);
        let limiter = Arc::new(RateLimiter::new(rate));
        for _ in 0..workers {
            let client = client.clone();
            let limiter = limiter.clone();
            let queue = queue.clone();
            tokio::spawn(run_worker(client, limiter, queue));
        }
        Self { client, jobs }
    }

    /// The underlying HTTP client.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Run one request through the pool and limiter.
    async fn execute(
        &self,
        request: reqwest::Request,
        cancel: &CancellationToken,
    ) -> FetchResult<reqwest::Response> {
        let (done, finish) = oneshot::channel();
        let job = Job {
            request,
            cancel: cancel.clone(),
            done,
        };
        self.jobs.send(job).await.map_err(|_| FetchError::PoolClosed)?;
        finish.await.map_err(|_| FetchError::PoolClosed)?
    }

    /// Fetch and lex a server's deploy-history file. Requires a 2xx
    /// response; the body is fully buffered before lexing.
    pub async fn fetch_deploy_history(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> FetchResult<Vec<BuildRecord>> {
        let request = self.client.get(url).build()?;
        let response = self.execute(request, cancel).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            body = response.bytes() => body?,
        };
        Ok(history::lex(&String::from_utf8_lossy(&body)))
    }

    /// Probe one artifact URL.
    ///
    /// Without a sink this is a HEAD request and the body outcome is
    /// [`ContentOutcome::Discarded`]. With a sink it is a GET: on 2xx the
    /// body streams into the sink, unless the content's ETag-derived hash
    /// is already claimed in `inflight` or already present in `store` —
    /// the outcome tells the caller which of those happened, and thereby
    /// whether this call owns the sink's bytes. The in-flight set is the
    /// caller's; nothing here ever clears it.
    pub async fn fetch_content(
        &self,
        cancel: &CancellationToken,
        url: &str,
        store: Option<&ObjectStore>,
        inflight: &InflightSet,
        sink: Option<&mut ObjectWriter>,
    ) -> FetchResult<(StatusCode, HeaderMap, ContentOutcome)> {
        let request = match sink {
            Some(_) => self.client.get(url),
            None => self.client.head(url),
        }
        .build()?;
        let mut response = self.execute(request, cancel).await?;
        let status = response.status();
        let headers = response.headers().clone();

        let Some(writer) = sink else {
            return Ok((status, headers, ContentOutcome::Discarded));
        };
        if !status.is_success() {
            return Ok((status, headers, ContentOutcome::Discarded));
        }

        if let Some(hash) = etag_hash(&headers) {
            if !inflight.try_claim(&hash) {
                debug!(url, %hash, "content already in flight, skipping download");
                return Ok((status, headers, ContentOutcome::InFlight(hash)));
            }
            if let Some(store) = store {
                if store.exists(&hash).await {
                    debug!(url, %hash, "object already stored, skipping download");
                    return Ok((status, headers, ContentOutcome::Stored(hash)));
                }
            }
        }

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                chunk = response.chunk() => chunk?,
            };
            let Some(chunk) = chunk else { break };
            writer.write(&chunk).await.map_err(StoreError::Io)?;
        }
        Ok((status, headers, ContentOutcome::Streamed))
    }
}

fn etag_hash(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ETAG)
        .and_then(|value| value.to_str().ok())
        .and_then(hash_from_etag)
}

async fn run_worker(
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    queue: async_channel::Receiver<Job>,
) {
    while let Ok(job) = queue.recv().await {
        let result = run_job(&client, &limiter, job.request, &job.cancel).await;
        // The requester may have gone away; a dropped mailbox is fine.
        let _ = job.done.send(result);
    }
}

async fn run_job(
    client: &reqwest::Client,
    limiter: &RateLimiter,
    request: reqwest::Request,
    cancel: &CancellationToken,
) -> FetchResult<reqwest::Response> {
    limiter.wait(cancel).await?;
    tokio::select! {
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        response = client.execute(request) => Ok(response?),
    }
}

use reqwest::Client;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::models::job::{JobSnapshot, OverallStatus};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_ATTEMPTS: u32 = 120;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("status request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("job {0} is unknown or has been evicted")]
    NotFound(Uuid),

    #[error("job did not complete within {0} status checks")]
    TimedOut(u32),

    #[error("polling was cancelled")]
    Cancelled,
}

/// Cancels an in-flight polling loop. Dropping the handle without calling
/// [`CancelHandle::cancel`] leaves the loop running to completion.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a cancellation pair for [`StatusPoller::wait_for_completion`].
pub fn cancellation() -> (CancelHandle, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, rx)
}

/// Polls the status endpoint for one job until it reaches a terminal
/// aggregate state.
///
/// Requests are strictly sequential: a new request is only scheduled once
/// the previous response has been consumed, so there is never more than
/// one in flight. Cancellation aborts the in-flight request and prevents
/// any further scheduling.
pub struct StatusPoller {
    http: Client,
    base_url: String,
    interval: Duration,
    max_attempts: u32,
}

impl StatusPoller {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            interval: DEFAULT_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Slower cadence for constrained devices.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Poll until the job completes, the attempt budget runs out, or the
    /// paired [`CancelHandle`] fires.
    ///
    /// A timeout here says nothing about the server-side job, which may
    /// still be running; it is simply no longer being observed.
    pub async fn wait_for_completion(
        &self,
        job_id: Uuid,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<JobSnapshot, PollError> {
        for attempt in 1..=self.max_attempts {
            let snapshot = tokio::select! {
                result = self.fetch(job_id) => result?,
                _ = wait_cancelled(&mut cancel) => return Err(PollError::Cancelled),
            };

            if snapshot.status == OverallStatus::Complete {
                return Ok(snapshot);
            }

            debug!(
                %job_id,
                attempt,
                completed = snapshot.completed_count,
                total = snapshot.total_count,
                "job still processing"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = wait_cancelled(&mut cancel) => return Err(PollError::Cancelled),
            }
        }

        Err(PollError::TimedOut(self.max_attempts))
    }

    async fn fetch(&self, job_id: Uuid) -> Result<JobSnapshot, PollError> {
        let response = self
            .http
            .get(format!("{}/api/v1/enrich/{}", self.base_url, job_id))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PollError::NotFound(job_id));
        }

        let response = response.error_for_status()?;
        Ok(response.json::<JobSnapshot>().await?)
    }
}

/// Resolves once cancellation is requested. A dropped sender (cancellation
/// no longer possible) never resolves.
async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{error, info, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::job_queue::{BillingJob, JobHandler, JobOutcome, JobQueue},
};

const QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(600),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Run one job with bounded retries. Returns the last error once attempts
/// are exhausted; the caller decides how to report it.
pub async fn run_with_retry(
    handler: &dyn JobHandler,
    job: &BillingJob,
    policy: RetryPolicy,
) -> AppResult<JobOutcome> {
    let mut attempt = 1;
    loop {
        match handler.handle(job).await {
            Ok(outcome) => {
                info!(job = job.name(), attempt, ?outcome, "Job finished");
                return Ok(outcome);
            }
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.backoff_for(attempt);
                warn!(
                    job = job.name(),
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Job failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Bounded in-process queue drained by a single worker task. Each job runs
/// in its own task so a retrying job does not hold up the rest.
#[derive(Clone)]
pub struct InProcessJobQueue {
    sender: mpsc::Sender<BillingJob>,
}

impl InProcessJobQueue {
    pub fn start(handler: Arc<dyn JobHandler>, policy: RetryPolicy) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<BillingJob>(QUEUE_CAPACITY);

        let worker = tokio::spawn(async move {
            info!(
                max_attempts = policy.max_attempts,
                "Billing job worker started"
            );
            while let Some(job) = receiver.recv().await {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    if let Err(e) = run_with_retry(handler.as_ref(), &job, policy).await {
                        error!(
                            job = job.name(),
                            attempts = policy.max_attempts,
                            error = %e,
                            "Job failed, giving up"
                        );
                    }
                });
            }
            info!("Billing job queue closed, worker exiting");
        });

        (Self { sender }, worker)
    }
}

#[async_trait]
impl JobQueue for InProcessJobQueue {
    async fn enqueue(&self, job: BillingJob) -> AppResult<()> {
        self.sender
            .send(job)
            .await
            .map_err(|e| AppError::Internal(format!("job queue closed: {}", e.0.name())))
    }
}

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::application::ports::{
    idempotency::IdempotencyStore,
    job_queue::{BillingJob, JobQueue},
};

/// When a recurring job fires, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    DailyAt { hour: u32, minute: u32 },
    HourlyAt { minute: u32 },
    Every(Duration),
}

impl Schedule {
    /// First firing strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Schedule::DailyAt { hour, minute } => {
                let today = now
                    .date_naive()
                    .and_hms_opt(hour.min(23), minute.min(59), 0)
                    .map(|t| t.and_utc());
                match today {
                    Some(t) if t > now => t,
                    Some(t) => t + ChronoDuration::days(1),
                    None => now + ChronoDuration::days(1),
                }
            }
            Schedule::HourlyAt { minute } => {
                let this_hour = now
                    .with_minute(minute.min(59))
                    .and_then(|t| t.with_second(0))
                    .and_then(|t| t.with_nanosecond(0));
                match this_hour {
                    Some(t) if t > now => t,
                    Some(t) => t + ChronoDuration::hours(1),
                    None => now + ChronoDuration::hours(1),
                }
            }
            Schedule::Every(every) => {
                now + ChronoDuration::from_std(every).unwrap_or(ChronoDuration::minutes(1))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub invoice_generation: Schedule,
    pub payment_reconciliation: Schedule,
    pub overdue_marking: Schedule,
    /// Sweep of the process-local idempotency tier
    pub idempotency_eviction_interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            invoice_generation: Schedule::DailyAt { hour: 2, minute: 0 },
            payment_reconciliation: Schedule::HourlyAt { minute: 15 },
            overdue_marking: Schedule::Every(Duration::from_secs(6 * 60 * 60)),
            idempotency_eviction_interval: Duration::from_secs(10 * 60),
        }
    }
}

/// Turns schedule ticks into queued jobs. Locking happens in the job
/// handler, so every instance can run a scheduler.
pub struct BillingScheduler {
    queue: Arc<dyn JobQueue>,
    idempotency: Arc<dyn IdempotencyStore>,
    settings: SchedulerSettings,
}

impl BillingScheduler {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        idempotency: Arc<dyn IdempotencyStore>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            queue,
            idempotency,
            settings,
        }
    }

    pub async fn run(self) {
        info!(settings = ?self.settings, "Billing scheduler started");
        tokio::join!(
            run_schedule(
                self.queue.clone(),
                self.settings.invoice_generation,
                |run_at| BillingJob::GenerateInvoices { run_at },
            ),
            run_schedule(
                self.queue.clone(),
                self.settings.payment_reconciliation,
                |run_at| BillingJob::ReconcilePendingPayments { run_at },
            ),
            run_schedule(
                self.queue.clone(),
                self.settings.overdue_marking,
                |run_at| BillingJob::MarkOverdueInvoices { run_at },
            ),
            run_eviction(
                self.idempotency.clone(),
                self.settings.idempotency_eviction_interval,
            ),
        );
    }
}

async fn run_schedule(
    queue: Arc<dyn JobQueue>,
    schedule: Schedule,
    make_job: fn(DateTime<Utc>) -> BillingJob,
) {
    loop {
        let now = Utc::now();
        let next = schedule.next_after(now);
        tokio::time::sleep((next - now).to_std().unwrap_or_default()).await;

        let job = make_job(next);
        let name = job.name();
        match queue.enqueue(job).await {
            Ok(()) => debug!(job = name, run_at = %next, "Enqueued scheduled job"),
            Err(e) => error!(job = name, error = %e, "Failed to enqueue scheduled job"),
        }
    }
}

async fn run_eviction(idempotency: Arc<dyn IdempotencyStore>, every: Duration) {
    let mut ticker = interval(every);
    loop {
        ticker.tick().await;
        idempotency.evict_expired().await;
        debug!("Evicted expired idempotency entries");
    }
}

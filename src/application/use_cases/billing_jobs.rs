use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        distributed_lock::DistributedLock,
        job_queue::{BillingJob, JobHandler, JobOutcome},
    },
    domain::entities::invoice::BillingPeriod,
};

use super::{invoice_generation::InvoiceUseCases, payment_reconciliation::ReconciliationUseCases};

/// Runs scheduled billing jobs, one instance at a time per job kind.
pub struct BillingJobRunner {
    invoices: Arc<InvoiceUseCases>,
    reconciler: Arc<ReconciliationUseCases>,
    lock: DistributedLock,
    lock_ttl: Duration,
}

impl BillingJobRunner {
    pub fn new(
        invoices: Arc<InvoiceUseCases>,
        reconciler: Arc<ReconciliationUseCases>,
        lock: DistributedLock,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            invoices,
            reconciler,
            lock,
            lock_ttl,
        }
    }

    async fn run(&self, job: &BillingJob) -> AppResult<()> {
        match job {
            BillingJob::GenerateInvoices { run_at } => {
                let period = BillingPeriod::previous_month(*run_at).ok_or_else(|| {
                    AppError::Internal(format!("no billing period before {run_at}"))
                })?;
                self.invoices.generate_for_period(&period).await?;
            }
            BillingJob::ReconcilePendingPayments { run_at } => {
                self.reconciler.reconcile_pending(*run_at).await?;
            }
            BillingJob::MarkOverdueInvoices { run_at } => {
                let summary = self.invoices.mark_overdue(*run_at).await?;
                info!(
                    marked_overdue = summary.marked_overdue,
                    suspended = summary.suspended,
                    "Overdue sweep finished"
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobHandler for BillingJobRunner {
    async fn handle(&self, job: &BillingJob) -> AppResult<JobOutcome> {
        let lock_name = job.lock_name();
        let Some(guard) = self.lock.try_acquire(&lock_name, self.lock_ttl).await? else {
            info!(job = job.name(), lock = %lock_name, "Lock held elsewhere, skipping run");
            return Ok(JobOutcome::Skipped);
        };

        let result = self.run(job).await;

        if let Err(e) = guard.release().await {
            warn!(job = job.name(), error = %e, "Failed to release job lock");
        }
        result.map(|_| JobOutcome::Completed)
    }
}

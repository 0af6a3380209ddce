use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app_error::AppResult;

/// Background billing work triggered by the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum BillingJob {
    /// Generate invoices for the calendar month before `run_at`
    GenerateInvoices { run_at: DateTime<Utc> },
    /// Confirm stale pending payments with their gateways
    ReconcilePendingPayments { run_at: DateTime<Utc> },
    /// Move past-due invoices to overdue and suspend long-overdue accounts
    MarkOverdueInvoices { run_at: DateTime<Utc> },
}

impl BillingJob {
    pub fn name(&self) -> &'static str {
        match self {
            BillingJob::GenerateInvoices { .. } => "generate_invoices",
            BillingJob::ReconcilePendingPayments { .. } => "reconcile_pending_payments",
            BillingJob::MarkOverdueInvoices { .. } => "mark_overdue_invoices",
        }
    }

    /// Name of the distributed lock that serializes this job across instances
    pub fn lock_name(&self) -> String {
        format!("billing:lock:{}", self.name())
    }
}

/// How a job run ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Another instance held the lock
    Skipped,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: BillingJob) -> AppResult<()>;
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &BillingJob) -> AppResult<JobOutcome>;
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::{
        invoice::{BillingPeriod, Invoice, InvoiceLineItem, InvoiceStatus, LineItemKind},
        payment::{Payment, PaymentStatus},
        payment_provider::PaymentProvider,
        subscription::{Subscription, SubscriptionStatus, UsageTotals},
    },
};

// ============================================================================
// Input Types
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct NewLineItem {
    pub kind: LineItemKind,
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewInvoice {
    pub invoice_number: String,
    pub account_id: Uuid,
    pub subscription_id: Uuid,
    pub currency: String,
    pub period: BillingPeriod,
    pub subscription_fee_cents: i64,
    pub usage_fee_cents: i64,
    pub transaction_fee_cents: i64,
    pub overage_fee_cents: i64,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub due_date: DateTime<Utc>,
    pub line_items: Vec<NewLineItem>,
}

/// Outcome of inserting an invoice guarded by the per-period unique key
#[derive(Debug, Clone, PartialEq)]
pub enum InvoiceInsert {
    Created(Invoice),
    /// Another writer already billed this account for the period
    AlreadyExists(Invoice),
}

/// A gateway-reported payment state to record against an invoice
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentUpdate {
    pub invoice_id: Uuid,
    pub account_id: Uuid,
    pub provider: PaymentProvider,
    pub provider_transaction_id: String,
    pub provider_reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

/// Result of recording a payment and settling its invoice in one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentApplication {
    pub payment: Payment,
    pub invoice: Invoice,
    pub invoice_status_before: InvoiceStatus,
    pub payment_created: bool,
    /// The payment moved into the reported status on this call
    pub status_changed: bool,
}

impl PaymentApplication {
    /// The invoice became PAID on this call
    pub fn invoice_newly_paid(&self) -> bool {
        self.invoice.status == InvoiceStatus::Paid
            && self.invoice_status_before != InvoiceStatus::Paid
    }
}

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait SubscriptionRepo: Send + Sync {
    /// Subscriptions the batch run bills
    async fn list_billable(&self) -> AppResult<Vec<Subscription>>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>>;

    async fn set_status(&self, id: Uuid, status: SubscriptionStatus) -> AppResult<()>;
}

#[async_trait]
pub trait UsageRepo: Send + Sync {
    async fn totals_for_period(
        &self,
        subscription_id: Uuid,
        period: &BillingPeriod,
    ) -> AppResult<UsageTotals>;
}

#[async_trait]
pub trait InvoiceRepo: Send + Sync {
    /// Non-void invoice covering exactly this account and period
    async fn find_for_period(
        &self,
        account_id: Uuid,
        period: &BillingPeriod,
    ) -> AppResult<Option<Invoice>>;

    /// Atomically allocate the next invoice sequence number for a month
    async fn next_sequence(&self, year: i32, month: u32) -> AppResult<i64>;

    /// Insert the invoice and its line items together
    async fn insert_with_line_items(&self, invoice: NewInvoice) -> AppResult<InvoiceInsert>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Invoice>>;

    async fn get_by_number(&self, invoice_number: &str) -> AppResult<Option<Invoice>>;

    async fn list_line_items(&self, invoice_id: Uuid) -> AppResult<Vec<InvoiceLineItem>>;

    /// Compare-and-set status change. Returns false if the invoice was not in `from`.
    async fn transition_status(
        &self,
        id: Uuid,
        from: InvoiceStatus,
        to: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// SENT or PARTIALLY_PAID invoices whose due date is before `now`
    async fn list_past_due(&self, now: DateTime<Utc>) -> AppResult<Vec<Invoice>>;

    /// OVERDUE invoices that became overdue at or before `cutoff`
    async fn list_overdue_since(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Invoice>>;
}

#[async_trait]
pub trait PaymentRepo: Send + Sync {
    /// Record a payment keyed by `(invoice_id, provider_transaction_id)` and
    /// settle the invoice, all under a lock on the invoice row.
    ///
    /// Implementations must follow `plan_payment_change` and, when the payment
    /// ends up COMPLETED on this call, `settle_invoice`.
    async fn apply_payment(&self, update: PaymentUpdate) -> AppResult<PaymentApplication>;

    /// PENDING payments last touched before `older_than`
    async fn list_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<Payment>>;

    async fn list_for_invoice(&self, invoice_id: Uuid) -> AppResult<Vec<Payment>>;
}

// ============================================================================
// Payment Application Rules
// ============================================================================

/// What to do with an incoming payment status for a given transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentChange {
    Insert,
    Update,
    /// Duplicate or terminal; nothing to write
    Ignore,
}

pub fn plan_payment_change(
    existing: Option<&Payment>,
    invoice_status: InvoiceStatus,
    incoming: PaymentStatus,
) -> AppResult<PaymentChange> {
    match existing {
        Some(payment) if payment.status == incoming => Ok(PaymentChange::Ignore),
        Some(payment) if !payment.status.can_transition_to(incoming) => {
            tracing::info!(
                payment_id = %payment.id,
                current = %payment.status,
                incoming = %incoming,
                "Ignoring status change for terminal payment"
            );
            Ok(PaymentChange::Ignore)
        }
        Some(_) => {
            if incoming == PaymentStatus::Completed {
                ensure_accepts_payment(invoice_status)?;
            }
            Ok(PaymentChange::Update)
        }
        None => {
            ensure_accepts_payment(invoice_status)?;
            Ok(PaymentChange::Insert)
        }
    }
}

fn ensure_accepts_payment(status: InvoiceStatus) -> AppResult<()> {
    match status {
        InvoiceStatus::Paid => Err(AppError::AlreadyPaidInvoice),
        InvoiceStatus::Void => Err(AppError::InvoiceVoid),
        _ => Ok(()),
    }
}

/// New invoice status and paid-at after `total_paid_cents` of completed payments
pub fn settle_invoice(
    invoice: &Invoice,
    total_paid_cents: i64,
    now: DateTime<Utc>,
) -> (InvoiceStatus, Option<DateTime<Utc>>) {
    let status = InvoiceStatus::after_payment(total_paid_cents, invoice.total_cents);
    let paid_at = match status {
        InvoiceStatus::Paid => Some(invoice.paid_at.unwrap_or(now)),
        _ => invoice.paid_at,
    };
    (status, paid_at)
}

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::notifications::{Notification, NotificationDispatcher},
    domain::entities::{
        invoice::{
            BillingPeriod, Invoice, InvoiceLineItem, InvoiceStatus, LineItemKind,
            format_invoice_number,
        },
        money::TaxRate,
        subscription::{Subscription, SubscriptionStatus, UsageTotals},
    },
};

use super::billing::{
    InvoiceInsert, InvoiceRepo, NewInvoice, NewLineItem, SubscriptionRepo, UsageRepo,
};

/// Attempts at a compare-and-set status change before giving up
const MAX_TRANSITION_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct InvoiceSettings {
    pub number_prefix: String,
    pub tax_rate: TaxRate,
    pub payment_terms_days: i64,
    /// Days an invoice may stay overdue before its subscription is suspended
    pub suspension_grace_days: i64,
    /// Issue (DRAFT -> SENT) invoices as soon as the batch creates them
    pub auto_issue: bool,
}

impl Default for InvoiceSettings {
    fn default() -> Self {
        Self {
            number_prefix: "INV".to_string(),
            tax_rate: TaxRate::default(),
            payment_terms_days: 14,
            suspension_grace_days: 14,
            auto_issue: true,
        }
    }
}

/// Fee breakdown for one subscription and period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceCharges {
    pub subscription_fee_cents: i64,
    pub usage_fee_cents: i64,
    pub transaction_fee_cents: i64,
    pub overage_fee_cents: i64,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

impl InvoiceCharges {
    pub fn compute(subscription: &Subscription, usage: &UsageTotals, tax_rate: TaxRate) -> Self {
        let subscription_fee_cents = subscription.price_cents;
        let usage_fee_cents = usage.usage_cost_cents;
        let transaction_fee_cents = usage.transaction_fee_cents;
        let overage_fee_cents = subscription.overage_fee_cents();

        let subtotal_cents =
            subscription_fee_cents + usage_fee_cents + transaction_fee_cents + overage_fee_cents;
        let tax_cents = tax_rate.apply(subtotal_cents);

        Self {
            subscription_fee_cents,
            usage_fee_cents,
            transaction_fee_cents,
            overage_fee_cents,
            subtotal_cents,
            tax_cents,
            total_cents: subtotal_cents + tax_cents,
        }
    }

    /// One line item per non-zero fee component
    pub fn line_items(&self, subscription: &Subscription, usage: &UsageTotals) -> Vec<NewLineItem> {
        let mut items = Vec::new();

        if self.subscription_fee_cents != 0 {
            items.push(NewLineItem {
                kind: LineItemKind::Subscription,
                description: format!("{} plan", subscription.tier),
                quantity: 1,
                unit_price_cents: self.subscription_fee_cents,
                amount_cents: self.subscription_fee_cents,
            });
        }
        if self.usage_fee_cents != 0 {
            items.push(NewLineItem {
                kind: LineItemKind::Usage,
                description: "Metered usage".to_string(),
                quantity: 1,
                unit_price_cents: self.usage_fee_cents,
                amount_cents: self.usage_fee_cents,
            });
        }
        // Per-transaction fees vary, so the line carries the summed fee as a
        // single unit and the count goes in the description.
        if self.transaction_fee_cents != 0 {
            items.push(NewLineItem {
                kind: LineItemKind::Transaction,
                description: format!(
                    "Transaction fees ({} transactions)",
                    usage.transaction_count
                ),
                quantity: 1,
                unit_price_cents: self.transaction_fee_cents,
                amount_cents: self.transaction_fee_cents,
            });
        }
        if self.overage_fee_cents != 0 {
            items.push(NewLineItem {
                kind: LineItemKind::Overage,
                description: format!(
                    "API calls above {} included",
                    subscription.calls_limit.unwrap_or_default()
                ),
                quantity: subscription.overage_calls(),
                unit_price_cents: subscription.overage_rate_cents,
                amount_cents: self.overage_fee_cents,
            });
        }

        items
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Created(Invoice),
    /// An invoice already covers this account and period; nothing was written
    Skipped(Invoice),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub issued: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverdueSummary {
    pub marked_overdue: usize,
    pub suspended: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceWithLineItems {
    pub invoice: Invoice,
    pub line_items: Vec<InvoiceLineItem>,
}

pub struct InvoiceUseCases {
    subscriptions: Arc<dyn SubscriptionRepo>,
    usage: Arc<dyn UsageRepo>,
    invoices: Arc<dyn InvoiceRepo>,
    notifier: Arc<dyn NotificationDispatcher>,
    settings: InvoiceSettings,
}

impl InvoiceUseCases {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepo>,
        usage: Arc<dyn UsageRepo>,
        invoices: Arc<dyn InvoiceRepo>,
        notifier: Arc<dyn NotificationDispatcher>,
        settings: InvoiceSettings,
    ) -> Self {
        Self {
            subscriptions,
            usage,
            invoices,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &InvoiceSettings {
        &self.settings
    }

    /// Bill one subscription for `period`. Re-running for the same period is a no-op.
    pub async fn generate_for_subscription(
        &self,
        subscription: &Subscription,
        period: &BillingPeriod,
    ) -> AppResult<GenerationOutcome> {
        if let Some(existing) = self
            .invoices
            .find_for_period(subscription.account_id, period)
            .await?
        {
            info!(
                account_id = %subscription.account_id,
                invoice_number = %existing.invoice_number,
                "Invoice already exists for period, skipping"
            );
            return Ok(GenerationOutcome::Skipped(existing));
        }

        let usage = self
            .usage
            .totals_for_period(subscription.id, period)
            .await?;
        let charges = InvoiceCharges::compute(subscription, &usage, self.settings.tax_rate);
        let line_items = charges.line_items(subscription, &usage);

        let year = period.start.year();
        let month = period.start.month();
        let sequence = self.invoices.next_sequence(year, month).await?;
        let invoice_number =
            format_invoice_number(&self.settings.number_prefix, year, month, sequence);

        let new_invoice = NewInvoice {
            invoice_number,
            account_id: subscription.account_id,
            subscription_id: subscription.id,
            currency: subscription.currency.clone(),
            period: *period,
            subscription_fee_cents: charges.subscription_fee_cents,
            usage_fee_cents: charges.usage_fee_cents,
            transaction_fee_cents: charges.transaction_fee_cents,
            overage_fee_cents: charges.overage_fee_cents,
            subtotal_cents: charges.subtotal_cents,
            tax_cents: charges.tax_cents,
            total_cents: charges.total_cents,
            due_date: period.end + Duration::days(self.settings.payment_terms_days),
            line_items,
        };

        match self.invoices.insert_with_line_items(new_invoice).await? {
            InvoiceInsert::Created(invoice) => {
                info!(
                    account_id = %invoice.account_id,
                    invoice_number = %invoice.invoice_number,
                    total_cents = invoice.total_cents,
                    "Generated invoice"
                );
                Ok(GenerationOutcome::Created(invoice))
            }
            InvoiceInsert::AlreadyExists(existing) => {
                info!(
                    account_id = %existing.account_id,
                    invoice_number = %existing.invoice_number,
                    "Invoice created concurrently, skipping"
                );
                Ok(GenerationOutcome::Skipped(existing))
            }
        }
    }

    /// Bill every active subscription. One subscription failing does not stop the batch.
    pub async fn generate_for_period(&self, period: &BillingPeriod) -> AppResult<BatchSummary> {
        let subscriptions = self.subscriptions.list_billable().await?;
        let mut summary = BatchSummary::default();

        for subscription in subscriptions {
            match self.generate_for_subscription(&subscription, period).await {
                Ok(GenerationOutcome::Created(invoice)) => {
                    summary.generated += 1;
                    if self.settings.auto_issue {
                        match self.issue(&invoice, &subscription).await {
                            Ok(_) => summary.issued += 1,
                            Err(e) => warn!(
                                invoice_number = %invoice.invoice_number,
                                error = %e,
                                "Failed to issue invoice"
                            ),
                        }
                    }
                }
                Ok(GenerationOutcome::Skipped(_)) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "Failed to generate invoice"
                    );
                }
            }
        }

        info!(
            generated = summary.generated,
            skipped = summary.skipped,
            failed = summary.failed,
            issued = summary.issued,
            "Invoice batch finished"
        );
        Ok(summary)
    }

    /// DRAFT -> SENT, notifying the customer.
    pub async fn issue_invoice(&self, invoice_id: Uuid) -> AppResult<Invoice> {
        let invoice = self.load(invoice_id).await?;
        let subscription = self
            .subscriptions
            .get_by_id(invoice.subscription_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.issue(&invoice, &subscription).await
    }

    async fn issue(&self, invoice: &Invoice, subscription: &Subscription) -> AppResult<Invoice> {
        let issued = self
            .transition(invoice.id, InvoiceStatus::Sent, Utc::now())
            .await?;

        self.notifier
            .notify(Notification::InvoiceIssued {
                account_id: issued.account_id,
                invoice_number: issued.invoice_number.clone(),
                total_cents: issued.total_cents,
                currency: issued.currency.clone(),
                customer_email: subscription.customer_email.clone(),
            })
            .await;
        Ok(issued)
    }

    /// Any non-PAID invoice can be voided. Voiding a void invoice is a no-op.
    pub async fn void_invoice(&self, invoice_id: Uuid) -> AppResult<Invoice> {
        let invoice = self.load(invoice_id).await?;
        if invoice.status == InvoiceStatus::Void {
            return Ok(invoice);
        }
        let voided = self
            .transition(invoice_id, InvoiceStatus::Void, Utc::now())
            .await?;
        info!(invoice_number = %voided.invoice_number, "Voided invoice");
        Ok(voided)
    }

    /// Push past-due invoices to OVERDUE, then suspend subscriptions whose
    /// invoices stayed overdue beyond the grace period.
    pub async fn mark_overdue(&self, now: DateTime<Utc>) -> AppResult<OverdueSummary> {
        let mut summary = OverdueSummary::default();

        for invoice in self.invoices.list_past_due(now).await? {
            if !invoice.status.can_become_overdue() {
                continue;
            }
            if self
                .invoices
                .transition_status(invoice.id, invoice.status, InvoiceStatus::Overdue, now)
                .await?
            {
                summary.marked_overdue += 1;
                info!(invoice_number = %invoice.invoice_number, "Invoice is overdue");
            }
        }

        let cutoff = now - Duration::days(self.settings.suspension_grace_days);
        for invoice in self.invoices.list_overdue_since(cutoff).await? {
            let Some(subscription) = self
                .subscriptions
                .get_by_id(invoice.subscription_id)
                .await?
            else {
                continue;
            };
            if subscription.status != SubscriptionStatus::Active {
                continue;
            }

            self.subscriptions
                .set_status(subscription.id, SubscriptionStatus::Suspended)
                .await?;
            summary.suspended += 1;
            warn!(
                subscription_id = %subscription.id,
                invoice_number = %invoice.invoice_number,
                "Suspended subscription for unpaid invoice"
            );
            self.notifier
                .notify(Notification::SubscriptionSuspended {
                    account_id: subscription.account_id,
                    subscription_id: subscription.id,
                    invoice_number: invoice.invoice_number.clone(),
                })
                .await;
        }

        Ok(summary)
    }

    pub async fn get_invoice(&self, invoice_id: Uuid) -> AppResult<InvoiceWithLineItems> {
        let invoice = self.load(invoice_id).await?;
        let line_items = self.invoices.list_line_items(invoice_id).await?;
        Ok(InvoiceWithLineItems {
            invoice,
            line_items,
        })
    }

    async fn load(&self, invoice_id: Uuid) -> AppResult<Invoice> {
        self.invoices
            .get_by_id(invoice_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Compare-and-set transition that re-reads the invoice when a concurrent
    /// writer (usually the reconciler) got there first.
    async fn transition(
        &self,
        invoice_id: Uuid,
        to: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Invoice> {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let invoice = self.load(invoice_id).await?;
            if invoice.status == InvoiceStatus::Paid && to == InvoiceStatus::Void {
                return Err(AppError::AlreadyPaidInvoice);
            }
            if !invoice.status.can_transition_to(to) {
                return Err(AppError::InvalidTransition {
                    from: invoice.status,
                    to,
                });
            }
            if self
                .invoices
                .transition_status(invoice_id, invoice.status, to, at)
                .await?
            {
                return self.load(invoice_id).await;
            }
        }
        Err(AppError::Internal(format!(
            "invoice {} kept changing during transition to {}",
            invoice_id, to
        )))
    }
}

//! In-memory implementation of the billing repository traits.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::billing::{
        InvoiceInsert, InvoiceRepo, NewInvoice, PaymentApplication, PaymentChange, PaymentRepo,
        PaymentUpdate, SubscriptionRepo, UsageRepo, plan_payment_change, settle_invoice,
    },
    domain::entities::{
        invoice::{BillingPeriod, Invoice, InvoiceLineItem, InvoiceStatus},
        payment::{Payment, PaymentStatus},
        subscription::{Subscription, SubscriptionStatus, UsageTotals},
    },
};

#[derive(Default)]
struct BillingState {
    subscriptions: HashMap<Uuid, Subscription>,
    usage: HashMap<Uuid, UsageTotals>,
    invoices: HashMap<Uuid, Invoice>,
    line_items: Vec<InvoiceLineItem>,
    payments: Vec<Payment>,
    sequences: HashMap<(i32, u32), i64>,
}

impl BillingState {
    fn invoice_for_period(&self, account_id: Uuid, period: &BillingPeriod) -> Option<&Invoice> {
        self.invoices.values().find(|i| {
            i.account_id == account_id
                && i.period_start == period.start
                && i.period_end == period.end
                && i.status != InvoiceStatus::Void
        })
    }
}

// ============================================================================
// InMemoryBillingStore
// ============================================================================

/// Every billing repository behind one mutex, which plays the role of the
/// invoice row lock in `apply_payment`.
#[derive(Default)]
pub struct InMemoryBillingStore {
    state: Mutex<BillingState>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscriptions(self, subscriptions: Vec<Subscription>) -> Self {
        for s in subscriptions {
            self.insert_subscription(s);
        }
        self
    }

    pub fn with_invoices(self, invoices: Vec<Invoice>) -> Self {
        for i in invoices {
            self.insert_invoice(i);
        }
        self
    }

    pub fn insert_subscription(&self, subscription: Subscription) {
        let mut state = self.state.lock().unwrap();
        state.subscriptions.insert(subscription.id, subscription);
    }

    pub fn insert_invoice(&self, invoice: Invoice) {
        let mut state = self.state.lock().unwrap();
        state.invoices.insert(invoice.id, invoice);
    }

    pub fn with_payments(self, payments: Vec<Payment>) -> Self {
        self.state.lock().unwrap().payments.extend(payments);
        self
    }

    pub fn with_usage(
        self,
        subscription_id: Uuid,
        usage_cost_cents: i64,
        transaction_count: i64,
        transaction_fee_cents: i64,
    ) -> Self {
        self.state.lock().unwrap().usage.insert(
            subscription_id,
            UsageTotals {
                usage_cost_cents,
                transaction_count,
                transaction_fee_cents,
            },
        );
        self
    }

    /// Panics if the invoice does not exist.
    pub fn invoice(&self, id: Uuid) -> Invoice {
        self.state.lock().unwrap().invoices[&id].clone()
    }

    /// Panics if the subscription does not exist.
    pub fn subscription(&self, id: Uuid) -> Subscription {
        self.state.lock().unwrap().subscriptions[&id].clone()
    }

    pub fn invoice_count(&self) -> usize {
        self.state.lock().unwrap().invoices.len()
    }

    pub fn invoices_for_account(&self, account_id: Uuid) -> Vec<Invoice> {
        self.state
            .lock()
            .unwrap()
            .invoices
            .values()
            .filter(|i| i.account_id == account_id)
            .cloned()
            .collect()
    }

    pub fn payments_for(&self, invoice_id: Uuid) -> Vec<Payment> {
        self.state
            .lock()
            .unwrap()
            .payments
            .iter()
            .filter(|p| p.invoice_id == invoice_id)
            .cloned()
            .collect()
    }

    pub fn line_items_for(&self, invoice_id: Uuid) -> Vec<InvoiceLineItem> {
        self.state
            .lock()
            .unwrap()
            .line_items
            .iter()
            .filter(|l| l.invoice_id == invoice_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SubscriptionRepo for InMemoryBillingStore {
    async fn list_billable(&self) -> AppResult<Vec<Subscription>> {
        let mut subscriptions: Vec<Subscription> = self
            .state
            .lock()
            .unwrap()
            .subscriptions
            .values()
            .filter(|s| s.status.is_billable())
            .cloned()
            .collect();
        subscriptions.sort_by_key(|s| (s.created_at, s.id));
        Ok(subscriptions)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>> {
        Ok(self.state.lock().unwrap().subscriptions.get(&id).cloned())
    }

    async fn set_status(&self, id: Uuid, status: SubscriptionStatus) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        let subscription = state.subscriptions.get_mut(&id).ok_or(AppError::NotFound)?;
        subscription.status = status;
        subscription.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl UsageRepo for InMemoryBillingStore {
    async fn totals_for_period(
        &self,
        subscription_id: Uuid,
        _period: &BillingPeriod,
    ) -> AppResult<UsageTotals> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .usage
            .get(&subscription_id)
            .copied()
            .unwrap_or_default())
    }
}

#[async_trait]
impl InvoiceRepo for InMemoryBillingStore {
    async fn find_for_period(
        &self,
        account_id: Uuid,
        period: &BillingPeriod,
    ) -> AppResult<Option<Invoice>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .invoice_for_period(account_id, period)
            .cloned())
    }

    async fn next_sequence(&self, year: i32, month: u32) -> AppResult<i64> {
        let mut state = self.state.lock().unwrap();
        let value = state.sequences.entry((year, month)).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn insert_with_line_items(&self, new: NewInvoice) -> AppResult<InvoiceInsert> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.invoice_for_period(new.account_id, &new.period) {
            return Ok(InvoiceInsert::AlreadyExists(existing.clone()));
        }
        if state
            .invoices
            .values()
            .any(|i| i.invoice_number == new.invoice_number)
        {
            return Err(AppError::InvalidInput(
                "A record with this value already exists".into(),
            ));
        }

        let now = Utc::now();
        let invoice = Invoice {
            id: Uuid::new_v4(),
            invoice_number: new.invoice_number,
            account_id: new.account_id,
            subscription_id: new.subscription_id,
            currency: new.currency,
            period_start: new.period.start,
            period_end: new.period.end,
            subscription_fee_cents: new.subscription_fee_cents,
            usage_fee_cents: new.usage_fee_cents,
            transaction_fee_cents: new.transaction_fee_cents,
            overage_fee_cents: new.overage_fee_cents,
            subtotal_cents: new.subtotal_cents,
            tax_cents: new.tax_cents,
            total_cents: new.total_cents,
            amount_paid_cents: 0,
            status: InvoiceStatus::Draft,
            due_date: new.due_date,
            issued_at: None,
            paid_at: None,
            overdue_at: None,
            voided_at: None,
            created_at: now,
            updated_at: now,
        };

        for item in new.line_items {
            state.line_items.push(InvoiceLineItem {
                id: Uuid::new_v4(),
                invoice_id: invoice.id,
                kind: item.kind,
                description: item.description,
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
                amount_cents: item.amount_cents,
            });
        }
        state.invoices.insert(invoice.id, invoice.clone());
        Ok(InvoiceInsert::Created(invoice))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Invoice>> {
        Ok(self.state.lock().unwrap().invoices.get(&id).cloned())
    }

    async fn get_by_number(&self, invoice_number: &str) -> AppResult<Option<Invoice>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .invoices
            .values()
            .find(|i| i.invoice_number == invoice_number)
            .cloned())
    }

    async fn list_line_items(&self, invoice_id: Uuid) -> AppResult<Vec<InvoiceLineItem>> {
        Ok(self.line_items_for(invoice_id))
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: InvoiceStatus,
        to: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().unwrap();
        let Some(invoice) = state.invoices.get_mut(&id) else {
            return Ok(false);
        };
        if invoice.status != from {
            return Ok(false);
        }

        invoice.status = to;
        invoice.updated_at = at;
        let stamp = match to {
            InvoiceStatus::Sent => Some(&mut invoice.issued_at),
            InvoiceStatus::Paid => Some(&mut invoice.paid_at),
            InvoiceStatus::Overdue => Some(&mut invoice.overdue_at),
            InvoiceStatus::Void => Some(&mut invoice.voided_at),
            InvoiceStatus::Draft | InvoiceStatus::PartiallyPaid => None,
        };
        if let Some(stamp) = stamp {
            stamp.get_or_insert(at);
        }
        Ok(true)
    }

    async fn list_past_due(&self, now: DateTime<Utc>) -> AppResult<Vec<Invoice>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .invoices
            .values()
            .filter(|i| i.status.can_become_overdue() && i.due_date < now)
            .cloned()
            .collect())
    }

    async fn list_overdue_since(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Invoice>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .invoices
            .values()
            .filter(|i| {
                i.status == InvoiceStatus::Overdue && i.overdue_at.is_some_and(|at| at <= cutoff)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentRepo for InMemoryBillingStore {
    async fn apply_payment(&self, update: PaymentUpdate) -> AppResult<PaymentApplication> {
        let mut state = self.state.lock().unwrap();
        let invoice = state
            .invoices
            .get(&update.invoice_id)
            .cloned()
            .ok_or(AppError::NotFound)?;
        let invoice_status_before = invoice.status;

        let existing_idx = state.payments.iter().position(|p| {
            p.invoice_id == update.invoice_id
                && p.provider_transaction_id == update.provider_transaction_id
        });
        let existing = existing_idx.map(|idx| &state.payments[idx]);
        let change = plan_payment_change(existing, invoice.status, update.status)?;
        let now = Utc::now();

        let (payment, payment_created, status_changed) = match (change, existing_idx) {
            (PaymentChange::Ignore, Some(idx)) => (state.payments[idx].clone(), false, false),
            (PaymentChange::Insert, _) => {
                let payment = Payment {
                    id: Uuid::new_v4(),
                    invoice_id: update.invoice_id,
                    account_id: update.account_id,
                    provider: update.provider,
                    provider_transaction_id: update.provider_transaction_id,
                    provider_reference: update.provider_reference,
                    amount_cents: update.amount_cents,
                    currency: update.currency,
                    status: update.status,
                    failure_reason: update.failure_reason,
                    paid_at: update.paid_at,
                    metadata: update.metadata,
                    created_at: now,
                    updated_at: now,
                };
                state.payments.push(payment.clone());
                (payment, true, true)
            }
            (PaymentChange::Update, Some(idx)) => {
                let payment = &mut state.payments[idx];
                payment.status = update.status;
                payment.amount_cents = update.amount_cents;
                payment.failure_reason = update.failure_reason;
                payment.paid_at = update.paid_at.or(payment.paid_at);
                payment.metadata = update.metadata;
                payment.updated_at = now;
                (payment.clone(), false, true)
            }
            (change, None) => {
                return Err(AppError::Internal(format!(
                    "payment change {change:?} planned without an existing payment"
                )));
            }
        };

        let invoice = if status_changed && payment.status == PaymentStatus::Completed {
            let total_paid: i64 = state
                .payments
                .iter()
                .filter(|p| p.invoice_id == invoice.id && p.status == PaymentStatus::Completed)
                .map(|p| p.amount_cents)
                .sum();
            let (status, paid_at) = settle_invoice(&invoice, total_paid, now);

            let stored = state
                .invoices
                .get_mut(&invoice.id)
                .ok_or(AppError::NotFound)?;
            stored.amount_paid_cents = total_paid;
            stored.status = status;
            stored.paid_at = paid_at;
            stored.updated_at = now;
            stored.clone()
        } else {
            invoice
        };

        Ok(PaymentApplication {
            payment,
            invoice,
            invoice_status_before,
            payment_created,
            status_changed,
        })
    }

    async fn list_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<Payment>> {
        let mut stale: Vec<Payment> = self
            .state
            .lock()
            .unwrap()
            .payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Pending && p.updated_at < older_than)
            .cloned()
            .collect();
        stale.sort_by_key(|p| p.updated_at);
        stale.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(stale)
    }

    async fn list_for_invoice(&self, invoice_id: Uuid) -> AppResult<Vec<Payment>> {
        let mut payments = self.payments_for(invoice_id);
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }
}

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        notifications::{Notification, NotificationDispatcher},
        wallet::{WalletCredit, WalletPort},
    },
    domain::entities::{
        invoice::{InvoiceStatus, invoice_number_from_reference},
        payment::{Payment, PaymentStatus},
        subscription::SubscriptionStatus,
        webhook_event::WebhookEvent,
    },
};

use super::{
    billing::{InvoiceRepo, PaymentApplication, PaymentRepo, PaymentUpdate, SubscriptionRepo},
    provider_registry::ProviderRegistry,
};

/// Pending payments confirmed per sweep
const SWEEP_BATCH_SIZE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// No invoice carries the event's reference; nothing was written
    InvoiceNotFound,
    /// Duplicate or terminal payment; nothing changed
    Unchanged { payment_id: Uuid },
    Applied {
        payment_id: Uuid,
        payment_status: PaymentStatus,
        invoice_status: InvoiceStatus,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub checked: usize,
    pub applied: usize,
    pub still_pending: usize,
    pub failed: usize,
}

pub struct ReconciliationUseCases {
    invoices: Arc<dyn InvoiceRepo>,
    payments: Arc<dyn PaymentRepo>,
    subscriptions: Arc<dyn SubscriptionRepo>,
    wallet: Arc<dyn WalletPort>,
    notifier: Arc<dyn NotificationDispatcher>,
    registry: Arc<ProviderRegistry>,
    pending_verify_after: Duration,
}

impl ReconciliationUseCases {
    pub fn new(
        invoices: Arc<dyn InvoiceRepo>,
        payments: Arc<dyn PaymentRepo>,
        subscriptions: Arc<dyn SubscriptionRepo>,
        wallet: Arc<dyn WalletPort>,
        notifier: Arc<dyn NotificationDispatcher>,
        registry: Arc<ProviderRegistry>,
        pending_verify_after: Duration,
    ) -> Self {
        Self {
            invoices,
            payments,
            subscriptions,
            wallet,
            notifier,
            registry,
            pending_verify_after,
        }
    }

    /// Apply a verified, normalized gateway event to the invoice it references.
    ///
    /// Safe to call repeatedly with the same event: the payment is keyed by
    /// `(invoice, transaction)` and side effects run only when its status changes.
    pub async fn apply_event(&self, event: &WebhookEvent) -> AppResult<ReconcileOutcome> {
        let invoice_number = invoice_number_from_reference(&event.reference);
        let Some(invoice) = self.invoices.get_by_number(invoice_number).await? else {
            warn!(
                provider = %event.provider,
                reference = %event.reference,
                "No invoice for payment reference, dropping event"
            );
            return Ok(ReconcileOutcome::InvoiceNotFound);
        };

        let status = PaymentStatus::from_gateway_status(&event.status);
        let failure_reason = match status {
            PaymentStatus::Failed => Some(
                event
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| format!("gateway reported {}", event.status)),
            ),
            _ => None,
        };

        let update = PaymentUpdate {
            invoice_id: invoice.id,
            account_id: invoice.account_id,
            provider: event.provider,
            provider_transaction_id: event.transaction_key().to_string(),
            provider_reference: event.reference.clone(),
            amount_cents: event.amount_cents,
            currency: event.currency.clone(),
            status,
            failure_reason,
            paid_at: match status {
                PaymentStatus::Completed => Some(event.paid_at.unwrap_or_else(Utc::now)),
                _ => None,
            },
            metadata: event.metadata.clone(),
        };

        let applied = match self.payments.apply_payment(update).await {
            Ok(applied) => applied,
            Err(e @ (AppError::AlreadyPaidInvoice | AppError::InvoiceVoid)) => {
                warn!(
                    provider = %event.provider,
                    invoice_number = %invoice.invoice_number,
                    transaction_id = %event.transaction_key(),
                    error = %e,
                    "Payment rejected, needs manual review"
                );
                self.notifier
                    .notify(Notification::ManualReview {
                        provider: event.provider,
                        reference: event.reference.clone(),
                        reason: e.to_string(),
                    })
                    .await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        if !applied.status_changed {
            debug!(
                payment_id = %applied.payment.id,
                status = %applied.payment.status,
                "Payment already recorded, nothing to do"
            );
            return Ok(ReconcileOutcome::Unchanged {
                payment_id: applied.payment.id,
            });
        }

        info!(
            payment_id = %applied.payment.id,
            invoice_number = %applied.invoice.invoice_number,
            payment_status = %applied.payment.status,
            invoice_status = %applied.invoice.status,
            "Applied payment"
        );

        match applied.payment.status {
            PaymentStatus::Completed => self.after_completed(&applied).await,
            PaymentStatus::Failed => {
                self.notifier
                    .notify(Notification::PaymentFailed {
                        account_id: applied.invoice.account_id,
                        invoice_number: applied.invoice.invoice_number.clone(),
                        reason: applied.payment.failure_reason.clone(),
                    })
                    .await;
            }
            PaymentStatus::Unknown => {
                self.notifier
                    .notify(Notification::ManualReview {
                        provider: applied.payment.provider,
                        reference: applied.payment.provider_reference.clone(),
                        reason: format!("unrecognised gateway status '{}'", event.status),
                    })
                    .await;
            }
            PaymentStatus::Pending => {}
        }

        Ok(ReconcileOutcome::Applied {
            payment_id: applied.payment.id,
            payment_status: applied.payment.status,
            invoice_status: applied.invoice.status,
        })
    }

    /// Side effects of a payment completing. None of these roll back the payment.
    async fn after_completed(&self, applied: &PaymentApplication) {
        if applied.invoice_newly_paid() {
            self.reactivate_subscription(applied).await;
        }

        self.credit_wallet(&applied.payment, &applied.invoice.invoice_number)
            .await;

        self.notifier
            .notify(Notification::PaymentSucceeded {
                account_id: applied.invoice.account_id,
                invoice_number: applied.invoice.invoice_number.clone(),
                amount_cents: applied.payment.amount_cents,
                currency: applied.payment.currency.clone(),
                invoice_paid: applied.invoice.status == InvoiceStatus::Paid,
            })
            .await;
    }

    async fn reactivate_subscription(&self, applied: &PaymentApplication) {
        let subscription_id = applied.invoice.subscription_id;
        let result = async {
            let Some(subscription) = self.subscriptions.get_by_id(subscription_id).await? else {
                return Ok(false);
            };
            if subscription.status != SubscriptionStatus::Suspended {
                return Ok(false);
            }
            self.subscriptions
                .set_status(subscription_id, SubscriptionStatus::Active)
                .await?;
            Ok::<_, AppError>(true)
        }
        .await;

        match result {
            Ok(true) => info!(%subscription_id, "Reactivated subscription after payment"),
            Ok(false) => {}
            Err(e) => error!(%subscription_id, error = %e, "Failed to reactivate subscription"),
        }
    }

    /// Best effort: the payment is already committed, so a wallet failure is
    /// logged and alerted on, never propagated.
    async fn credit_wallet(&self, payment: &Payment, invoice_number: &str) {
        let credit = WalletCredit {
            account_id: payment.account_id,
            amount_cents: payment.amount_cents,
            currency: payment.currency.clone(),
            payment_id: payment.id,
            invoice_number: invoice_number.to_string(),
        };

        if let Err(e) = self.wallet.credit(&credit).await {
            error!(
                payment_id = %payment.id,
                account_id = %payment.account_id,
                amount_cents = payment.amount_cents,
                error = %e,
                "Wallet credit failed after payment committed"
            );
            self.notifier
                .notify(Notification::WalletCreditFailed {
                    account_id: payment.account_id,
                    payment_id: payment.id,
                    invoice_number: invoice_number.to_string(),
                    amount_cents: payment.amount_cents,
                    error: e.to_string(),
                })
                .await;
        }
    }

    /// Confirm payments stuck in PENDING with their gateway and apply the
    /// result through `apply_event`.
    pub async fn reconcile_pending(&self, now: DateTime<Utc>) -> AppResult<SweepSummary> {
        let stale = self
            .payments
            .list_stale_pending(now - self.pending_verify_after, SWEEP_BATCH_SIZE)
            .await?;
        let mut summary = SweepSummary::default();

        for payment in stale {
            summary.checked += 1;
            match self.verify_and_apply(&payment).await {
                Ok(ReconcileOutcome::Applied {
                    payment_status: PaymentStatus::Pending,
                    ..
                })
                | Ok(ReconcileOutcome::Unchanged { .. }) => summary.still_pending += 1,
                Ok(_) => summary.applied += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        payment_id = %payment.id,
                        provider = %payment.provider,
                        error = %e,
                        "Failed to confirm pending payment"
                    );
                }
            }
        }

        info!(
            checked = summary.checked,
            applied = summary.applied,
            still_pending = summary.still_pending,
            failed = summary.failed,
            "Pending payment sweep finished"
        );
        Ok(summary)
    }

    async fn verify_and_apply(&self, payment: &Payment) -> AppResult<ReconcileOutcome> {
        let adapter = self.registry.get(payment.provider)?;
        let verification = adapter.verify_payment(&payment.provider_reference).await?;

        // Rows recorded without a gateway transaction id are keyed by reference
        // and adopt whatever transaction the gateway reports for it. Any other
        // row only accepts a result for its own transaction.
        let keyed_by_reference = payment.provider_transaction_id == payment.provider_reference;
        let reported = verification.transaction_id.as_deref();
        if let Some(reported) =
            reported.filter(|r| !keyed_by_reference && *r != payment.provider_transaction_id)
        {
            warn!(
                payment_id = %payment.id,
                provider = %payment.provider,
                reference = %payment.provider_reference,
                transaction_id = %payment.provider_transaction_id,
                reported_transaction_id = %reported,
                "Verification names another transaction, leaving payment pending"
            );
            return Ok(ReconcileOutcome::Unchanged {
                payment_id: payment.id,
            });
        }

        let mut event = verification.into_event(payment.provider);
        event.transaction_id = Some(payment.provider_transaction_id.clone());
        self.apply_event(&event).await
    }
}

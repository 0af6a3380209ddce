//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::domain::entities::{
    invoice::{Invoice, InvoiceStatus},
    payment::{Payment, PaymentStatus},
    payment_provider::PaymentProvider,
    subscription::{Subscription, SubscriptionStatus},
    webhook_event::WebhookEvent,
};

/// Factory invoice numbers start well above anything a test generates.
static NEXT_INVOICE_NUMBER: AtomicU32 = AtomicU32::new(50_000);

/// Create a test subscription with sensible defaults.
pub fn create_test_subscription(overrides: impl FnOnce(&mut Subscription)) -> Subscription {
    let mut subscription = Subscription {
        id: Uuid::new_v4(),
        account_id: Uuid::new_v4(),
        tier: "growth".to_string(),
        price_cents: 10_000,
        currency: "ZAR".to_string(),
        status: SubscriptionStatus::Active,
        calls_limit: Some(10_000),
        calls_used: 0,
        overage_rate_cents: 5,
        customer_email: "billing@example.com".to_string(),
        current_period_start: test_datetime(),
        current_period_end: test_datetime() + Duration::days(31),
        created_at: test_datetime(),
        updated_at: test_datetime(),
    };
    overrides(&mut subscription);
    subscription
}

/// Create a test invoice for December 2025: 10 000 plan + 2 000 usage + 15% VAT.
pub fn create_test_invoice(overrides: impl FnOnce(&mut Invoice)) -> Invoice {
    let number = NEXT_INVOICE_NUMBER.fetch_add(1, Ordering::Relaxed);
    let period_start = Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap();
    let period_end = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let mut invoice = Invoice {
        id: Uuid::new_v4(),
        invoice_number: format!("INV-202512-{number:05}"),
        account_id: Uuid::new_v4(),
        subscription_id: Uuid::new_v4(),
        currency: "ZAR".to_string(),
        period_start,
        period_end,
        subscription_fee_cents: 10_000,
        usage_fee_cents: 2_000,
        transaction_fee_cents: 0,
        overage_fee_cents: 0,
        subtotal_cents: 12_000,
        tax_cents: 1_800,
        total_cents: 13_800,
        amount_paid_cents: 0,
        status: InvoiceStatus::Sent,
        due_date: period_end + Duration::days(14),
        issued_at: Some(period_end),
        paid_at: None,
        overdue_at: None,
        voided_at: None,
        created_at: period_end,
        updated_at: period_end,
    };
    overrides(&mut invoice);
    invoice
}

/// Create a pending test payment with sensible defaults.
pub fn create_test_payment(overrides: impl FnOnce(&mut Payment)) -> Payment {
    let mut payment = Payment {
        id: Uuid::new_v4(),
        invoice_id: Uuid::new_v4(),
        account_id: Uuid::new_v4(),
        provider: PaymentProvider::Paystack,
        provider_transaction_id: format!("txn_{}", Uuid::new_v4().simple()),
        provider_reference: "INV-202512-00001".to_string(),
        amount_cents: 13_800,
        currency: "ZAR".to_string(),
        status: PaymentStatus::Pending,
        failure_reason: None,
        paid_at: None,
        metadata: serde_json::json!({}),
        created_at: test_datetime(),
        updated_at: test_datetime(),
    };
    overrides(&mut payment);
    payment
}

/// Create a verified, successful gateway event. Set `reference` to target an invoice.
pub fn create_test_event(overrides: impl FnOnce(&mut WebhookEvent)) -> WebhookEvent {
    let mut event = WebhookEvent {
        provider: PaymentProvider::Paystack,
        event_type: "charge.success".to_string(),
        reference: "INV-202512-00001".to_string(),
        transaction_id: Some("txn_test_1".to_string()),
        status: "success".to_string(),
        amount_cents: 13_800,
        currency: "ZAR".to_string(),
        paid_at: Some(test_datetime()),
        customer_email: Some("billing@example.com".to_string()),
        failure_reason: None,
        metadata: serde_json::json!({}),
    };
    overrides(&mut event);
    event
}

/// Fixed timestamp for deterministic tests.
pub fn test_datetime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
}

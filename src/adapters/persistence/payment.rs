use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::{
        PostgresPersistence,
        invoice::{INVOICE_COLS, row_to_invoice},
    },
    app_error::{AppError, AppResult},
    application::use_cases::billing::{
        PaymentApplication, PaymentChange, PaymentRepo, PaymentUpdate, plan_payment_change,
        settle_invoice,
    },
    domain::entities::payment::{Payment, PaymentStatus},
};

const PAYMENT_COLS: &str = r#"
    id, invoice_id, account_id, provider, provider_transaction_id, provider_reference,
    amount_cents, currency, status, failure_reason, paid_at, metadata,
    created_at, updated_at
"#;

fn row_to_payment(row: sqlx::postgres::PgRow) -> Payment {
    Payment {
        id: row.get("id"),
        invoice_id: row.get("invoice_id"),
        account_id: row.get("account_id"),
        provider: row.get("provider"),
        provider_transaction_id: row.get("provider_transaction_id"),
        provider_reference: row.get("provider_reference"),
        amount_cents: row.get("amount_cents"),
        currency: row.get("currency"),
        status: row.get("status"),
        failure_reason: row.get("failure_reason"),
        paid_at: row.get("paid_at"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl PaymentRepo for PostgresPersistence {
    async fn apply_payment(&self, update: PaymentUpdate) -> AppResult<PaymentApplication> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        // Row lock on the invoice serializes every payment applied to it.
        let invoice = sqlx::query(&format!(
            "SELECT {INVOICE_COLS} FROM invoices WHERE id = $1 FOR UPDATE"
        ))
        .bind(update.invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?
        .map(row_to_invoice)
        .ok_or(AppError::NotFound)?;
        let invoice_status_before = invoice.status;

        let existing = sqlx::query(&format!(
            r#"
            SELECT {PAYMENT_COLS} FROM payments
            WHERE invoice_id = $1 AND provider_transaction_id = $2
            "#
        ))
        .bind(update.invoice_id)
        .bind(&update.provider_transaction_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?
        .map(row_to_payment);

        let change = plan_payment_change(existing.as_ref(), invoice.status, update.status)?;
        let now = Utc::now();

        let (payment, payment_created, status_changed) = match (change, existing) {
            (PaymentChange::Ignore, Some(payment)) => (payment, false, false),
            (PaymentChange::Insert, _) => {
                let row = sqlx::query(&format!(
                    r#"
                    INSERT INTO payments (
                        id, invoice_id, account_id, provider, provider_transaction_id,
                        provider_reference, amount_cents, currency, status, failure_reason,
                        paid_at, metadata, created_at, updated_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
                    RETURNING {PAYMENT_COLS}
                    "#
                ))
                .bind(Uuid::new_v4())
                .bind(update.invoice_id)
                .bind(update.account_id)
                .bind(update.provider)
                .bind(&update.provider_transaction_id)
                .bind(&update.provider_reference)
                .bind(update.amount_cents)
                .bind(&update.currency)
                .bind(update.status)
                .bind(&update.failure_reason)
                .bind(update.paid_at)
                .bind(&update.metadata)
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(AppError::from)?;
                (row_to_payment(row), true, true)
            }
            (PaymentChange::Update, Some(existing)) => {
                let row = sqlx::query(&format!(
                    r#"
                    UPDATE payments
                    SET status = $2,
                        amount_cents = $3,
                        failure_reason = $4,
                        paid_at = COALESCE($5, paid_at),
                        metadata = $6,
                        updated_at = $7
                    WHERE id = $1
                    RETURNING {PAYMENT_COLS}
                    "#
                ))
                .bind(existing.id)
                .bind(update.status)
                .bind(update.amount_cents)
                .bind(&update.failure_reason)
                .bind(update.paid_at)
                .bind(&update.metadata)
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(AppError::from)?;
                (row_to_payment(row), false, true)
            }
            (change, None) => {
                return Err(AppError::Internal(format!(
                    "payment change {change:?} planned without an existing payment"
                )));
            }
        };

        let invoice = if status_changed && payment.status == PaymentStatus::Completed {
            let total_paid: i64 = sqlx::query(
                r#"
                SELECT COALESCE(SUM(amount_cents), 0)::BIGINT AS total_paid
                FROM payments
                WHERE invoice_id = $1 AND status = 'completed'
                "#,
            )
            .bind(invoice.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::from)?
            .get("total_paid");

            let (status, paid_at) = settle_invoice(&invoice, total_paid, now);
            let row = sqlx::query(&format!(
                r#"
                UPDATE invoices
                SET amount_paid_cents = $2, status = $3, paid_at = $4, updated_at = $5
                WHERE id = $1
                RETURNING {INVOICE_COLS}
                "#
            ))
            .bind(invoice.id)
            .bind(total_paid)
            .bind(status)
            .bind(paid_at)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::from)?;
            row_to_invoice(row)
        } else {
            invoice
        };

        tx.commit().await.map_err(AppError::from)?;

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
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PAYMENT_COLS} FROM payments
            WHERE status = 'pending' AND updated_at < $1
            ORDER BY updated_at
            LIMIT $2
            "#
        ))
        .bind(older_than)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_payment).collect())
    }

    async fn list_for_invoice(&self, invoice_id: Uuid) -> AppResult<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLS} FROM payments WHERE invoice_id = $1 ORDER BY created_at"
        ))
        .bind(invoice_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_payment).collect())
    }
}

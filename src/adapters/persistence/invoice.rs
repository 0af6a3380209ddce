use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::billing::{InvoiceInsert, InvoiceRepo, NewInvoice},
    domain::entities::invoice::{BillingPeriod, Invoice, InvoiceLineItem, InvoiceStatus},
};

pub(crate) const INVOICE_COLS: &str = r#"
    id, invoice_number, account_id, subscription_id, currency,
    period_start, period_end,
    subscription_fee_cents, usage_fee_cents, transaction_fee_cents, overage_fee_cents,
    subtotal_cents, tax_cents, total_cents, amount_paid_cents, status, due_date,
    issued_at, paid_at, overdue_at, voided_at, created_at, updated_at
"#;

pub(crate) fn row_to_invoice(row: sqlx::postgres::PgRow) -> Invoice {
    Invoice {
        id: row.get("id"),
        invoice_number: row.get("invoice_number"),
        account_id: row.get("account_id"),
        subscription_id: row.get("subscription_id"),
        currency: row.get("currency"),
        period_start: row.get("period_start"),
        period_end: row.get("period_end"),
        subscription_fee_cents: row.get("subscription_fee_cents"),
        usage_fee_cents: row.get("usage_fee_cents"),
        transaction_fee_cents: row.get("transaction_fee_cents"),
        overage_fee_cents: row.get("overage_fee_cents"),
        subtotal_cents: row.get("subtotal_cents"),
        tax_cents: row.get("tax_cents"),
        total_cents: row.get("total_cents"),
        amount_paid_cents: row.get("amount_paid_cents"),
        status: row.get("status"),
        due_date: row.get("due_date"),
        issued_at: row.get("issued_at"),
        paid_at: row.get("paid_at"),
        overdue_at: row.get("overdue_at"),
        voided_at: row.get("voided_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_line_item(row: sqlx::postgres::PgRow) -> InvoiceLineItem {
    InvoiceLineItem {
        id: row.get("id"),
        invoice_id: row.get("invoice_id"),
        kind: row.get("kind"),
        description: row.get("description"),
        quantity: row.get("quantity"),
        unit_price_cents: row.get("unit_price_cents"),
        amount_cents: row.get("amount_cents"),
    }
}

/// Timestamp column stamped when an invoice enters `status`
fn status_timestamp_column(status: InvoiceStatus) -> Option<&'static str> {
    match status {
        InvoiceStatus::Sent => Some("issued_at"),
        InvoiceStatus::Paid => Some("paid_at"),
        InvoiceStatus::Overdue => Some("overdue_at"),
        InvoiceStatus::Void => Some("voided_at"),
        InvoiceStatus::Draft | InvoiceStatus::PartiallyPaid => None,
    }
}

#[async_trait]
impl InvoiceRepo for PostgresPersistence {
    async fn find_for_period(
        &self,
        account_id: Uuid,
        period: &BillingPeriod,
    ) -> AppResult<Option<Invoice>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {INVOICE_COLS} FROM invoices
            WHERE account_id = $1 AND period_start = $2 AND period_end = $3
              AND status <> 'void'
            "#
        ))
        .bind(account_id)
        .bind(period.start)
        .bind(period.end)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_invoice))
    }

    async fn next_sequence(&self, year: i32, month: u32) -> AppResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO invoice_sequences (year, month, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (year, month)
            DO UPDATE SET last_value = invoice_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(year)
        .bind(month as i32)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.get("last_value"))
    }

    async fn insert_with_line_items(&self, invoice: NewInvoice) -> AppResult<InvoiceInsert> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        // The partial unique index arbitrates concurrent generators for the same period.
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO invoices (
                id, invoice_number, account_id, subscription_id, currency,
                period_start, period_end,
                subscription_fee_cents, usage_fee_cents, transaction_fee_cents, overage_fee_cents,
                subtotal_cents, tax_cents, total_cents, status, due_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (account_id, period_start, period_end) WHERE status <> 'void'
            DO NOTHING
            RETURNING {INVOICE_COLS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&invoice.invoice_number)
        .bind(invoice.account_id)
        .bind(invoice.subscription_id)
        .bind(&invoice.currency)
        .bind(invoice.period.start)
        .bind(invoice.period.end)
        .bind(invoice.subscription_fee_cents)
        .bind(invoice.usage_fee_cents)
        .bind(invoice.transaction_fee_cents)
        .bind(invoice.overage_fee_cents)
        .bind(invoice.subtotal_cents)
        .bind(invoice.tax_cents)
        .bind(invoice.total_cents)
        .bind(InvoiceStatus::Draft)
        .bind(invoice.due_date)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?;

        let Some(row) = inserted else {
            tx.rollback().await.map_err(AppError::from)?;
            let existing = self
                .find_for_period(invoice.account_id, &invoice.period)
                .await?
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "invoice for account {} conflicted but was not found",
                        invoice.account_id
                    ))
                })?;
            return Ok(InvoiceInsert::AlreadyExists(existing));
        };
        let created = row_to_invoice(row);

        for item in &invoice.line_items {
            sqlx::query(
                r#"
                INSERT INTO invoice_line_items
                    (id, invoice_id, kind, description, quantity, unit_price_cents, amount_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(created.id)
            .bind(item.kind)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.amount_cents)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;
        }

        tx.commit().await.map_err(AppError::from)?;
        Ok(InvoiceInsert::Created(created))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Invoice>> {
        let row = sqlx::query(&format!("SELECT {INVOICE_COLS} FROM invoices WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;

        Ok(row.map(row_to_invoice))
    }

    async fn get_by_number(&self, invoice_number: &str) -> AppResult<Option<Invoice>> {
        let row = sqlx::query(&format!(
            "SELECT {INVOICE_COLS} FROM invoices WHERE invoice_number = $1"
        ))
        .bind(invoice_number)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_invoice))
    }

    async fn list_line_items(&self, invoice_id: Uuid) -> AppResult<Vec<InvoiceLineItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, invoice_id, kind, description, quantity, unit_price_cents, amount_cents
            FROM invoice_line_items
            WHERE invoice_id = $1
            ORDER BY kind
            "#,
        )
        .bind(invoice_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_line_item).collect())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: InvoiceStatus,
        to: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let stamp = status_timestamp_column(to)
            .map(|col| format!(", {col} = COALESCE({col}, $4)"))
            .unwrap_or_default();

        let result = sqlx::query(&format!(
            "UPDATE invoices SET status = $3, updated_at = $4{stamp} WHERE id = $1 AND status = $2"
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_past_due(&self, now: DateTime<Utc>) -> AppResult<Vec<Invoice>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {INVOICE_COLS} FROM invoices
            WHERE status IN ('sent', 'partially_paid') AND due_date < $1
            ORDER BY due_date
            "#
        ))
        .bind(now)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_invoice).collect())
    }

    async fn list_overdue_since(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Invoice>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {INVOICE_COLS} FROM invoices
            WHERE status = 'overdue' AND overdue_at <= $1
            ORDER BY overdue_at
            "#
        ))
        .bind(cutoff)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_invoice).collect())
    }
}

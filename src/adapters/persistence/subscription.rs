use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::billing::SubscriptionRepo,
    domain::entities::subscription::{Subscription, SubscriptionStatus},
};

const SELECT_COLS: &str = r#"
    id, account_id, tier, price_cents, currency, status,
    calls_limit, calls_used, overage_rate_cents, customer_email,
    current_period_start, current_period_end, created_at, updated_at
"#;

fn row_to_subscription(row: sqlx::postgres::PgRow) -> Subscription {
    Subscription {
        id: row.get("id"),
        account_id: row.get("account_id"),
        tier: row.get("tier"),
        price_cents: row.get("price_cents"),
        currency: row.get("currency"),
        status: row.get("status"),
        calls_limit: row.get("calls_limit"),
        calls_used: row.get("calls_used"),
        overage_rate_cents: row.get("overage_rate_cents"),
        customer_email: row.get("customer_email"),
        current_period_start: row.get("current_period_start"),
        current_period_end: row.get("current_period_end"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl SubscriptionRepo for PostgresPersistence {
    async fn list_billable(&self) -> AppResult<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLS} FROM subscriptions WHERE status = $1 ORDER BY created_at, id"
        ))
        .bind(SubscriptionStatus::Active)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_subscription).collect())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLS} FROM subscriptions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_subscription))
    }

    async fn set_status(&self, id: Uuid, status: SubscriptionStatus) -> AppResult<()> {
        let result =
            sqlx::query("UPDATE subscriptions SET status = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(status)
                .execute(self.pool())
                .await
                .map_err(AppError::from)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}

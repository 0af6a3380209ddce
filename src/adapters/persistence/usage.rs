use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::billing::UsageRepo,
    domain::entities::{invoice::BillingPeriod, subscription::UsageTotals},
};

#[async_trait]
impl UsageRepo for PostgresPersistence {
    /// Sums usage recorded in `[period.start, period.end)`.
    async fn totals_for_period(
        &self,
        subscription_id: Uuid,
        period: &BillingPeriod,
    ) -> AppResult<UsageTotals> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(cost_cents), 0)::BIGINT AS usage_cost_cents,
                COUNT(*) FILTER (WHERE is_transaction)::BIGINT AS transaction_count,
                COALESCE(SUM(transaction_fee_cents), 0)::BIGINT AS transaction_fee_cents
            FROM usage_records
            WHERE subscription_id = $1
              AND recorded_at >= $2
              AND recorded_at < $3
            "#,
        )
        .bind(subscription_id)
        .bind(period.start)
        .bind(period.end)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(UsageTotals {
            usage_cost_cents: row.get("usage_cost_cents"),
            transaction_count: row.get("transaction_count"),
            transaction_fee_cents: row.get("transaction_fee_cents"),
        })
    }
}

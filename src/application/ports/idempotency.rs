use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{app_error::AppResult, domain::entities::payment_provider::PaymentProvider};

/// What is remembered about a webhook once it has been fully processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedWebhook {
    pub webhook_id: String,
    pub provider: PaymentProvider,
    pub event_type: String,
    pub reference: String,
    pub processed_at: DateTime<Utc>,
}

/// Deduplicates webhook deliveries across restarts and instances.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Check if a webhook has already been processed
    async fn is_processed(&self, webhook_id: &str) -> AppResult<bool>;

    /// Record a webhook as processed. Call only after its side effects committed.
    async fn mark_processed(&self, record: ProcessedWebhook) -> AppResult<()>;

    /// Drop expired entries from any process-local tier.
    async fn evict_expired(&self) {}
}

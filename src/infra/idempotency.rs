use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::Utc;
use moka::{Expiry, future::Cache};
use tracing::{debug, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        idempotency::{IdempotencyStore, ProcessedWebhook},
        shared_cache::SharedCache,
    },
};

const KEY_PREFIX: &str = "billing:webhook:";

/// Retention window for processed webhook ids
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on ids held by the process-local tier
pub const LOCAL_CAPACITY: u64 = 100_000;

/// Each local entry stores its own time to live, so ids backfilled from the
/// shared cache expire no later than the shared record.
struct RemainingTtl;

impl Expiry<String, Duration> for RemainingTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        ttl: &Duration,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(*ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        ttl: &Duration,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(*ttl)
    }
}

/// Webhook dedupe with a process-local tier in front of the shared cache.
///
/// The shared cache is the source of truth and expires entries itself; the
/// local tier is a bounded moka cache that only saves a round trip.
pub struct TwoTierIdempotencyStore {
    durable: Arc<dyn SharedCache>,
    local: Cache<String, Duration>,
    retention: Duration,
}

impl TwoTierIdempotencyStore {
    pub fn new(durable: Arc<dyn SharedCache>, retention: Duration) -> Self {
        Self::with_capacity(durable, retention, LOCAL_CAPACITY)
    }

    pub fn with_capacity(
        durable: Arc<dyn SharedCache>,
        retention: Duration,
        max_capacity: u64,
    ) -> Self {
        let local = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(RemainingTtl)
            .build();
        Self {
            durable,
            local,
            retention,
        }
    }

    fn durable_key(webhook_id: &str) -> String {
        format!("{KEY_PREFIX}{webhook_id}")
    }

    /// Local time to live for a record read back from the durable tier, so
    /// the backfilled entry does not outlive the durable one.
    fn backfill_ttl(&self, stored: &str) -> Duration {
        match serde_json::from_str::<ProcessedWebhook>(stored) {
            Ok(record) => {
                let age = (Utc::now() - record.processed_at)
                    .to_std()
                    .unwrap_or_default();
                self.retention.saturating_sub(age)
            }
            Err(e) => {
                warn!(error = %e, "Unreadable idempotency record, using full retention");
                self.retention
            }
        }
    }
}

#[async_trait]
impl IdempotencyStore for TwoTierIdempotencyStore {
    async fn is_processed(&self, webhook_id: &str) -> AppResult<bool> {
        if self.local.get(webhook_id).await.is_some() {
            return Ok(true);
        }

        match self.durable.get(&Self::durable_key(webhook_id)).await? {
            Some(stored) => {
                let ttl = self.backfill_ttl(&stored);
                self.local.insert(webhook_id.to_string(), ttl).await;
                debug!(%webhook_id, "Idempotency hit in shared cache, backfilled local tier");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_processed(&self, record: ProcessedWebhook) -> AppResult<()> {
        let value = serde_json::to_string(&record)
            .map_err(|e| AppError::Internal(format!("serialize idempotency record: {e}")))?;

        self.durable
            .set_with_ttl(&Self::durable_key(&record.webhook_id), &value, self.retention)
            .await?;
        self.local.insert(record.webhook_id, self.retention).await;
        Ok(())
    }

    async fn evict_expired(&self) {
        self.local.run_pending_tasks().await;
    }
}

use std::time::Duration;

use async_trait::async_trait;

use crate::app_error::AppResult;

/// Key-value store shared by every instance of the service (Redis in
/// production). Backs the durable idempotency tier and the distributed lock.
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Overwrite `key` with an expiry.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Set `key` only if absent. Returns whether this call created it.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool>;

    /// Delete `key` only if it still holds `expected`, atomically.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> AppResult<bool>;
}

use std::{sync::Arc, time::Duration};

use tracing::{debug, warn};
use uuid::Uuid;

use super::shared_cache::SharedCache;
use crate::app_error::AppResult;

/// Mutual exclusion across service instances, built on `SharedCache`.
///
/// Acquisition is `SET NX` with a TTL under a random token; release deletes
/// the key only while it still holds that token, so an instance whose lock
/// expired cannot release someone else's.
#[derive(Clone)]
pub struct DistributedLock {
    cache: Arc<dyn SharedCache>,
}

impl DistributedLock {
    pub fn new(cache: Arc<dyn SharedCache>) -> Self {
        Self { cache }
    }

    /// Try once to take `name`. `Ok(None)` means another holder has it.
    pub async fn try_acquire(&self, name: &str, ttl: Duration) -> AppResult<Option<LockGuard>> {
        let token = Uuid::new_v4().to_string();
        let acquired = self.cache.set_if_absent(name, &token, ttl).await?;
        if !acquired {
            return Ok(None);
        }

        debug!(lock = %name, "Acquired lock");
        Ok(Some(LockGuard {
            cache: self.cache.clone(),
            key: name.to_string(),
            token,
            released: false,
        }))
    }
}

/// Held lock. Release explicitly with `release`; if the guard is dropped on
/// any other path (early return, error, panic) the release is spawned onto the
/// current runtime. The TTL covers a crashed process.
pub struct LockGuard {
    cache: Arc<dyn SharedCache>,
    key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns `false` if the lock had already expired or changed hands.
    pub async fn release(mut self) -> AppResult<bool> {
        self.released = true;
        let released = self.cache.delete_if_equals(&self.key, &self.token).await?;
        if !released {
            warn!(lock = %self.key, "Lock expired before release");
        }
        Ok(released)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let cache = self.cache.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = cache.delete_if_equals(&key, &token).await {
                        warn!(lock = %key, error = %e, "Failed to release dropped lock");
                    }
                });
            }
            Err(_) => {
                warn!(lock = %key, "No runtime to release dropped lock, waiting for TTL");
            }
        }
    }
}

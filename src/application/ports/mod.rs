pub mod distributed_lock;
pub mod idempotency;
pub mod job_queue;
pub mod notifications;
pub mod payment_provider;
pub mod shared_cache;
pub mod wallet;

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod flutterwave_adapter;
pub mod http_client;
pub mod idempotency;
pub mod job_queue;
pub mod ozow_adapter;
pub mod payfast_adapter;
pub mod paystack_adapter;
pub mod redis_cache;
pub mod scheduler;
pub mod setup;
pub mod webhook_signature;

pub use error::InfraError;

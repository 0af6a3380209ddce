pub mod invoice;
pub mod money;
pub mod payment;
pub mod payment_provider;
pub mod subscription;
pub mod webhook_event;

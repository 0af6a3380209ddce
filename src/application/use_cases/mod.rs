pub mod billing;
pub mod billing_jobs;
pub mod checkout;
pub mod invoice_generation;
pub mod payment_reconciliation;
pub mod provider_registry;
pub mod webhook_ingest;

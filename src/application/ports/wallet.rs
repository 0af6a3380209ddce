use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::app_error::AppResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletCredit {
    pub account_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    /// Payment that funded the credit; the wallet service dedupes on it
    pub payment_id: Uuid,
    pub invoice_number: String,
}

/// Credits an account's prepaid balance after a confirmed payment.
#[async_trait]
pub trait WalletPort: Send + Sync {
    async fn credit(&self, credit: &WalletCredit) -> AppResult<()>;
}

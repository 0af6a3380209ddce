use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info};
use url::Url;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::wallet::{WalletCredit, WalletPort},
    infra::{
        config::WalletConfig,
        http_client::{build_client, transport_error},
    },
};

const SERVICE: &str = "wallet";

/// Credits prepaid balances through the wallet service's REST API.
pub struct HttpWalletClient {
    client: Client,
    credits_url: String,
    api_key: SecretString,
}

impl HttpWalletClient {
    pub fn new(config: &WalletConfig) -> Self {
        Self {
            client: build_client(),
            credits_url: credits_url(&config.url),
            api_key: SecretString::new(config.api_key.expose_secret().into()),
        }
    }
}

fn credits_url(base: &Url) -> String {
    format!("{}/credits", base.as_str().trim_end_matches('/'))
}

#[async_trait]
impl WalletPort for HttpWalletClient {
    async fn credit(&self, credit: &WalletCredit) -> AppResult<()> {
        let response = self
            .client
            .post(&self.credits_url)
            .bearer_auth(self.api_key.expose_secret())
            // The wallet service dedupes retried credits on this key.
            .header("Idempotency-Key", credit.payment_id.to_string())
            .json(credit)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                payment_id = %credit.payment_id,
                status = %status,
                body = %body,
                "Wallet service rejected credit"
            );
            return Err(AppError::Gateway(format!("{SERVICE} returned {status}")));
        }

        info!(
            payment_id = %credit.payment_id,
            account_id = %credit.account_id,
            amount_cents = credit.amount_cents,
            "Credited wallet"
        );
        Ok(())
    }
}

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};
use url::Url;

use crate::{
    application::ports::notifications::{Notification, NotificationDispatcher},
    infra::http_client::build_client,
};

/// Posts notifications as JSON to an alerting endpoint, or logs them when
/// no endpoint is configured.
pub struct WebhookNotifier {
    client: Client,
    endpoint: Option<Url>,
}

impl WebhookNotifier {
    pub fn new(endpoint: Option<Url>) -> Self {
        Self {
            client: build_client(),
            endpoint,
        }
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookNotifier {
    async fn notify(&self, notification: Notification) {
        let kind = notification.kind();
        let Some(endpoint) = &self.endpoint else {
            info!(kind, notification = ?notification, "Notification (no endpoint configured)");
            return;
        };

        match self
            .client
            .post(endpoint.clone())
            .json(&notification)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!(kind, "Sent notification");
            }
            Ok(response) => {
                warn!(
                    kind,
                    status = %response.status(),
                    "Notification endpoint rejected notification"
                );
            }
            Err(e) => {
                warn!(kind, error = %e, "Failed to send notification");
            }
        }
    }
}

//! HTTP client factory and response handling shared by the gateway and
//! collaborator clients.

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::app_error::{AppError, AppResult};

/// Default connect timeout (TCP handshake + TLS).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default request timeout (total request/response time).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build an HTTP client with default timeouts.
///
/// Panics if the client cannot be built (e.g., TLS misconfiguration); only
/// called while wiring singletons at startup.
pub fn build_client() -> Client {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()
        .expect("Failed to build HTTP client")
}

pub fn transport_error(service: &str, err: reqwest::Error) -> AppError {
    tracing::warn!(service, error = %err, "Request failed");
    AppError::Gateway(format!("{service} request failed"))
}

/// Read a JSON response, mapping non-2xx statuses to `AppError::Gateway`.
pub async fn read_json<T: DeserializeOwned>(
    service: &str,
    response: reqwest::Response,
) -> AppResult<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AppError::Gateway(format!("{service}: failed to read response: {e}")))?;

    if !status.is_success() {
        tracing::error!(service, status = %status, body = %body, "Upstream API error");
        return Err(AppError::Gateway(format!("{service} returned {status}")));
    }

    serde_json::from_str(&body).map_err(|e| {
        tracing::error!(service, body = %body, error = %e, "Failed to parse upstream response");
        AppError::Gateway(format!("{service}: unexpected response: {e}"))
    })
}

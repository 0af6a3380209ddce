//! Gateway webhook ingress.

use std::str::FromStr;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use tracing::{error, warn};

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::use_cases::webhook_ingest::{PROVIDER_HEADER, detect_provider},
    domain::entities::payment_provider::PaymentProvider,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhooks", post(ingest_detected))
        .route("/webhooks/{provider}", post(ingest_for_provider))
}

// ============================================================================
// Helper Functions
// ============================================================================

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Determines if a webhook processing error should make the gateway redeliver.
///
/// Returns `true` for transient failures: we answer 5xx so the gateway retries.
/// Returns `false` for conditions a redelivery cannot fix: we answer 2xx and log.
fn is_retryable_error(error: &AppError) -> bool {
    match error {
        // Transient errors - retry may succeed
        AppError::Database(_) => true,
        AppError::Internal(_) => true,
        AppError::Gateway(_) => true,

        // Expected conditions - won't change with retry
        AppError::NotFound => false,
        AppError::InvalidInput(_) => false,
        AppError::AlreadyPaidInvoice => false,
        AppError::InvoiceVoid => false,
        AppError::InvalidTransition { .. } => false,

        // Unknown/new variants - safer to retry
        #[allow(unreachable_patterns)]
        _ => true,
    }
}

/// Returns 500 so the gateway redelivers the webhook.
fn webhook_retryable_error(error: &AppError, provider: &str) -> Response {
    error!(
        error = %error,
        provider,
        retryable = true,
        "Webhook processing failed, returning 500 for redelivery"
    );
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "status": "retry" })),
    )
        .into_response()
}

async fn ingest(
    app_state: &AppState,
    provider: &str,
    body: &[u8],
    signature: Option<&str>,
) -> AppResult<Response> {
    match app_state
        .webhook_use_cases
        .ingest(provider, body, signature)
        .await
    {
        Ok(outcome) => Ok((StatusCode::OK, Json(outcome)).into_response()),
        // Authentication and routing failures keep their own status codes.
        Err(
            e @ (AppError::InvalidSignature
            | AppError::UnknownProvider(_)
            | AppError::ProviderNotConfigured(_)),
        ) => Err(e),
        Err(e) if is_retryable_error(&e) => Ok(webhook_retryable_error(&e, provider)),
        Err(e) => {
            warn!(
                error = %e,
                provider,
                retryable = false,
                "Webhook not processed, acknowledging to stop redelivery"
            );
            Ok((
                StatusCode::OK,
                Json(serde_json::json!({ "status": "ignored", "reason": e.to_string() })),
            )
                .into_response())
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/webhooks/{provider}
async fn ingest_for_provider(
    State(app_state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    // An unknown name falls through to the registry, which reports it.
    let signature = PaymentProvider::from_str(provider.trim())
        .ok()
        .and_then(|p| header_str(&headers, p.signature_header()));

    ingest(&app_state, &provider, &body, signature).await
}

/// POST /api/webhooks
/// Gateway-agnostic ingress; the provider comes from a header or the body.
async fn ingest_detected(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let provider = detect_provider(header_str(&headers, PROVIDER_HEADER), &body)?;
    let signature = header_str(&headers, provider.signature_header());

    ingest(&app_state, provider.as_ref(), &body, signature).await
}

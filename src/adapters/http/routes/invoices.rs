use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::{use_cases::checkout::CheckoutInput, validators::is_valid_callback_url},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{invoice_id}", get(get_invoice))
        .route("/{invoice_id}/issue", post(issue_invoice))
        .route("/{invoice_id}/void", post(void_invoice))
        .route("/{invoice_id}/payments", post(initiate_payment))
}

#[derive(Deserialize)]
struct InitiatePaymentPayload {
    provider: String,
    return_url: String,
    cancel_url: Option<String>,
    customer_name: Option<String>,
}

/// GET /api/invoices/{invoice_id}
async fn get_invoice(
    State(app_state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let invoice = app_state.invoice_use_cases.get_invoice(invoice_id).await?;
    Ok(Json(invoice))
}

/// POST /api/invoices/{invoice_id}/issue
async fn issue_invoice(
    State(app_state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let invoice = app_state.invoice_use_cases.issue_invoice(invoice_id).await?;
    Ok(Json(invoice))
}

/// POST /api/invoices/{invoice_id}/void
async fn void_invoice(
    State(app_state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let invoice = app_state.invoice_use_cases.void_invoice(invoice_id).await?;
    Ok(Json(invoice))
}

/// POST /api/invoices/{invoice_id}/payments
/// Starts a gateway payment for the invoice's outstanding balance.
async fn initiate_payment(
    State(app_state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<InitiatePaymentPayload>,
) -> AppResult<impl IntoResponse> {
    if payload
        .cancel_url
        .as_deref()
        .is_some_and(|url| !is_valid_callback_url(url))
    {
        return Err(AppError::InvalidInput("Invalid cancel url".into()));
    }

    let initiation = app_state
        .checkout_use_cases
        .initiate_payment(
            invoice_id,
            CheckoutInput {
                provider: payload.provider,
                return_url: payload.return_url.trim().to_string(),
                cancel_url: payload.cancel_url,
                customer_name: payload.customer_name,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(initiation)))
}

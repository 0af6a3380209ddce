use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the error before it gets converted into a status response.
        tracing::error!(error = ?self, "Request failed");

        match self {
            AppError::Database(_) => {
                error_resp(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DatabaseError, None)
            }
            AppError::InvalidInput(msg) => {
                error_resp(StatusCode::BAD_REQUEST, ErrorCode::InvalidInput, Some(msg))
            }
            AppError::NotFound => error_resp(StatusCode::NOT_FOUND, ErrorCode::NotFound, None),
            AppError::Internal(_) => {
                error_resp(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::InternalError, None)
            }
            AppError::InvalidSignature => {
                error_resp(StatusCode::UNAUTHORIZED, ErrorCode::InvalidSignature, None)
            }
            AppError::UnknownProvider(name) => error_resp(
                StatusCode::NOT_FOUND,
                ErrorCode::UnknownProvider,
                Some(format!("Unknown payment provider: {name}")),
            ),
            AppError::ProviderNotConfigured(name) => error_resp(
                StatusCode::NOT_FOUND,
                ErrorCode::ProviderNotConfigured,
                Some(format!("Payment provider not configured: {name}")),
            ),
            AppError::Gateway(_) => {
                error_resp(StatusCode::BAD_GATEWAY, ErrorCode::GatewayError, None)
            }
            AppError::AlreadyPaidInvoice => {
                error_resp(StatusCode::CONFLICT, ErrorCode::AlreadyPaidInvoice, None)
            }
            AppError::InvoiceVoid => error_resp(StatusCode::CONFLICT, ErrorCode::InvoiceVoid, None),
            AppError::InvalidTransition { from, to } => error_resp(
                StatusCode::CONFLICT,
                ErrorCode::InvalidTransition,
                Some(format!("Cannot move invoice from {from} to {to}")),
            ),
        }
    }
}

fn error_resp(status: StatusCode, code: ErrorCode, message: Option<String>) -> Response {
    let body = match message {
        Some(msg) => serde_json::json!({ "code": code.as_str(), "message": msg }),
        None => serde_json::json!({ "code": code.as_str() }),
    };
    (status, Json(body)).into_response()
}

use thiserror::Error;

use crate::domain::entities::invoice::InvoiceStatus;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Unknown payment provider: {0}")]
    UnknownProvider(String),

    #[error("Payment provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Invoice is already paid")]
    AlreadyPaidInvoice,

    #[error("Invoice is void")]
    InvoiceVoid,

    #[error("Invalid invoice transition from {from} to {to}")]
    InvalidTransition {
        from: InvoiceStatus,
        to: InvoiceStatus,
    },
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    DatabaseError,
    InvalidInput,
    NotFound,
    InternalError,
    InvalidSignature,
    UnknownProvider,
    ProviderNotConfigured,
    GatewayError,
    AlreadyPaidInvoice,
    InvoiceVoid,
    InvalidTransition,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::UnknownProvider => "UNKNOWN_PROVIDER",
            ErrorCode::ProviderNotConfigured => "PROVIDER_NOT_CONFIGURED",
            ErrorCode::GatewayError => "GATEWAY_ERROR",
            ErrorCode::AlreadyPaidInvoice => "ALREADY_PAID_INVOICE",
            ErrorCode::InvoiceVoid => "INVOICE_VOID",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

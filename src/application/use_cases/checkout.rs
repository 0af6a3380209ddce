use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_provider::{PaymentInitiation, PaymentRequest},
    domain::entities::invoice::{InvoiceStatus, attempt_reference},
};

use super::{
    billing::{InvoiceRepo, SubscriptionRepo},
    provider_registry::ProviderRegistry,
};

#[derive(Debug, Clone)]
pub struct CheckoutInput {
    pub provider: String,
    pub return_url: String,
    pub cancel_url: Option<String>,
    pub customer_name: Option<String>,
}

/// Starts gateway payments for the outstanding balance of an invoice.
pub struct CheckoutUseCases {
    invoices: Arc<dyn InvoiceRepo>,
    subscriptions: Arc<dyn SubscriptionRepo>,
    registry: Arc<ProviderRegistry>,
    /// Base URL gateways post notifications back to
    public_base_url: String,
}

impl CheckoutUseCases {
    pub fn new(
        invoices: Arc<dyn InvoiceRepo>,
        subscriptions: Arc<dyn SubscriptionRepo>,
        registry: Arc<ProviderRegistry>,
        public_base_url: String,
    ) -> Self {
        Self {
            invoices,
            subscriptions,
            registry,
            public_base_url,
        }
    }

    pub async fn initiate_payment(
        &self,
        invoice_id: Uuid,
        input: CheckoutInput,
    ) -> AppResult<PaymentInitiation> {
        let adapter = self.registry.resolve(&input.provider)?;

        let invoice = self
            .invoices
            .get_by_id(invoice_id)
            .await?
            .ok_or(AppError::NotFound)?;
        match invoice.status {
            InvoiceStatus::Paid => return Err(AppError::AlreadyPaidInvoice),
            InvoiceStatus::Void => return Err(AppError::InvoiceVoid),
            InvoiceStatus::Draft => {
                return Err(AppError::InvalidInput("invoice has not been issued".into()));
            }
            _ => {}
        }

        let subscription = self
            .subscriptions
            .get_by_id(invoice.subscription_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let request = PaymentRequest {
            reference: attempt_reference(&invoice.invoice_number, Uuid::new_v4()),
            amount_cents: invoice.balance_due_cents(),
            currency: invoice.currency.clone(),
            customer_email: subscription.customer_email.clone(),
            customer_name: input.customer_name,
            description: format!("Invoice {}", invoice.invoice_number),
            invoice_id: invoice.id,
            account_id: invoice.account_id,
            return_url: input.return_url,
            cancel_url: input.cancel_url,
            notify_url: Some(format!(
                "{}/api/webhooks/{}",
                self.public_base_url.trim_end_matches('/'),
                adapter.provider()
            )),
        };
        request.validate(adapter.supported_currencies())?;

        let initiation = adapter.create_payment(&request).await?;
        info!(
            invoice_number = %invoice.invoice_number,
            reference = %request.reference,
            provider = %adapter.provider(),
            amount_cents = request.amount_cents,
            "Initiated payment"
        );
        Ok(initiation)
    }
}

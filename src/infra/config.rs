use std::{net::SocketAddr, str::FromStr, time::Duration};

use axum::http::HeaderValue;
use env_helpers::get_env_default;
use secrecy::SecretString;
use url::Url;

use super::{
    InfraError,
    flutterwave_adapter::FLUTTERWAVE_API_BASE,
    job_queue::RetryPolicy,
    ozow_adapter::{OZOW_API_BASE, OzowSettings},
    payfast_adapter::{PAYFAST_API_BASE, PAYFAST_PROCESS_URL, PayfastSettings},
    paystack_adapter::PAYSTACK_API_BASE,
    scheduler::{Schedule, SchedulerSettings},
};
use crate::{
    application::use_cases::invoice_generation::InvoiceSettings,
    domain::entities::money::TaxRate,
};

pub struct PaystackConfig {
    pub secret_key: SecretString,
    pub base_url: String,
}

pub struct FlutterwaveConfig {
    pub secret_key: SecretString,
    /// Dashboard "secret hash" used to sign webhooks
    pub secret_hash: SecretString,
    pub base_url: String,
}

/// Credentials per gateway. A gateway is enabled only when its section is present.
#[derive(Default)]
pub struct GatewayCredentials {
    pub paystack: Option<PaystackConfig>,
    pub flutterwave: Option<FlutterwaveConfig>,
    pub payfast: Option<PayfastSettings>,
    pub ozow: Option<OzowSettings>,
}

pub struct WalletConfig {
    pub url: Url,
    pub api_key: SecretString,
}

pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: String,
    pub cors_origin: HeaderValue,
    /// Externally reachable base URL; gateway notify URLs are built from it
    pub public_base_url: Url,
    pub invoice: InvoiceSettings,
    pub scheduler: SchedulerSettings,
    pub job_retry: RetryPolicy,
    pub job_lock_ttl: Duration,
    pub webhook_retention: Duration,
    /// Age after which a pending payment is confirmed with its gateway
    pub pending_verify_after: chrono::Duration,
    pub wallet: WalletConfig,
    /// Where operational and customer notifications are posted; logged only when unset
    pub notification_url: Option<Url>,
    pub gateways: GatewayCredentials,
}

fn required(var: &'static str) -> Result<String, InfraError> {
    optional(var).ok_or(InfraError::ConfigMissing { var })
}

fn optional(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(var: &'static str, raw: &str) -> Result<T, InfraError> {
    raw.trim().parse().map_err(|_| InfraError::ConfigInvalid { var })
}

fn secret(var: &'static str) -> Option<SecretString> {
    optional(var).map(|s| SecretString::new(s.into()))
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        let bind_addr: SocketAddr = parsed(
            "BIND_ADDR",
            &get_env_default("BIND_ADDR", "127.0.0.1:3001".to_string()),
        )?;
        let database_url = required("DATABASE_URL")?;
        let database_max_connections: u32 = get_env_default("DATABASE_MAX_CONNECTIONS", 5);
        let redis_url: String = get_env_default("REDIS_URL", "redis://127.0.0.1:6379".to_string());
        let cors_origin: HeaderValue = parsed(
            "CORS_ORIGIN",
            &get_env_default("CORS_ORIGIN", String::from("http://localhost:3000")),
        )?;
        let public_base_url: Url = parsed("PUBLIC_BASE_URL", &required("PUBLIC_BASE_URL")?)?;

        let invoice = InvoiceSettings {
            number_prefix: get_env_default("INVOICE_PREFIX", "INV".to_string()),
            tax_rate: TaxRate::from_basis_points(get_env_default("VAT_RATE_BPS", 1500)),
            payment_terms_days: get_env_default("PAYMENT_TERMS_DAYS", 14),
            suspension_grace_days: get_env_default("SUSPENSION_GRACE_DAYS", 14),
            auto_issue: get_env_default("AUTO_ISSUE_INVOICES", true),
        };

        let scheduler = SchedulerSettings {
            invoice_generation: Schedule::DailyAt {
                hour: get_env_default("INVOICE_RUN_HOUR_UTC", 2),
                minute: get_env_default("INVOICE_RUN_MINUTE_UTC", 0),
            },
            payment_reconciliation: Schedule::HourlyAt {
                minute: get_env_default("RECONCILE_RUN_MINUTE", 15),
            },
            overdue_marking: Schedule::Every(Duration::from_secs(get_env_default(
                "OVERDUE_CHECK_INTERVAL_SECS",
                6 * 60 * 60,
            ))),
            idempotency_eviction_interval: Duration::from_secs(get_env_default(
                "IDEMPOTENCY_SWEEP_INTERVAL_SECS",
                600,
            )),
        };

        let job_retry = RetryPolicy {
            max_attempts: get_env_default("JOB_MAX_ATTEMPTS", 3),
            initial_backoff: Duration::from_secs(get_env_default("JOB_INITIAL_BACKOFF_SECS", 30)),
            max_backoff: Duration::from_secs(get_env_default("JOB_MAX_BACKOFF_SECS", 600)),
        };

        let wallet = WalletConfig {
            url: parsed("WALLET_API_URL", &required("WALLET_API_URL")?)?,
            api_key: secret("WALLET_API_KEY").ok_or(InfraError::ConfigMissing {
                var: "WALLET_API_KEY",
            })?,
        };

        let notification_url = optional("NOTIFICATION_WEBHOOK_URL")
            .map(|raw| parsed("NOTIFICATION_WEBHOOK_URL", &raw))
            .transpose()?;

        Ok(Self {
            bind_addr,
            database_url,
            database_max_connections,
            redis_url,
            cors_origin,
            public_base_url,
            invoice,
            scheduler,
            job_retry,
            job_lock_ttl: Duration::from_secs(get_env_default("JOB_LOCK_TTL_SECS", 3600)),
            webhook_retention: Duration::from_secs(get_env_default(
                "WEBHOOK_RETENTION_SECS",
                24 * 60 * 60,
            )),
            pending_verify_after: chrono::Duration::minutes(get_env_default(
                "PENDING_VERIFY_AFTER_MINUTES",
                30,
            )),
            wallet,
            notification_url,
            gateways: gateways_from_env(),
        })
    }
}

fn gateways_from_env() -> GatewayCredentials {
    let paystack = secret("PAYSTACK_SECRET_KEY").map(|secret_key| PaystackConfig {
        secret_key,
        base_url: get_env_default("PAYSTACK_BASE_URL", PAYSTACK_API_BASE.to_string()),
    });

    let flutterwave = match (
        secret("FLUTTERWAVE_SECRET_KEY"),
        secret("FLUTTERWAVE_SECRET_HASH"),
    ) {
        (Some(secret_key), Some(secret_hash)) => Some(FlutterwaveConfig {
            secret_key,
            secret_hash,
            base_url: get_env_default("FLUTTERWAVE_BASE_URL", FLUTTERWAVE_API_BASE.to_string()),
        }),
        _ => None,
    };

    let payfast = match (
        optional("PAYFAST_MERCHANT_ID"),
        secret("PAYFAST_MERCHANT_KEY"),
        secret("PAYFAST_PASSPHRASE"),
    ) {
        (Some(merchant_id), Some(merchant_key), Some(passphrase)) => Some(PayfastSettings {
            merchant_id,
            merchant_key,
            passphrase,
            process_url: get_env_default("PAYFAST_PROCESS_URL", PAYFAST_PROCESS_URL.to_string()),
            api_base: get_env_default("PAYFAST_API_BASE", PAYFAST_API_BASE.to_string()),
        }),
        _ => None,
    };

    let ozow = match (
        optional("OZOW_SITE_CODE"),
        secret("OZOW_API_KEY"),
        secret("OZOW_PRIVATE_KEY"),
    ) {
        (Some(site_code), Some(api_key), Some(private_key)) => Some(OzowSettings {
            site_code,
            api_key,
            private_key,
            api_base: get_env_default("OZOW_API_BASE", OZOW_API_BASE.to_string()),
            is_test: get_env_default("OZOW_IS_TEST", false),
        }),
        _ => None,
    };

    GatewayCredentials {
        paystack,
        flutterwave,
        payfast,
        ozow,
    }
}

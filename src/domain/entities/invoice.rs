use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Invoice lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invoice_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    PartiallyPaid,
    Paid,
    Overdue,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Void => "void",
        }
    }

    /// Paid and void invoices never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Void)
    }

    /// Whether a gateway payment may still be applied
    pub fn accepts_payment(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Draft
                | InvoiceStatus::Sent
                | InvoiceStatus::PartiallyPaid
                | InvoiceStatus::Overdue
        )
    }

    /// Whether the due date can push the invoice into `Overdue`
    pub fn can_become_overdue(&self) -> bool {
        matches!(self, InvoiceStatus::Sent | InvoiceStatus::PartiallyPaid)
    }

    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        match (*self, next) {
            (Paid, _) | (Void, _) => false,
            (_, Void) => true,
            (Draft, Sent) => true,
            (_, PartiallyPaid) | (_, Paid) => self.accepts_payment(),
            (Sent, Overdue) | (PartiallyPaid, Overdue) => true,
            _ => false,
        }
    }

    /// Status an invoice settles into once `total_paid_cents` has been collected
    pub fn after_payment(total_paid_cents: i64, total_cents: i64) -> InvoiceStatus {
        if total_paid_cents >= total_cents {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::PartiallyPaid
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "partially_paid" => Ok(InvoiceStatus::PartiallyPaid),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            "void" => Ok(InvoiceStatus::Void),
            _ => Err(format!("Invalid invoice status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "line_item_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LineItemKind {
    Subscription,
    Usage,
    Transaction,
    Overage,
}

impl LineItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineItemKind::Subscription => "subscription",
            LineItemKind::Usage => "usage",
            LineItemKind::Transaction => "transaction",
            LineItemKind::Overage => "overage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceLineItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub kind: LineItemKind,
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub account_id: Uuid,
    pub subscription_id: Uuid,
    pub currency: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub subscription_fee_cents: i64,
    pub usage_fee_cents: i64,
    pub transaction_fee_cents: i64,
    pub overage_fee_cents: i64,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub amount_paid_cents: i64,
    pub status: InvoiceStatus,
    pub due_date: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub overdue_at: Option<DateTime<Utc>>,
    pub voided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn balance_due_cents(&self) -> i64 {
        (self.total_cents - self.amount_paid_cents).max(0)
    }
}

/// Half-open billing window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BillingPeriod {
    /// The full calendar month `year-month`.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = first.checked_add_months(Months::new(1))?;
        Some(Self {
            start: Utc.from_utc_datetime(&first.and_hms_opt(0, 0, 0)?),
            end: Utc.from_utc_datetime(&next.and_hms_opt(0, 0, 0)?),
        })
    }

    /// The calendar month containing `at`.
    pub fn containing(at: DateTime<Utc>) -> Option<Self> {
        Self::month(at.year(), at.month())
    }

    /// The calendar month before the one containing `at`.
    pub fn previous_month(at: DateTime<Utc>) -> Option<Self> {
        let current = Self::containing(at)?;
        let prev = current.start.date_naive().checked_sub_months(Months::new(1))?;
        Self::month(prev.year(), prev.month())
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// `PREFIX-YYYYMM-NNNNN`
pub fn format_invoice_number(prefix: &str, year: i32, month: u32, sequence: i64) -> String {
    format!("{}-{:04}{:02}-{:05}", prefix, year, month, sequence)
}

const ATTEMPT_SUFFIX_LEN: usize = 8;

/// Gateway reference for one checkout attempt: `INVOICE_NUMBER.xxxxxxxx`.
///
/// Gateways refuse a reused reference, so each attempt gets a fresh suffix.
pub fn attempt_reference(invoice_number: &str, attempt_id: Uuid) -> String {
    let suffix = attempt_id.simple().to_string();
    format!("{}.{}", invoice_number, &suffix[..ATTEMPT_SUFFIX_LEN])
}

/// Invoice number a gateway reference belongs to. Bare invoice numbers pass
/// through unchanged.
pub fn invoice_number_from_reference(reference: &str) -> &str {
    match reference.rsplit_once('.') {
        Some((number, suffix))
            if !number.is_empty()
                && suffix.len() == ATTEMPT_SUFFIX_LEN
                && suffix.chars().all(|c| c.is_ascii_hexdigit()) =>
        {
            number
        }
        _ => reference,
    }
}

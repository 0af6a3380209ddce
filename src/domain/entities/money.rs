use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Every supported currency settles with two decimal places.
pub const MINOR_UNIT_SCALE: u32 = 2;

const BASIS_POINTS_PER_UNIT: i64 = 10_000;

/// Converts an amount in minor units (cents, kobo) to major units.
pub fn minor_to_major(amount_cents: i64) -> Decimal {
    Decimal::new(amount_cents, MINOR_UNIT_SCALE)
}

/// Converts a major-unit amount to minor units, rounding half away from zero.
///
/// Returns `None` when the result does not fit in an `i64`.
pub fn major_to_minor(amount: Decimal) -> Option<i64> {
    let mut scaled =
        amount.round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointAwayFromZero);
    scaled.rescale(MINOR_UNIT_SCALE);
    i64::try_from(scaled.mantissa()).ok()
}

/// Parses a decimal major-unit string such as `"138.00"`.
pub fn parse_major_amount(raw: &str) -> Option<i64> {
    let amount = Decimal::from_str(raw.trim()).ok()?;
    major_to_minor(amount)
}

/// Formats minor units as a fixed two-decimal major-unit string.
pub fn format_major_amount(amount_cents: i64) -> String {
    minor_to_major(amount_cents).to_string()
}

/// Reads a major-unit amount from a JSON number or numeric string.
pub fn major_amount_from_json(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => parse_major_amount(&n.to_string()),
        serde_json::Value::String(s) => parse_major_amount(s),
        _ => None,
    }
}

/// Tax rate expressed in basis points (1500 = 15%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate {
    basis_points: u32,
}

impl TaxRate {
    pub const fn from_basis_points(basis_points: u32) -> Self {
        Self { basis_points }
    }

    pub fn basis_points(&self) -> u32 {
        self.basis_points
    }

    /// Tax owed on `subtotal_cents`, rounded half up to the nearest minor unit.
    pub fn apply(&self, subtotal_cents: i64) -> i64 {
        let numerator = subtotal_cents * i64::from(self.basis_points);
        if numerator >= 0 {
            (numerator + BASIS_POINTS_PER_UNIT / 2) / BASIS_POINTS_PER_UNIT
        } else {
            (numerator - BASIS_POINTS_PER_UNIT / 2) / BASIS_POINTS_PER_UNIT
        }
    }
}

impl Default for TaxRate {
    /// Flat 15% VAT.
    fn default() -> Self {
        Self::from_basis_points(1500)
    }
}

use crate::error::{KioskError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The price of one session, as configured by the operator.
///
/// Wraps `rust_decimal::Decimal` so that a zero or negative price can never reach the
/// payment terminal.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal")]
pub struct ChargeAmount(Decimal);

impl ChargeAmount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(KioskError::ValidationError(
                "Charge amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Expresses the amount in minor units (e.g. cents for `minor_unit = 2`).
    ///
    /// Fails if the amount carries more precision than the currency allows.
    pub fn minor_units(&self, minor_unit: u32) -> Result<i64> {
        let scaled = self.0 * Decimal::from(10_i64.pow(minor_unit));
        if scaled.fract() != Decimal::ZERO {
            return Err(KioskError::ValidationError(format!(
                "{} has more than {} decimal places",
                self.0, minor_unit
            )));
        }
        i64::try_from(scaled.trunc())
            .map_err(|_| KioskError::ValidationError(format!("{} is out of range", self.0)))
    }
}

impl TryFrom<Decimal> for ChargeAmount {
    type Error = KioskError;

    fn try_from(value: Decimal) -> std::result::Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChargeAmount> for Decimal {
    fn from(amount: ChargeAmount) -> Self {
        amount.0
    }
}

/// Transaction status as reported by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Successful,
    Failed,
    Cancelled,
    Other(String),
}

impl TransactionStatus {
    /// `SUCCESSFUL` and `FAILED` end polling; anything else keeps it going.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Successful | TransactionStatus::Failed)
    }
}

impl From<&str> for TransactionStatus {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => TransactionStatus::Pending,
            "SUCCESSFUL" => TransactionStatus::Successful,
            "FAILED" => TransactionStatus::Failed,
            "CANCELLED" => TransactionStatus::Cancelled,
            other => TransactionStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => f.write_str("PENDING"),
            TransactionStatus::Successful => f.write_str("SUCCESSFUL"),
            TransactionStatus::Failed => f.write_str("FAILED"),
            TransactionStatus::Cancelled => f.write_str("CANCELLED"),
            TransactionStatus::Other(raw) => f.write_str(raw),
        }
    }
}

/// One answer from the provider's status endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: TransactionStatus,
    /// The provider's short transaction code, when it already assigned one.
    pub label: Option<String>,
}

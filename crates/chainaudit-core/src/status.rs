//! Operation-status classification.
//!
//! Networks report operation outcomes as free-form status strings. The
//! driver configures a [`StatusRegistry`] from network metadata at startup;
//! the coin index consults it through the [`StatusClassifier`] seam so the
//! table's origin stays outside the storage core.

use std::collections::HashMap;

use crate::error::StatusError;
use crate::types::{Amount, Operation};

/// Classifies operation outcomes and validates reported amounts.
///
/// Implementations must be pure: the same operation always classifies the
/// same way for the lifetime of the process.
pub trait StatusClassifier: Send + Sync {
    /// Whether the operation's status maps to a successful outcome.
    ///
    /// An unrecognized status is an error, not a failure outcome: it means
    /// the network reported something the configured table never declared.
    fn operation_successful(&self, operation: &Operation) -> Result<bool, StatusError>;

    /// Validate that an amount is well-formed (integer-string value,
    /// non-empty currency symbol).
    fn validate_amount(&self, amount: &Amount) -> Result<(), StatusError> {
        if amount.value.is_empty() || amount.value.parse::<i128>().is_err() {
            return Err(StatusError::InvalidAmount(format!(
                "value {:?} is not a base-10 integer",
                amount.value
            )));
        }
        if amount.currency.symbol.is_empty() {
            return Err(StatusError::InvalidAmount(
                "currency symbol is empty".into(),
            ));
        }
        Ok(())
    }
}

/// Table-driven [`StatusClassifier`]: status string → successful flag.
#[derive(Debug, Clone, Default)]
pub struct StatusRegistry {
    statuses: HashMap<String, bool>,
}

impl StatusRegistry {
    /// Build a registry from `(status, successful)` pairs.
    pub fn new(entries: impl IntoIterator<Item = (String, bool)>) -> Self {
        Self {
            statuses: entries.into_iter().collect(),
        }
    }

    /// Look up a raw status string.
    pub fn successful(&self, status: &str) -> Result<bool, StatusError> {
        self.statuses
            .get(status)
            .copied()
            .ok_or_else(|| StatusError::UnknownStatus(status.to_string()))
    }
}

impl StatusClassifier for StatusRegistry {
    fn operation_successful(&self, operation: &Operation) -> Result<bool, StatusError> {
        self.successful(&operation.status)
    }
}

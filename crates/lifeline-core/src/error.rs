//! Error taxonomy shared by the classifier, alert manager and auth gate.

use thiserror::Error;

use crate::models::AlertState;

pub type Result<T> = std::result::Result<T, FleetError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FleetError {
    /// Malformed input to a classifier (negative stock, score out of range, ...).
    #[error("invalid metric `{field}`: {reason}")]
    InvalidMetric { field: &'static str, reason: String },

    /// Credential check failed. Deliberately carries no detail.
    #[error("authentication failed")]
    AuthFailure,

    #[error("invalid password hash: {0}")]
    InvalidHash(String),

    /// Another scan already holds the single-writer guard.
    #[error("a scan is already in progress")]
    ScanConflict,

    #[error("alert {0} not found")]
    AlertNotFound(String),

    #[error("alert {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: String,
        from: AlertState,
        to: AlertState,
    },
}

impl FleetError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidMetric {
            field,
            reason: reason.into(),
        }
    }
}

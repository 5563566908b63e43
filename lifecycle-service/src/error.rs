//! Error taxonomy for lifecycle-service.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{InvoiceStatus, UserRole};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Invoice not found")]
    NotFound,

    #[error("Invoice belongs to a different company")]
    AccessDenied,

    #[error("Invalid transition from {from} to {to}; allowed: {}", format_statuses(.allowed))]
    InvalidTransition {
        from: InvoiceStatus,
        to: InvoiceStatus,
        allowed: Vec<InvoiceStatus>,
    },

    #[error("Insufficient payment: {paid} paid of {due} due")]
    InsufficientPayment { paid: Decimal, due: Decimal },

    #[error("A reason is required for transition to {status}")]
    ReasonRequired { status: InvoiceStatus },

    #[error("Role {role} may not set this status without force_override and a reason")]
    InsufficientRole { role: UserRole },

    #[error("Invoice is written off; no further status changes are possible")]
    TerminalState,

    #[error("Overpayment rejected: {0}")]
    OverpaymentRejected(String),

    #[error("Invalid payment: {0}")]
    InvalidPayment(String),

    #[error("Payment currency {payment} does not match invoice currency {invoice}")]
    CurrencyMismatch { payment: String, invoice: String },

    #[error("Operation timed out")]
    Timeout,

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[source] anyhow::Error),

    #[error("Audit write failure: {0}")]
    AuditWriteFailure(#[source] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(#[source] anyhow::Error),
}

impl LifecycleError {
    /// Stable label for the error counter.
    pub fn metric_label(&self) -> &'static str {
        match self {
            LifecycleError::NotFound => "not_found",
            LifecycleError::AccessDenied => "access_denied",
            LifecycleError::InvalidTransition { .. } => "invalid_transition",
            LifecycleError::InsufficientPayment { .. } => "insufficient_payment",
            LifecycleError::ReasonRequired { .. } => "reason_required",
            LifecycleError::InsufficientRole { .. } => "insufficient_role",
            LifecycleError::TerminalState => "terminal_state",
            LifecycleError::OverpaymentRejected(_) => "overpayment_rejected",
            LifecycleError::InvalidPayment(_) => "invalid_payment",
            LifecycleError::CurrencyMismatch { .. } => "currency_mismatch",
            LifecycleError::Timeout => "timeout",
            LifecycleError::PersistenceFailure(_) => "persistence_failure",
            LifecycleError::AuditWriteFailure(_) => "audit_write_failure",
            LifecycleError::ConfigError(_) => "config_error",
        }
    }

    /// Whether the caller can recover by retrying with different input.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            LifecycleError::PersistenceFailure(_)
                | LifecycleError::AuditWriteFailure(_)
                | LifecycleError::ConfigError(_)
                | LifecycleError::Timeout
        )
    }
}

impl From<config::ConfigError> for LifecycleError {
    fn from(err: config::ConfigError) -> Self {
        LifecycleError::ConfigError(anyhow::Error::new(err))
    }
}

fn format_statuses(statuses: &[InvoiceStatus]) -> String {
    if statuses.is_empty() {
        return "none".to_string();
    }
    statuses
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_recoverable_infrastructure_errors_are_not() {
        let err = LifecycleError::InvalidTransition {
            from: InvoiceStatus::Draft,
            to: InvoiceStatus::Paid,
            allowed: vec![InvoiceStatus::Sent],
        };
        assert!(err.is_recoverable());
        assert_eq!(err.metric_label(), "invalid_transition");
        assert_eq!(
            err.to_string(),
            "Invalid transition from draft to paid; allowed: sent"
        );

        let err = LifecycleError::PersistenceFailure(anyhow::anyhow!("connection reset"));
        assert!(!err.is_recoverable());
        assert_eq!(err.metric_label(), "persistence_failure");
    }

    #[test]
    fn empty_allowed_set_reads_as_none() {
        let err = LifecycleError::InvalidTransition {
            from: InvoiceStatus::WrittenOff,
            to: InvoiceStatus::Sent,
            allowed: vec![],
        };
        assert_eq!(
            err.to_string(),
            "Invalid transition from written_off to sent; allowed: none"
        );
    }
}

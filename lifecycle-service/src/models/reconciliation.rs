//! Derived reconciliation figures. Never persisted as its own entity.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::InvoiceStatus;

/// Payment completeness classification, in priority order
/// OVERPAID > FULLY_PAID > PARTIALLY_PAID > UNPAID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    PartiallyPaid,
    FullyPaid,
    Overpaid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::PartiallyPaid => "partially_paid",
            PaymentStatus::FullyPaid => "fully_paid",
            PaymentStatus::Overpaid => "overpaid",
        }
    }
}

/// Result of reconciling an invoice against its payment history, with an
/// optional candidate new payment folded in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub invoice_total: Decimal,
    pub previously_paid: Decimal,
    pub new_payment_amount: Decimal,
    pub total_paid: Decimal,
    /// `max(0, invoice_total - total_paid)`; never negative.
    pub remaining_amount: Decimal,
    /// `max(0, total_paid - invoice_total)`; never negative.
    pub overpayment_amount: Decimal,
    pub is_fully_paid: bool,
    pub is_overpaid: bool,
    pub payment_status: PaymentStatus,
    pub suggested_invoice_status: InvoiceStatus,
}

impl ReconciliationResult {
    /// The invoice is settled: nothing remains outstanding.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.payment_status,
            PaymentStatus::FullyPaid | PaymentStatus::Overpaid
        )
    }
}

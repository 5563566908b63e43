//! Reconciliation calculator.
//!
//! Pure derivation of payment-completeness facts from an invoice and its
//! payment history. Safe to call speculatively; nothing here writes.

use rust_decimal::Decimal;

use crate::models::{Invoice, InvoiceStatus, Payment, PaymentStatus, ReconciliationResult};

/// Rounding slack allowed when comparing a paid amount to an invoice total.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Fraction of the invoice total, e.g. 0.01 for 1%.
    pub relative: Decimal,
    /// Floor in minor currency units, e.g. 0.01.
    pub minimum: Decimal,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            relative: Decimal::new(1, 2),
            minimum: Decimal::new(1, 2),
        }
    }
}

impl Tolerance {
    /// Absolute slack for a given invoice total.
    pub fn slack_for(&self, total: Decimal) -> Decimal {
        (total * self.relative).max(self.minimum)
    }
}

/// Derive reconciliation figures for an invoice, optionally folding in a
/// candidate new payment amount (e.g. to preview a payment or refund).
pub fn reconcile(
    invoice: &Invoice,
    payments: &[Payment],
    new_payment_amount: Option<Decimal>,
    tolerance: Tolerance,
) -> ReconciliationResult {
    let invoice_total = invoice.total_amount;
    let previously_paid: Decimal = payments.iter().map(|p| p.amount).sum();
    let new_payment_amount = new_payment_amount.unwrap_or(Decimal::ZERO);
    let total_paid = previously_paid + new_payment_amount;

    let remaining_amount = (invoice_total - total_paid).max(Decimal::ZERO);
    let overpayment_amount = (total_paid - invoice_total).max(Decimal::ZERO);

    let slack = tolerance.slack_for(invoice_total);
    let payment_status = if total_paid > invoice_total + slack {
        PaymentStatus::Overpaid
    } else if total_paid >= invoice_total - slack {
        PaymentStatus::FullyPaid
    } else if total_paid > Decimal::ZERO {
        PaymentStatus::PartiallyPaid
    } else {
        PaymentStatus::Unpaid
    };

    let suggested_invoice_status = match payment_status {
        PaymentStatus::Overpaid | PaymentStatus::FullyPaid => InvoiceStatus::Paid,
        PaymentStatus::PartiallyPaid => invoice.status(),
        PaymentStatus::Unpaid => InvoiceStatus::Sent,
    };

    ReconciliationResult {
        invoice_total,
        previously_paid,
        new_payment_amount,
        total_paid,
        remaining_amount,
        overpayment_amount,
        is_fully_paid: payment_status == PaymentStatus::FullyPaid,
        is_overpaid: payment_status == PaymentStatus::Overpaid,
        payment_status,
        suggested_invoice_status,
    }
}

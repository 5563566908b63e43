//! Status corrector.
//!
//! Applied only after validation has accepted a transition: resolves drift
//! between the requested status and what payment and due-date facts support
//! at commit time, so the persisted status is always consistent with the
//! totals the transaction saw.

use chrono::{DateTime, Utc};

use crate::models::{Invoice, InvoiceStatus, ReconciliationResult};
use crate::services::reconciliation::Tolerance;

/// The status actually persisted, with the correction made explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveStatus {
    pub status: InvoiceStatus,
    /// False when correction leaves the invoice in its current status.
    pub changed: bool,
    /// True when a PAID request was reverted because payment totals no
    /// longer supported it.
    pub reverted: bool,
}

/// Resolve the effective status for a validated request.
pub fn determine_effective_status(
    invoice: &Invoice,
    requested: InvoiceStatus,
    reconciliation: &ReconciliationResult,
    tolerance: Tolerance,
    now: DateTime<Utc>,
) -> EffectiveStatus {
    let current = invoice.status();

    // A sent invoice past its due date goes overdue regardless of the
    // request, unless the request closes it out.
    if current == InvoiceStatus::Sent
        && invoice.is_past_due(now)
        && !matches!(
            requested,
            InvoiceStatus::Paid | InvoiceStatus::WrittenOff | InvoiceStatus::Disputed
        )
    {
        return EffectiveStatus {
            status: InvoiceStatus::Overdue,
            changed: true,
            reverted: false,
        };
    }

    // Payment facts may have shifted since the caller decided to request
    // PAID; recheck sufficiency and silently keep the current status if it
    // no longer holds.
    if requested == InvoiceStatus::Paid {
        let slack = tolerance.slack_for(invoice.total_amount);
        if reconciliation.total_paid < invoice.total_amount - slack {
            return EffectiveStatus {
                status: current,
                changed: false,
                reverted: true,
            };
        }
    }

    EffectiveStatus {
        status: requested,
        changed: requested != current,
        reverted: false,
    }
}

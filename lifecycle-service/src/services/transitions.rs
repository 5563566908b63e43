//! Transition rule table and status validator.

use std::collections::HashMap;

use crate::error::LifecycleError;
use crate::models::{
    Invoice, InvoiceStatus, ReconciliationResult, RequestContext, StatusUpdateOptions,
};
use crate::services::audit::FLAG_REQUIRES_ADMIN_APPROVAL;
use crate::services::reconciliation::Tolerance;

/// Immutable directed graph of legal status transitions. Injected into the
/// validator; there is no process-wide singleton.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    edges: HashMap<InvoiceStatus, Vec<InvoiceStatus>>,
}

impl Default for TransitionTable {
    fn default() -> Self {
        use InvoiceStatus::*;
        let mut edges = HashMap::new();
        edges.insert(Draft, vec![Sent, WrittenOff]);
        edges.insert(Sent, vec![Paid, Overdue, Disputed, WrittenOff]);
        edges.insert(Overdue, vec![Paid, Disputed, WrittenOff]);
        edges.insert(Paid, vec![Disputed]);
        edges.insert(Disputed, vec![Paid, Overdue, Sent, WrittenOff]);
        // Terminal: no outgoing edges, ever.
        edges.insert(WrittenOff, vec![]);
        Self { edges }
    }
}

impl TransitionTable {
    /// Build a table from an explicit edge set; statuses absent from the
    /// map have no outgoing transitions.
    pub fn new(edges: HashMap<InvoiceStatus, Vec<InvoiceStatus>>) -> Self {
        Self { edges }
    }

    pub fn allowed_from(&self, status: InvoiceStatus) -> &[InvoiceStatus] {
        self.edges.get(&status).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_allowed(&self, from: InvoiceStatus, to: InvoiceStatus) -> bool {
        self.allowed_from(from).contains(&to)
    }
}

/// Approval token returned by a successful validation.
#[derive(Debug, Clone)]
pub struct TransitionApproval {
    /// Human-readable compliance note suitable for display.
    pub compliance_note: String,
    /// Machine-readable flags to fold into the audit entry metadata.
    pub compliance_flags: Vec<String>,
}

impl TransitionApproval {
    /// Approval for a requested status equal to the current one; nothing to
    /// validate, correction alone decides the effective status.
    pub fn unchanged(status: InvoiceStatus) -> Self {
        Self {
            compliance_note: format!("No transition requested; status remains {status}"),
            compliance_flags: Vec::new(),
        }
    }
}

/// Validate a requested transition against the rule table, payment facts,
/// and caller role. Pure; correction happens afterwards.
pub fn validate_transition(
    table: &TransitionTable,
    invoice: &Invoice,
    requested: InvoiceStatus,
    reconciliation: &ReconciliationResult,
    ctx: &RequestContext,
    opts: &StatusUpdateOptions,
    tolerance: Tolerance,
) -> Result<TransitionApproval, LifecycleError> {
    let current = invoice.status();

    // Defense in depth beyond the table's empty edge set.
    if current.is_terminal() {
        return Err(LifecycleError::TerminalState);
    }

    if !table.is_allowed(current, requested) {
        return Err(LifecycleError::InvalidTransition {
            from: current,
            to: requested,
            allowed: table.allowed_from(current).to_vec(),
        });
    }

    if requested == InvoiceStatus::Paid {
        let slack = tolerance.slack_for(invoice.total_amount);
        if reconciliation.total_paid < invoice.total_amount - slack {
            return Err(LifecycleError::InsufficientPayment {
                paid: reconciliation.total_paid,
                due: invoice.total_amount,
            });
        }
    }

    let reason = opts.trimmed_reason();
    let gated = matches!(requested, InvoiceStatus::Disputed | InvoiceStatus::WrittenOff);
    if gated && reason.is_none() {
        return Err(LifecycleError::ReasonRequired { status: requested });
    }

    let mut compliance_flags = Vec::new();
    let mut compliance_note = format!(
        "Transition {current} -> {requested} approved for {} {}",
        ctx.user_role, ctx.user_id
    );
    if gated && !ctx.user_role.is_privileged() {
        if opts.force_override && reason.is_some() {
            compliance_flags.push(FLAG_REQUIRES_ADMIN_APPROVAL.to_string());
            compliance_note.push_str(" (forced override, pending admin approval)");
        } else {
            return Err(LifecycleError::InsufficientRole {
                role: ctx.user_role,
            });
        }
    }

    Ok(TransitionApproval {
        compliance_note,
        compliance_flags,
    })
}

//! Audit recorder.
//!
//! Builds the immutable entry persisted alongside every effective status
//! mutation. The business-context snapshot is computed fresh at record
//! time, from the same invoice and payments the transaction locked.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::models::{
    AuditEntry, AuditMetadata, BusinessContext, Invoice, InvoiceStatus, Payment,
    ReconciliationResult, RequestContext, StatusUpdateOptions,
};

pub const FLAG_OVERDUE_STATUS: &str = "OVERDUE_STATUS";
pub const FLAG_TRN_COMPLIANT: &str = "TRN_COMPLIANT";
pub const FLAG_TAX_DEDUCTION_ELIGIBLE: &str = "TAX_DEDUCTION_ELIGIBLE";
pub const FLAG_REQUIRES_ADMIN_APPROVAL: &str = "REQUIRES_ADMIN_APPROVAL";

/// Tax registration numbers are 15-digit identifiers.
const TRN_LENGTH: usize = 15;

fn trn_is_well_formed(trn: &str) -> bool {
    trn.len() == TRN_LENGTH && trn.bytes().all(|b| b.is_ascii_digit())
}

fn business_context(
    invoice: &Invoice,
    payments: &[Payment],
    reconciliation: &ReconciliationResult,
    now: DateTime<Utc>,
) -> BusinessContext {
    let is_overdue = invoice.due_date < now && reconciliation.remaining_amount > Decimal::ZERO;
    BusinessContext {
        is_overdue,
        days_past_due: invoice.days_past_due(now),
        // Rows, not sums: a fully refunded invoice still has payments.
        has_payments: !payments.is_empty() || !reconciliation.new_payment_amount.is_zero(),
        total_paid: reconciliation.total_paid,
        remaining_amount: reconciliation.remaining_amount,
        due_date: invoice.due_date,
    }
}

fn compliance_flags(
    invoice: &Invoice,
    new_status: InvoiceStatus,
    context: &BusinessContext,
    extra_flags: &[String],
) -> Vec<String> {
    let mut flags = Vec::new();
    if context.is_overdue {
        flags.push(FLAG_OVERDUE_STATUS.to_string());
    }
    if invoice
        .tax_registration_number
        .as_deref()
        .is_some_and(trn_is_well_formed)
    {
        flags.push(FLAG_TRN_COMPLIANT.to_string());
    }
    if new_status == InvoiceStatus::WrittenOff {
        flags.push(FLAG_TAX_DEDUCTION_ELIGIBLE.to_string());
    }
    for flag in extra_flags {
        if !flags.contains(flag) {
            flags.push(flag.clone());
        }
    }
    flags
}

/// Build the audit entry for an effective mutation. `extra_flags` carries
/// validator-produced flags such as the forced-override marker.
#[allow(clippy::too_many_arguments)]
pub fn build_audit_entry(
    invoice: &Invoice,
    payments: &[Payment],
    old_status: InvoiceStatus,
    new_status: InvoiceStatus,
    reason: &str,
    reconciliation: &ReconciliationResult,
    ctx: &RequestContext,
    opts: &StatusUpdateOptions,
    extra_flags: &[String],
    now: DateTime<Utc>,
) -> AuditEntry {
    let context = business_context(invoice, payments, reconciliation, now);
    let flags = compliance_flags(invoice, new_status, &context, extra_flags);
    let metadata = AuditMetadata {
        automated_change: opts.automated,
        batch_operation: opts.batch,
        compliance_flags: flags,
    };

    AuditEntry {
        audit_id: Uuid::new_v4(),
        invoice_id: invoice.invoice_id,
        invoice_number: invoice.invoice_number.clone(),
        company_id: invoice.company_id,
        user_id: ctx.user_id,
        user_role: ctx.user_role.as_str().to_string(),
        old_status: old_status.as_str().to_string(),
        new_status: new_status.as_str().to_string(),
        reason: reason.to_string(),
        business_context: serde_json::to_value(&context).unwrap_or_else(|_| json!({})),
        metadata: serde_json::to_value(&metadata).unwrap_or_else(|_| json!({})),
        created_utc: now,
    }
}

/// Best-effort fallback when the primary audit write fails: the entry is
/// serialized into the structured log stream so the change context is not
/// lost, and the original error still propagates to the caller.
pub fn record_fallback(entry: &AuditEntry, cause: &anyhow::Error) {
    let serialized = serde_json::to_string(entry)
        .unwrap_or_else(|_| format!("audit_id={} (unserializable)", entry.audit_id));
    error!(
        invoice_id = %entry.invoice_id,
        audit_id = %entry.audit_id,
        fallback_entry = %serialized,
        error = %cause,
        "Primary audit write failed; fallback record emitted"
    );
}

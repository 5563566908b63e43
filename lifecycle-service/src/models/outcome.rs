//! Structured operation results returned to callers.

use rust_decimal::Decimal;
use uuid::Uuid;

use super::{AuditEntry, InvoiceStatus, Payment, ReconciliationResult};

/// Result of a single status update.
#[derive(Debug, Clone)]
pub struct StatusUpdateOutcome {
    pub invoice_id: Uuid,
    pub old_status: InvoiceStatus,
    pub new_status: InvoiceStatus,
    /// False for no-ops and for PAID requests reverted by the corrector.
    pub changed: bool,
    /// True when a validated PAID request was reverted because payment
    /// totals no longer supported it at commit time.
    pub reverted: bool,
    pub reason: String,
    pub reconciliation: ReconciliationResult,
    /// Present iff the status actually changed.
    pub audit_entry: Option<AuditEntry>,
}

/// Result of recording a payment.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub payment: Payment,
    pub reconciliation: ReconciliationResult,
    /// The chained PAID update, when the payment settled the invoice and
    /// automatic status sync was requested.
    pub status_update: Option<StatusUpdateOutcome>,
}

/// Result of an overpayment refund.
#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub refund: Payment,
    pub reconciliation: ReconciliationResult,
    pub audit_entry: AuditEntry,
}

/// Per-invoice result inside a batch.
#[derive(Debug, Clone)]
pub enum BatchItemResult {
    Updated(StatusUpdateOutcome),
    /// Already in the target status (or correction produced no change).
    Skipped { status: InvoiceStatus },
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct BatchItem {
    pub invoice_id: Uuid,
    pub result: BatchItemResult,
}

/// Aggregate batch result. One item per input invoice; a failure never
/// aborts the rest of the batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub items: Vec<BatchItem>,
    pub success_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    /// Sum of invoice totals across evaluated invoices.
    pub total_amount: Decimal,
    /// Sum of remaining balances across evaluated invoices.
    pub total_outstanding: Decimal,
    pub dry_run: bool,
}

impl BatchOutcome {
    pub fn empty(dry_run: bool) -> Self {
        Self {
            items: Vec::new(),
            success_count: 0,
            failed_count: 0,
            skipped_count: 0,
            total_amount: Decimal::ZERO,
            total_outstanding: Decimal::ZERO,
            dry_run,
        }
    }

    pub fn push(&mut self, invoice_id: Uuid, result: BatchItemResult) {
        match &result {
            BatchItemResult::Updated(_) => self.success_count += 1,
            BatchItemResult::Skipped { .. } => self.skipped_count += 1,
            BatchItemResult::Failed { .. } => self.failed_count += 1,
        }
        self.items.push(BatchItem { invoice_id, result });
    }
}

/// Options for bulk status updates.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub reason: Option<String>,
    pub force_override: bool,
    /// Evaluate every invoice and report would-be outcomes without writing.
    pub dry_run: bool,
}

/// Options for overdue detection.
#[derive(Debug, Clone, Default)]
pub struct OverdueConfig {
    /// Days past the due date before an invoice is marked overdue.
    pub grace_days: i64,
    pub dry_run: bool,
}

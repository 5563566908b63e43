//! Persistence boundary.
//!
//! The lifecycle service prepares a single [`InvoiceMutation`] per
//! operation; a store transaction applies it all-or-nothing, so a reader
//! can never observe a status change without its audit entry or vice
//! versa. Loading an invoice inside the transaction takes a row lock, so
//! two writers on the same invoice serialize.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::models::{AuditEntry, Invoice, InvoiceStatus, NotificationRequest, Payment};

/// An invoice together with its full payment history, in insertion order.
#[derive(Debug, Clone)]
pub struct InvoiceRecord {
    pub invoice: Invoice,
    pub payments: Vec<Payment>,
}

/// Everything one lifecycle operation writes, committed atomically.
#[derive(Debug, Clone)]
pub struct InvoiceMutation {
    pub invoice_id: Uuid,
    pub set_status: Option<InvoiceStatus>,
    pub insert_payment: Option<Payment>,
    pub audit_entry: Option<AuditEntry>,
    pub notification: Option<NotificationRequest>,
}

impl InvoiceMutation {
    pub fn for_invoice(invoice_id: Uuid) -> Self {
        Self {
            invoice_id,
            set_status: None,
            insert_payment: None,
            audit_entry: None,
            notification: None,
        }
    }

}

/// One transactional unit of work. Dropping the transaction without
/// committing rolls everything back.
#[async_trait]
pub trait StoreTx: Send {
    /// Load an invoice and its payments, locking the invoice row for the
    /// remainder of the transaction. `None` when the id is unknown.
    async fn load_invoice(
        &mut self,
        invoice_id: Uuid,
    ) -> Result<Option<InvoiceRecord>, LifecycleError>;

    /// Apply the mutation and commit. An audit-row failure is reported as
    /// `AuditWriteFailure`; any other failure as `PersistenceFailure`.
    async fn commit(self: Box<Self>, mutation: InvoiceMutation) -> Result<(), LifecycleError>;
}

#[async_trait]
pub trait LifecycleStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, LifecycleError>;

    /// Invoices in SENT status whose due date lapsed on or before `as_of`.
    async fn list_overdue_candidates(
        &self,
        company_id: Uuid,
        as_of: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Uuid>, LifecycleError>;

    /// Audit trail for one invoice, oldest first.
    async fn list_audit_entries(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<AuditEntry>, LifecycleError>;
}

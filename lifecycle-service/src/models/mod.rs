//! Domain models for lifecycle-service.

mod audit;
mod context;
mod invoice;
mod outcome;
mod payment;
mod reconciliation;

pub use audit::{AuditEntry, AuditMetadata, BusinessContext, NotificationRequest};
pub use context::{RequestContext, StatusUpdateOptions, UserRole};
pub use invoice::{Invoice, InvoiceStatus};
pub use outcome::{
    BatchItem, BatchItemResult, BatchOptions, BatchOutcome, OverdueConfig, PaymentOutcome,
    RefundOutcome, StatusUpdateOutcome,
};
pub use payment::{NewPayment, Payment, PaymentMethod, PaymentRules};
pub use reconciliation::{PaymentStatus, ReconciliationResult};

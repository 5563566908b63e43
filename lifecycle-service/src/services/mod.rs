//! Services module for lifecycle-service.

pub mod audit;
pub mod corrector;
pub mod database;
pub mod lifecycle;
pub mod memory;
pub mod metrics;
pub mod reconciliation;
pub mod store;
pub mod transitions;

pub use database::PgLifecycleStore;
pub use lifecycle::LifecycleService;
pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use reconciliation::{reconcile, Tolerance};
pub use store::{InvoiceMutation, InvoiceRecord, LifecycleStore, StoreTx};
pub use transitions::{TransitionApproval, TransitionTable};

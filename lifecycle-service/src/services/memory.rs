//! In-memory store.
//!
//! Backs integration tests and local experimentation with the same
//! all-or-nothing commit semantics as the Postgres store: a mutation is
//! applied under one lock, entirely or not at all.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::models::{AuditEntry, Invoice, InvoiceStatus, NotificationRequest, Payment};
use crate::services::store::{InvoiceMutation, InvoiceRecord, LifecycleStore, StoreTx};

#[derive(Debug, Default)]
struct State {
    invoices: HashMap<Uuid, Invoice>,
    payments: HashMap<Uuid, Vec<Payment>>,
    audit_log: HashMap<Uuid, Vec<AuditEntry>>,
    outbox: Vec<NotificationRequest>,
    /// Per-invoice commit counter backing the compare-and-swap check in
    /// [`MemoryTx::commit`].
    versions: HashMap<Uuid, u64>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_invoice(&self, invoice: Invoice) {
        let mut state = self.lock();
        state.payments.entry(invoice.invoice_id).or_default();
        state.invoices.insert(invoice.invoice_id, invoice);
    }

    pub fn insert_payment(&self, payment: Payment) {
        self.lock()
            .payments
            .entry(payment.invoice_id)
            .or_default()
            .push(payment);
    }

    pub fn invoice(&self, invoice_id: Uuid) -> Option<Invoice> {
        self.lock().invoices.get(&invoice_id).cloned()
    }

    pub fn payments(&self, invoice_id: Uuid) -> Vec<Payment> {
        self.lock()
            .payments
            .get(&invoice_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn audit_entries(&self, invoice_id: Uuid) -> Vec<AuditEntry> {
        self.lock()
            .audit_log
            .get(&invoice_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn outbox(&self) -> Vec<NotificationRequest> {
        self.lock().outbox.clone()
    }
}

pub struct MemoryTx {
    state: Arc<Mutex<State>>,
    /// Version of the invoice at load time; the invoice must still be at
    /// this version when the transaction commits.
    loaded: Option<(Uuid, u64)>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn load_invoice(
        &mut self,
        invoice_id: Uuid,
    ) -> Result<Option<InvoiceRecord>, LifecycleError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let record = state.invoices.get(&invoice_id).map(|invoice| InvoiceRecord {
            invoice: invoice.clone(),
            payments: state
                .payments
                .get(&invoice_id)
                .cloned()
                .unwrap_or_default(),
        });
        if record.is_some() {
            let version = state.versions.get(&invoice_id).copied().unwrap_or(0);
            self.loaded = Some((invoice_id, version));
        }
        Ok(record)
    }

    async fn commit(self: Box<Self>, mutation: InvoiceMutation) -> Result<(), LifecycleError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if !state.invoices.contains_key(&mutation.invoice_id) {
            return Err(LifecycleError::PersistenceFailure(anyhow::anyhow!(
                "invoice {} disappeared before commit",
                mutation.invoice_id
            )));
        }

        // The Postgres store holds a row lock from load to commit; here the
        // lock is released in between, so stale facts are caught by a
        // compare-and-swap on the per-invoice version instead.
        if let Some((invoice_id, loaded_version)) = self.loaded {
            if invoice_id == mutation.invoice_id {
                let current = state.versions.get(&invoice_id).copied().unwrap_or(0);
                if current != loaded_version {
                    return Err(LifecycleError::PersistenceFailure(anyhow::anyhow!(
                        "invoice {} was modified by a concurrent transaction",
                        invoice_id
                    )));
                }
            }
        }
        *state.versions.entry(mutation.invoice_id).or_insert(0) += 1;

        if let Some(status) = mutation.set_status {
            if let Some(invoice) = state.invoices.get_mut(&mutation.invoice_id) {
                invoice.status = status.as_str().to_string();
                invoice.updated_utc = Utc::now();
            }
        }
        if let Some(payment) = mutation.insert_payment {
            state
                .payments
                .entry(mutation.invoice_id)
                .or_default()
                .push(payment);
        }
        if let Some(entry) = mutation.audit_entry {
            state
                .audit_log
                .entry(mutation.invoice_id)
                .or_default()
                .push(entry);
        }
        if let Some(notification) = mutation.notification {
            state.outbox.push(notification);
        }
        Ok(())
    }
}

#[async_trait]
impl LifecycleStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, LifecycleError> {
        Ok(Box::new(MemoryTx {
            state: Arc::clone(&self.state),
            loaded: None,
        }))
    }

    async fn list_overdue_candidates(
        &self,
        company_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, LifecycleError> {
        let state = self.lock();
        let mut ids: Vec<(DateTime<Utc>, Uuid)> = state
            .invoices
            .values()
            .filter(|inv| {
                inv.company_id == company_id
                    && inv.status() == InvoiceStatus::Sent
                    && inv.due_date < as_of
            })
            .map(|inv| (inv.due_date, inv.invoice_id))
            .collect();
        ids.sort();
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn list_audit_entries(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<AuditEntry>, LifecycleError> {
        Ok(self.audit_entries(invoice_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::InvoiceMutation;
    use chrono::Duration;

    fn invoice(status: InvoiceStatus) -> Invoice {
        let now = Utc::now();
        Invoice {
            invoice_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            invoice_number: "INV-0123".to_string(),
            customer_id: Uuid::new_v4(),
            customer_name: "Harbour Freight".to_string(),
            status: status.as_str().to_string(),
            currency: "AED".to_string(),
            total_amount: "1000.00".parse().expect("decimal literal"),
            due_date: now + Duration::days(14),
            tax_registration_number: None,
            notes: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    fn set_status(invoice_id: Uuid, status: InvoiceStatus) -> InvoiceMutation {
        let mut mutation = InvoiceMutation::for_invoice(invoice_id);
        mutation.set_status = Some(status);
        mutation
    }

    #[tokio::test]
    async fn stale_commit_is_rejected_after_a_concurrent_write() {
        let store = InMemoryStore::new();
        let inv = invoice(InvoiceStatus::Sent);
        let invoice_id = inv.invoice_id;
        store.insert_invoice(inv);

        // Both transactions load the same SENT invoice.
        let mut first = store.begin().await.expect("begin");
        first.load_invoice(invoice_id).await.expect("load");
        let mut second = store.begin().await.expect("begin");
        second.load_invoice(invoice_id).await.expect("load");

        // The second writer wins the race and writes the invoice off.
        second
            .commit(set_status(invoice_id, InvoiceStatus::WrittenOff))
            .await
            .expect("first commit should pass");

        // The first transaction now holds stale facts; its commit must fail
        // and the terminal status must stand.
        let err = first
            .commit(set_status(invoice_id, InvoiceStatus::Paid))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::PersistenceFailure(_)));
        assert_eq!(
            store.invoice(invoice_id).unwrap().status(),
            InvoiceStatus::WrittenOff
        );
    }

    #[tokio::test]
    async fn sequential_transactions_commit_cleanly() {
        let store = InMemoryStore::new();
        let inv = invoice(InvoiceStatus::Draft);
        let invoice_id = inv.invoice_id;
        store.insert_invoice(inv);

        let mut tx = store.begin().await.expect("begin");
        tx.load_invoice(invoice_id).await.expect("load");
        tx.commit(set_status(invoice_id, InvoiceStatus::Sent))
            .await
            .expect("commit");

        let mut tx = store.begin().await.expect("begin");
        tx.load_invoice(invoice_id).await.expect("load");
        tx.commit(set_status(invoice_id, InvoiceStatus::Disputed))
            .await
            .expect("commit after a fresh load should pass");

        assert_eq!(
            store.invoice(invoice_id).unwrap().status(),
            InvoiceStatus::Disputed
        );
    }
}

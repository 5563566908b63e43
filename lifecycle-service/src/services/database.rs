//! Postgres store for lifecycle-service.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::models::{AuditEntry, Invoice, Payment};
use crate::services::metrics::STORE_OP_DURATION;
use crate::services::store::{InvoiceMutation, InvoiceRecord, LifecycleStore, StoreTx};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgLifecycleStore {
    pool: PgPool,
}

impl PgLifecycleStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "lifecycle-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, LifecycleError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| {
                LifecycleError::PersistenceFailure(anyhow::anyhow!("Failed to connect: {}", e))
            })?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), LifecycleError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                LifecycleError::PersistenceFailure(anyhow::anyhow!("Health check failed: {}", e))
            })?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), LifecycleError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                LifecycleError::PersistenceFailure(anyhow::anyhow!("Migration failed: {}", e))
            })?;
        info!("Database migrations completed");
        Ok(())
    }
}

pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    /// Locks the invoice row for the rest of the transaction, so a second
    /// writer on the same invoice waits instead of acting on stale totals.
    async fn load_invoice(
        &mut self,
        invoice_id: Uuid,
    ) -> Result<Option<InvoiceRecord>, LifecycleError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["load_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, company_id, invoice_number, customer_id, customer_name,
                status, currency, total_amount, due_date, tax_registration_number, notes,
                created_utc, updated_utc
            FROM invoices
            WHERE invoice_id = $1
            FOR UPDATE
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            LifecycleError::PersistenceFailure(anyhow::anyhow!("Failed to load invoice: {}", e))
        })?;

        let Some(invoice) = invoice else {
            timer.observe_duration();
            return Ok(None);
        };

        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, invoice_id, company_id, amount, currency, method,
                reference, notes, payment_date, is_refund, created_utc
            FROM payments
            WHERE invoice_id = $1
            ORDER BY created_utc, payment_id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| {
            LifecycleError::PersistenceFailure(anyhow::anyhow!("Failed to load payments: {}", e))
        })?;

        timer.observe_duration();

        Ok(Some(InvoiceRecord { invoice, payments }))
    }

    async fn commit(mut self: Box<Self>, mutation: InvoiceMutation) -> Result<(), LifecycleError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["commit_mutation"])
            .start_timer();

        if let Some(status) = mutation.set_status {
            sqlx::query(
                r#"
                UPDATE invoices
                SET status = $2, updated_utc = NOW()
                WHERE invoice_id = $1
                "#,
            )
            .bind(mutation.invoice_id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                LifecycleError::PersistenceFailure(anyhow::anyhow!(
                    "Failed to update status: {}",
                    e
                ))
            })?;
        }

        if let Some(payment) = &mutation.insert_payment {
            sqlx::query(
                r#"
                INSERT INTO payments (
                    payment_id, invoice_id, company_id, amount, currency, method,
                    reference, notes, payment_date, is_refund, created_utc
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(payment.payment_id)
            .bind(payment.invoice_id)
            .bind(payment.company_id)
            .bind(payment.amount)
            .bind(&payment.currency)
            .bind(&payment.method)
            .bind(&payment.reference)
            .bind(&payment.notes)
            .bind(payment.payment_date)
            .bind(payment.is_refund)
            .bind(payment.created_utc)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                LifecycleError::PersistenceFailure(anyhow::anyhow!(
                    "Failed to insert payment: {}",
                    e
                ))
            })?;
        }

        if let Some(entry) = &mutation.audit_entry {
            sqlx::query(
                r#"
                INSERT INTO invoice_audit_log (
                    audit_id, invoice_id, invoice_number, company_id, user_id, user_role,
                    old_status, new_status, reason, business_context, metadata, created_utc
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(entry.audit_id)
            .bind(entry.invoice_id)
            .bind(&entry.invoice_number)
            .bind(entry.company_id)
            .bind(entry.user_id)
            .bind(&entry.user_role)
            .bind(&entry.old_status)
            .bind(&entry.new_status)
            .bind(&entry.reason)
            .bind(&entry.business_context)
            .bind(&entry.metadata)
            .bind(entry.created_utc)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                LifecycleError::AuditWriteFailure(anyhow::anyhow!(
                    "Failed to insert audit entry: {}",
                    e
                ))
            })?;
        }

        if let Some(notification) = &mutation.notification {
            sqlx::query(
                r#"
                INSERT INTO notification_outbox (
                    outbox_id, invoice_id, company_id, old_status, new_status, dispatched, created_utc
                )
                VALUES ($1, $2, $3, $4, $5, FALSE, NOW())
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(notification.invoice_id)
            .bind(notification.company_id)
            .bind(notification.old_status.as_str())
            .bind(notification.new_status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                LifecycleError::PersistenceFailure(anyhow::anyhow!(
                    "Failed to enqueue notification: {}",
                    e
                ))
            })?;
        }

        self.tx.commit().await.map_err(|e| {
            LifecycleError::PersistenceFailure(anyhow::anyhow!("Failed to commit: {}", e))
        })?;

        timer.observe_duration();

        Ok(())
    }
}

#[async_trait]
impl LifecycleStore for PgLifecycleStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, LifecycleError> {
        let tx = self.pool.begin().await.map_err(|e| {
            LifecycleError::PersistenceFailure(anyhow::anyhow!(
                "Failed to begin transaction: {}",
                e
            ))
        })?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn list_overdue_candidates(
        &self,
        company_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, LifecycleError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["list_overdue_candidates"])
            .start_timer();

        let ids: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT invoice_id
            FROM invoices
            WHERE company_id = $1 AND status = 'sent' AND due_date < $2
            ORDER BY due_date, invoice_id
            "#,
        )
        .bind(company_id)
        .bind(as_of)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            LifecycleError::PersistenceFailure(anyhow::anyhow!(
                "Failed to list overdue candidates: {}",
                e
            ))
        })?;

        timer.observe_duration();

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn list_audit_entries(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<AuditEntry>, LifecycleError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["list_audit_entries"])
            .start_timer();

        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT audit_id, invoice_id, invoice_number, company_id, user_id, user_role,
                old_status, new_status, reason, business_context, metadata, created_utc
            FROM invoice_audit_log
            WHERE invoice_id = $1
            ORDER BY created_utc, audit_id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            LifecycleError::PersistenceFailure(anyhow::anyhow!(
                "Failed to list audit entries: {}",
                e
            ))
        })?;

        timer.observe_duration();

        Ok(entries)
    }
}

//! Lifecycle service: owns the transaction boundary for every status
//! update, payment recording, and refund.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::models::{
    AuditEntry, BatchItemResult, BatchOptions, BatchOutcome, InvoiceStatus, NewPayment,
    NotificationRequest, OverdueConfig, Payment, PaymentOutcome, PaymentRules,
    ReconciliationResult, RefundOutcome, RequestContext, StatusUpdateOptions, StatusUpdateOutcome,
};
use crate::services::audit::{build_audit_entry, record_fallback};
use crate::services::corrector::determine_effective_status;
use crate::services::metrics::{ERRORS_TOTAL, PAYMENTS_TOTAL, TRANSITIONS_TOTAL};
use crate::services::reconciliation::{reconcile, Tolerance};
use crate::services::store::{InvoiceMutation, InvoiceRecord, LifecycleStore};
use crate::services::transitions::{validate_transition, TransitionApproval, TransitionTable};

pub struct LifecycleService<S> {
    store: Arc<S>,
    table: TransitionTable,
    tolerance: Tolerance,
    op_timeout: Option<Duration>,
}

impl<S: LifecycleStore> LifecycleService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            table: TransitionTable::default(),
            tolerance: Tolerance::default(),
            op_timeout: None,
        }
    }

    pub fn with_table(mut self, table: TransitionTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.op_timeout = timeout;
        self
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, LifecycleError>>,
    ) -> Result<T, LifecycleError> {
        let result = match self.op_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| LifecycleError::Timeout)
                .and_then(|r| r),
            None => fut.await,
        };
        if let Err(err) = &result {
            ERRORS_TOTAL.with_label_values(&[err.metric_label()]).inc();
        }
        result
    }

    /// Update one invoice's status atomically: validate, correct, persist
    /// the effective status with its audit entry and notification row.
    #[instrument(skip(self, ctx, opts), fields(invoice_id = %invoice_id, requested = %requested))]
    pub async fn update_status(
        &self,
        invoice_id: Uuid,
        requested: InvoiceStatus,
        ctx: &RequestContext,
        opts: &StatusUpdateOptions,
    ) -> Result<StatusUpdateOutcome, LifecycleError> {
        self.bounded(self.apply_status_update(invoice_id, requested, ctx, opts, false))
            .await
    }

    async fn apply_status_update(
        &self,
        invoice_id: Uuid,
        requested: InvoiceStatus,
        ctx: &RequestContext,
        opts: &StatusUpdateOptions,
        dry_run: bool,
    ) -> Result<StatusUpdateOutcome, LifecycleError> {
        let mut tx = self.store.begin().await?;
        let record = tx
            .load_invoice(invoice_id)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        if record.invoice.company_id != ctx.company_id {
            return Err(LifecycleError::AccessDenied);
        }

        let now = Utc::now();
        let current = record.invoice.status();
        let reconciliation = reconcile(&record.invoice, &record.payments, None, self.tolerance);

        let approval = if requested == current {
            TransitionApproval::unchanged(current)
        } else {
            validate_transition(
                &self.table,
                &record.invoice,
                requested,
                &reconciliation,
                ctx,
                opts,
                self.tolerance,
            )?
        };

        let effective =
            determine_effective_status(&record.invoice, requested, &reconciliation, self.tolerance, now);

        if !effective.changed {
            // No-op or silent revert. The transaction is dropped unused; no
            // audit entry exists for a change that did not happen.
            return Ok(StatusUpdateOutcome {
                invoice_id,
                old_status: current,
                new_status: current,
                changed: false,
                reverted: effective.reverted,
                reason: opts.trimmed_reason().unwrap_or_default().to_string(),
                reconciliation,
                audit_entry: None,
            });
        }

        let reason = opts
            .trimmed_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Status changed from {current} to {}", effective.status));
        let entry = build_audit_entry(
            &record.invoice,
            &record.payments,
            current,
            effective.status,
            &reason,
            &reconciliation,
            ctx,
            opts,
            &approval.compliance_flags,
            now,
        );

        if dry_run {
            // Report the would-be outcome without persisting anything; the
            // entry is withheld since it was never written.
            return Ok(StatusUpdateOutcome {
                invoice_id,
                old_status: current,
                new_status: effective.status,
                changed: true,
                reverted: false,
                reason,
                reconciliation,
                audit_entry: None,
            });
        }

        let mutation = InvoiceMutation {
            invoice_id,
            set_status: Some(effective.status),
            insert_payment: None,
            audit_entry: Some(entry.clone()),
            notification: Some(NotificationRequest {
                invoice_id,
                company_id: record.invoice.company_id,
                old_status: current,
                new_status: effective.status,
            }),
        };
        commit_with_fallback(tx, mutation, Some(&entry)).await?;

        TRANSITIONS_TOTAL
            .with_label_values(&[current.as_str(), effective.status.as_str()])
            .inc();
        info!(
            invoice_id = %invoice_id,
            old_status = %current,
            new_status = %effective.status,
            compliance_note = %approval.compliance_note,
            "Invoice status updated"
        );

        Ok(StatusUpdateOutcome {
            invoice_id,
            old_status: current,
            new_status: effective.status,
            changed: true,
            reverted: false,
            reason,
            reconciliation,
            audit_entry: Some(entry),
        })
    }

    /// Record a payment against an invoice, optionally chaining into a
    /// PAID status update in the same transaction when it settles the
    /// invoice.
    #[instrument(skip(self, input, ctx, rules), fields(invoice_id = %invoice_id))]
    pub async fn record_payment(
        &self,
        invoice_id: Uuid,
        input: NewPayment,
        ctx: &RequestContext,
        rules: &PaymentRules,
    ) -> Result<PaymentOutcome, LifecycleError> {
        self.bounded(self.apply_payment(invoice_id, input, ctx, rules))
            .await
    }

    async fn apply_payment(
        &self,
        invoice_id: Uuid,
        input: NewPayment,
        ctx: &RequestContext,
        rules: &PaymentRules,
    ) -> Result<PaymentOutcome, LifecycleError> {
        let mut tx = self.store.begin().await?;
        let record = tx
            .load_invoice(invoice_id)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        let invoice = &record.invoice;
        if invoice.company_id != ctx.company_id {
            return Err(LifecycleError::AccessDenied);
        }

        let now = Utc::now();
        if invoice.status().is_terminal() {
            return Err(LifecycleError::InvalidPayment(
                "cannot record a payment against a written-off invoice".to_string(),
            ));
        }
        if let Some(currency) = &input.currency {
            if currency != &invoice.currency {
                return Err(LifecycleError::CurrencyMismatch {
                    payment: currency.clone(),
                    invoice: invoice.currency.clone(),
                });
            }
        }
        if input.amount <= Decimal::ZERO {
            return Err(LifecycleError::InvalidPayment(
                "payment amount must be positive".to_string(),
            ));
        }
        if input.amount < rules.minimum_amount {
            return Err(LifecycleError::InvalidPayment(format!(
                "payment amount {} is below the minimum {}",
                input.amount, rules.minimum_amount
            )));
        }
        let has_reference = input
            .reference
            .as_deref()
            .map(str::trim)
            .is_some_and(|r| !r.is_empty());
        if rules.requires_reference(input.method) && !has_reference {
            return Err(LifecycleError::InvalidPayment(format!(
                "a reference is required for {} payments",
                input.method
            )));
        }
        if input.payment_date > now && !rules.allow_future_dates {
            return Err(LifecycleError::InvalidPayment(
                "payment date may not be in the future".to_string(),
            ));
        }

        let reconciliation = reconcile(invoice, &record.payments, Some(input.amount), self.tolerance);
        if reconciliation.is_overpaid && !rules.allow_overpayment {
            let allowed_over =
                invoice.total_amount * rules.overpayment_tolerance_percent / Decimal::ONE_HUNDRED;
            if reconciliation.overpayment_amount > allowed_over {
                return Err(LifecycleError::OverpaymentRejected(format!(
                    "payment of {} would exceed the invoice total {} by {}",
                    input.amount, invoice.total_amount, reconciliation.overpayment_amount
                )));
            }
        }

        let payment = Payment {
            payment_id: Uuid::new_v4(),
            invoice_id,
            company_id: invoice.company_id,
            amount: input.amount,
            currency: invoice.currency.clone(),
            method: input.method.as_str().to_string(),
            reference: input.reference.clone(),
            notes: input.notes.clone(),
            payment_date: input.payment_date,
            is_refund: false,
            created_utc: now,
        };

        let mut mutation = InvoiceMutation::for_invoice(invoice_id);
        mutation.insert_payment = Some(payment.clone());

        let current = invoice.status();
        let mut status_update = None;
        if rules.auto_update_status
            && reconciliation.is_settled()
            && current != InvoiceStatus::Paid
            && self.table.is_allowed(current, InvoiceStatus::Paid)
        {
            let opts = StatusUpdateOptions {
                reason: Some("Payment received; invoice settled".to_string()),
                automated: true,
                ..StatusUpdateOptions::default()
            };
            let effective = determine_effective_status(
                invoice,
                InvoiceStatus::Paid,
                &reconciliation,
                self.tolerance,
                now,
            );
            if effective.changed && effective.status == InvoiceStatus::Paid {
                let reason = "Payment received; invoice settled".to_string();
                let entry = build_audit_entry(
                    invoice,
                    &record.payments,
                    current,
                    InvoiceStatus::Paid,
                    &reason,
                    &reconciliation,
                    ctx,
                    &opts,
                    &[],
                    now,
                );
                mutation.set_status = Some(InvoiceStatus::Paid);
                mutation.audit_entry = Some(entry.clone());
                mutation.notification = Some(NotificationRequest {
                    invoice_id,
                    company_id: invoice.company_id,
                    old_status: current,
                    new_status: InvoiceStatus::Paid,
                });
                status_update = Some(StatusUpdateOutcome {
                    invoice_id,
                    old_status: current,
                    new_status: InvoiceStatus::Paid,
                    changed: true,
                    reverted: false,
                    reason,
                    reconciliation: reconciliation.clone(),
                    audit_entry: Some(entry),
                });
            }
        }

        let audit_for_fallback = mutation.audit_entry.clone();
        commit_with_fallback(tx, mutation, audit_for_fallback.as_ref()).await?;

        PAYMENTS_TOTAL
            .with_label_values(&[input.method.as_str()])
            .inc();
        info!(
            invoice_id = %invoice_id,
            payment_id = %payment.payment_id,
            amount = %payment.amount,
            payment_status = reconciliation.payment_status.as_str(),
            "Payment recorded"
        );

        Ok(PaymentOutcome {
            payment,
            reconciliation,
            status_update,
        })
    }

    /// Reverse an overpaid balance with a negative refund payment, then
    /// re-reconcile and audit.
    #[instrument(skip(self, ctx), fields(invoice_id = %invoice_id, refund_amount = %refund_amount))]
    pub async fn process_overpayment_refund(
        &self,
        invoice_id: Uuid,
        refund_amount: Decimal,
        ctx: &RequestContext,
    ) -> Result<RefundOutcome, LifecycleError> {
        self.bounded(self.apply_refund(invoice_id, refund_amount, ctx))
            .await
    }

    async fn apply_refund(
        &self,
        invoice_id: Uuid,
        refund_amount: Decimal,
        ctx: &RequestContext,
    ) -> Result<RefundOutcome, LifecycleError> {
        let mut tx = self.store.begin().await?;
        let record = tx
            .load_invoice(invoice_id)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        let invoice = &record.invoice;
        if invoice.company_id != ctx.company_id {
            return Err(LifecycleError::AccessDenied);
        }
        if refund_amount <= Decimal::ZERO {
            return Err(LifecycleError::InvalidPayment(
                "refund amount must be positive".to_string(),
            ));
        }

        let before = reconcile(invoice, &record.payments, None, self.tolerance);
        if !before.is_overpaid {
            return Err(LifecycleError::OverpaymentRejected(
                "invoice is not overpaid".to_string(),
            ));
        }
        if refund_amount > before.overpayment_amount {
            return Err(LifecycleError::OverpaymentRejected(format!(
                "refund of {} exceeds the overpayment of {}",
                refund_amount, before.overpayment_amount
            )));
        }

        let now = Utc::now();
        let refund = Payment {
            payment_id: Uuid::new_v4(),
            invoice_id,
            company_id: invoice.company_id,
            amount: -refund_amount,
            currency: invoice.currency.clone(),
            method: "bank_transfer".to_string(),
            reference: None,
            notes: Some("Overpayment refund".to_string()),
            payment_date: now,
            is_refund: true,
            created_utc: now,
        };

        let after = reconcile(invoice, &record.payments, Some(-refund_amount), self.tolerance);
        let current = invoice.status();
        let reason = format!("Overpayment refund of {} {}", refund_amount, invoice.currency);
        let entry = build_audit_entry(
            invoice,
            &record.payments,
            current,
            current,
            &reason,
            &after,
            ctx,
            &StatusUpdateOptions::default(),
            &[],
            now,
        );

        let mut mutation = InvoiceMutation::for_invoice(invoice_id);
        mutation.insert_payment = Some(refund.clone());
        mutation.audit_entry = Some(entry.clone());
        commit_with_fallback(tx, mutation, Some(&entry)).await?;

        info!(
            invoice_id = %invoice_id,
            refund_amount = %refund_amount,
            remaining_overpayment = %after.overpayment_amount,
            "Overpayment refunded"
        );

        Ok(RefundOutcome {
            refund,
            reconciliation: after,
            audit_entry: entry,
        })
    }

    /// Apply one status to many invoices. Each invoice runs in its own
    /// transaction; a failure is captured per item and never aborts the
    /// rest of the batch.
    #[instrument(skip(self, invoice_ids, ctx, opts), fields(count = invoice_ids.len(), requested = %requested))]
    pub async fn bulk_update_status(
        &self,
        invoice_ids: &[Uuid],
        requested: InvoiceStatus,
        ctx: &RequestContext,
        opts: &BatchOptions,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::empty(opts.dry_run);
        for &invoice_id in invoice_ids {
            let item_opts = StatusUpdateOptions {
                reason: opts.reason.clone(),
                force_override: opts.force_override,
                automated: false,
                batch: true,
            };
            let result = self
                .bounded(self.apply_status_update(
                    invoice_id,
                    requested,
                    ctx,
                    &item_opts,
                    opts.dry_run,
                ))
                .await;
            record_batch_item(&mut outcome, invoice_id, result);
        }
        outcome
    }

    /// Find SENT invoices past their due date (plus any grace period) and
    /// move them to OVERDUE via the corrector.
    #[instrument(skip(self, ctx, config), fields(company_id = %ctx.company_id))]
    pub async fn detect_and_update_overdue(
        &self,
        ctx: &RequestContext,
        config: &OverdueConfig,
    ) -> Result<BatchOutcome, LifecycleError> {
        let as_of = Utc::now() - chrono::Duration::days(config.grace_days);
        let candidates = self
            .store
            .list_overdue_candidates(ctx.company_id, as_of)
            .await?;

        let mut outcome = BatchOutcome::empty(config.dry_run);
        for invoice_id in candidates {
            let opts = StatusUpdateOptions {
                reason: Some("Invoice past due".to_string()),
                force_override: false,
                automated: true,
                batch: true,
            };
            // Request the current SENT status; the corrector resolves the
            // effective status to OVERDUE for lapsed invoices.
            let result = self
                .bounded(self.apply_status_update(
                    invoice_id,
                    InvoiceStatus::Sent,
                    ctx,
                    &opts,
                    config.dry_run,
                ))
                .await;
            record_batch_item(&mut outcome, invoice_id, result);
        }
        Ok(outcome)
    }

    /// Company-scoped fetch of an invoice with its payment history.
    pub async fn get_invoice(
        &self,
        invoice_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<InvoiceRecord, LifecycleError> {
        let mut tx = self.store.begin().await?;
        let record = tx
            .load_invoice(invoice_id)
            .await?
            .ok_or(LifecycleError::NotFound)?;
        if record.invoice.company_id != ctx.company_id {
            return Err(LifecycleError::AccessDenied);
        }
        Ok(record)
    }

    /// Speculative reconciliation with an optional candidate amount (use a
    /// negative amount to preview a refund). Never writes.
    pub async fn preview_reconciliation(
        &self,
        invoice_id: Uuid,
        candidate_amount: Option<Decimal>,
        ctx: &RequestContext,
    ) -> Result<ReconciliationResult, LifecycleError> {
        let record = self.get_invoice(invoice_id, ctx).await?;
        Ok(reconcile(
            &record.invoice,
            &record.payments,
            candidate_amount,
            self.tolerance,
        ))
    }

    /// Audit trail for one invoice, oldest first.
    pub async fn list_audit_entries(
        &self,
        invoice_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<Vec<AuditEntry>, LifecycleError> {
        // Company scoping first; the invoice must be visible to the caller.
        self.get_invoice(invoice_id, ctx).await?;
        self.store.list_audit_entries(invoice_id).await
    }
}

fn record_batch_item(
    outcome: &mut BatchOutcome,
    invoice_id: Uuid,
    result: Result<StatusUpdateOutcome, LifecycleError>,
) {
    match result {
        Ok(item) => {
            outcome.total_amount += item.reconciliation.invoice_total;
            outcome.total_outstanding += item.reconciliation.remaining_amount;
            if item.changed {
                outcome.push(invoice_id, BatchItemResult::Updated(item));
            } else {
                outcome.push(
                    invoice_id,
                    BatchItemResult::Skipped {
                        status: item.new_status,
                    },
                );
            }
        }
        Err(err) => outcome.push(
            invoice_id,
            BatchItemResult::Failed {
                error: err.to_string(),
            },
        ),
    }
}

async fn commit_with_fallback(
    tx: Box<dyn crate::services::store::StoreTx>,
    mutation: InvoiceMutation,
    audit_entry: Option<&AuditEntry>,
) -> Result<(), LifecycleError> {
    match tx.commit(mutation).await {
        Ok(()) => Ok(()),
        Err(LifecycleError::AuditWriteFailure(cause)) => {
            if let Some(entry) = audit_entry {
                record_fallback(entry, &cause);
            }
            Err(LifecycleError::AuditWriteFailure(cause))
        }
        Err(err) => Err(err),
    }
}

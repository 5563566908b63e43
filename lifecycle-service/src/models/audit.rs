//! Audit trail models. Entries are append-only and written in the same
//! transaction as the status mutation they describe.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{InvoiceStatus, UserRole};

/// Snapshot of the business facts at the moment of a status change.
/// All fields are required so compliance data cannot be silently omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessContext {
    pub is_overdue: bool,
    pub days_past_due: i64,
    pub has_payments: bool,
    pub total_paid: Decimal,
    pub remaining_amount: Decimal,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditMetadata {
    pub automated_change: bool,
    pub batch_operation: bool,
    pub compliance_flags: Vec<String>,
}

/// Immutable audit log row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditEntry {
    pub audit_id: Uuid,
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub user_role: String,
    pub old_status: String,
    pub new_status: String,
    pub reason: String,
    pub business_context: serde_json::Value,
    pub metadata: serde_json::Value,
    pub created_utc: DateTime<Utc>,
}

impl AuditEntry {
    pub fn old_status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.old_status)
    }

    pub fn new_status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.new_status)
    }

    pub fn role(&self) -> UserRole {
        UserRole::from_string(&self.user_role)
    }

    pub fn context(&self) -> Option<BusinessContext> {
        serde_json::from_value(self.business_context.clone()).ok()
    }

    pub fn audit_metadata(&self) -> Option<AuditMetadata> {
        serde_json::from_value(self.metadata.clone()).ok()
    }

    pub fn compliance_flags(&self) -> Vec<String> {
        self.audit_metadata()
            .map(|m| m.compliance_flags)
            .unwrap_or_default()
    }
}

/// Outbox row handed to the external notification scheduler. Inserted in
/// the same transaction as the status change; draining it is not this
/// engine's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub invoice_id: Uuid,
    pub company_id: Uuid,
    pub old_status: InvoiceStatus,
    pub new_status: InvoiceStatus,
}

//! Invoice model for lifecycle-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Overdue,
    Paid,
    Disputed,
    WrittenOff,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Disputed => "disputed",
            InvoiceStatus::WrittenOff => "written_off",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "sent" => InvoiceStatus::Sent,
            "overdue" => InvoiceStatus::Overdue,
            "paid" => InvoiceStatus::Paid,
            "disputed" => InvoiceStatus::Disputed,
            "written_off" => InvoiceStatus::WrittenOff,
            _ => InvoiceStatus::Draft,
        }
    }

    /// Terminal statuses admit no further mutation by this engine.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::WrittenOff)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invoice document. Referenced, not owned, by the engine: only `status`
/// and `updated_utc` are ever written back.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub company_id: Uuid,
    pub invoice_number: String,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub status: String,
    pub currency: String,
    pub total_amount: Decimal,
    pub due_date: DateTime<Utc>,
    pub tax_registration_number: Option<String>,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Invoice {
    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }

    /// An invoice is past due once its due date has lapsed and it is not
    /// already settled or closed.
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.due_date < now
            && !matches!(self.status(), InvoiceStatus::Paid | InvoiceStatus::WrittenOff)
    }

    pub fn days_past_due(&self, now: DateTime<Utc>) -> i64 {
        (now - self.due_date).num_days().max(0)
    }
}

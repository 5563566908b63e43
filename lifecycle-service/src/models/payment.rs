//! Payment model for lifecycle-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    Cheque,
    Cash,
    CreditCard,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Cheque => "cheque",
            PaymentMethod::Cash => "cash",
            PaymentMethod::CreditCard => "credit_card",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "cheque" => PaymentMethod::Cheque,
            "cash" => PaymentMethod::Cash,
            "credit_card" => PaymentMethod::CreditCard,
            _ => PaymentMethod::BankTransfer,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment row. A negative `amount` is a refund; the sum of an invoice's
/// payment amounts is the single source of truth for amount paid.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub company_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub method: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub payment_date: DateTime<Utc>,
    pub is_refund: bool,
    pub created_utc: DateTime<Utc>,
}

impl Payment {
    pub fn method(&self) -> PaymentMethod {
        PaymentMethod::from_string(&self.method)
    }
}

/// Input for recording a payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub amount: Decimal,
    /// Defaults to the invoice currency when omitted; rejected if it differs.
    pub currency: Option<String>,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub payment_date: DateTime<Utc>,
}

/// Business rules applied when recording a payment.
#[derive(Debug, Clone)]
pub struct PaymentRules {
    pub minimum_amount: Decimal,
    pub reference_required_methods: Vec<PaymentMethod>,
    pub allow_future_dates: bool,
    pub allow_overpayment: bool,
    /// Overpayment within this percentage of the invoice total is accepted
    /// even when `allow_overpayment` is off.
    pub overpayment_tolerance_percent: Decimal,
    /// Chain into a PAID status update when a payment settles the invoice.
    pub auto_update_status: bool,
}

impl Default for PaymentRules {
    fn default() -> Self {
        Self {
            minimum_amount: Decimal::new(1, 2),
            reference_required_methods: vec![PaymentMethod::Cheque, PaymentMethod::BankTransfer],
            allow_future_dates: false,
            allow_overpayment: false,
            overpayment_tolerance_percent: Decimal::ZERO,
            auto_update_status: true,
        }
    }
}

impl PaymentRules {
    pub fn requires_reference(&self, method: PaymentMethod) -> bool {
        self.reference_required_methods.contains(&method)
    }
}

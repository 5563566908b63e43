//! Shared fixtures for lifecycle-service integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use lifecycle_service::models::{
    Invoice, InvoiceStatus, NewPayment, Payment, PaymentMethod, RequestContext, UserRole,
};
use lifecycle_service::services::{InMemoryStore, LifecycleService};

pub fn dec(s: &str) -> Decimal {
    s.parse().expect("decimal literal")
}

pub fn setup() -> (Arc<InMemoryStore>, LifecycleService<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let service = LifecycleService::new(Arc::clone(&store))
        .with_timeout(Some(std::time::Duration::from_secs(5)));
    (store, service)
}

pub fn ctx(role: UserRole, company_id: Uuid) -> RequestContext {
    RequestContext {
        user_id: Uuid::new_v4(),
        user_role: role,
        company_id,
    }
}

pub struct InvoiceBuilder {
    invoice: Invoice,
}

impl InvoiceBuilder {
    pub fn new(company_id: Uuid, total: &str) -> Self {
        let now = Utc::now();
        Self {
            invoice: Invoice {
                invoice_id: Uuid::new_v4(),
                company_id,
                invoice_number: format!("INV-{}", &Uuid::new_v4().simple().to_string()[..8]),
                customer_id: Uuid::new_v4(),
                customer_name: "Pearl Contracting LLC".to_string(),
                status: InvoiceStatus::Sent.as_str().to_string(),
                currency: "AED".to_string(),
                total_amount: dec(total),
                due_date: now + Duration::days(30),
                tax_registration_number: None,
                notes: None,
                created_utc: now,
                updated_utc: now,
            },
        }
    }

    pub fn status(mut self, status: InvoiceStatus) -> Self {
        self.invoice.status = status.as_str().to_string();
        self
    }

    pub fn due_date(mut self, due: DateTime<Utc>) -> Self {
        self.invoice.due_date = due;
        self
    }

    pub fn past_due(self, days: i64) -> Self {
        let due = Utc::now() - Duration::days(days);
        self.due_date(due)
    }

    pub fn trn(mut self, trn: &str) -> Self {
        self.invoice.tax_registration_number = Some(trn.to_string());
        self
    }

    pub fn build(self) -> Invoice {
        self.invoice
    }

    pub fn insert(self, store: &InMemoryStore) -> Invoice {
        let invoice = self.invoice;
        store.insert_invoice(invoice.clone());
        invoice
    }
}

pub fn seed_payment(store: &InMemoryStore, invoice: &Invoice, amount: &str) -> Payment {
    let payment = Payment {
        payment_id: Uuid::new_v4(),
        invoice_id: invoice.invoice_id,
        company_id: invoice.company_id,
        amount: dec(amount),
        currency: invoice.currency.clone(),
        method: PaymentMethod::BankTransfer.as_str().to_string(),
        reference: Some("SEED".to_string()),
        notes: None,
        payment_date: Utc::now(),
        is_refund: false,
        created_utc: Utc::now(),
    };
    store.insert_payment(payment.clone());
    payment
}

pub fn bank_payment(amount: &str) -> NewPayment {
    NewPayment {
        amount: dec(amount),
        currency: None,
        method: PaymentMethod::BankTransfer,
        reference: Some("TXN-0001".to_string()),
        notes: None,
        payment_date: Utc::now(),
    }
}

pub fn cash_payment(amount: &str) -> NewPayment {
    NewPayment {
        amount: dec(amount),
        currency: None,
        method: PaymentMethod::Cash,
        reference: None,
        notes: None,
        payment_date: Utc::now(),
    }
}

//! Overpayment refund integration tests for lifecycle-service.

mod common;

use common::{bank_payment, ctx, dec, setup, InvoiceBuilder};
use lifecycle_service::error::LifecycleError;
use lifecycle_service::models::{PaymentMethod, PaymentRules, UserRole};
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::test]
async fn overpaid_invoice_refunds_down_to_exact_settlement() {
    let (store, service) = setup();
    let invoice = InvoiceBuilder::new(Uuid::new_v4(), "1000.00").insert(&store);
    let caller = ctx(UserRole::Finance, invoice.company_id);
    let rules = PaymentRules {
        allow_overpayment: true,
        ..PaymentRules::default()
    };

    let payment = service
        .record_payment(invoice.invoice_id, bank_payment("1200.00"), &caller, &rules)
        .await
        .expect("overpayment should be accepted");
    assert!(payment.reconciliation.is_overpaid);
    assert_eq!(payment.reconciliation.overpayment_amount, dec("200.00"));

    // A refund above the overpaid balance is refused outright.
    let err = service
        .process_overpayment_refund(invoice.invoice_id, dec("250.00"), &caller)
        .await
        .unwrap_err();
    match err {
        LifecycleError::OverpaymentRejected(msg) => assert!(msg.contains("exceeds")),
        other => panic!("expected OverpaymentRejected, got {other:?}"),
    }

    let outcome = service
        .process_overpayment_refund(invoice.invoice_id, dec("200.00"), &caller)
        .await
        .expect("refund of the full overpayment should pass");

    assert_eq!(outcome.refund.amount, dec("-200.00"));
    assert!(outcome.refund.is_refund);
    assert_eq!(outcome.refund.method(), PaymentMethod::BankTransfer);
    assert!(outcome.reconciliation.is_fully_paid);
    assert!(!outcome.reconciliation.is_overpaid);
    assert_eq!(outcome.reconciliation.remaining_amount, Decimal::ZERO);
    assert_eq!(outcome.reconciliation.overpayment_amount, Decimal::ZERO);

    // The refund row and its audit entry landed in one transaction.
    let payments = store.payments(invoice.invoice_id);
    assert_eq!(payments.len(), 2);
    assert!(payments.iter().any(|p| p.is_refund));
    let entries = store.audit_entries(invoice.invoice_id);
    assert_eq!(entries.last().unwrap().reason, "Overpayment refund of 200.00 AED");
}

#[tokio::test]
async fn partial_refund_leaves_the_rest_overpaid() {
    let (store, service) = setup();
    let invoice = InvoiceBuilder::new(Uuid::new_v4(), "1000.00").insert(&store);
    common::seed_payment(&store, &invoice, "1300.00");
    let caller = ctx(UserRole::Finance, invoice.company_id);

    let outcome = service
        .process_overpayment_refund(invoice.invoice_id, dec("100.00"), &caller)
        .await
        .expect("partial refund should pass");

    assert!(outcome.reconciliation.is_overpaid);
    assert_eq!(outcome.reconciliation.overpayment_amount, dec("200.00"));
    assert_eq!(outcome.reconciliation.total_paid, dec("1200.00"));
}

#[tokio::test]
async fn refund_on_a_non_overpaid_invoice_is_rejected() {
    let (store, service) = setup();
    let invoice = InvoiceBuilder::new(Uuid::new_v4(), "1000.00").insert(&store);
    common::seed_payment(&store, &invoice, "600.00");
    let caller = ctx(UserRole::Finance, invoice.company_id);

    let err = service
        .process_overpayment_refund(invoice.invoice_id, dec("50.00"), &caller)
        .await
        .unwrap_err();
    match err {
        LifecycleError::OverpaymentRejected(msg) => assert!(msg.contains("not overpaid")),
        other => panic!("expected OverpaymentRejected, got {other:?}"),
    }
    assert_eq!(store.payments(invoice.invoice_id).len(), 1);
    assert!(store.audit_entries(invoice.invoice_id).is_empty());
}

#[tokio::test]
async fn non_positive_refund_amount_is_rejected() {
    let (store, service) = setup();
    let invoice = InvoiceBuilder::new(Uuid::new_v4(), "1000.00").insert(&store);
    common::seed_payment(&store, &invoice, "1200.00");
    let caller = ctx(UserRole::Finance, invoice.company_id);

    let err = service
        .process_overpayment_refund(invoice.invoice_id, Decimal::ZERO, &caller)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidPayment(_)));
}

#[tokio::test]
async fn refund_round_trips_an_overpayment_exactly() {
    let (store, service) = setup();
    let invoice = InvoiceBuilder::new(Uuid::new_v4(), "500.00").insert(&store);
    let caller = ctx(UserRole::Finance, invoice.company_id);
    let rules = PaymentRules {
        allow_overpayment: true,
        ..PaymentRules::default()
    };

    service
        .record_payment(invoice.invoice_id, bank_payment("500.00"), &caller, &rules)
        .await
        .expect("settling payment");
    service
        .record_payment(invoice.invoice_id, bank_payment("75.00"), &caller, &rules)
        .await
        .expect("extra payment on a paid invoice is still overpayment");

    let refunded = service
        .process_overpayment_refund(invoice.invoice_id, dec("75.00"), &caller)
        .await
        .expect("refunding the exact excess");

    // Overpay by X then refund X: settled, no residual excess.
    assert!(refunded.reconciliation.is_fully_paid);
    assert!(!refunded.reconciliation.is_overpaid);
    assert_eq!(
        refunded.reconciliation.total_paid,
        invoice.total_amount
    );
}

#[tokio::test]
async fn refund_is_scoped_to_the_caller_company() {
    let (store, service) = setup();
    let invoice = InvoiceBuilder::new(Uuid::new_v4(), "1000.00").insert(&store);
    common::seed_payment(&store, &invoice, "1200.00");
    let stranger = ctx(UserRole::Admin, Uuid::new_v4());

    let err = service
        .process_overpayment_refund(invoice.invoice_id, dec("200.00"), &stranger)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::AccessDenied));
}

//! End-to-end order ingestion and lifecycle tests against an in-memory SQLite backend.
mod support;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use fakt_common::{Money, Quantity, VatRate};
use faktura_engine::{
    api::objects::{CancelOutcome, InvoiceQueryFilter, OrderUpdate},
    db_types::{InvoiceStatus, NewInvoiceLine, NewPayment},
    events::EventProducers,
    helpers::{validate_kid, KidScheme},
    InvoicingDatabase,
    InvoicingError,
    OrderFlowApi,
};
use support::{new_test_db, sample_customer, sample_order};

#[tokio::test]
async fn ingesting_an_order_creates_a_draft_invoice() {
    let db = new_test_db().await;
    let api = OrderFlowApi::new(db, EventProducers::default());
    let invoice = api.process_order(sample_order("ORD-1001", "kari@example.no")).await.unwrap();

    let year = Utc::now().year();
    assert_eq!(invoice.invoice_number.as_str(), format!("{year}-000001"));
    assert_eq!(invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.subtotal, Money::from_minor(100_000));
    assert_eq!(invoice.vat_amount, Money::from_minor(25_000));
    assert_eq!(invoice.total_amount, invoice.subtotal + invoice.vat_amount);
    assert_eq!(invoice.currency, "NOK");
    // First customer gets 10001, and the KID embeds it
    assert!(invoice.kid.as_str().starts_with("10001"));
    assert!(validate_kid(&invoice.kid, KidScheme::Luhn));
    // Default payment terms
    assert_eq!(invoice.due_date - invoice.order_date, Duration::days(14));
}

#[tokio::test]
async fn repeated_orders_are_rejected_with_the_original_invoice_number() {
    let db = new_test_db().await;
    let api = OrderFlowApi::new(db, EventProducers::default());
    let first = api.process_order(sample_order("ORD-1001", "kari@example.no")).await.unwrap();
    let err = api.process_order(sample_order("ORD-1001", "kari@example.no")).await.unwrap_err();
    match err {
        InvoicingError::DuplicateOrder { invoice_number } => assert_eq!(invoice_number, first.invoice_number),
        e => panic!("Expected DuplicateOrder, got {e}"),
    }
    // Same order id from a different source is a different order
    let mut other = sample_order("ORD-1001", "kari@example.no");
    other.source = "pos".to_string();
    assert!(api.process_order(other).await.is_ok());
}

#[tokio::test]
async fn customers_are_deduplicated_by_email() {
    let db = new_test_db().await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let a = api.process_order(sample_order("ORD-1", "kari@example.no")).await.unwrap();
    let b = api.process_order(sample_order("ORD-2", "ola@example.no")).await.unwrap();
    let mut third = sample_order("ORD-3", "kari@example.no");
    third.customer.name = "Kari N. Hansen".to_string();
    third.customer.city = None;
    let c = api.process_order(third).await.unwrap();

    assert_ne!(a.customer_id, b.customer_id);
    assert_eq!(a.customer_id, c.customer_id);

    let details = db.fetch_invoice_details(&c.invoice_number).await.unwrap().unwrap();
    assert_eq!(details.customer.customer_number, 10001);
    // Present fields overwrite, absent fields keep their stored values
    assert_eq!(details.customer.name, "Kari N. Hansen");
    assert_eq!(details.customer.city.as_deref(), Some("Oslo"));

    let details_b = db.fetch_invoice_details(&b.invoice_number).await.unwrap().unwrap();
    assert_eq!(details_b.customer.customer_number, 10002);
}

#[tokio::test]
async fn due_days_are_clamped() {
    let db = new_test_db().await;
    let api = OrderFlowApi::new(db, EventProducers::default());
    let mut order = sample_order("ORD-1", "kari@example.no");
    order.order_date = Some(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    order.due_days = Some(9_999);
    let invoice = api.process_order(order).await.unwrap();
    assert_eq!(invoice.due_date - invoice.order_date, Duration::days(365));

    let mut order = sample_order("ORD-2", "kari@example.no");
    order.due_days = Some(-5);
    let invoice = api.process_order(order).await.unwrap();
    assert_eq!(invoice.due_date, invoice.order_date);
}

#[tokio::test]
async fn an_order_without_lines_is_invalid() {
    let db = new_test_db().await;
    let api = OrderFlowApi::new(db, EventProducers::default());
    let mut order = sample_order("ORD-1", "kari@example.no");
    order.lines.clear();
    assert!(matches!(api.process_order(order).await.unwrap_err(), InvoicingError::InvalidOrder(_)));
}

#[tokio::test]
async fn draft_updates_recompute_totals_and_stop_after_send() {
    let db = new_test_db().await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let invoice = api.process_order(sample_order("ORD-1", "kari@example.no")).await.unwrap();

    let update = OrderUpdate {
        lines: Some(vec![NewInvoiceLine {
            description: "Reduced scope".to_string(),
            quantity: Quantity::from_millis(1_000),
            unit_price: Money::from_minor(10_000),
            vat_rate: VatRate::from_basis_points(2_500),
        }]),
        ..OrderUpdate::default()
    };
    let updated = api.update_order(&invoice.invoice_number, update.clone()).await.unwrap();
    assert_eq!(updated.subtotal, Money::from_minor(10_000));
    assert_eq!(updated.vat_amount, Money::from_minor(2_500));
    assert_eq!(updated.total_amount, Money::from_minor(12_500));

    db.mark_sent(&invoice.invoice_number, None).await.unwrap();
    let err = api.update_order(&invoice.invoice_number, update).await.unwrap_err();
    assert!(matches!(err, InvoicingError::NotEditable(_, InvoiceStatus::Sent)));
}

#[tokio::test]
async fn updating_the_customer_regenerates_the_kid() {
    let db = new_test_db().await;
    let api = OrderFlowApi::new(db, EventProducers::default());
    let invoice = api.process_order(sample_order("ORD-1", "kari@example.no")).await.unwrap();
    let update = OrderUpdate { customer: Some(sample_customer("ola@example.no")), ..OrderUpdate::default() };
    let updated = api.update_order(&invoice.invoice_number, update).await.unwrap();
    assert_ne!(updated.customer_id, invoice.customer_id);
    assert_ne!(updated.kid, invoice.kid);
    assert!(updated.kid.as_str().starts_with("10002"));
    assert!(validate_kid(&updated.kid, KidScheme::Luhn));
}

#[tokio::test]
async fn cancelling_a_draft_deletes_it() {
    let db = new_test_db().await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let invoice = api.process_order(sample_order("ORD-1", "kari@example.no")).await.unwrap();
    let outcome = api.cancel_order(&invoice.invoice_number, None).await.unwrap();
    assert!(matches!(outcome, CancelOutcome::Deleted { .. }));
    assert!(db.fetch_invoice(&invoice.invoice_number).await.unwrap().is_none());
    // The order can be re-ingested afterwards
    assert!(api.process_order(sample_order("ORD-1", "kari@example.no")).await.is_ok());
}

#[tokio::test]
async fn cancelling_a_sent_invoice_issues_a_credit_note() {
    let db = new_test_db().await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let invoice = api.process_order(sample_order("ORD-1", "kari@example.no")).await.unwrap();
    db.mark_sent(&invoice.invoice_number, None).await.unwrap();

    let outcome = api.cancel_order(&invoice.invoice_number, None).await.unwrap();
    let CancelOutcome::Credited { invoice: original, credit_note } = outcome else {
        panic!("Expected a credit note");
    };
    assert_eq!(original.status, InvoiceStatus::Credited);
    assert_eq!(original.credit_note_id, Some(credit_note.id));
    assert_eq!(credit_note.credits_invoice_id, Some(original.id));
    assert_eq!(credit_note.total_amount, -original.total_amount);
    assert_eq!(credit_note.subtotal, -original.subtotal);
    assert!(credit_note.source.is_none());
    // Credit notes use the weighted KID scheme
    assert!(validate_kid(&credit_note.kid, KidScheme::Mod10Weighted));

    // Cancelling again fails
    let err = api.cancel_order(&original.invoice_number, None).await.unwrap_err();
    assert!(matches!(err, InvoicingError::AlreadyCredited(_)));
}

#[tokio::test]
async fn cancellation_reason_lands_on_the_audit_row() {
    let db = new_test_db().await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());

    let draft = api.process_order(sample_order("ORD-1", "kari@example.no")).await.unwrap();
    api.cancel_order(&draft.invoice_number, Some("customer withdrew the order")).await.unwrap();

    let sent = api.process_order(sample_order("ORD-2", "kari@example.no")).await.unwrap();
    db.mark_sent(&sent.invoice_number, None).await.unwrap();
    api.cancel_order(&sent.invoice_number, Some("goods returned")).await.unwrap();

    let details: Vec<String> =
        sqlx::query_scalar("SELECT detail FROM audit_events WHERE detail IS NOT NULL ORDER BY id")
            .fetch_all(db.pool())
            .await
            .unwrap();
    assert!(details.iter().any(|d| d.contains("customer withdrew the order")));
    assert!(details.iter().any(|d| d.contains("goods returned")));
}

#[tokio::test]
async fn paid_invoices_cannot_be_cancelled() {
    let db = new_test_db().await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let invoice = api.process_order(sample_order("ORD-1", "kari@example.no")).await.unwrap();
    db.mark_sent(&invoice.invoice_number, None).await.unwrap();
    db.register_payment(NewPayment::new(invoice.invoice_number.clone(), invoice.total_amount)).await.unwrap();
    let err = api.cancel_order(&invoice.invoice_number, None).await.unwrap_err();
    assert!(matches!(err, InvoicingError::CannotCancelPaid(_)));
}

#[tokio::test]
async fn sending_twice_fails() {
    let db = new_test_db().await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let invoice = api.process_order(sample_order("ORD-1", "kari@example.no")).await.unwrap();
    db.mark_sent(&invoice.invoice_number, Some("https://files.test/a.pdf")).await.unwrap();
    let err = db.mark_sent(&invoice.invoice_number, None).await.unwrap_err();
    assert!(matches!(err, InvoicingError::AlreadySent(_)));
}

#[tokio::test]
async fn overdue_invoices_flip_on_status_reads() {
    let db = new_test_db().await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let mut order = sample_order("ORD-1", "kari@example.no");
    order.order_date = Some(Utc::now().date_naive() - Duration::days(60));
    order.due_days = Some(10);
    let invoice = api.process_order(order).await.unwrap();
    db.mark_sent(&invoice.invoice_number, None).await.unwrap();

    let status = api.order_status(Some("webshop"), "ORD-1").await.unwrap().unwrap();
    assert_eq!(status.status, InvoiceStatus::Overdue);
}

#[tokio::test]
async fn search_filters_by_source_status_and_window() {
    let db = new_test_db().await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    for i in 0..5 {
        let mut order = sample_order(&format!("ORD-{i}"), "kari@example.no");
        if i >= 3 {
            order.source = "pos".to_string();
        }
        api.process_order(order).await.unwrap();
    }
    let webshop = api.list_orders(InvoiceQueryFilter::default().with_source("webshop")).await.unwrap();
    assert_eq!(webshop.len(), 3);
    let drafts = api.list_orders(InvoiceQueryFilter::default().with_status(InvoiceStatus::Draft)).await.unwrap();
    assert_eq!(drafts.len(), 5);
    let limited = api.list_orders(InvoiceQueryFilter::default().with_limit(2)).await.unwrap();
    assert_eq!(limited.len(), 2);
    let none = api
        .list_orders(InvoiceQueryFilter::default().since(Utc::now().date_naive() + Duration::days(1)))
        .await
        .unwrap();
    assert!(none.is_empty());
}

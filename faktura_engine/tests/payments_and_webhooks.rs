//! Payment recording and webhook store tests against an in-memory SQLite backend.
mod support;

use chrono::Utc;
use fakt_common::Money;
use faktura_engine::{
    db_types::{InvoiceStatus, NewOutgoingWebhook, NewPayment, PaymentStatus, WebhookStatus},
    events::EventProducers,
    CredentialManagement,
    InvoicingDatabase,
    InvoicingError,
    OrderFlowApi,
    PaymentApi,
    WebhookStore,
    WebhookStoreError,
};
use support::{new_test_db, sample_order};

#[tokio::test]
async fn partial_then_full_payment() {
    let db = new_test_db().await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let payments = PaymentApi::new(db.clone(), EventProducers::default());
    let invoice = orders.process_order(sample_order("ORD-1", "kari@example.no")).await.unwrap();
    db.mark_sent(&invoice.invoice_number, None).await.unwrap();

    // 400.00 of 1250.00
    let mut payment = NewPayment::new(invoice.invoice_number.clone(), Money::from_minor(40_000));
    payment.method = Some("bank_transfer".to_string());
    payment.reference = Some(invoice.kid.to_string());
    let outcome = payments.register_payment(payment).await.unwrap();
    assert!(!outcome.is_fully_paid());
    assert_eq!(outcome.invoice.status, InvoiceStatus::PartiallyPaid);
    assert_eq!(outcome.paid_total, Money::from_minor(40_000));
    assert_eq!(outcome.remaining, Money::from_minor(85_000));

    let outcome = payments
        .register_payment(NewPayment::new(invoice.invoice_number.clone(), Money::from_minor(85_000)))
        .await
        .unwrap();
    assert!(outcome.is_fully_paid());
    assert_eq!(outcome.invoice.status, InvoiceStatus::Paid);
    assert_eq!(outcome.remaining, Money::from_minor(0));

    let details = db.fetch_invoice_details(&invoice.invoice_number).await.unwrap().unwrap();
    assert_eq!(details.payments.len(), 2);
}

#[tokio::test]
async fn overpayment_still_reports_zero_remaining() {
    let db = new_test_db().await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let payments = PaymentApi::new(db.clone(), EventProducers::default());
    let invoice = orders.process_order(sample_order("ORD-1", "kari@example.no")).await.unwrap();
    db.mark_sent(&invoice.invoice_number, None).await.unwrap();

    let outcome = payments
        .register_payment(NewPayment::new(invoice.invoice_number.clone(), Money::from_minor(999_999)))
        .await
        .unwrap();
    assert!(outcome.is_fully_paid());
    assert_eq!(outcome.remaining, Money::from_minor(0));
    assert_eq!(outcome.paid_total, Money::from_minor(999_999));
}

#[tokio::test]
async fn pending_and_failed_payments_do_not_count_towards_the_paid_total() {
    let db = new_test_db().await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let payments = PaymentApi::new(db.clone(), EventProducers::default());
    let invoice = orders.process_order(sample_order("ORD-1", "kari@example.no")).await.unwrap();
    db.mark_sent(&invoice.invoice_number, None).await.unwrap();

    let outcome = payments
        .register_payment(NewPayment::new(invoice.invoice_number.clone(), Money::from_minor(40_000)))
        .await
        .unwrap();
    assert_eq!(outcome.paid_total, Money::from_minor(40_000));

    // Provider-reported rows that never settled
    for status in [PaymentStatus::Pending, PaymentStatus::Failed] {
        sqlx::query("INSERT INTO payments (invoice_id, amount, status, paid_at) VALUES ($1, $2, $3, $4)")
            .bind(invoice.id)
            .bind(85_000i64)
            .bind(status)
            .bind(Utc::now())
            .execute(db.pool())
            .await
            .unwrap();
    }

    let details = db.fetch_invoice_details(&invoice.invoice_number).await.unwrap().unwrap();
    assert_eq!(details.payments.len(), 3);
    assert_eq!(details.paid_total(), Money::from_minor(40_000));
    assert_eq!(details.remaining(), Money::from_minor(85_000));
    assert_eq!(details.invoice.status, InvoiceStatus::PartiallyPaid);
}

#[tokio::test]
async fn payment_against_unknown_invoice_fails() {
    let db = new_test_db().await;
    let payments = PaymentApi::new(db, EventProducers::default());
    let number = faktura_engine::db_types::InvoiceNumber::new(2025, 999_999);
    let err = payments.register_payment(NewPayment::new(number, Money::from_minor(100))).await.unwrap_err();
    assert!(matches!(err, InvoicingError::InvoiceNotFound(_)));
}

#[tokio::test]
async fn webhook_delivery_state_transitions() {
    let db = new_test_db().await;
    let hook = db
        .insert_pending_webhook(NewOutgoingWebhook {
            invoice_id: None,
            target_url: "https://partner.example/hooks".to_string(),
            event: "invoice.created".to_string(),
            payload: r#"{"event":"invoice.created"}"#.to_string(),
        })
        .await
        .unwrap();
    assert_eq!(hook.status, WebhookStatus::Pending);
    assert_eq!(hook.attempts, 0);
    assert!(hook.sent_at.is_none());

    db.record_delivery_state(hook.id, WebhookStatus::Retrying, 1, Some("connection refused"), None).await.unwrap();
    let hook = db.fetch_webhook(hook.id).await.unwrap();
    assert_eq!(hook.status, WebhookStatus::Retrying);
    assert_eq!(hook.attempts, 1);
    assert_eq!(hook.last_error.as_deref(), Some("connection refused"));

    let now = Utc::now();
    db.record_delivery_state(hook.id, WebhookStatus::Sent, 2, None, Some(now)).await.unwrap();
    let hook = db.fetch_webhook(hook.id).await.unwrap();
    assert_eq!(hook.status, WebhookStatus::Sent);
    assert!(hook.sent_at.is_some());

    let err = db.record_delivery_state(9999, WebhookStatus::Sent, 1, None, None).await.unwrap_err();
    assert!(matches!(err, WebhookStoreError::WebhookNotFound(9999)));
}

#[tokio::test]
async fn failed_webhooks_are_returned_oldest_first_and_capped() {
    let db = new_test_db().await;
    for i in 0..4 {
        let hook = db
            .insert_pending_webhook(NewOutgoingWebhook {
                invoice_id: None,
                target_url: format!("https://partner.example/hooks/{i}"),
                event: "invoice.sent".to_string(),
                payload: "{}".to_string(),
            })
            .await
            .unwrap();
        // Only the even ones end up failed
        if i % 2 == 0 {
            db.record_delivery_state(hook.id, WebhookStatus::Failed, 3, Some("timeout"), None).await.unwrap();
        }
    }
    let failed = db.fetch_failed_webhooks(50).await.unwrap();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|w| w.status == WebhookStatus::Failed));
    let capped = db.fetch_failed_webhooks(1).await.unwrap();
    assert_eq!(capped.len(), 1);
}

#[tokio::test]
async fn endpoints_filter_by_source_and_event() {
    let db = new_test_db().await;
    db.insert_endpoint("https://a.example/hook", Some("s1"), Some("webshop"), &[]).await.unwrap();
    db.insert_endpoint("https://b.example/hook", None, Some("pos"), &["invoice.paid".to_string()]).await.unwrap();
    db.insert_endpoint("https://c.example/hook", None, None, &["invoice.created".to_string()]).await.unwrap();

    // The NULL-source endpoint matches every source; the webshop endpoint subscribes to all events
    let hits = db.active_endpoints(Some("webshop"), "invoice.created").await.unwrap();
    let urls: Vec<&str> = hits.iter().map(|e| e.url.as_str()).collect();
    assert_eq!(urls, vec!["https://a.example/hook", "https://c.example/hook"]);

    let hits = db.active_endpoints(Some("pos"), "invoice.paid").await.unwrap();
    let urls: Vec<&str> = hits.iter().map(|e| e.url.as_str()).collect();
    assert_eq!(urls, vec!["https://b.example/hook"]);

    let hits = db.active_endpoints(Some("pos"), "invoice.overdue").await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn callback_url_comes_from_ingestion_meta() {
    let db = new_test_db().await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let mut order = sample_order("ORD-1", "kari@example.no");
    order.meta.callback_url = Some("https://webshop.example/callbacks/ORD-1".to_string());
    let invoice = orders.process_order(order).await.unwrap();

    let url = db.callback_url_for_invoice(invoice.id).await.unwrap();
    assert_eq!(url.as_deref(), Some("https://webshop.example/callbacks/ORD-1"));

    let plain = orders.process_order(sample_order("ORD-2", "kari@example.no")).await.unwrap();
    assert!(db.callback_url_for_invoice(plain.id).await.unwrap().is_none());
}

#[tokio::test]
async fn credentials_round_trip_and_deactivation() {
    let db = new_test_db().await;
    let hash = faktura_engine::helpers::key_hash("fakt_live_abc123");
    let cred = db.insert_credential("Webshop integration", &hash, "hmac-secret").await.unwrap();
    assert!(cred.is_active);
    assert!(cred.last_used_at.is_none());
    // The Debug form never leaks the secret
    assert!(!format!("{cred:?}").contains("hmac-secret"));

    let fetched = db.fetch_credential_by_key_hash(&hash).await.unwrap().unwrap();
    assert_eq!(fetched.secret.reveal(), "hmac-secret");

    db.touch_credential(cred.id).await.unwrap();
    let fetched = db.fetch_credential_by_key_hash(&hash).await.unwrap().unwrap();
    assert!(fetched.last_used_at.is_some());

    sqlx::query("UPDATE api_credentials SET is_active = 0 WHERE id = ?")
        .bind(cred.id)
        .execute(db.pool())
        .await
        .unwrap();
    assert!(db.fetch_credential_by_key_hash(&hash).await.unwrap().is_none());
}

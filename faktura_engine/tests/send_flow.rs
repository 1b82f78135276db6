//! Send-flow tests with stubbed collaborators: rendering, storage and mail.
mod support;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
    Mutex,
};

use async_trait::async_trait;
use faktura_engine::{
    db_types::{EmailLog, EmailStatus, InvoiceStatus},
    events::{EventHandlers, EventHooks, EventProducers},
    sqlite::db::audit,
    traits::{CollaboratorError, Mailer, ObjectStore, PdfRenderer},
    InvoiceApi,
    InvoicingDatabase,
    InvoicingError,
    OrderFlowApi,
    SqliteDatabase,
};
use support::{new_test_db, sample_order};

async fn email_logs(db: &SqliteDatabase, invoice_id: i64) -> Vec<EmailLog> {
    let mut conn = db.pool().acquire().await.unwrap();
    audit::email_logs_for_invoice(invoice_id, &mut conn).await.unwrap()
}

struct StubRenderer;

#[async_trait]
impl PdfRenderer for StubRenderer {
    async fn render(
        &self,
        _details: &faktura_engine::api::objects::InvoiceDetails,
    ) -> Result<Vec<u8>, CollaboratorError> {
        Ok(b"%PDF-1.7 stub".to_vec())
    }
}

struct StubStore;

#[async_trait]
impl ObjectStore for StubStore {
    async fn store_pdf(
        &self,
        invoice_number: &faktura_engine::db_types::InvoiceNumber,
        _bytes: &[u8],
    ) -> Result<String, CollaboratorError> {
        Ok(format!("https://files.test/{invoice_number}.pdf"))
    }
}

/// Fails the first send, then succeeds.
struct FlakyMailer {
    failed_once: AtomicBool,
}

#[async_trait]
impl Mailer for FlakyMailer {
    async fn send_invoice(
        &self,
        _details: &faktura_engine::api::objects::InvoiceDetails,
        _pdf_url: &str,
    ) -> Result<(), CollaboratorError> {
        if self.failed_once.swap(true, Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CollaboratorError::Mail("relay unavailable".to_string()))
        }
    }
}

struct OkMailer;

#[async_trait]
impl Mailer for OkMailer {
    async fn send_invoice(
        &self,
        _details: &faktura_engine::api::objects::InvoiceDetails,
        _pdf_url: &str,
    ) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

fn invoice_api<B>(db: B, mailer: Arc<dyn Mailer>, producers: EventProducers) -> InvoiceApi<B> {
    InvoiceApi::new(db, Arc::new(StubRenderer), Arc::new(StubStore), mailer, producers)
}

#[tokio::test]
async fn mail_failure_leaves_the_invoice_in_draft() {
    let db = new_test_db().await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let invoice = orders.process_order(sample_order("ORD-1", "kari@example.no")).await.unwrap();

    let mailer = Arc::new(FlakyMailer { failed_once: AtomicBool::new(false) });
    let api = invoice_api(db.clone(), mailer, EventProducers::default());

    let err = api.send(&invoice.invoice_number).await.unwrap_err();
    assert!(matches!(err, InvoicingError::EmailDispatch(_)));
    let details = db.fetch_invoice_details(&invoice.invoice_number).await.unwrap().unwrap();
    assert_eq!(details.invoice.status, InvoiceStatus::Draft);
    assert!(details.invoice.pdf_url.is_none());
    let logs = email_logs(&db, invoice.id).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, EmailStatus::Failed);

    // The retry goes through on the same draft
    let sent = api.send(&invoice.invoice_number).await.unwrap();
    assert_eq!(sent.status, InvoiceStatus::Sent);
    assert_eq!(sent.pdf_url.as_deref(), Some(format!("https://files.test/{}.pdf", invoice.invoice_number).as_str()));
    let logs = email_logs(&db, invoice.id).await;
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().any(|l| l.status == EmailStatus::Sent));
}

#[tokio::test]
async fn sending_a_sent_invoice_fails() {
    let db = new_test_db().await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let invoice = orders.process_order(sample_order("ORD-1", "kari@example.no")).await.unwrap();
    let api = invoice_api(db, Arc::new(OkMailer), EventProducers::default());
    api.send(&invoice.invoice_number).await.unwrap();
    let err = api.send(&invoice.invoice_number).await.unwrap_err();
    assert!(matches!(err, InvoicingError::AlreadySent(_)));
}

#[tokio::test]
async fn a_successful_send_fires_the_sent_hook() {
    let db = new_test_db().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut hooks = EventHooks::default();
    hooks.on_invoice_sent(move |event| {
        let sink = Arc::clone(&sink);
        Box::pin(async move {
            sink.lock().unwrap().push(event.invoice.invoice_number.clone());
        })
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let invoice = orders.process_order(sample_order("ORD-1", "kari@example.no")).await.unwrap();
    let api = invoice_api(db, Arc::new(OkMailer), producers);
    api.send(&invoice.invoice_number).await.unwrap();

    // The handler runs on a spawned task
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let seen = seen.lock().unwrap();
    assert_eq!(seen.as_slice(), &[invoice.invoice_number]);
}

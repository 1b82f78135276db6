use std::{fmt::Debug, sync::Arc};

use chrono::NaiveDate;
use log::*;

use crate::{
    db_types::{EmailStatus, Invoice, InvoiceNumber, InvoiceStatus},
    events::{EventProducers, InvoiceOverdueEvent, InvoiceSentEvent},
    traits::{InvoicingDatabase, InvoicingError, Mailer, ObjectStore, PdfRenderer},
};

/// `InvoiceApi` drives the invoice lifecycle: the send flow (render, store, mail), credit notes
/// and the overdue sweep.
///
/// The three collaborators are injected, so tests can exercise the ordering guarantees of the
/// send flow without a renderer or an SMTP relay.
pub struct InvoiceApi<B> {
    db: B,
    renderer: Arc<dyn PdfRenderer>,
    store: Arc<dyn ObjectStore>,
    mailer: Arc<dyn Mailer>,
    producers: EventProducers,
}

impl<B> Debug for InvoiceApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InvoiceApi")
    }
}

impl<B> InvoiceApi<B> {
    pub fn new(
        db: B,
        renderer: Arc<dyn PdfRenderer>,
        store: Arc<dyn ObjectStore>,
        mailer: Arc<dyn Mailer>,
        producers: EventProducers,
    ) -> Self {
        Self { db, renderer, store, mailer, producers }
    }
}

impl<B> InvoiceApi<B>
where B: InvoicingDatabase
{
    /// Sends a draft invoice: renders the PDF, stores it, and mails the customer.
    ///
    /// The status only flips to `Sent` after the mailer has accepted the message. A mail failure
    /// leaves the invoice in `Draft` with a failed entry in the email log, so the send can be
    /// retried without re-ingesting anything.
    pub async fn send(&self, number: &InvoiceNumber) -> Result<Invoice, InvoicingError> {
        let details = self
            .db
            .fetch_invoice_details(number)
            .await?
            .ok_or_else(|| InvoicingError::InvoiceNotFound(number.clone()))?;
        if details.invoice.status != InvoiceStatus::Draft {
            return Err(InvoicingError::AlreadySent(number.clone()));
        }
        let recipient = details.customer.email.clone();
        let pdf = self.renderer.render(&details).await?;
        let pdf_url = self.store.store_pdf(number, &pdf).await?;
        trace!("🧾️ Invoice {number} rendered and stored at {pdf_url}");
        if let Err(e) = self.mailer.send_invoice(&details, &pdf_url).await {
            warn!("🧾️ Mail dispatch for {number} failed: {e}. Invoice stays in DRAFT.");
            self.db
                .record_email_outcome(details.invoice.id, &recipient, EmailStatus::Failed, Some(&e.to_string()))
                .await?;
            return Err(InvoicingError::EmailDispatch(e.to_string()));
        }
        let sent = self.db.mark_sent(number, Some(&pdf_url)).await?;
        self.db.record_email_outcome(sent.id, &recipient, EmailStatus::Sent, None).await?;
        self.call_invoice_sent_hook(&sent).await;
        info!("🧾️ Invoice {number} sent to {recipient}");
        Ok(sent)
    }

    /// Issues a credit note against a delivered invoice. Returns `(updated original, note)`.
    pub async fn create_credit_note(
        &self,
        number: &InvoiceNumber,
        reason: Option<&str>,
    ) -> Result<(Invoice, Invoice), InvoicingError> {
        let (original, note) = self.db.insert_credit_note(number, reason).await?;
        for emitter in &self.producers.credit_note_created_producer {
            let event = crate::events::CreditNoteCreatedEvent::new(original.clone(), note.clone());
            emitter.publish_event(event).await;
        }
        Ok((original, note))
    }

    /// Flips delivered invoices past their due date to `Overdue`, firing an event per invoice.
    pub async fn refresh_overdue(&self, today: NaiveDate) -> Result<Vec<Invoice>, InvoicingError> {
        let flipped = self.db.refresh_overdue(today).await?;
        for invoice in &flipped {
            for emitter in &self.producers.invoice_overdue_producer {
                let event = InvoiceOverdueEvent::new(invoice.clone());
                emitter.publish_event(event).await;
            }
        }
        Ok(flipped)
    }

    async fn call_invoice_sent_hook(&self, invoice: &Invoice) {
        for emitter in &self.producers.invoice_sent_producer {
            let event = InvoiceSentEvent::new(invoice.clone());
            emitter.publish_event(event).await;
        }
    }
}

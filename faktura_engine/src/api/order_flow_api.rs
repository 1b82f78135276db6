use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    api::objects::{CancelOutcome, IncomingOrder, InvoiceDetails, InvoiceQueryFilter, OrderUpdate},
    db_types::{Invoice, InvoiceNumber, InvoiceStatus},
    events::{CreditNoteCreatedEvent, EventProducers, InvoiceCreatedEvent, InvoiceOverdueEvent},
    traits::{InvoicingDatabase, InvoicingError},
};

/// `OrderFlowApi` is the primary API for order ingestion and the order-facing queries and
/// mutations: status, listing, draft updates and cancellation.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: InvoicingDatabase
{
    /// Ingests a new order end to end and returns the created draft invoice.
    ///
    /// A repeated `(source, source_order_id)` pair fails with
    /// [`InvoicingError::DuplicateOrder`] carrying the existing invoice number, so callers can
    /// respond idempotently.
    pub async fn process_order(&self, order: IncomingOrder) -> Result<Invoice, InvoicingError> {
        let source = order.source.clone();
        let source_order_id = order.source_order_id.clone();
        let invoice = self.db.insert_incoming_order(order).await?;
        self.call_invoice_created_hook(&invoice).await;
        debug!("🧾️ Order {source}/{source_order_id} ingested as invoice {}", invoice.invoice_number);
        Ok(invoice)
    }

    /// The current status of an ingested order. Overdue flags are refreshed first, so a status
    /// read never reports `Sent` for an invoice past its due date.
    pub async fn order_status(
        &self,
        source: Option<&str>,
        source_order_id: &str,
    ) -> Result<Option<Invoice>, InvoicingError> {
        self.refresh_overdue().await?;
        self.db.fetch_invoice_by_source(source, source_order_id).await
    }

    /// Invoices matching the filter, newest first, capped at the search limit.
    pub async fn list_orders(&self, query: InvoiceQueryFilter) -> Result<Vec<Invoice>, InvoicingError> {
        self.refresh_overdue().await?;
        self.db.search_invoices(query).await
    }

    pub async fn invoice_details(&self, number: &InvoiceNumber) -> Result<Option<InvoiceDetails>, InvoicingError> {
        self.refresh_overdue().await?;
        self.db.fetch_invoice_details(number).await
    }

    /// Applies a partial update to a draft invoice. Non-draft invoices fail with
    /// [`InvoicingError::NotEditable`].
    pub async fn update_order(&self, number: &InvoiceNumber, update: OrderUpdate) -> Result<Invoice, InvoicingError> {
        self.db.update_draft_order(number, update).await
    }

    /// Cancels an order. Drafts are deleted outright; delivered invoices are reversed with a
    /// credit note; paid invoices cannot be cancelled. The caller's reason, if any, ends up on
    /// the audit row.
    pub async fn cancel_order(
        &self,
        number: &InvoiceNumber,
        reason: Option<&str>,
    ) -> Result<CancelOutcome, InvoicingError> {
        let invoice =
            self.db.fetch_invoice(number).await?.ok_or_else(|| InvoicingError::InvoiceNotFound(number.clone()))?;
        match invoice.status {
            InvoiceStatus::Draft => {
                self.db.delete_draft(number, reason).await?;
                info!("🧾️ Draft {number} cancelled and deleted");
                Ok(CancelOutcome::Deleted { invoice_number: number.clone() })
            },
            InvoiceStatus::Sent | InvoiceStatus::PartiallyPaid | InvoiceStatus::Overdue => {
                let (original, note) = self.db.insert_credit_note(number, reason).await?;
                self.call_credit_note_hook(&original, &note).await;
                info!("🧾️ Invoice {number} cancelled with credit note {}", note.invoice_number);
                Ok(CancelOutcome::Credited { invoice: original, credit_note: note })
            },
            InvoiceStatus::Paid => Err(InvoicingError::CannotCancelPaid(number.clone())),
            InvoiceStatus::Credited => Err(InvoicingError::AlreadyCredited(number.clone())),
            InvoiceStatus::Cancelled => Err(InvoicingError::NotEditable(number.clone(), invoice.status)),
        }
    }

    async fn refresh_overdue(&self) -> Result<(), InvoicingError> {
        let flipped = self.db.refresh_overdue(Utc::now().date_naive()).await?;
        for invoice in flipped {
            self.call_invoice_overdue_hook(invoice).await;
        }
        Ok(())
    }

    async fn call_invoice_created_hook(&self, invoice: &Invoice) {
        for emitter in &self.producers.invoice_created_producer {
            let event = InvoiceCreatedEvent::new(invoice.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn call_credit_note_hook(&self, original: &Invoice, note: &Invoice) {
        for emitter in &self.producers.credit_note_created_producer {
            let event = CreditNoteCreatedEvent::new(original.clone(), note.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn call_invoice_overdue_hook(&self, invoice: Invoice) {
        for emitter in &self.producers.invoice_overdue_producer {
            let event = InvoiceOverdueEvent::new(invoice.clone());
            emitter.publish_event(event).await;
        }
    }
}

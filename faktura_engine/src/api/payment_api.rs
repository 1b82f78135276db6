use std::fmt::Debug;

use log::*;

use crate::{
    api::objects::PaymentOutcome,
    db_types::NewPayment,
    events::{EventProducers, InvoicePaidEvent, PaymentPartialEvent},
    traits::{InvoicingDatabase, InvoicingError},
};

/// `PaymentApi` records incoming payments against invoices and fires the matching events.
pub struct PaymentApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for PaymentApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentApi")
    }
}

impl<B> PaymentApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> PaymentApi<B>
where B: InvoicingDatabase
{
    /// Registers a completed payment. The paid total is recomputed from all completed payments
    /// in the same transaction as the insert, and the invoice flips to `PartiallyPaid` or
    /// `Paid` accordingly.
    pub async fn register_payment(&self, payment: NewPayment) -> Result<PaymentOutcome, InvoicingError> {
        let number = payment.invoice_number.clone();
        let outcome = self.db.register_payment(payment).await?;
        if outcome.is_fully_paid() {
            debug!("💰️ Invoice {number} is now fully paid");
            for emitter in &self.producers.invoice_paid_producer {
                let event = InvoicePaidEvent::new(outcome.invoice.clone(), outcome.paid_total);
                emitter.publish_event(event).await;
            }
        } else {
            debug!("💰️ Partial payment on {number}. {} outstanding", outcome.remaining);
            for emitter in &self.producers.payment_partial_producer {
                let event =
                    PaymentPartialEvent::new(outcome.invoice.clone(), outcome.payment.amount, outcome.remaining);
                emitter.publish_event(event).await;
            }
        }
        Ok(outcome)
    }
}

use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    CreditNoteCreatedEvent,
    EventHandler,
    EventProducer,
    Handler,
    InvoiceCreatedEvent,
    InvoiceOverdueEvent,
    InvoicePaidEvent,
    InvoiceSentEvent,
    PaymentPartialEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub invoice_created_producer: Vec<EventProducer<InvoiceCreatedEvent>>,
    pub invoice_sent_producer: Vec<EventProducer<InvoiceSentEvent>>,
    pub invoice_paid_producer: Vec<EventProducer<InvoicePaidEvent>>,
    pub payment_partial_producer: Vec<EventProducer<PaymentPartialEvent>>,
    pub credit_note_created_producer: Vec<EventProducer<CreditNoteCreatedEvent>>,
    pub invoice_overdue_producer: Vec<EventProducer<InvoiceOverdueEvent>>,
}

pub struct EventHandlers {
    pub on_invoice_created: Option<EventHandler<InvoiceCreatedEvent>>,
    pub on_invoice_sent: Option<EventHandler<InvoiceSentEvent>>,
    pub on_invoice_paid: Option<EventHandler<InvoicePaidEvent>>,
    pub on_payment_partial: Option<EventHandler<PaymentPartialEvent>>,
    pub on_credit_note_created: Option<EventHandler<CreditNoteCreatedEvent>>,
    pub on_invoice_overdue: Option<EventHandler<InvoiceOverdueEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_invoice_created = hooks.on_invoice_created.map(|f| EventHandler::new(buffer_size, f));
        let on_invoice_sent = hooks.on_invoice_sent.map(|f| EventHandler::new(buffer_size, f));
        let on_invoice_paid = hooks.on_invoice_paid.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_partial = hooks.on_payment_partial.map(|f| EventHandler::new(buffer_size, f));
        let on_credit_note_created = hooks.on_credit_note_created.map(|f| EventHandler::new(buffer_size, f));
        let on_invoice_overdue = hooks.on_invoice_overdue.map(|f| EventHandler::new(buffer_size, f));
        Self {
            on_invoice_created,
            on_invoice_sent,
            on_invoice_paid,
            on_payment_partial,
            on_credit_note_created,
            on_invoice_overdue,
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_invoice_created {
            result.invoice_created_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_invoice_sent {
            result.invoice_sent_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_invoice_paid {
            result.invoice_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_partial {
            result.payment_partial_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_credit_note_created {
            result.credit_note_created_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_invoice_overdue {
            result.invoice_overdue_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_invoice_created {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_invoice_sent {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_invoice_paid {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_payment_partial {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_credit_note_created {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_invoice_overdue {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_invoice_created: Option<Handler<InvoiceCreatedEvent>>,
    pub on_invoice_sent: Option<Handler<InvoiceSentEvent>>,
    pub on_invoice_paid: Option<Handler<InvoicePaidEvent>>,
    pub on_payment_partial: Option<Handler<PaymentPartialEvent>>,
    pub on_credit_note_created: Option<Handler<CreditNoteCreatedEvent>>,
    pub on_invoice_overdue: Option<Handler<InvoiceOverdueEvent>>,
}

impl EventHooks {
    pub fn on_invoice_created<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(InvoiceCreatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_invoice_created = Some(Arc::new(f));
        self
    }

    pub fn on_invoice_sent<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(InvoiceSentEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_invoice_sent = Some(Arc::new(f));
        self
    }

    pub fn on_invoice_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(InvoicePaidEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_invoice_paid = Some(Arc::new(f));
        self
    }

    pub fn on_payment_partial<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentPartialEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_partial = Some(Arc::new(f));
        self
    }

    pub fn on_credit_note_created<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(CreditNoteCreatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_credit_note_created = Some(Arc::new(f));
        self
    }

    pub fn on_invoice_overdue<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(InvoiceOverdueEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_invoice_overdue = Some(Arc::new(f));
        self
    }
}

//! Domain events emitted by the engine APIs.
//!
//! The `event_name` strings are the wire-level event identifiers used in webhook payloads and
//! endpoint subscriptions.
use fakt_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::Invoice;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceCreatedEvent {
    pub invoice: Invoice,
}

impl InvoiceCreatedEvent {
    pub const EVENT_NAME: &'static str = "invoice.created";

    pub fn new(invoice: Invoice) -> Self {
        Self { invoice }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSentEvent {
    pub invoice: Invoice,
}

impl InvoiceSentEvent {
    pub const EVENT_NAME: &'static str = "invoice.sent";

    pub fn new(invoice: Invoice) -> Self {
        Self { invoice }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoicePaidEvent {
    pub invoice: Invoice,
    pub paid_total: Money,
}

impl InvoicePaidEvent {
    pub const EVENT_NAME: &'static str = "invoice.paid";

    pub fn new(invoice: Invoice, paid_total: Money) -> Self {
        Self { invoice, paid_total }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentPartialEvent {
    pub invoice: Invoice,
    pub amount: Money,
    pub remaining: Money,
}

impl PaymentPartialEvent {
    pub const EVENT_NAME: &'static str = "payment.partial";

    pub fn new(invoice: Invoice, amount: Money, remaining: Money) -> Self {
        Self { invoice, amount, remaining }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditNoteCreatedEvent {
    pub original: Invoice,
    pub credit_note: Invoice,
}

impl CreditNoteCreatedEvent {
    pub const EVENT_NAME: &'static str = "creditnote.created";

    pub fn new(original: Invoice, credit_note: Invoice) -> Self {
        Self { original, credit_note }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceOverdueEvent {
    pub invoice: Invoice,
}

impl InvoiceOverdueEvent {
    pub const EVENT_NAME: &'static str = "invoice.overdue";

    pub fn new(invoice: Invoice) -> Self {
        Self { invoice }
    }
}

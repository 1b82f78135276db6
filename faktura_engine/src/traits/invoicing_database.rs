use chrono::NaiveDate;
use thiserror::Error;

use crate::{
    api::objects::{IncomingOrder, InvoiceDetails, InvoiceQueryFilter, OrderUpdate, PaymentOutcome},
    db_types::{EmailStatus, Invoice, InvoiceNumber, InvoiceStatus, NewPayment},
    traits::CollaboratorError,
};

/// The top-level storage contract for the invoicing engine.
///
/// Backends implement the full order-to-invoice flow as atomic operations: order ingestion,
/// draft mutation, credit notes, payment registration and the overdue sweep each run inside a
/// single transaction. Callers never see partially applied state.
#[allow(async_fn_in_trait)]
pub trait InvoicingDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Ingests a validated order in one transaction: customer upsert (with sequential customer
    /// number assignment), organization resolution, date and total computation, invoice number
    /// and KID generation, line/meta/attachment inserts and the audit record.
    ///
    /// A second order with the same `(source, source_order_id)` fails with
    /// [`InvoicingError::DuplicateOrder`] carrying the existing invoice number, whether caught by
    /// the pre-check or by the unique index under a concurrent race.
    async fn insert_incoming_order(&self, order: IncomingOrder) -> Result<Invoice, InvoicingError>;

    /// Looks up an invoice by its originating order. A `None` source matches any source, for
    /// callers that only know the partner's order id. Credit notes are never returned here since
    /// they carry no source fields.
    async fn fetch_invoice_by_source(
        &self,
        source: Option<&str>,
        source_order_id: &str,
    ) -> Result<Option<Invoice>, InvoicingError>;

    async fn fetch_invoice(&self, number: &InvoiceNumber) -> Result<Option<Invoice>, InvoicingError>;

    /// Fetches the invoice with lines, customer, organization, payments, meta and attachments.
    async fn fetch_invoice_details(&self, number: &InvoiceNumber) -> Result<Option<InvoiceDetails>, InvoicingError>;

    /// Fetches invoices matching the filter, ordered by creation time descending. The row count
    /// is always capped, even when the filter requests more.
    async fn search_invoices(&self, query: InvoiceQueryFilter) -> Result<Vec<Invoice>, InvoicingError>;

    /// Applies a partial update to a draft. Only drafts are editable; any other status fails
    /// with [`InvoicingError::NotEditable`]. When lines are replaced, totals, and the due date if
    /// requested, are recomputed in the same transaction.
    async fn update_draft_order(&self, number: &InvoiceNumber, update: OrderUpdate) -> Result<Invoice, InvoicingError>;

    /// Hard-deletes a draft invoice together with its lines, meta and attachments. The consumed
    /// invoice number is **not** returned to the pool. A caller-supplied reason is recorded on
    /// the audit row.
    async fn delete_draft(&self, number: &InvoiceNumber, reason: Option<&str>) -> Result<(), InvoicingError>;

    /// Creates a credit note reversing the given invoice: mirrored negative lines, negated
    /// totals, a fresh invoice number from the same yearly sequence and a weighted-scheme KID.
    /// The original is marked `Credited` and linked to the note. A caller-supplied reason is
    /// recorded on the audit row.
    ///
    /// Returns `(updated original, credit note)`.
    async fn insert_credit_note(
        &self,
        number: &InvoiceNumber,
        reason: Option<&str>,
    ) -> Result<(Invoice, Invoice), InvoicingError>;

    /// Flips a draft to `Sent`, recording the rendered PDF location and the audit entry.
    async fn mark_sent(&self, number: &InvoiceNumber, pdf_url: Option<&str>) -> Result<Invoice, InvoicingError>;

    /// Registers a completed payment and recomputes the paid total against the invoice total in
    /// the same transaction, flipping the status to `PartiallyPaid` or `Paid` as appropriate.
    async fn register_payment(&self, payment: NewPayment) -> Result<PaymentOutcome, InvoicingError>;

    /// Marks every `Sent` or `PartiallyPaid` invoice with a due date before `today` as
    /// `Overdue`. Returns the flipped invoices.
    async fn refresh_overdue(&self, today: NaiveDate) -> Result<Vec<Invoice>, InvoicingError>;

    /// Records the outcome of an email dispatch attempt for an invoice.
    async fn record_email_outcome(
        &self,
        invoice_id: i64,
        recipient: &str,
        status: EmailStatus,
        error: Option<&str>,
    ) -> Result<(), InvoicingError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), InvoicingError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum InvoicingError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("An invoice for this order already exists: {invoice_number}")]
    DuplicateOrder { invoice_number: InvoiceNumber },
    #[error("Invoice {0} does not exist")]
    InvoiceNotFound(InvoiceNumber),
    #[error("Invoice {0} is {1} and can no longer be edited")]
    NotEditable(InvoiceNumber, InvoiceStatus),
    #[error("Invoice {0} has already been sent")]
    AlreadySent(InvoiceNumber),
    #[error("Invoice {0} has already been credited")]
    AlreadyCredited(InvoiceNumber),
    #[error("Invoice {0} is paid and cannot be cancelled")]
    CannotCancelPaid(InvoiceNumber),
    #[error("Credit notes cannot be issued against credit note {0}")]
    CannotCreditCreditNote(InvoiceNumber),
    #[error("No organization was specified and no default organization is configured")]
    NoOrganization,
    #[error("Organization {0} does not exist")]
    OrganizationNotFound(i64),
    #[error("Invalid order: {0}")]
    InvalidOrder(String),
    #[error("The invoice email could not be dispatched: {0}")]
    EmailDispatch(String),
    #[error("{0}")]
    Collaborator(#[from] CollaboratorError),
}

impl From<sqlx::Error> for InvoicingError {
    fn from(e: sqlx::Error) -> Self {
        InvoicingError::DatabaseError(e.to_string())
    }
}

/// Whether the error is a unique-constraint violation, e.g. on the `(source, source_order_id)`
/// idempotency index.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error().map(|de| de.is_unique_violation()).unwrap_or(false)
}

//! Interface contracts for engine backends and collaborators.
//!
//! * [`InvoicingDatabase`] is the top-level storage contract: order ingestion, invoice
//!   lifecycle, payments and the overdue sweep, each as an atomic operation.
//! * [`CredentialManagement`] covers API credential lookup for request authentication.
//! * [`WebhookStore`] is the persistence side of the outbound webhook dispatcher.
//! * [`PdfRenderer`], [`ObjectStore`] and [`Mailer`] are the injected collaborators of the
//!   invoice send flow.
mod collaborators;
mod credential_management;
mod invoicing_database;
mod webhook_store;

pub use collaborators::{CollaboratorError, Mailer, ObjectStore, PdfRenderer};
pub use credential_management::{AuthenticationError, CredentialManagement};
pub use invoicing_database::{is_unique_violation, InvoicingDatabase, InvoicingError};
pub use webhook_store::{WebhookStore, WebhookStoreError};

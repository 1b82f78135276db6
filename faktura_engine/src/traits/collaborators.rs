//! External collaborators for the invoice send flow.
//!
//! Rendering, storage and mail are injected behind object-safe traits so the send flow can be
//! exercised in tests without touching a renderer, a bucket or an SMTP relay.
use async_trait::async_trait;
use thiserror::Error;

use crate::{api::objects::InvoiceDetails, db_types::InvoiceNumber};

#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    #[error("PDF rendering failed: {0}")]
    Render(String),
    #[error("Object storage failed: {0}")]
    Storage(String),
    #[error("Mail dispatch failed: {0}")]
    Mail(String),
}

/// Renders an invoice to a PDF document.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, details: &InvoiceDetails) -> Result<Vec<u8>, CollaboratorError>;
}

/// Stores rendered documents and returns a stable URL for them.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn store_pdf(&self, invoice_number: &InvoiceNumber, bytes: &[u8]) -> Result<String, CollaboratorError>;
}

/// Delivers the invoice email to the customer.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Returns once the message has been accepted for delivery. The invoice status only flips to
    /// `Sent` after this resolves.
    async fn send_invoice(&self, details: &InvoiceDetails, pdf_url: &str) -> Result<(), CollaboratorError>;
}

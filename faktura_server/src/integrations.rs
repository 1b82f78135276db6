//! Default collaborator implementations for the send flow.
//!
//! These are deliberately small: a text-only PDF renderer, an object store backed by a local
//! directory, and a mailer that logs instead of speaking SMTP. Production deployments swap these
//! for real integrations behind the same traits.
use std::path::PathBuf;

use async_trait::async_trait;
use faktura_engine::{
    api::objects::InvoiceDetails,
    db_types::InvoiceNumber,
    traits::{CollaboratorError, Mailer, ObjectStore, PdfRenderer},
};
use log::*;

/// Renders a single-page, text-only PDF. No external renderer process required.
pub struct BasicPdfRenderer;

#[async_trait]
impl PdfRenderer for BasicPdfRenderer {
    async fn render(&self, details: &InvoiceDetails) -> Result<Vec<u8>, CollaboratorError> {
        let mut text_lines = vec![
            format!("Faktura {}", details.invoice.invoice_number),
            details.organization.name.clone(),
            format!("Kunde: {}", details.customer.name),
            format!("KID: {}", details.invoice.kid),
            format!("Forfallsdato: {}", details.invoice.due_date),
            String::new(),
        ];
        for line in &details.lines {
            text_lines.push(format!(
                "{}  {} x {} {}  = {} {}",
                line.description,
                line.quantity,
                line.unit_price,
                details.invoice.currency,
                line.amount,
                details.invoice.currency
            ));
        }
        text_lines.push(String::new());
        text_lines.push(format!("Netto: {} {}", details.invoice.subtotal, details.invoice.currency));
        text_lines.push(format!("MVA: {} {}", details.invoice.vat_amount, details.invoice.currency));
        text_lines.push(format!("Totalt: {} {}", details.invoice.total_amount, details.invoice.currency));
        Ok(minimal_pdf(&text_lines))
    }
}

/// Builds a valid one-page PDF with the given lines in Helvetica 11pt.
fn minimal_pdf(lines: &[String]) -> Vec<u8> {
    let mut content = String::from("BT /F1 11 Tf 40 800 Td 14 TL\n");
    for line in lines {
        let escaped = line.replace('\\', r"\\").replace('(', r"\(").replace(')', r"\)");
        content.push_str(&format!("({escaped}) Tj T*\n"));
    }
    content.push_str("ET\n");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] /Contents 4 0 R /Resources << /Font << /F1 5 0 R \
         >> >> >>"
            .to_string(),
        format!("<< /Length {} >>\nstream\n{content}endstream", content.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{body}\nendobj\n", i + 1));
    }
    let xref_at = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        pdf.push_str(&format!("{offset:010} 00000 n \n"));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
        objects.len() + 1
    ));
    pdf.into_bytes()
}

/// Writes PDFs under a local directory and hands back `file://` URLs.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn store_pdf(&self, invoice_number: &InvoiceNumber, bytes: &[u8]) -> Result<String, CollaboratorError> {
        let path = self.root.join(format!("{invoice_number}.pdf"));
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| CollaboratorError::Storage(e.to_string()))?;
        tokio::fs::write(&path, bytes).await.map_err(|e| CollaboratorError::Storage(e.to_string()))?;
        debug!("🧾️ Stored {} ({} bytes)", path.display(), bytes.len());
        Ok(format!("file://{}", path.display()))
    }
}

/// Logs the outgoing invoice email instead of delivering it. Stands in until an SMTP relay or
/// transactional-mail provider is wired up.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_invoice(&self, details: &InvoiceDetails, pdf_url: &str) -> Result<(), CollaboratorError> {
        info!(
            "📧️ Invoice {} ({} {}) to {} <{}>. PDF: {pdf_url}",
            details.invoice.invoice_number,
            details.invoice.total_amount,
            details.invoice.currency,
            details.customer.name,
            details.customer.email,
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn minimal_pdf_has_a_header_and_trailer() {
        let pdf = minimal_pdf(&["Faktura 2025-000001".to_string(), "Totalt: 1250.00 NOK".to_string()]);
        let text = String::from_utf8(pdf).unwrap();
        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.ends_with("%%EOF\n"));
        assert!(text.contains("(Faktura 2025-000001) Tj"));
    }

    #[test]
    fn pdf_text_is_escaped() {
        let pdf = minimal_pdf(&["Vedlikehold (juni)".to_string()]);
        let text = String::from_utf8(pdf).unwrap();
        assert!(text.contains(r"(Vedlikehold \(juni\)) Tj"));
    }
}

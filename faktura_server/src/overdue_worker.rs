use chrono::Utc;
use faktura_engine::{db_types::Invoice, InvoiceApi, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

/// Starts the overdue sweep worker. Do not await the returned JoinHandle, as it will run
/// indefinitely.
///
/// Unpaid invoices past their due date flip to `OVERDUE` lazily on reads too; this worker exists
/// so the `invoice.overdue` webhook fires close to the due date even when nobody is polling.
pub fn start_overdue_worker(api: InvoiceApi<SqliteDatabase>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        info!("🕰️ Overdue invoice sweep worker started (every {interval_secs}s)");
        loop {
            timer.tick().await;
            debug!("🕰️ Running overdue invoice sweep");
            match api.refresh_overdue(Utc::now().date_naive()).await {
                Ok(flipped) if flipped.is_empty() => {},
                Ok(flipped) => {
                    info!("🕰️ {} invoices flipped to overdue: {}", flipped.len(), invoice_list(&flipped));
                },
                Err(e) => {
                    error!("🕰️ Error running overdue invoice sweep: {e}");
                },
            }
        }
    })
}

fn invoice_list(invoices: &[Invoice]) -> String {
    invoices
        .iter()
        .map(|i| format!("[{}] due: {} total: {}", i.invoice_number, i.due_date, i.total_amount))
        .collect::<Vec<String>>()
        .join(", ")
}

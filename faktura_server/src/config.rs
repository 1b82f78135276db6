use std::env;

use log::*;

const DEFAULT_FAKT_HOST: &str = "127.0.0.1";
const DEFAULT_FAKT_PORT: u16 = 8420;
const DEFAULT_OVERDUE_SWEEP_SECONDS: u64 = 3600;
const DEFAULT_EVENT_BUFFER_SIZE: usize = 25;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Seconds between runs of the overdue invoice sweep.
    pub overdue_sweep_interval_secs: u64,
    /// Buffer size of the bounded event-hook channels feeding the webhook dispatcher.
    pub event_buffer_size: usize,
    /// Directory where rendered invoice PDFs are written.
    pub pdf_storage_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_FAKT_HOST.to_string(),
            port: DEFAULT_FAKT_PORT,
            database_url: String::default(),
            overdue_sweep_interval_secs: DEFAULT_OVERDUE_SWEEP_SECONDS,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            pdf_storage_dir: "data/pdfs".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("FAKT_HOST").ok().unwrap_or_else(|| DEFAULT_FAKT_HOST.into());
        let port = env::var("FAKT_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for FAKT_PORT. {e} Using the default, {DEFAULT_FAKT_PORT}, \
                         instead."
                    );
                    DEFAULT_FAKT_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_FAKT_PORT);
        let database_url = env::var("FAKT_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ FAKT_DATABASE_URL is not set. Please set it to the URL for the invoicing database.");
            String::default()
        });
        let overdue_sweep_interval_secs = env::var("FAKT_OVERDUE_SWEEP_INTERVAL")
            .map_err(|_| {
                info!(
                    "🪛️ FAKT_OVERDUE_SWEEP_INTERVAL is not set. Using the default of {DEFAULT_OVERDUE_SWEEP_SECONDS} \
                     seconds."
                )
            })
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for FAKT_OVERDUE_SWEEP_INTERVAL. {e}"))
            })
            .ok()
            .unwrap_or(DEFAULT_OVERDUE_SWEEP_SECONDS);
        let event_buffer_size = env::var("FAKT_EVENT_BUFFER_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_EVENT_BUFFER_SIZE);
        let pdf_storage_dir = env::var("FAKT_PDF_STORAGE_DIR").ok().unwrap_or_else(|| "data/pdfs".to_string());
        Self { host, port, database_url, overdue_sweep_interval_secs, event_buffer_size, pdf_storage_dir }
    }
}

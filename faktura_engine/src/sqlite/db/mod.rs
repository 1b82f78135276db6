//! # SQLite database methods
//!
//! "Low-level" database interactions, kept as simple functions that accept a
//! `&mut SqliteConnection`. Callers obtain a connection from the pool, or open a transaction and
//! pass `&mut *tx`, so multi-step operations compose into a single atomic unit without these
//! functions knowing about it.
use std::env;

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod audit;
pub mod credentials;
pub mod customers;
pub mod invoices;
pub mod organizations;
pub mod payments;
pub mod webhooks;

const SQLITE_DB_URL: &str = "sqlite://data/faktura.db";

pub fn db_url() -> String {
    let result = env::var("FAKT_DATABASE_URL").unwrap_or_else(|_| {
        info!("FAKT_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options: SqliteConnectOptions = url.parse::<SqliteConnectOptions>()?.foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

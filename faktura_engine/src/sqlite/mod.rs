pub mod db;
mod sqlite_impl;

pub use sqlite_impl::SqliteDatabase;

/// The engine's embedded migrations, so binaries can bring a database up to date on startup.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

//! # Faktura server
//! The partner-facing HTTP surface of the invoicing pipeline. It is responsible for:
//! * Authenticating partner requests (HMAC-signed mutations, key-only reads).
//! * Converting wire DTOs to engine types at the boundary.
//! * Dispatching outbound webhooks for invoice lifecycle events, with retries.
//! * Running the periodic overdue sweep.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more
//! information.
//!
//! ## Routes
//! * `/health`: liveness check, no authentication.
//! * `/orders/receive`: signed order ingestion, returns the created draft invoice.
//! * `/orders/status/{orderId}`, `/orders/list`, `/orders/invoice/{orderId}`: key-only reads.
//! * `/orders/cancel/{orderId}`, `/orders/update/{orderId}`, `/orders/send/{orderId}`: signed
//!   lifecycle mutations.
//! * `/payments`: signed payment registration.
//! * `/webhooks/retry`: signed sweep over failed webhook deliveries.

pub mod auth;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod integrations;
pub mod overdue_worker;
pub mod routes;
pub mod server;
pub mod webhooks;

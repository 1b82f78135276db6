use thiserror::Error;

use crate::db_types::ApiCredential;

#[derive(Debug, Clone, Error)]
pub enum AuthenticationError {
    #[error("No API key was supplied with the request")]
    MissingCredential,
    #[error("The request timestamp is missing, malformed, or outside the accepted window")]
    RequestExpired,
    #[error("The API key is unknown or has been deactivated")]
    InvalidCredential,
    #[error("The request signature does not match the request body")]
    InvalidSignature,
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for AuthenticationError {
    fn from(e: sqlx::Error) -> Self {
        AuthenticationError::DatabaseError(e.to_string())
    }
}

/// Storage contract for API credential lookup and bookkeeping.
///
/// Credentials are looked up by the SHA-256 hash of the key token, so the raw token never needs
/// to be stored. Inactive credentials are never returned.
#[allow(async_fn_in_trait)]
pub trait CredentialManagement: Clone {
    /// Fetches the active credential whose key hash matches exactly. Returns `None` for unknown
    /// or deactivated keys.
    async fn fetch_credential_by_key_hash(&self, key_hash: &str) -> Result<Option<ApiCredential>, AuthenticationError>;

    /// Stamps `last_used_at` for the credential. Failures here must not fail the request.
    async fn touch_credential(&self, credential_id: i64) -> Result<(), AuthenticationError>;

    /// Registers a new credential and returns the stored record.
    async fn insert_credential(
        &self,
        display_name: &str,
        key_hash: &str,
        secret: &str,
    ) -> Result<ApiCredential, AuthenticationError>;
}

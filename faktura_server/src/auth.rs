//! Request authentication plumbing.
//!
//! Mutating endpoints require the full HMAC handshake: `X-API-Key`, `X-Timestamp` (unix seconds)
//! and `X-Signature` (hex HMAC-SHA256 over `"{timestamp}.{body}"`, computed on the raw request
//! bytes). Read endpoints only require a valid `X-API-Key`.
use actix_web::HttpRequest;
use chrono::Utc;
use faktura_engine::{db_types::ApiCredential, traits::CredentialManagement, CredentialApi};
use log::*;

use crate::errors::ServerError;

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const TIMESTAMP_HEADER: &str = "X-Timestamp";
pub const SIGNATURE_HEADER: &str = "X-Signature";

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Full HMAC authentication against the raw body bytes, before any deserialization.
pub async fn require_signed_request<B: CredentialManagement>(
    req: &HttpRequest,
    body: &[u8],
    api: &CredentialApi<B>,
) -> Result<ApiCredential, ServerError> {
    let credential = api
        .authenticate(
            header(req, API_KEY_HEADER),
            header(req, TIMESTAMP_HEADER),
            header(req, SIGNATURE_HEADER),
            body,
            Utc::now(),
        )
        .await?;
    trace!("🔐️ Signed request authenticated for [{}]", credential.display_name);
    Ok(credential)
}

/// Key-only authentication for read endpoints.
pub async fn require_api_key<B: CredentialManagement>(
    req: &HttpRequest,
    api: &CredentialApi<B>,
) -> Result<ApiCredential, ServerError> {
    let credential = api.authenticate_key_only(header(req, API_KEY_HEADER)).await?;
    trace!("🔐️ Key-only request authenticated for [{}]", credential.display_name);
    Ok(credential)
}

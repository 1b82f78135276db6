use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::ApiCredential,
    helpers::{key_hash, verify},
    traits::{AuthenticationError, CredentialManagement},
};

/// Maximum accepted distance between the request timestamp and server time, in either direction.
/// A request exactly at the boundary is accepted.
pub const MAX_TIMESTAMP_SKEW_SECONDS: i64 = 300;

/// `CredentialApi` authenticates partner requests: API key lookup, timestamp freshness and the
/// HMAC body signature, in that order, so the cheapest checks run first and each failure maps to
/// a distinct error.
#[derive(Debug, Clone)]
pub struct CredentialApi<B> {
    db: B,
}

impl<B> CredentialApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> CredentialApi<B>
where B: CredentialManagement
{
    /// Full request authentication for mutating endpoints.
    ///
    /// The signature covers `"{timestamp}.{body}"` where `body` is the raw request bytes, so
    /// verification happens before any deserialization.
    pub async fn authenticate(
        &self,
        api_key: Option<&str>,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<ApiCredential, AuthenticationError> {
        // An absent header is a missing credential; the more specific errors are reserved for
        // headers that are present but wrong.
        let api_key = match api_key {
            Some(k) if !k.is_empty() => k,
            _ => return Err(AuthenticationError::MissingCredential),
        };
        let timestamp = match timestamp {
            Some(t) if !t.trim().is_empty() => t,
            _ => return Err(AuthenticationError::MissingCredential),
        };
        let signature = match signature {
            Some(s) if !s.is_empty() => s,
            _ => return Err(AuthenticationError::MissingCredential),
        };
        let ts: i64 = timestamp.trim().parse().map_err(|_| AuthenticationError::RequestExpired)?;
        if (now.timestamp() - ts).abs() > MAX_TIMESTAMP_SKEW_SECONDS {
            debug!("🔐️ Request timestamp {ts} outside the accepted window");
            return Err(AuthenticationError::RequestExpired);
        }
        let credential = self
            .db
            .fetch_credential_by_key_hash(&key_hash(api_key))
            .await?
            .ok_or(AuthenticationError::InvalidCredential)?;
        if !verify(credential.secret.reveal(), ts, body, signature) {
            debug!("🔐️ Signature mismatch for credential [{}]", credential.display_name);
            return Err(AuthenticationError::InvalidSignature);
        }
        // Bookkeeping only. A failed stamp must not fail an otherwise valid request.
        if let Err(e) = self.db.touch_credential(credential.id).await {
            warn!("🔐️ Could not stamp last_used_at for credential {}: {e}", credential.id);
        }
        Ok(credential)
    }

    /// Key-only authentication for read endpoints. No freshness or signature rules apply.
    pub async fn authenticate_key_only(&self, api_key: Option<&str>) -> Result<ApiCredential, AuthenticationError> {
        let api_key = match api_key {
            Some(k) if !k.is_empty() => k,
            _ => return Err(AuthenticationError::MissingCredential),
        };
        let credential = self
            .db
            .fetch_credential_by_key_hash(&key_hash(api_key))
            .await?
            .ok_or(AuthenticationError::InvalidCredential)?;
        if let Err(e) = self.db.touch_credential(credential.id).await {
            warn!("🔐️ Could not stamp last_used_at for credential {}: {e}", credential.id);
        }
        Ok(credential)
    }
}

#[cfg(test)]
mod test {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use fakt_common::Secret;

    use super::*;
    use crate::helpers::sign;

    #[derive(Clone, Default)]
    struct MemCredentials {
        by_hash: Arc<Mutex<HashMap<String, ApiCredential>>>,
    }

    impl MemCredentials {
        fn with_key(api_key: &str, secret: &str) -> Self {
            let db = Self::default();
            let cred = ApiCredential {
                id: 1,
                display_name: "test".into(),
                key_hash: key_hash(api_key),
                secret: Secret::new(secret.to_string()),
                is_active: true,
                created_at: Utc::now(),
                last_used_at: None,
            };
            db.by_hash.lock().unwrap().insert(cred.key_hash.clone(), cred);
            db
        }
    }

    impl CredentialManagement for MemCredentials {
        async fn fetch_credential_by_key_hash(
            &self,
            key_hash: &str,
        ) -> Result<Option<ApiCredential>, AuthenticationError> {
            Ok(self.by_hash.lock().unwrap().get(key_hash).cloned())
        }

        async fn touch_credential(&self, _credential_id: i64) -> Result<(), AuthenticationError> {
            Ok(())
        }

        async fn insert_credential(
            &self,
            _display_name: &str,
            _key_hash: &str,
            _secret: &str,
        ) -> Result<ApiCredential, AuthenticationError> {
            unimplemented!("not needed in these tests")
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[tokio::test]
    async fn happy_path_authenticates() {
        let api = CredentialApi::new(MemCredentials::with_key("fakt_key", "s3cret"));
        let body = br#"{"source":"webshop"}"#;
        let ts = now().timestamp();
        let sig = sign("s3cret", ts, body);
        let cred = api.authenticate(Some("fakt_key"), Some(&ts.to_string()), Some(&sig), body, now()).await;
        assert!(cred.is_ok());
    }

    #[tokio::test]
    async fn missing_key_is_distinct_from_bad_key() {
        let api = CredentialApi::new(MemCredentials::with_key("fakt_key", "s3cret"));
        let err = api.authenticate(None, Some("0"), Some("aa"), b"", now()).await.unwrap_err();
        assert!(matches!(err, AuthenticationError::MissingCredential));
        let ts = now().timestamp();
        let sig = sign("s3cret", ts, b"");
        let err =
            api.authenticate(Some("wrong_key"), Some(&ts.to_string()), Some(&sig), b"", now()).await.unwrap_err();
        assert!(matches!(err, AuthenticationError::InvalidCredential));
    }

    #[tokio::test]
    async fn absent_timestamp_or_signature_is_a_missing_credential() {
        let api = CredentialApi::new(MemCredentials::with_key("fakt_key", "s3cret"));
        let body = b"payload";
        let ts = now().timestamp();
        let sig = sign("s3cret", ts, body);
        // Valid key, no timestamp header
        let err = api.authenticate(Some("fakt_key"), None, Some(&sig), body, now()).await.unwrap_err();
        assert!(matches!(err, AuthenticationError::MissingCredential));
        // Valid key and timestamp, no signature header
        let err = api.authenticate(Some("fakt_key"), Some(&ts.to_string()), None, body, now()).await.unwrap_err();
        assert!(matches!(err, AuthenticationError::MissingCredential));
        // Empty header values count as absent too
        let err = api.authenticate(Some("fakt_key"), Some("  "), Some(&sig), body, now()).await.unwrap_err();
        assert!(matches!(err, AuthenticationError::MissingCredential));
        let err = api.authenticate(Some("fakt_key"), Some(&ts.to_string()), Some(""), body, now()).await.unwrap_err();
        assert!(matches!(err, AuthenticationError::MissingCredential));
    }

    #[tokio::test]
    async fn timestamp_window_boundaries() {
        let api = CredentialApi::new(MemCredentials::with_key("fakt_key", "s3cret"));
        let body = b"payload";
        // 300 seconds old: accepted
        let ts = now().timestamp() - 300;
        let sig = sign("s3cret", ts, body);
        assert!(api.authenticate(Some("fakt_key"), Some(&ts.to_string()), Some(&sig), body, now()).await.is_ok());
        // 299 seconds in the future: accepted
        let ts = now().timestamp() + 299;
        let sig = sign("s3cret", ts, body);
        assert!(api.authenticate(Some("fakt_key"), Some(&ts.to_string()), Some(&sig), body, now()).await.is_ok());
        // 301 seconds old: rejected before any signature check
        let ts = now().timestamp() - 301;
        let sig = sign("s3cret", ts, body);
        let err = api.authenticate(Some("fakt_key"), Some(&ts.to_string()), Some(&sig), body, now()).await.unwrap_err();
        assert!(matches!(err, AuthenticationError::RequestExpired));
        // garbage timestamp
        let err = api.authenticate(Some("fakt_key"), Some("yesterday"), Some("aa"), body, now()).await.unwrap_err();
        assert!(matches!(err, AuthenticationError::RequestExpired));
    }

    #[tokio::test]
    async fn tampered_body_fails_signature() {
        let api = CredentialApi::new(MemCredentials::with_key("fakt_key", "s3cret"));
        let ts = now().timestamp();
        let sig = sign("s3cret", ts, b"original body");
        let err = api
            .authenticate(Some("fakt_key"), Some(&ts.to_string()), Some(&sig), b"tampered body", now())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthenticationError::InvalidSignature));
    }

    #[tokio::test]
    async fn key_only_skips_freshness() {
        let api = CredentialApi::new(MemCredentials::with_key("fakt_key", "s3cret"));
        assert!(api.authenticate_key_only(Some("fakt_key")).await.is_ok());
        assert!(matches!(
            api.authenticate_key_only(None).await.unwrap_err(),
            AuthenticationError::MissingCredential
        ));
        assert!(matches!(
            api.authenticate_key_only(Some("wrong")).await.unwrap_err(),
            AuthenticationError::InvalidCredential
        ));
    }
}

//! Bearer-token sessions for the image API.
//!
//! The login service signs HS256 JWTs with `JWT_SECRET` and clients present
//! them as `Authorization: Bearer <token>`. This module verifies them against
//! the same secret. [`SessionKeys::issue`] mints compatible tokens.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, GatewayError, Result};

/// Session token TTL in seconds (30 days).
const SESSION_TTL_SECS: u64 = 30 * 24 * 3600;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionClaims {
    pub subject: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// Wire claims. The login service puts the user id in `id`; `sub` is
/// accepted as well.
#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    #[serde(default)]
    iat: u64,
    exp: u64,
}

impl TokenClaims {
    fn subject(&self) -> Option<String> {
        let id = match &self.id {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        id.or_else(|| self.sub.clone())
            .filter(|s| !s.trim().is_empty())
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// HMAC key material shared with the login service.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: Arc<EncodingKey>,
    decoding: Arc<DecodingKey>,
    ttl: Duration,
}

impl SessionKeys {
    /// Keys for tokens signed with `secret`.
    pub fn from_secret(secret: &str) -> Result<Self> {
        Self::from_bytes(secret.as_bytes())
    }

    /// Keys from `secret`, or a random per-process key when it is unset.
    /// No externally issued token verifies against a random key.
    pub fn from_optional_secret(secret: Option<&str>) -> Result<Self> {
        match secret {
            Some(secret) => Self::from_secret(secret),
            None => {
                tracing::warn!("JWT_SECRET is not set; using a random session key");
                let mut bytes = [0u8; 32];
                OsRng.fill_bytes(&mut bytes);
                Self::from_bytes(&bytes)
            }
        }
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(GatewayError::Config("JWT_SECRET must not be empty".into()));
        }
        Ok(Self {
            encoding: Arc::new(EncodingKey::from_secret(bytes)),
            decoding: Arc::new(DecodingKey::from_secret(bytes)),
            ttl: Duration::from_secs(SESSION_TTL_SECS),
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Mint a session token for `subject`.
    pub fn issue(&self, subject: &str) -> Result<String> {
        self.issue_at(subject, now_secs())
    }

    fn issue_at(&self, subject: &str, issued_at: u64) -> Result<String> {
        let claims = TokenClaims {
            id: Some(Value::String(subject.to_string())),
            sub: None,
            iat: issued_at,
            exp: issued_at + self.ttl.as_secs(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| GatewayError::Auth(format!("Failed to sign session token: {e}")))
    }

    /// Verify signature and expiry of a session token.
    pub fn validate(&self, token: &str) -> Result<SessionClaims> {
        let validation = Validation::new(Algorithm::HS256);
        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &validation)
            .map_err(|e| GatewayError::Auth(format!("Invalid session token: {e}")))?;

        let subject = data
            .claims
            .subject()
            .ok_or_else(|| GatewayError::Auth("Missing subject in token".into()))?;

        Ok(SessionClaims {
            subject,
            issued_at: data.claims.iat,
            expires_at: data.claims.exp,
        })
    }
}

/// Extract a Bearer token from an Authorization header value.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
}

// ---------------------------------------------------------------------------
// Axum extractor
// ---------------------------------------------------------------------------

/// Validates `Authorization: Bearer <token>` and yields the session subject.
///
/// ```ignore
/// async fn handler(SessionAuth(subject): SessionAuth) -> impl IntoResponse { ... }
/// ```
pub struct SessionAuth(pub String);

impl<S> FromRequestParts<S> for SessionAuth
where
    SessionKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(extract_bearer_token)
            .ok_or_else(|| GatewayError::Auth("Not authorized, no token".into()))?;

        let keys = SessionKeys::from_ref(state);
        let claims = keys.validate(token).map_err(|err| {
            tracing::debug!(error = %err, "rejected session token");
            GatewayError::Auth("Not authorized, token failed".into())
        })?;

        Ok(SessionAuth(claims.subject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "test-session-secret";

    fn keys() -> SessionKeys {
        SessionKeys::from_secret(SECRET).unwrap()
    }

    fn sign(claims: &Value, secret: &str) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn token_roundtrip() {
        let keys = keys();
        let token = keys.issue("user-42").unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims = keys.validate(&token).unwrap();
        assert_eq!(claims.subject, "user-42");
        assert!(claims.expires_at > now_secs());
        assert!(claims.issued_at <= now_secs());
    }

    #[test]
    fn login_service_token_is_accepted() {
        let now = now_secs();
        let token = sign(
            &json!({ "id": "65a1f0c2e4b0a1b2c3d4e5f6", "iat": now, "exp": now + 3600 }),
            SECRET,
        );
        let claims = keys().validate(&token).unwrap();
        assert_eq!(claims.subject, "65a1f0c2e4b0a1b2c3d4e5f6");
        assert_eq!(claims.issued_at, now);
    }

    #[test]
    fn sub_claim_is_accepted_as_subject() {
        let now = now_secs();
        let token = sign(&json!({ "sub": "user-9", "exp": now + 60 }), SECRET);
        assert_eq!(keys().validate(&token).unwrap().subject, "user-9");
    }

    #[test]
    fn token_without_subject_is_rejected() {
        let token = sign(&json!({ "exp": now_secs() + 60 }), SECRET);
        assert!(keys().validate(&token).is_err());
    }

    #[test]
    fn token_without_expiry_is_rejected() {
        let token = sign(&json!({ "id": "user-1" }), SECRET);
        assert!(keys().validate(&token).is_err());
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = keys().issue("user-42").unwrap();
        let other = SessionKeys::from_secret("another-secret").unwrap();
        assert!(other.validate(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = keys().with_ttl(Duration::from_secs(60));
        let token = keys.issue_at("user-42", now_secs() - 3600).unwrap();
        assert!(keys.validate(&token).is_err());
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(keys().validate("not.a.token").is_err());
        assert!(keys().validate("").is_err());
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(SessionKeys::from_secret("").is_err());
    }

    #[test]
    fn random_keys_do_not_share_tokens() {
        let a = SessionKeys::from_optional_secret(None).unwrap();
        let b = SessionKeys::from_optional_secret(None).unwrap();
        let token = a.issue("user-1").unwrap();
        assert!(a.validate(&token).is_ok());
        assert!(b.validate(&token).is_err());
    }

    #[test]
    fn extract_bearer() {
        assert_eq!(extract_bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("bearer xyz"), Some("xyz"));
        assert_eq!(extract_bearer_token("Bearer   "), None);
        assert_eq!(extract_bearer_token("Basic abc"), None);
    }
}

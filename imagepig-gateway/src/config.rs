use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::{GatewayError, Result};
use crate::{API_KEY_LEN, DEFAULT_PORT, DEFAULT_PROVIDER_URL, DEFAULT_TIMEOUT_SECS};

const MISSING_KEY_MESSAGE: &str =
    "API service is temporarily unavailable. Please contact administrator.";
const MALFORMED_KEY_MESSAGE: &str = "API configuration error. Please contact administrator.";

/// Validated ImagePig credential.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Trim and validate a raw credential. A blank value counts as missing.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
            tracing::error!("IMAGEPIG_API_KEY is missing from the environment");
            return Err(GatewayError::Config(MISSING_KEY_MESSAGE.into()));
        };
        let trimmed = raw.trim();
        let len = trimmed.chars().count();
        if len != API_KEY_LEN {
            tracing::error!(
                expected = API_KEY_LEN,
                actual = len,
                "IMAGEPIG_API_KEY has an invalid format"
            );
            return Err(GatewayError::Config(MALFORMED_KEY_MESSAGE.into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters followed by an ellipsis, safe for logs.
    pub fn masked(&self) -> String {
        let prefix: String = self.0.chars().take(8).collect();
        format!("{prefix}...")
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiKey").field(&self.masked()).finish()
    }
}

/// Process configuration, loaded once at startup.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Raw `IMAGEPIG_API_KEY`; validated by [`GatewayConfig::validate`] and
    /// again on every provider call.
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
    pub port: u16,
    /// Permitted cross-origin caller. `None` allows any origin.
    pub cors_origin: Option<String>,
    /// Secret the session tokens are keyed from.
    pub session_secret: Option<String>,
}

impl GatewayConfig {
    /// Configuration for a given credential with every other field defaulted.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: DEFAULT_PROVIDER_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            port: DEFAULT_PORT,
            cors_origin: None,
            session_secret: None,
        }
    }

    pub fn load() -> Self {
        let api_key = env::var("IMAGEPIG_API_KEY").ok();
        let base_url =
            env::var("IMAGEPIG_BASE_URL").unwrap_or_else(|_| DEFAULT_PROVIDER_URL.to_string());
        let timeout = env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let cors_origin = env::var("CORS_ORIGIN")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let session_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|value| !value.is_empty());

        GatewayConfig {
            api_key,
            base_url,
            timeout: Duration::from_secs(timeout),
            port,
            cors_origin,
            session_secret,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_session_secret(mut self, secret: impl Into<String>) -> Self {
        self.session_secret = Some(secret.into());
        self
    }

    /// Whether a non-blank credential is configured, valid or not.
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    /// Validate the credential. Called at startup so a bad key stops the
    /// process before it binds a port.
    pub fn validate(&self) -> Result<ApiKey> {
        ApiKey::parse(self.api_key.as_deref())
    }

    /// Report which settings are present, without their values.
    pub fn log_environment(&self) {
        let presence = |set: bool| if set { "SET" } else { "MISSING" };
        tracing::info!(port = self.port, "environment check");
        tracing::info!("IMAGEPIG_API_KEY: {}", presence(self.has_api_key()));
        tracing::info!("JWT_SECRET: {}", presence(self.session_secret.is_some()));
        tracing::info!("MONGO_URI: {}", presence(env::var("MONGO_URI").is_ok()));
        tracing::info!(
            base_url = %self.base_url,
            timeout_secs = self.timeout.as_secs(),
            cors_origin = self.cors_origin.as_deref().unwrap_or("*"),
            "provider settings"
        );
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("port", &self.port)
            .field("cors_origin", &self.cors_origin)
            .field("session_secret", &self.session_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

//! Outbound calls to the ImagePig API and classification of their failures.

use std::fmt;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ApiKey, GatewayConfig};
use crate::error::{GatewayError, Result};
use crate::http::{api_key_headers, build_url, http_client};
use crate::normalize::Operation;

/// A classified provider failure. Exactly one variant describes any failed
/// call; [`ProviderFailure::user_message`] renders it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderFailure {
    /// HTTP 401 or 403.
    Unauthorized,
    /// HTTP 422 with a `detail` array; one message per entry.
    ValidationFailed { details: Vec<String> },
    /// HTTP 422 whose `detail` is present but not a usable array.
    InvalidParameters,
    /// HTTP 422 without any `detail`.
    InvalidFormat,
    /// HTTP 429.
    RateLimited,
    /// No response within the configured timeout.
    TimedOut,
    /// The response body carried its own `error` field.
    ProviderReported { message: String },
    /// The request never produced a response.
    NetworkUnreachable,
    Unknown,
}

impl ProviderFailure {
    pub fn user_message(&self) -> String {
        match self {
            ProviderFailure::Unauthorized => {
                "Authentication failed. Please check your API configuration.".into()
            }
            ProviderFailure::ValidationFailed { details } => details.join(", "),
            ProviderFailure::InvalidParameters => {
                "Invalid request parameters. Please check your input.".into()
            }
            ProviderFailure::InvalidFormat => {
                "Invalid request format. Please check your input parameters.".into()
            }
            ProviderFailure::RateLimited => "Rate limit exceeded. Please try again later.".into(),
            ProviderFailure::TimedOut => {
                "Request timeout. The server is taking too long to respond.".into()
            }
            ProviderFailure::ProviderReported { message } => message.clone(),
            ProviderFailure::NetworkUnreachable => {
                "Network error. Please check your internet connection.".into()
            }
            ProviderFailure::Unknown => "Failed to process image request. Please try again.".into(),
        }
    }

    /// Classify a failed call. Checks run in a fixed priority order and the
    /// first match wins.
    pub fn classify(failure: &CallFailure) -> Self {
        match failure {
            CallFailure::Status { status, body } => classify_status(*status, body.as_ref()),
            CallFailure::Timeout => ProviderFailure::TimedOut,
            CallFailure::Transport(_) => ProviderFailure::NetworkUnreachable,
            CallFailure::Undecodable(_) => ProviderFailure::Unknown,
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}

fn classify_status(status: StatusCode, body: Option<&Value>) -> ProviderFailure {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderFailure::Unauthorized,
        StatusCode::UNPROCESSABLE_ENTITY => {
            match body.and_then(|b| b.get("detail")).filter(|d| truthy(d)) {
                Some(Value::Array(entries)) if !entries.is_empty() => {
                    ProviderFailure::ValidationFailed {
                        details: entries.iter().map(detail_message).collect(),
                    }
                }
                Some(_) => ProviderFailure::InvalidParameters,
                None => ProviderFailure::InvalidFormat,
            }
        }
        StatusCode::TOO_MANY_REQUESTS => ProviderFailure::RateLimited,
        _ => match body.and_then(|b| b.get("error")).filter(|e| truthy(e)) {
            Some(Value::String(message)) => ProviderFailure::ProviderReported {
                message: message.clone(),
            },
            Some(other) => ProviderFailure::ProviderReported {
                message: other.to_string(),
            },
            None => ProviderFailure::Unknown,
        },
    }
}

/// `msg` of one validation entry, or a generic label.
fn detail_message(entry: &Value) -> String {
    match entry.get("msg").filter(|m| truthy(m)) {
        Some(Value::String(msg)) => msg.clone(),
        Some(other) => other.to_string(),
        None => "Validation error".to_string(),
    }
}

/// JSON values the provider uses to mean "nothing here".
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// What went wrong on the wire, before classification.
#[derive(Debug)]
pub enum CallFailure {
    /// The provider answered with a non-success status. `body` is the
    /// response parsed as JSON, if it was JSON.
    Status {
        status: StatusCode,
        body: Option<Value>,
    },
    Timeout,
    /// No response was received.
    Transport(String),
    /// A success response whose body was not JSON.
    Undecodable(String),
}

impl CallFailure {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CallFailure::Timeout
        } else {
            CallFailure::Transport(err.to_string())
        }
    }
}

/// Issues one provider call per [`ProviderGateway::invoke`].
///
/// Holds the raw credential and resolves it on every call, so a gateway
/// built from bad configuration fails before touching the network.
pub struct ProviderGateway {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ProviderGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn credential(&self) -> Result<ApiKey> {
        ApiKey::parse(self.api_key.as_deref())
    }

    pub fn has_credential(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    /// POST `payload` to the provider endpoint for `operation` and return the
    /// response body unmodified. Never retries.
    pub async fn invoke(&self, operation: Operation, payload: &Value) -> Result<Value> {
        let api_key = self.credential()?;
        let endpoint = operation.provider_path();
        let url = build_url(&self.base_url, endpoint)?;
        let headers = api_key_headers(&api_key)?;

        debug!(endpoint, key = %api_key.masked(), "sending request to ImagePig");

        match self.send(url, headers, payload).await {
            Ok(body) => {
                info!(endpoint, "ImagePig request succeeded");
                Ok(body)
            }
            Err(failure) => {
                let classified = ProviderFailure::classify(&failure);
                warn!(endpoint, ?failure, classified = %classified, "ImagePig request failed");
                Err(GatewayError::Provider(classified))
            }
        }
    }

    async fn send(
        &self,
        url: reqwest::Url,
        headers: reqwest::header::HeaderMap,
        payload: &Value,
    ) -> std::result::Result<Value, CallFailure> {
        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(payload)
            .send()
            .await
            .map_err(CallFailure::from_reqwest)?;
        let status = response.status();

        if !status.is_success() {
            // A body we cannot read still leaves the status to classify on.
            let body = match response.bytes().await {
                Ok(bytes) => serde_json::from_slice(&bytes).ok(),
                Err(err) if err.is_timeout() => return Err(CallFailure::Timeout),
                Err(_) => None,
            };
            return Err(CallFailure::Status { status, body });
        }

        let bytes = response.bytes().await.map_err(|err| {
            if err.is_timeout() {
                CallFailure::Timeout
            } else {
                CallFailure::Undecodable(format!("Failed to read response body: {err}"))
            }
        })?;
        serde_json::from_slice(&bytes).map_err(|err| {
            CallFailure::Undecodable(format!("Invalid provider response JSON: {err}"))
        })
    }
}

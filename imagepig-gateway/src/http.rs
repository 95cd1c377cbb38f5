use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Url};
use std::time::Duration;

use crate::config::ApiKey;
use crate::error::{GatewayError, Result};

/// Header ImagePig reads the credential from.
pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("api-key");

/// Append `path` to `base`, keeping any path prefix `base` already has.
pub fn build_url(base: &str, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|err| {
        GatewayError::Internal(format!("Invalid provider URL '{joined}': {err}"))
    })
}

pub fn api_key_headers(api_key: &ApiKey) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let mut value = HeaderValue::from_str(api_key.as_str()).map_err(|_| {
        GatewayError::Config("API configuration error. Please contact administrator.".into())
    })?;
    value.set_sensitive(true);
    headers.insert(API_KEY_HEADER, value);

    Ok(headers)
}

pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| GatewayError::Internal(format!("Failed to build HTTP client: {err}")))
}

//! Gateway between authenticated callers and the ImagePig image API.
//!
//! This crate provides the request normalizer, the provider gateway, session
//! auth and the axum router that ties them together. The binary crate only
//! loads configuration, installs logging and serves the router.

pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod image_api;
pub mod normalize;
pub mod session_auth;

pub use config::{ApiKey, GatewayConfig};
pub use error::{ApiError, GatewayError};
pub use gateway::{ProviderFailure, ProviderGateway};
pub use image_api::{AppState, image_api_router};
pub use normalize::{Operation, normalize};
pub use session_auth::{SessionAuth, SessionKeys};

pub const DEFAULT_PROVIDER_URL: &str = "https://api.imagepig.com";
pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Inbound JSON bodies carry base64 images, so the limit is generous.
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;
/// Required credential length after trimming.
pub const API_KEY_LEN: usize = 36;

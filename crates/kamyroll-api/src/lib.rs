//! Typed access to the Kamyroll backend: the media model, explicit JSON
//! decoders, the HTTP transport seam and the API client with its retry loop.

pub mod client;
pub mod decode;
pub mod error;
pub mod media;
pub mod retry;
pub mod service;
pub mod transport;

pub use client::{ApiClient, ApiClientConfig, Credentials, MediaRequest};
pub use error::{ApiError, Result};
pub use media::*;
pub use service::{Channel, ConfigHandle, Service, ServiceConfig, UrlMatch};
pub use transport::{HttpTransport, ReqwestTransport};

//! Sync layer: the commerce platform's HTTP API behind the extractor's query service.

pub mod retry;
pub use retry::RetryPolicy;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{ClientConfig, CommerceClient, SyncError};

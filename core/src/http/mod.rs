pub mod client;
#[cfg(test)]
pub(crate) mod mock;

pub use client::HttpIssuer;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Outcome;

/// Performs one request against the configured target.
///
/// Called concurrently from many request tasks; implementations must turn
/// every transport problem into an `Outcome` rather than an error.
#[async_trait]
pub trait RequestIssuer: Send + Sync {
    async fn issue(&self) -> Outcome;
}

pub type IssuerRef = Arc<dyn RequestIssuer>;

/// Maps a transport error onto the two failure buckets.
/// Timeouts are cancellations; everything else is a fault.
pub fn classify(error: &reqwest::Error) -> Outcome {
    match error {
        e if e.is_timeout() => Outcome::TimedOut,
        _ => Outcome::Failed,
    }
}

/// Parses the load target, accepting only http and https URLs.
pub fn parse_target(target: &str) -> crate::error::Result<url::Url> {
    let url = url::Url::parse(target)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(crate::error::GeneratorError::invalid(format!(
            "unsupported target scheme '{}', expected http or https",
            other
        ))),
    }
}

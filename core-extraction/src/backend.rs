//! Backend seam shared by every extraction service adapter.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::http::HttpResponse;
use serde::{Deserialize, Serialize};

/// A playable audio stream for one video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioResult {
    pub audio_url: String,
    pub title: String,
    pub thumbnail: String,
}

/// Why a backend could not deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Timeout,
    Network(String),
    HttpStatus(u16),
    /// The service answered but flagged the request as failed
    ErrorFlagged(String),
    MalformedPayload(String),
    NoStreams,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Timeout => f.write_str("timed out"),
            SkipReason::Network(e) => write!(f, "network error: {}", e),
            SkipReason::HttpStatus(status) => write!(f, "HTTP {}", status),
            SkipReason::ErrorFlagged(detail) => write!(f, "service error: {}", detail),
            SkipReason::MalformedPayload(e) => write!(f, "malformed payload: {}", e),
            SkipReason::NoStreams => f.write_str("no audio streams"),
        }
    }
}

/// Parse result of one backend attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOutcome {
    Ok(AudioResult),
    Skip(SkipReason),
}

impl BackendOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, BackendOutcome::Ok(_))
    }
}

/// One extraction service instance.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Label used in logs and events, e.g. `piped:https://pipedapi.kavin.rocks`
    fn name(&self) -> &str;

    /// Upper bound for one `fetch`; the chain enforces it.
    fn timeout(&self) -> Duration;

    /// Queries the service once. Never retries.
    async fn fetch(&self, video_id: &str) -> BackendOutcome;
}

/// Anything that can turn a video id into an audio stream.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// `None` when no source could be resolved.
    async fn extract(&self, video_id: &str) -> Option<AudioResult>;
}

/// Maps transport failures and non-2xx statuses to a skip, then parses JSON.
pub(crate) fn json_body<T>(
    response: bridge_traits::error::Result<HttpResponse>,
) -> std::result::Result<T, SkipReason>
where
    T: serde::de::DeserializeOwned,
{
    let response = response.map_err(|e| match e {
        bridge_traits::error::BridgeError::Timeout(_) => SkipReason::Timeout,
        other => SkipReason::Network(other.to_string()),
    })?;

    if !response.is_success() {
        return Err(SkipReason::HttpStatus(response.status));
    }

    serde_json::from_slice(&response.body).map_err(|e| SkipReason::MalformedPayload(e.to_string()))
}

//! Piped adapter
//!
//! `GET {instance}/streams/{videoId}` returns every stream of the video; the
//! adapter picks one audio stream from the list.

use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, RetryPolicy};
use core_library::youtube_thumbnail_url;
use serde::Deserialize;
use tracing::debug;

use crate::backend::{json_body, AudioResult, BackendOutcome, ExtractionBackend, SkipReason};

/// Container preferred for playback compatibility.
pub const PREFERRED_MIME_TYPE: &str = "audio/mp4";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PipedResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    audio_streams: Option<Vec<PipedStream>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PipedStream {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    bitrate: Option<u64>,
}

pub struct PipedBackend {
    name: String,
    instance: String,
    http_client: Arc<dyn HttpClient>,
    timeout: Duration,
    user_agent: String,
}

impl PipedBackend {
    pub fn new(
        instance: impl Into<String>,
        http_client: Arc<dyn HttpClient>,
        timeout: Duration,
        user_agent: impl Into<String>,
    ) -> Self {
        let instance = instance.into();
        Self {
            name: format!("piped:{}", instance),
            instance,
            http_client,
            timeout,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl ExtractionBackend for PipedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, video_id: &str) -> BackendOutcome {
        let url = format!(
            "{}/streams/{}",
            self.instance.trim_end_matches('/'),
            video_id
        );
        debug!(backend = %self.name, video_id, "Requesting streams from Piped");

        let request = HttpRequest::get(url)
            .accept_json()
            .user_agent(self.user_agent.as_str())
            .timeout(self.timeout);
        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::none())
            .await;

        match json_body::<PipedResponse>(response) {
            Ok(body) => parse_piped_response(video_id, body),
            Err(reason) => BackendOutcome::Skip(reason),
        }
    }
}

pub(crate) fn parse_piped_response(video_id: &str, body: PipedResponse) -> BackendOutcome {
    let streams = body.audio_streams.unwrap_or_default();
    let Some(best) = select_stream(&streams) else {
        return BackendOutcome::Skip(SkipReason::NoStreams);
    };

    debug!(
        mime_type = best.mime_type.as_deref().unwrap_or_default(),
        bitrate = best.bitrate.unwrap_or_default(),
        "Selected Piped audio stream"
    );

    BackendOutcome::Ok(AudioResult {
        audio_url: best.url.clone().unwrap_or_default(),
        title: body
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
        thumbnail: body
            .thumbnail_url
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| youtube_thumbnail_url(video_id)),
    })
}

/// Keeps audio streams with a URL, then orders by preferred container first
/// and bitrate descending. Ties keep response order.
pub(crate) fn select_stream(streams: &[PipedStream]) -> Option<&PipedStream> {
    let mut candidates: Vec<&PipedStream> = streams
        .iter()
        .filter(|s| s.url.as_deref().is_some_and(|u| !u.is_empty()))
        .filter(|s| s.mime_type.as_deref().is_some_and(|m| m.starts_with("audio/")))
        .collect();

    candidates.sort_by_key(|s| {
        let preferred = s
            .mime_type
            .as_deref()
            .is_some_and(|m| m.starts_with(PREFERRED_MIME_TYPE));
        (!preferred, Reverse(s.bitrate.unwrap_or(0)))
    });
    candidates.first().copied()
}

//! Cobalt adapter
//!
//! `POST {instance}` with the watch URL; the service answers with a single
//! best stream (`tunnel`/`redirect`) or a `picker` list.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, RetryPolicy};
use core_library::{youtube_thumbnail_url, youtube_watch_url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::backend::{json_body, AudioResult, BackendOutcome, ExtractionBackend, SkipReason};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CobaltRequest<'a> {
    url: &'a str,
    download_mode: &'a str,
    audio_format: &'a str,
    audio_bitrate: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CobaltResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    picker: Option<Vec<PickerItem>>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PickerItem {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

pub struct CobaltBackend {
    name: String,
    instance: String,
    http_client: Arc<dyn HttpClient>,
    timeout: Duration,
    user_agent: String,
}

impl CobaltBackend {
    pub fn new(
        instance: impl Into<String>,
        http_client: Arc<dyn HttpClient>,
        timeout: Duration,
        user_agent: impl Into<String>,
    ) -> Self {
        let instance = instance.into();
        Self {
            name: format!("cobalt:{}", instance),
            instance,
            http_client,
            timeout,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl ExtractionBackend for CobaltBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, video_id: &str) -> BackendOutcome {
        let watch_url = youtube_watch_url(video_id);
        let request = HttpRequest::post(self.instance.as_str())
            .accept_json()
            .user_agent(self.user_agent.as_str())
            .timeout(self.timeout)
            .json(&CobaltRequest {
                url: &watch_url,
                download_mode: "audio",
                audio_format: "mp3",
                audio_bitrate: "320",
            });

        let request = match request {
            Ok(request) => request,
            Err(e) => return BackendOutcome::Skip(SkipReason::Network(e.to_string())),
        };

        debug!(backend = %self.name, video_id, "Requesting audio from Cobalt");
        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::none())
            .await;

        match json_body::<CobaltResponse>(response) {
            Ok(body) => parse_cobalt_response(video_id, body),
            Err(reason) => BackendOutcome::Skip(reason),
        }
    }
}

pub(crate) fn parse_cobalt_response(video_id: &str, body: CobaltResponse) -> BackendOutcome {
    let title = body
        .filename
        .clone()
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());
    let result = |audio_url: String| {
        BackendOutcome::Ok(AudioResult {
            audio_url,
            title: title.clone(),
            thumbnail: youtube_thumbnail_url(video_id),
        })
    };

    match body.status.as_deref() {
        Some("error") => {
            let detail = body
                .error
                .as_ref()
                .and_then(|e| e.get("code"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .or(body.text)
                .unwrap_or_else(|| "unknown".to_string());
            BackendOutcome::Skip(SkipReason::ErrorFlagged(detail))
        }
        Some("tunnel") | Some("redirect") => match body.url.filter(|u| !u.is_empty()) {
            Some(url) => result(url),
            None => BackendOutcome::Skip(SkipReason::NoStreams),
        },
        Some("picker") => {
            let items = body.picker.unwrap_or_default();
            let first_has_url = items
                .first()
                .and_then(|item| item.url.as_deref())
                .is_some_and(|u| !u.is_empty());
            if !first_has_url {
                return BackendOutcome::Skip(SkipReason::NoStreams);
            }

            items
                .iter()
                .find(|item| {
                    item.kind.as_deref() == Some("audio")
                        || item.url.as_deref().is_some_and(|u| u.contains("audio"))
                })
                .or_else(|| items.first())
                .and_then(|item| item.url.clone())
                .map(result)
                .unwrap_or(BackendOutcome::Skip(SkipReason::NoStreams))
        }
        other => BackendOutcome::Skip(SkipReason::MalformedPayload(format!(
            "unexpected status {:?}",
            other
        ))),
    }
}

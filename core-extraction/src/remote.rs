//! Hosted extraction function client
//!
//! `POST {endpoint}` with `{"videoId": ...}`. The function runs the fallback
//! chain server-side and answers `{audioUrl, title, thumbnail}` on success or
//! `{error}` with a non-2xx status when every source is down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, RetryPolicy};
use core_runtime::config::ExtractionApiConfig;
use core_runtime::events::{CoreEvent, EventBus, ExtractionEvent};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::backend::{json_body, AudioExtractor, AudioResult};
use crate::error::{ExtractionError, Result};

const BACKEND_NAME: &str = "remote";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoteRequest<'a> {
    video_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteResponse {
    #[serde(default)]
    audio_url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct RemoteExtractor {
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    http_client: Arc<dyn HttpClient>,
    event_bus: Option<EventBus>,
}

impl RemoteExtractor {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        http_client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            timeout,
            http_client,
            event_bus: None,
        }
    }

    pub fn from_config(
        config: &ExtractionApiConfig,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self> {
        let endpoint = config
            .remote_endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| {
                ExtractionError::Config("remote extraction requires an endpoint".to_string())
            })?;

        Ok(Self::new(
            endpoint,
            config.remote_api_key.clone(),
            config.remote_timeout,
            http_client,
        ))
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    fn emit(&self, event: ExtractionEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Extraction(event));
        }
    }

    async fn request(&self, video_id: &str) -> std::result::Result<AudioResult, String> {
        let mut request = HttpRequest::post(self.endpoint.as_str())
            .accept_json()
            .timeout(self.timeout)
            .json(&RemoteRequest { video_id })
            .map_err(|e| e.to_string())?;
        if let Some(key) = &self.api_key {
            request = request.bearer_token(key.as_str()).header("apikey", key.as_str());
        }

        let response = tokio::time::timeout(
            self.timeout,
            self.http_client
                .execute_with_retry(request, RetryPolicy::none()),
        )
        .await
        .map_err(|_| "timed out".to_string())?;

        let body: RemoteResponse = json_body(response).map_err(|reason| reason.to_string())?;
        if let Some(error) = body.error {
            return Err(error);
        }

        let audio_url = body
            .audio_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| "response has no audioUrl".to_string())?;

        Ok(AudioResult {
            audio_url,
            title: body.title.unwrap_or_else(|| "Unknown".to_string()),
            thumbnail: body
                .thumbnail
                .unwrap_or_else(|| core_library::youtube_thumbnail_url(video_id)),
        })
    }
}

#[async_trait]
impl AudioExtractor for RemoteExtractor {
    #[instrument(skip(self))]
    async fn extract(&self, video_id: &str) -> Option<AudioResult> {
        match self.request(video_id).await {
            Ok(result) => {
                info!("Remote extraction resolved audio");
                self.emit(ExtractionEvent::Resolved {
                    video_id: video_id.to_string(),
                    backend: BACKEND_NAME.to_string(),
                });
                Some(result)
            }
            Err(reason) => {
                warn!(reason = %reason, "Remote extraction failed");
                self.emit(ExtractionEvent::BackendSkipped {
                    video_id: video_id.to_string(),
                    backend: BACKEND_NAME.to_string(),
                    reason,
                });
                self.emit(ExtractionEvent::Exhausted {
                    video_id: video_id.to_string(),
                    attempts: 1,
                });
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_endpoint() {
        struct Unused;

        #[async_trait]
        impl HttpClient for Unused {
            async fn execute(
                &self,
                _request: HttpRequest,
            ) -> bridge_traits::error::Result<bridge_traits::http::HttpResponse> {
                Err(bridge_traits::error::BridgeError::NotAvailable("unused".into()))
            }
        }

        let result = RemoteExtractor::from_config(&ExtractionApiConfig::default(), Arc::new(Unused));
        assert!(matches!(result, Err(ExtractionError::Config(_))));
    }
}

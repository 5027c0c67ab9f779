//! Sequential fallback driver.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::http::HttpClient;
use core_runtime::config::{ExtractionApiConfig, FeatureFlags};
use core_runtime::events::{CoreEvent, EventBus, ExtractionEvent};
use tracing::{debug, info, instrument, warn};

use crate::backend::{AudioExtractor, AudioResult, BackendOutcome, ExtractionBackend, SkipReason};
use crate::cobalt::CobaltBackend;
use crate::error::{ExtractionError, Result};
use crate::piped::PipedBackend;
use crate::remote::RemoteExtractor;

/// Ordered list of backends tried one after another.
///
/// Each backend is asked at most once per extraction and bounded by its own
/// timeout. The first `Ok` wins and no later backend is contacted.
pub struct ExtractionChain {
    backends: Vec<Arc<dyn ExtractionBackend>>,
    event_bus: Option<EventBus>,
}

impl ExtractionChain {
    pub fn new(backends: Vec<Arc<dyn ExtractionBackend>>) -> Result<Self> {
        if backends.is_empty() {
            return Err(ExtractionError::NoBackends);
        }
        Ok(Self {
            backends,
            event_bus: None,
        })
    }

    /// Cobalt instances first, then Piped instances, in configured order.
    pub fn from_config(
        config: &ExtractionApiConfig,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self> {
        let cobalt = config.cobalt_instances.iter().map(|instance| {
            Arc::new(CobaltBackend::new(
                instance.as_str(),
                http_client.clone(),
                config.cobalt_timeout,
                config.user_agent.as_str(),
            )) as Arc<dyn ExtractionBackend>
        });
        let piped = config.piped_instances.iter().map(|instance| {
            Arc::new(PipedBackend::new(
                instance.as_str(),
                http_client.clone(),
                config.piped_timeout,
                config.user_agent.as_str(),
            )) as Arc<dyn ExtractionBackend>
        });

        Self::new(cobalt.chain(piped).collect())
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    fn emit(&self, event: ExtractionEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Extraction(event));
        }
    }
}

#[async_trait]
impl AudioExtractor for ExtractionChain {
    #[instrument(skip(self), fields(backends = self.backends.len()))]
    async fn extract(&self, video_id: &str) -> Option<AudioResult> {
        for backend in &self.backends {
            debug!(backend = backend.name(), "Trying extraction backend");

            let outcome = match tokio::time::timeout(backend.timeout(), backend.fetch(video_id)).await
            {
                Ok(outcome) => outcome,
                Err(_) => BackendOutcome::Skip(SkipReason::Timeout),
            };

            match outcome {
                BackendOutcome::Ok(result) => {
                    info!(backend = backend.name(), "Resolved audio stream");
                    self.emit(ExtractionEvent::Resolved {
                        video_id: video_id.to_string(),
                        backend: backend.name().to_string(),
                    });
                    return Some(result);
                }
                BackendOutcome::Skip(reason) => {
                    warn!(backend = backend.name(), reason = %reason, "Extraction backend skipped");
                    self.emit(ExtractionEvent::BackendSkipped {
                        video_id: video_id.to_string(),
                        backend: backend.name().to_string(),
                        reason: reason.to_string(),
                    });
                }
            }
        }

        warn!(attempts = self.backends.len(), "All extraction backends failed");
        self.emit(ExtractionEvent::Exhausted {
            video_id: video_id.to_string(),
            attempts: self.backends.len(),
        });
        None
    }
}

/// Builds the extractor selected by the feature flags: the hosted function
/// when remote extraction is enabled, the local chain otherwise.
pub fn build_extractor(
    config: &ExtractionApiConfig,
    features: &FeatureFlags,
    http_client: Arc<dyn HttpClient>,
    event_bus: EventBus,
) -> Result<Arc<dyn AudioExtractor>> {
    if features.enable_remote_extraction {
        let remote = RemoteExtractor::from_config(config, http_client)?.with_event_bus(event_bus);
        return Ok(Arc::new(remote));
    }

    let chain = ExtractionChain::from_config(config, http_client)?.with_event_bus(event_bus);
    info!(backends = ?chain.backend_names(), "Extraction chain ready");
    Ok(Arc::new(chain))
}

//! Playback bridge traits.
//!
//! The player core never decodes audio. It asks the host for a handle on a
//! playable URL (an `<audio>` element, a native media player, a test fake) and
//! drives that handle through play/pause/seek/volume calls, sampling its
//! position on a timer.

use async_trait::async_trait;

use crate::error::Result;

/// One loaded audio source.
///
/// Control calls are synchronous: they only forward a command to the host's
/// player and never wait for audio to change. Positions and durations are in
/// seconds.
pub trait AudioHandle: Send + Sync {
    /// Start or resume output.
    ///
    /// # Errors
    ///
    /// Fails when the source cannot be decoded or the host refuses to play it.
    fn play(&self) -> Result<()>;

    fn pause(&self);

    /// Stop output and release host resources. The handle is unusable afterwards.
    fn stop(&self);

    fn seek(&self, position_secs: f64);

    /// Normalized to `0.0..=1.0`.
    fn set_volume(&self, volume: f32);

    fn position(&self) -> f64;

    /// `None` until the host knows the duration (metadata not loaded yet).
    fn duration(&self) -> Option<f64>;

    /// Live playing state as reported by the host player.
    fn is_playing(&self) -> bool;

    /// True once the source has played to its natural end.
    fn is_ended(&self) -> bool;
}

/// Factory for [`AudioHandle`]s.
///
/// Platform implementations:
/// - **Web**: wraps `new Audio(url)`
/// - **Desktop/mobile**: wraps the native media player
/// - **Tests**: scripted fakes
#[async_trait]
pub trait AudioEngine: Send + Sync {
    /// Create a handle for `url` without starting output.
    ///
    /// # Errors
    ///
    /// Fails when the URL is unsupported or cannot be opened.
    async fn open(&self, url: &str) -> Result<Box<dyn AudioHandle>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use mockall::mock;

    mock! {
        Engine {}

        #[async_trait]
        impl AudioEngine for Engine {
            async fn open(&self, url: &str) -> Result<Box<dyn AudioHandle>>;
        }
    }

    #[tokio::test]
    async fn test_engine_open_error_propagates() {
        let mut engine = MockEngine::new();
        engine
            .expect_open()
            .withf(|url| url.starts_with("blob:"))
            .returning(|url| Err(BridgeError::NotAvailable(url.to_string())));

        let result = engine.open("blob:local-1").await;
        assert!(matches!(result, Err(BridgeError::NotAvailable(_))));
    }
}

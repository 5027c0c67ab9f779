//! Equalizer state
//!
//! Six gain sliders in dB plus the name of the active preset. The values are
//! cosmetic: nothing in the playback path reads them.

use std::fmt;
use std::sync::Arc;

use bridge_traits::storage::SettingsStore;
use core_runtime::events::{EventBus, LibraryEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::instrument;

use super::{emit, load_document, save_document, EQUALIZER_KEY};
use crate::error::{LibraryError, Result};

pub const BAND_COUNT: usize = 6;

/// Slider labels, lowest band first.
pub const BAND_LABELS: [&str; BAND_COUNT] = ["60Hz", "230Hz", "910Hz", "3.6kHz", "14kHz", "16kHz"];

/// Gain range of a band in dB.
pub const MIN_GAIN_DB: f32 = -12.0;
pub const MAX_GAIN_DB: f32 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EqualizerPreset {
    Flat,
    Rock,
    Pop,
    Jazz,
    Classical,
    #[serde(rename = "Bass Boost")]
    BassBoost,
    /// Set once any band is edited by hand
    Custom,
}

impl EqualizerPreset {
    /// The presets a user can pick, in display order.
    pub const ALL: [EqualizerPreset; 6] = [
        EqualizerPreset::Flat,
        EqualizerPreset::Rock,
        EqualizerPreset::Pop,
        EqualizerPreset::Jazz,
        EqualizerPreset::Classical,
        EqualizerPreset::BassBoost,
    ];

    /// Band values of the preset; `None` for `Custom`.
    pub fn values(self) -> Option<[f32; BAND_COUNT]> {
        match self {
            EqualizerPreset::Flat => Some([0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            EqualizerPreset::Rock => Some([5.0, 3.0, -1.0, -1.0, 3.0, 5.0]),
            EqualizerPreset::Pop => Some([-1.0, 2.0, 5.0, 5.0, 2.0, -1.0]),
            EqualizerPreset::Jazz => Some([3.0, 0.0, 2.0, 2.0, 0.0, 3.0]),
            EqualizerPreset::Classical => Some([4.0, 3.0, 0.0, 0.0, 3.0, 4.0]),
            EqualizerPreset::BassBoost => Some([6.0, 4.0, 0.0, 0.0, 0.0, 0.0]),
            EqualizerPreset::Custom => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EqualizerPreset::Flat => "Flat",
            EqualizerPreset::Rock => "Rock",
            EqualizerPreset::Pop => "Pop",
            EqualizerPreset::Jazz => "Jazz",
            EqualizerPreset::Classical => "Classical",
            EqualizerPreset::BassBoost => "Bass Boost",
            EqualizerPreset::Custom => "Custom",
        }
    }
}

impl fmt::Display for EqualizerPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stored shape: `{"values": [..6], "activePreset": "Flat"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EqualizerState {
    pub values: [f32; BAND_COUNT],
    pub active_preset: EqualizerPreset,
}

impl Default for EqualizerState {
    fn default() -> Self {
        Self {
            values: [0.0; BAND_COUNT],
            active_preset: EqualizerPreset::Flat,
        }
    }
}

pub struct EqualizerStore {
    store: Arc<dyn SettingsStore>,
    event_bus: EventBus,
    state: RwLock<EqualizerState>,
}

impl EqualizerStore {
    pub async fn open(store: Arc<dyn SettingsStore>, event_bus: EventBus) -> Result<Self> {
        let state: EqualizerState = load_document(store.as_ref(), EQUALIZER_KEY).await?;
        Ok(Self {
            store,
            event_bus,
            state: RwLock::new(state),
        })
    }

    pub async fn state(&self) -> EqualizerState {
        self.state.read().await.clone()
    }

    /// Sets one band, clamped to ±12 dB, and marks the preset `Custom`.
    #[instrument(skip(self))]
    pub async fn set_band(&self, band: usize, gain_db: f32) -> Result<EqualizerState> {
        if band >= BAND_COUNT {
            return Err(LibraryError::InvalidInput {
                field: "band".to_string(),
                message: format!("band {} out of range 0..{}", band, BAND_COUNT),
            });
        }
        if !gain_db.is_finite() {
            return Err(LibraryError::InvalidInput {
                field: "gain_db".to_string(),
                message: "gain must be a finite number".to_string(),
            });
        }

        let mut next = self.state().await;
        next.values[band] = gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
        next.active_preset = EqualizerPreset::Custom;
        self.replace(next).await
    }

    /// Loads a preset's values. `Custom` keeps the current values.
    #[instrument(skip(self))]
    pub async fn apply_preset(&self, preset: EqualizerPreset) -> Result<EqualizerState> {
        let mut next = self.state().await;
        if let Some(values) = preset.values() {
            next.values = values;
        }
        next.active_preset = preset;
        self.replace(next).await
    }

    pub async fn reset(&self) -> Result<EqualizerState> {
        self.apply_preset(EqualizerPreset::Flat).await
    }

    async fn replace(&self, next: EqualizerState) -> Result<EqualizerState> {
        let mut state = self.state.write().await;
        save_document(self.store.as_ref(), EQUALIZER_KEY, &next).await?;
        *state = next.clone();
        drop(state);

        emit(
            &self.event_bus,
            LibraryEvent::EqualizerChanged {
                preset: next.active_preset.name().to_string(),
            },
        );
        Ok(next)
    }
}

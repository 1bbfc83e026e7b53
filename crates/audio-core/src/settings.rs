use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::effects::{AudioQuality, EqualizerPreset, VoiceEffect};
use crate::gain::VolumeConfig;

const MIN_BITRATE: u32 = 16_000;
const MAX_BITRATE: u32 = 320_000;

/// Kind of media a request refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Audio,
    Video,
}

/// Per-request voice settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Volume percentage as shown to users
    pub volume: u16,
    pub effect: VoiceEffect,
    pub equalizer: EqualizerPreset,
    pub quality: AudioQuality,
    /// Explicit bitrate, overrides `quality`
    pub bitrate: Option<u32>,
    pub kind: MediaKind,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            volume: 100,
            effect: VoiceEffect::None,
            equalizer: EqualizerPreset::Normal,
            quality: AudioQuality::High,
            bitrate: None,
            kind: MediaKind::Audio,
        }
    }
}

impl VoiceSettings {
    pub fn with_volume(volume: u16) -> Self {
        Self { volume, ..Self::default() }
    }

    /// Settings clamped into the given volume range and bitrate bounds
    pub fn normalized(mut self, volume: &VolumeConfig) -> Self {
        let clamped = volume.clamp(self.volume);
        if clamped != self.volume {
            warn!(requested = self.volume, clamped, "volume outside configured range");
            self.volume = clamped;
        }
        if let Some(bitrate) = self.bitrate {
            let bounded = bitrate.clamp(MIN_BITRATE, MAX_BITRATE);
            if bounded != bitrate {
                warn!(requested = bitrate, bounded, "bitrate outside supported range");
            }
            self.bitrate = Some(bounded);
        }
        self
    }

    /// Encoder bitrate in bits per second
    pub fn bitrate(&self) -> u32 {
        self.bitrate
            .map(|b| b.clamp(MIN_BITRATE, MAX_BITRATE))
            .unwrap_or_else(|| self.quality.bitrate())
    }

    /// Bitrate formatted for the converter, e.g. `256k`
    pub fn bitrate_arg(&self) -> String {
        format!("{}k", self.bitrate() / 1000)
    }
}

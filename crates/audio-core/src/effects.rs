//! Voice effects, equalizer presets and output quality

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chain::EqBand;
use crate::error::AudioError;

/// Character effect applied after the EQ stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceEffect {
    #[default]
    None,
    Robot,
    Echo,
    Chipmunk,
    Deep,
    Underwater,
}

impl VoiceEffect {
    pub const ALL: [VoiceEffect; 6] = [
        VoiceEffect::None,
        VoiceEffect::Robot,
        VoiceEffect::Echo,
        VoiceEffect::Chipmunk,
        VoiceEffect::Deep,
        VoiceEffect::Underwater,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceEffect::None => "none",
            VoiceEffect::Robot => "robot",
            VoiceEffect::Echo => "echo",
            VoiceEffect::Chipmunk => "chipmunk",
            VoiceEffect::Deep => "deep",
            VoiceEffect::Underwater => "underwater",
        }
    }

    /// Filter stages for this effect at the given output rate
    pub fn filters(&self, sample_rate: u32) -> Vec<String> {
        match self {
            VoiceEffect::None => Vec::new(),
            VoiceEffect::Robot => vec![
                "vibrato=f=60:d=1".to_string(),
                "aphaser=type=s:speed=2".to_string(),
            ],
            VoiceEffect::Echo => vec!["aecho=0.8:0.88:60:0.4".to_string()],
            VoiceEffect::Chipmunk => pitch_shift(sample_rate, 1.5),
            VoiceEffect::Deep => pitch_shift(sample_rate, 0.75),
            VoiceEffect::Underwater => vec![
                "lowpass=f=500".to_string(),
                "aecho=0.8:0.7:40:0.3".to_string(),
            ],
        }
    }
}

// shift pitch by `factor` while keeping duration
fn pitch_shift(sample_rate: u32, factor: f64) -> Vec<String> {
    let shifted = (f64::from(sample_rate) * factor).round() as u32;
    vec![
        format!("asetrate={}", shifted),
        format!("aresample={}", sample_rate),
        format!("atempo={:.4}", 1.0 / factor),
    ]
}

impl fmt::Display for VoiceEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoiceEffect {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == wanted)
            .ok_or_else(|| AudioError::UnknownEffect(s.to_string()))
    }
}

/// Equalizer preset layered on top of the tier's own EQ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EqualizerPreset {
    #[default]
    Normal,
    Rock,
    Vocal,
    Electronic,
    Classical,
    Loud,
}

impl EqualizerPreset {
    pub const ALL: [EqualizerPreset; 6] = [
        EqualizerPreset::Normal,
        EqualizerPreset::Rock,
        EqualizerPreset::Vocal,
        EqualizerPreset::Electronic,
        EqualizerPreset::Classical,
        EqualizerPreset::Loud,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EqualizerPreset::Normal => "normal",
            EqualizerPreset::Rock => "rock",
            EqualizerPreset::Vocal => "vocal",
            EqualizerPreset::Electronic => "electronic",
            EqualizerPreset::Classical => "classical",
            EqualizerPreset::Loud => "loud",
        }
    }

    pub fn bands(&self) -> Vec<EqBand> {
        match self {
            EqualizerPreset::Normal => Vec::new(),
            EqualizerPreset::Rock => vec![
                EqBand::new(100.0, 100.0, 4.0),
                EqBand::new(1000.0, 500.0, -2.0),
                EqBand::new(8000.0, 4000.0, 4.0),
            ],
            EqualizerPreset::Vocal => vec![
                EqBand::new(200.0, 150.0, -2.0),
                EqBand::new(2500.0, 1500.0, 4.0),
                EqBand::new(6000.0, 2000.0, 2.0),
            ],
            EqualizerPreset::Electronic => vec![
                EqBand::new(60.0, 60.0, 5.0),
                EqBand::new(1000.0, 500.0, -1.0),
                EqBand::new(10000.0, 4000.0, 4.0),
            ],
            EqualizerPreset::Classical => vec![
                EqBand::new(250.0, 200.0, 1.0),
                EqBand::new(4000.0, 2000.0, 2.0),
            ],
            EqualizerPreset::Loud => vec![
                EqBand::new(80.0, 80.0, 4.0),
                EqBand::new(3000.0, 2000.0, 3.0),
                EqBand::new(12000.0, 4000.0, 3.0),
            ],
        }
    }
}

impl fmt::Display for EqualizerPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EqualizerPreset {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == wanted)
            .ok_or_else(|| AudioError::UnknownEqualizer(s.to_string()))
    }
}

/// Output quality, selects the encoder bitrate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Low,
    Medium,
    #[default]
    High,
}

impl AudioQuality {
    /// Bitrate in bits per second
    pub fn bitrate(&self) -> u32 {
        match self {
            AudioQuality::Low => 64_000,
            AudioQuality::Medium => 128_000,
            AudioQuality::High => 256_000,
        }
    }
}

impl FromStr for AudioQuality {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(AudioQuality::Low),
            "medium" => Ok(AudioQuality::Medium),
            "high" => Ok(AudioQuality::High),
            _ => Err(AudioError::UnknownQuality(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("Robot".parse::<VoiceEffect>().unwrap(), VoiceEffect::Robot);
        assert_eq!(" vocal ".parse::<EqualizerPreset>().unwrap(), EqualizerPreset::Vocal);
        assert!("karaoke".parse::<VoiceEffect>().is_err());
        assert!(matches!("ultra".parse::<AudioQuality>(), Err(AudioError::UnknownQuality(_))));
    }

    #[test]
    fn test_pitch_shift_restores_rate() {
        let filters = VoiceEffect::Chipmunk.filters(48000);
        assert_eq!(filters, vec!["asetrate=72000", "aresample=48000", "atempo=0.6667"]);
        assert!(VoiceEffect::None.filters(48000).is_empty());
    }

    #[test]
    fn test_quality_bitrates() {
        assert_eq!(AudioQuality::default().bitrate(), 256_000);
        assert_eq!(AudioQuality::Low.bitrate(), 64_000);
    }
}

//! Processing chain descriptors
//!
//! A [`ChainTable`] holds tiers of increasing aggressiveness. The tier is chosen by
//! gain multiplier and expanded into a [`ProcessingChainSpec`], which renders to
//! the filter graph passed to the converter:
//!
//! ```text
//! highpass -> lowpass -> volume -> acompressor(s) -> dynaudnorm -> equalizer(s)
//!          -> extra filters -> alimiter -> aresample
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{AudioError, Result};

/// One compressor stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorStage {
    pub threshold_db: f64,
    pub ratio: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
    /// Linear makeup gain (1.0 - 64.0)
    pub makeup: f64,
}

impl CompressorStage {
    pub const fn new(threshold_db: f64, ratio: f64, attack_ms: f64, release_ms: f64, makeup: f64) -> Self {
        Self { threshold_db, ratio, attack_ms, release_ms, makeup }
    }
}

/// One parametric EQ band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqBand {
    pub frequency_hz: f64,
    pub width_hz: f64,
    pub gain_db: f64,
}

impl EqBand {
    pub const fn new(frequency_hz: f64, width_hz: f64, gain_db: f64) -> Self {
        Self { frequency_hz, width_hz, gain_db }
    }
}

/// A discrete aggressiveness level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainTier {
    pub name: String,
    /// Lowest gain multiplier this tier applies to
    pub min_multiplier: f64,
    pub highpass_hz: f64,
    pub lowpass_hz: f64,
    pub compressors: Vec<CompressorStage>,
    /// Adaptive loudness normalization
    pub normalize: bool,
    pub eq: Vec<EqBand>,
    pub limiter_ceiling_db: f64,
}

impl ChainTier {
    /// Sum of positive EQ gains
    pub fn eq_emphasis(&self) -> f64 {
        self.eq.iter().map(|b| b.gain_db.max(0.0)).sum()
    }
}

/// Ordered set of tiers plus the output sample rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainTable {
    pub tiers: Vec<ChainTier>,
    pub resample_hz: u32,
}

impl Default for ChainTable {
    fn default() -> Self {
        let tier = |name: &str, min_multiplier, compressors, normalize, eq, limiter_ceiling_db| ChainTier {
            name: name.to_string(),
            min_multiplier,
            highpass_hz: 120.0,
            lowpass_hz: 14000.0,
            compressors,
            normalize,
            eq,
            limiter_ceiling_db,
        };

        Self {
            tiers: vec![
                tier(
                    "clean",
                    0.0,
                    vec![CompressorStage::new(-18.0, 2.0, 10.0, 100.0, 1.0)],
                    false,
                    vec![],
                    -1.0,
                ),
                tier(
                    "boost",
                    1.0,
                    vec![CompressorStage::new(-14.0, 6.0, 5.0, 50.0, 1.0)],
                    false,
                    vec![EqBand::new(3000.0, 2000.0, 1.5)],
                    -1.0,
                ),
                tier(
                    "loud",
                    4.0,
                    vec![
                        CompressorStage::new(-16.0, 4.0, 5.0, 80.0, 1.0),
                        CompressorStage::new(-10.0, 8.0, 3.0, 40.0, 1.0),
                    ],
                    true,
                    vec![EqBand::new(100.0, 100.0, 2.0), EqBand::new(3000.0, 2000.0, 2.0)],
                    -1.5,
                ),
                tier(
                    "extreme",
                    16.0,
                    vec![
                        CompressorStage::new(-18.0, 4.0, 5.0, 80.0, 1.0),
                        CompressorStage::new(-12.0, 8.0, 3.0, 40.0, 1.0),
                        CompressorStage::new(-6.0, 20.0, 1.0, 20.0, 1.0),
                    ],
                    true,
                    vec![EqBand::new(100.0, 100.0, 2.0), EqBand::new(3000.0, 2000.0, 3.0)],
                    -2.0,
                ),
            ],
            resample_hz: 48000,
        }
    }
}

impl ChainTable {
    /// Check tier ordering and limiter rules
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(AudioError::InvalidChain(msg));

        if self.tiers.is_empty() {
            return invalid("chain table has no tiers".into());
        }
        if self.resample_hz == 0 {
            return invalid("resample_hz must be positive".into());
        }

        for tier in &self.tiers {
            if tier.limiter_ceiling_db >= 0.0 {
                return invalid(format!(
                    "tier '{}' limiter ceiling {} dB is not below 0 dBFS",
                    tier.name, tier.limiter_ceiling_db
                ));
            }
            if tier.highpass_hz <= 0.0 || tier.highpass_hz >= tier.lowpass_hz {
                return invalid(format!(
                    "tier '{}' band {}..{} Hz is empty",
                    tier.name, tier.highpass_hz, tier.lowpass_hz
                ));
            }
        }

        for pair in self.tiers.windows(2) {
            let (lower, upper) = (&pair[0], &pair[1]);
            if upper.min_multiplier <= lower.min_multiplier {
                return invalid(format!("tier '{}' is not above '{}'", upper.name, lower.name));
            }
            if upper.compressors.len() < lower.compressors.len() {
                return invalid(format!("tier '{}' has fewer compressor stages than '{}'", upper.name, lower.name));
            }
            if upper.limiter_ceiling_db > lower.limiter_ceiling_db {
                return invalid(format!("tier '{}' raises the limiter ceiling over '{}'", upper.name, lower.name));
            }
            if upper.eq_emphasis() < lower.eq_emphasis() {
                return invalid(format!("tier '{}' has less EQ emphasis than '{}'", upper.name, lower.name));
            }
        }
        Ok(())
    }

    /// Tier for a multiplier: the highest one whose `min_multiplier` is not above it
    pub fn tier_for(&self, multiplier: f64) -> Option<&ChainTier> {
        self.tiers
            .iter()
            .rev()
            .find(|t| t.min_multiplier <= multiplier)
            .or_else(|| self.tiers.first())
    }

    /// Expand the chain for `multiplier`
    pub fn chain(&self, multiplier: f64) -> ProcessingChainSpec {
        match self.tier_for(multiplier) {
            Some(tier) => ProcessingChainSpec {
                multiplier,
                tier: tier.name.clone(),
                highpass_hz: tier.highpass_hz,
                lowpass_hz: tier.lowpass_hz,
                compressors: tier.compressors.clone(),
                normalize: tier.normalize,
                eq: tier.eq.clone(),
                extra_filters: Vec::new(),
                limiter_ceiling_db: tier.limiter_ceiling_db,
                resample_hz: self.resample_hz,
            },
            None => ProcessingChainSpec::passthrough(multiplier, self.resample_hz),
        }
    }
}

/// Fully resolved chain for one transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingChainSpec {
    pub multiplier: f64,
    pub tier: String,
    pub highpass_hz: f64,
    pub lowpass_hz: f64,
    pub compressors: Vec<CompressorStage>,
    pub normalize: bool,
    pub eq: Vec<EqBand>,
    /// Pre-rendered filters (voice effects) inserted before the limiter
    pub extra_filters: Vec<String>,
    pub limiter_ceiling_db: f64,
    pub resample_hz: u32,
}

impl ProcessingChainSpec {
    /// Gain and a limiter only; used when a table has no tiers
    pub fn passthrough(multiplier: f64, resample_hz: u32) -> Self {
        Self {
            multiplier,
            tier: "passthrough".into(),
            highpass_hz: 20.0,
            lowpass_hz: 20000.0,
            compressors: Vec::new(),
            normalize: false,
            eq: Vec::new(),
            extra_filters: Vec::new(),
            limiter_ceiling_db: -1.0,
            resample_hz,
        }
    }

    pub fn with_eq_bands(mut self, bands: impl IntoIterator<Item = EqBand>) -> Self {
        self.eq.extend(bands);
        self
    }

    pub fn with_filters(mut self, filters: impl IntoIterator<Item = String>) -> Self {
        self.extra_filters.extend(filters);
        self
    }

    /// Render as an ffmpeg `-af` filter graph
    pub fn render(&self) -> String {
        let mut stages = vec![
            format!("highpass=f={}", self.highpass_hz),
            format!("lowpass=f={}", self.lowpass_hz),
            format!("volume={:.3}:precision=fixed", self.multiplier),
        ];

        stages.extend(self.compressors.iter().map(|c| {
            format!(
                "acompressor=threshold={}dB:ratio={}:attack={}:release={}:makeup={}",
                c.threshold_db, c.ratio, c.attack_ms, c.release_ms, c.makeup
            )
        }));

        if self.normalize {
            stages.push("dynaudnorm=f=150:g=15".to_string());
        }

        stages.extend(self.eq.iter().map(|b| {
            format!(
                "equalizer=f={}:width_type=h:width={}:g={}",
                b.frequency_hz, b.width_hz, b.gain_db
            )
        }));

        stages.extend(self.extra_filters.iter().cloned());
        stages.push(format!("alimiter=limit={}dB", self.limiter_ceiling_db));
        stages.push(format!("aresample={}", self.resample_hz));
        stages.join(",")
    }
}

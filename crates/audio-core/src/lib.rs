//! # callcast audio core
//!
//! Pure, synchronous building blocks for the loudness pipeline:
//!
//! - [`gain`]: maps a UI volume percentage to a gain multiplier
//! - [`chain`]: maps a gain multiplier to a tiered processing chain and renders it
//!   as a converter filter graph
//! - [`effects`]: voice effects, equalizer presets and output quality
//! - [`settings`]: per-request voice settings
//!
//! [`LoudnessPipeline`] ties the pieces together:
//!
//! ```
//! use callcast_audio_core::{LoudnessPipeline, VoiceSettings};
//!
//! let pipeline = LoudnessPipeline::standard();
//! let chain = pipeline.chain_for(&VoiceSettings::with_volume(150));
//! assert!(chain.render().contains("alimiter"));
//! ```

pub mod chain;
pub mod effects;
pub mod error;
pub mod gain;
pub mod settings;

pub use chain::{ChainTable, ChainTier, CompressorStage, EqBand, ProcessingChainSpec};
pub use effects::{AudioQuality, EqualizerPreset, VoiceEffect};
pub use error::{AudioError, Result};
pub use gain::{GainBand, GainCurve, GainMapper, VolumeConfig};
pub use settings::{MediaKind, VoiceSettings};

/// Gain mapper and chain table used together to derive a chain for a request
#[derive(Debug, Clone)]
pub struct LoudnessPipeline {
    mapper: GainMapper,
    table: ChainTable,
}

impl LoudnessPipeline {
    /// Build a pipeline, validating both halves
    pub fn new(volume: VolumeConfig, table: ChainTable) -> Result<Self> {
        table.validate()?;
        Ok(Self {
            mapper: GainMapper::new(volume)?,
            table,
        })
    }

    /// 10–200% linear mapping with the default chain table
    pub fn standard() -> Self {
        Self {
            mapper: GainMapper::from_validated(VolumeConfig::standard()),
            table: ChainTable::default(),
        }
    }

    pub fn mapper(&self) -> &GainMapper {
        &self.mapper
    }

    pub fn table(&self) -> &ChainTable {
        &self.table
    }

    /// Derive the full chain for a set of voice settings.
    ///
    /// Equalizer preset bands are appended after the tier's own EQ and the voice
    /// effect filters run before the limiter.
    pub fn chain_for(&self, settings: &VoiceSettings) -> ProcessingChainSpec {
        let multiplier = self.mapper.gain(settings.volume);
        let sample_rate = self.table.resample_hz;
        self.table
            .chain(multiplier)
            .with_eq_bands(settings.equalizer.bands())
            .with_filters(settings.effect.filters(sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_rejects_invalid_table() {
        let mut table = ChainTable::default();
        table.tiers.clear();
        assert!(LoudnessPipeline::new(VolumeConfig::standard(), table).is_err());
    }

    #[test]
    fn test_effect_filters_sit_before_limiter() {
        let pipeline = LoudnessPipeline::standard();
        let settings = VoiceSettings {
            effect: VoiceEffect::Echo,
            ..VoiceSettings::with_volume(100)
        };
        let graph = pipeline.chain_for(&settings).render();
        let echo = graph.find("aecho").unwrap();
        let limiter = graph.find("alimiter").unwrap();
        assert!(echo < limiter);
    }
}

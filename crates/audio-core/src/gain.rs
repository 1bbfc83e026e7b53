//! Loudness mapper
//!
//! Converts the volume percentage shown to users into the gain multiplier fed to
//! the processing chain. 100% is always unity gain; values below attenuate
//! linearly and values above boost along the configured [`GainCurve`].

use serde::{Deserialize, Serialize};

use crate::error::{AudioError, Result};

/// One step of a stepped curve: at or above `min_percent` the gain is `multiplier`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainBand {
    pub min_percent: u16,
    pub multiplier: f64,
}

/// Shape of the boost region above 100%
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum GainCurve {
    /// Straight ramp from 1.0 at 100% to `max_multiplier` at the configured maximum
    Linear { max_multiplier: f64 },
    /// Discrete bands, stored in ascending `min_percent` order
    Stepped { bands: Vec<GainBand> },
}

impl GainCurve {
    /// Bands used by the extreme preset
    pub fn default_bands() -> Vec<GainBand> {
        [(200, 12.0), (300, 24.0), (400, 36.0), (500, 48.0), (600, 60.0)]
            .into_iter()
            .map(|(min_percent, multiplier)| GainBand { min_percent, multiplier })
            .collect()
    }
}

/// Volume range plus mapping shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub min_percent: u16,
    pub max_percent: u16,
    /// Volume applied when a request does not specify one
    pub default_percent: u16,
    pub curve: GainCurve,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl VolumeConfig {
    /// 10–200%, linear boost up to 12x
    pub fn standard() -> Self {
        Self {
            min_percent: 10,
            max_percent: 200,
            default_percent: 100,
            curve: GainCurve::Linear { max_multiplier: 12.0 },
        }
    }

    /// 1–600%, stepped boost up to 60x
    pub fn extreme() -> Self {
        Self {
            min_percent: 1,
            max_percent: 600,
            default_percent: 100,
            curve: GainCurve::Stepped { bands: GainCurve::default_bands() },
        }
    }

    pub fn with_max_percent(mut self, max_percent: u16) -> Self {
        self.max_percent = max_percent;
        self
    }

    pub fn with_curve(mut self, curve: GainCurve) -> Self {
        self.curve = curve;
        self
    }

    /// Clamp a requested percentage into the configured range
    pub fn clamp(&self, percent: u16) -> u16 {
        percent.clamp(self.min_percent, self.max_percent)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(AudioError::InvalidVolumeConfig(msg));

        if self.min_percent == 0 {
            return invalid("min_percent must be at least 1".into());
        }
        if self.min_percent > 100 {
            return invalid(format!("min_percent {} is above 100", self.min_percent));
        }
        if self.max_percent < 100 {
            return invalid(format!("max_percent {} is below 100", self.max_percent));
        }
        if !(self.min_percent..=self.max_percent).contains(&self.default_percent) {
            return invalid(format!(
                "default_percent {} outside {}..={}",
                self.default_percent, self.min_percent, self.max_percent
            ));
        }

        match &self.curve {
            GainCurve::Linear { max_multiplier } => {
                if !max_multiplier.is_finite() || *max_multiplier < 1.0 {
                    return invalid(format!("max_multiplier {} must be >= 1.0", max_multiplier));
                }
            }
            GainCurve::Stepped { bands } => {
                let mut previous: Option<&GainBand> = None;
                for band in bands {
                    if band.min_percent <= 100 {
                        return invalid(format!("band threshold {}% must be above 100%", band.min_percent));
                    }
                    if !band.multiplier.is_finite() || band.multiplier < 1.0 {
                        return invalid(format!("band multiplier {} must be >= 1.0", band.multiplier));
                    }
                    if let Some(prev) = previous {
                        if band.min_percent <= prev.min_percent || band.multiplier < prev.multiplier {
                            return invalid(format!(
                                "bands must be ascending: {}%->{} follows {}%->{}",
                                band.min_percent, band.multiplier, prev.min_percent, prev.multiplier
                            ));
                        }
                    }
                    previous = Some(band);
                }
            }
        }
        Ok(())
    }
}

/// Maps volume percentages to gain multipliers
#[derive(Debug, Clone)]
pub struct GainMapper {
    config: VolumeConfig,
}

impl GainMapper {
    pub fn new(config: VolumeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Skip validation for the built-in presets
    pub(crate) fn from_validated(config: VolumeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    /// Gain multiplier for `percent`, clamped to the configured range first.
    /// Monotonic non-decreasing, and exactly 1.0 at 100%.
    pub fn gain(&self, percent: u16) -> f64 {
        let p = self.config.clamp(percent);
        if p <= 100 {
            return f64::from(p) / 100.0;
        }

        match &self.config.curve {
            GainCurve::Linear { max_multiplier } => {
                let span = f64::from(self.config.max_percent) - 100.0;
                if span <= 0.0 {
                    return 1.0;
                }
                1.0 + (f64::from(p) - 100.0) / span * (max_multiplier - 1.0)
            }
            GainCurve::Stepped { bands } => {
                if let Some(band) = bands.iter().rev().find(|b| p >= b.min_percent) {
                    return band.multiplier;
                }
                match bands.first() {
                    // ramp from unity up to the first band
                    Some(first) => {
                        let span = f64::from(first.min_percent) - 100.0;
                        1.0 + (f64::from(p) - 100.0) / span * (first.multiplier - 1.0)
                    }
                    None => 1.0,
                }
            }
        }
    }
}

// file: src/config.rs
// description: Typed configuration for the rotary encoder and nucleus sampler, with JSON loading.
// author: cipher-rc5

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

use crate::error::ConfigError;

/// Construction parameters of [`crate::rope::RotaryEmbedding`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotaryConfig {
    #[serde(
        alias = "rope_theta",
        alias = "base",
        default = "default_max_wavelength"
    )]
    pub max_wavelength: f64,
    #[serde(default = "default_scaling_factor")]
    pub scaling_factor: f64,
    #[serde(default = "default_sequence_axis")]
    pub sequence_axis: isize,
    #[serde(default = "default_feature_axis")]
    pub feature_axis: isize,
}

impl Default for RotaryConfig {
    fn default() -> Self {
        Self {
            max_wavelength: default_max_wavelength(),
            scaling_factor: default_scaling_factor(),
            sequence_axis: default_sequence_axis(),
            feature_axis: default_feature_axis(),
        }
    }
}

impl RotaryConfig {
    /// Checks everything that does not depend on the input rank.
    pub fn validate(&self) -> Result<()> {
        if !is_positive(self.max_wavelength) {
            return Err(ConfigError::InvalidWavelength(self.max_wavelength).into());
        }
        if !is_positive(self.scaling_factor) {
            return Err(ConfigError::InvalidScalingFactor(self.scaling_factor).into());
        }
        // Mixed-sign axes can only be compared once the rank is known.
        if self.sequence_axis == self.feature_axis {
            return Err(ConfigError::SameAxes(self.sequence_axis).into());
        }
        Ok(())
    }

    /// Normalizes negative axes against `rank` and checks they are distinct.
    pub fn resolve_axes(&self, rank: usize) -> Result<(usize, usize)> {
        if rank < 2 {
            return Err(ConfigError::RankTooSmall(rank).into());
        }
        let sequence_axis = normalize_axis(self.sequence_axis, rank)?;
        let feature_axis = normalize_axis(self.feature_axis, rank)?;
        if sequence_axis == feature_axis {
            return Err(ConfigError::SameAxes(sequence_axis as isize).into());
        }
        Ok((sequence_axis, feature_axis))
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn normalize_axis(axis: isize, rank: usize) -> Result<usize> {
    let resolved = if axis < 0 { rank as isize + axis } else { axis };
    if resolved < 0 || resolved >= rank as isize {
        return Err(ConfigError::AxisOutOfRange { axis, rank }.into());
    }
    Ok(resolved as usize)
}

/// Construction parameters of [`crate::sampler::NucleusSampler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NucleusConfig {
    #[serde(alias = "top_p", default = "default_p")]
    pub p: f32,
    #[serde(alias = "top_k", default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for NucleusConfig {
    fn default() -> Self {
        Self {
            p: default_p(),
            k: None,
            seed: None,
            temperature: default_temperature(),
        }
    }
}

impl NucleusConfig {
    pub fn validate(&self) -> Result<()> {
        let p_in_range = self.p > 0.0 && self.p <= 1.0;
        if !p_in_range {
            return Err(ConfigError::InvalidProbability(self.p).into());
        }
        if let Some(k) = self.k {
            // The upper bound is checked per call, once vocab_size is known.
            if k == 0 {
                return Err(ConfigError::InvalidTopK { k, vocab_size: 0 }.into());
            }
        }
        if !is_positive(f64::from(self.temperature)) {
            return Err(ConfigError::InvalidTemperature(self.temperature).into());
        }
        Ok(())
    }

    /// Number of sorted candidates kept before the nucleus cut.
    pub fn cutoff(&self, vocab_size: usize) -> Result<usize> {
        match self.k {
            None => Ok(vocab_size),
            Some(k) if (1..=vocab_size).contains(&k) => Ok(k),
            Some(k) => Err(ConfigError::InvalidTopK { k, vocab_size }.into()),
        }
    }
}

/// Both components' settings, as read from a single JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodingConfig {
    #[serde(alias = "rope", default)]
    pub rotary: RotaryConfig,
    #[serde(alias = "sampling", default)]
    pub sampler: NucleusConfig,
}

impl DecodingConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open decoding config at {:?}", path))?;
        let config: DecodingConfig = serde_json::from_reader(file)
            .with_context(|| format!("Failed to parse decoding config at {:?}", path))?;
        config.rotary.validate()?;
        config.sampler.validate()?;
        Ok(config)
    }
}

fn default_max_wavelength() -> f64 {
    10_000.0
}

fn default_scaling_factor() -> f64 {
    1.0
}

fn default_sequence_axis() -> isize {
    1
}

fn default_feature_axis() -> isize {
    -1
}

fn default_p() -> f32 {
    0.1
}

fn default_temperature() -> f32 {
    1.0
}

// file: src/error.rs
// description: Precondition violations raised by the rotary encoder and the nucleus sampler.
// author: cipher-rc5

use candle_core::DType;
use thiserror::Error;

/// Invalid configuration or input detected before any tensor work starts.
///
/// Public operations return `anyhow::Result`; these values travel inside the
/// `anyhow::Error` and can be recovered with `downcast_ref::<ConfigError>()`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("max_wavelength must be positive, got {0}")]
    InvalidWavelength(f64),

    #[error("scaling_factor must be positive, got {0}")]
    InvalidScalingFactor(f64),

    #[error("rotary input must have rank >= 2, got rank {0}")]
    RankTooSmall(usize),

    #[error("axis {axis} is out of range for a rank {rank} tensor")]
    AxisOutOfRange { axis: isize, rank: usize },

    #[error("sequence_axis and feature_axis both refer to axis {0}")]
    SameAxes(isize),

    #[error("feature axis size must be even for rotary pairing, got {0}")]
    OddFeatureDim(usize),

    #[error("feature axis is empty, there are no channel pairs to rotate")]
    EmptyFeatureDim,

    #[error("rotary embedding requires a floating point tensor, got {0:?}")]
    NonFloatDtype(DType),

    #[error("p must be in (0, 1], got {0}")]
    InvalidProbability(f32),

    #[error("k must be in [1, vocab_size={vocab_size}], got {k}")]
    InvalidTopK { k: usize, vocab_size: usize },

    #[error("temperature must be positive, got {0}")]
    InvalidTemperature(f32),

    #[error("probabilities must have shape (batch, vocab_size), got {0:?}")]
    ProbabilityShape(Vec<usize>),

    #[error("fork {0} would land on this stream's own ChaCha stream or past the last one")]
    StreamUnavailable(u64),
}

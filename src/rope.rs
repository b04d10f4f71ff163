// file: src/rope.rs
// description: Rotary positional embedding over arbitrary sequence/feature axes of a Candle tensor.
// author: cipher-rc5
// created: 2026-02-21
// modified: 2026-03-14

use anyhow::Result;
use candle_core::{DType, Shape, Tensor};
use tracing::debug;

use crate::config::RotaryConfig;
use crate::error::ConfigError;

/// Split-half rotary positional encoding.
///
/// Channel `i` of the feature axis is paired with channel `i + rotary_dim/2`
/// and the pair is rotated by `position * inverse_freq[i]`. Works for any
/// rank >= 2; axes other than the sequence and feature axes (batch, heads)
/// are broadcast over.
#[derive(Debug, Clone, Default)]
pub struct RotaryEmbedding {
    config: RotaryConfig,
}

impl RotaryEmbedding {
    pub fn new(config: RotaryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RotaryConfig {
        &self.config
    }

    pub fn output_shape(&self, input: &Shape) -> Shape {
        input.clone()
    }

    /// Inverse frequencies `max_wavelength^(-(2i / scaling_factor) / rotary_dim)`.
    pub fn inverse_frequencies(&self, rotary_dim: usize) -> Vec<f64> {
        let half = rotary_dim / 2;
        (0..half)
            .map(|i| {
                let freq = (2 * i) as f64 / self.config.scaling_factor;
                self.config
                    .max_wavelength
                    .powf(-freq / rotary_dim as f64)
            })
            .collect()
    }

    /// Cosine and sine embeddings laid out to broadcast against `x`: the
    /// sequence and feature axes keep their sizes, every other axis is 1.
    pub fn cos_sin(&self, x: &Tensor) -> Result<(Tensor, Tensor)> {
        let dims = x.dims();
        let (sequence_axis, feature_axis) = self.config.resolve_axes(dims.len())?;
        self.cos_sin_for_axes(x, sequence_axis, feature_axis)
    }

    fn cos_sin_for_axes(
        &self,
        x: &Tensor,
        sequence_axis: usize,
        feature_axis: usize,
    ) -> Result<(Tensor, Tensor)> {
        let dims = x.dims();
        let rotary_dim = dims[feature_axis];
        let seq_len = dims[sequence_axis];
        if rotary_dim == 0 {
            return Err(ConfigError::EmptyFeatureDim.into());
        }
        if rotary_dim % 2 != 0 {
            return Err(ConfigError::OddFeatureDim(rotary_dim).into());
        }
        if !x.dtype().is_float() {
            return Err(ConfigError::NonFloatDtype(x.dtype()).into());
        }

        let compute_dtype = if x.dtype() == DType::F64 {
            DType::F64
        } else {
            DType::F32
        };
        let device = x.device();
        let half = rotary_dim / 2;

        let inverse_freq = self.inverse_frequencies(rotary_dim);
        let inverse_freq =
            Tensor::from_vec(inverse_freq, (1, half), device)?.to_dtype(compute_dtype)?;
        let positions = Tensor::arange(0u32, seq_len as u32, device)?
            .to_dtype(compute_dtype)?
            .reshape((seq_len, 1))?;

        // (seq_len, half) -> (seq_len, rotary_dim)
        let angle = positions.broadcast_mul(&inverse_freq)?;
        let mut embedding = Tensor::cat(&[&angle, &angle], 1)?;
        if feature_axis < sequence_axis {
            embedding = embedding.t()?;
        }

        let mut broadcast_shape = vec![1usize; dims.len()];
        broadcast_shape[sequence_axis] = seq_len;
        broadcast_shape[feature_axis] = rotary_dim;
        let embedding = embedding.contiguous()?.reshape(broadcast_shape)?;

        let cos = embedding.cos()?.to_dtype(x.dtype())?;
        let sin = embedding.sin()?.to_dtype(x.dtype())?;
        Ok((cos, sin))
    }

    /// Rotates `x` and returns a tensor of the same shape and dtype.
    ///
    /// Fails when the feature axis size is zero or odd, the axes coincide or
    /// fall outside the tensor, the rank is below 2, or the dtype is not a
    /// float.
    pub fn apply(&self, x: &Tensor) -> Result<Tensor> {
        let (sequence_axis, feature_axis) = self.config.resolve_axes(x.rank())?;
        let (cos, sin) = self.cos_sin_for_axes(x, sequence_axis, feature_axis)?;

        debug!(
            "rotary embedding: shape={:?} sequence_axis={} feature_axis={}",
            x.dims(),
            sequence_axis,
            feature_axis
        );

        let half = x.dim(feature_axis)? / 2;
        let x1 = x.narrow(feature_axis, 0, half)?;
        let x2 = x.narrow(feature_axis, half, half)?;
        let rotated = Tensor::cat(&[&x2.neg()?, &x1], feature_axis)?;

        let out = x
            .broadcast_mul(&cos)?
            .add(&rotated.broadcast_mul(&sin)?)?;
        Ok(out)
    }
}

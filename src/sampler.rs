// file: src/sampler.rs
// description: Implements top-k pre-filtered nucleus (top-p) token selection over probability tensors.
// author: cipher-rc5

use anyhow::Result;
use candle_core::{D, DType, Device, Tensor};
use tracing::debug;

use crate::config::NucleusConfig;
use crate::error::ConfigError;
use crate::seed::SeedStream;

/// Softmax of `logits / temperature` along the last axis.
pub fn probabilities_from_logits(logits: &Tensor, temperature: f32) -> Result<Tensor> {
    if !(temperature.is_finite() && temperature > 0.0) {
        return Err(ConfigError::InvalidTemperature(temperature).into());
    }
    let scaled = (logits.to_dtype(DType::F32)? / f64::from(temperature))?;
    let max = scaled.max_keepdim(D::Minus1)?;
    let exp = scaled.broadcast_sub(&max)?.exp()?;
    let sum = exp.sum_keepdim(D::Minus1)?;
    Ok(exp.broadcast_div(&sum)?)
}

/// Nucleus sampler with an optional top-k pre-filter.
///
/// Each row keeps the smallest descending-sorted prefix whose cumulative
/// probability reaches `p`, including the token that crosses `p`, and draws
/// one token from it. With `k` set only the `k` most probable tokens are
/// considered, even if they do not reach `p`.
#[derive(Debug, Clone)]
pub struct NucleusSampler {
    config: NucleusConfig,
}

impl NucleusSampler {
    pub fn new(config: NucleusConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &NucleusConfig {
        &self.config
    }

    /// Stream for the configured seed, or a fresh entropy-seeded one.
    pub fn seed_stream(&self) -> SeedStream {
        match self.config.seed {
            Some(seed) => SeedStream::new(seed),
            None => SeedStream::from_entropy(),
        }
    }

    /// Sorts each row descending and keeps the `cutoff` largest entries.
    ///
    /// Returns `(sorted_preds, sorted_indices)`, both `(batch, cutoff)`.
    /// Ties keep the lower vocabulary index first.
    pub fn top_candidates(&self, probabilities: &Tensor) -> Result<(Tensor, Tensor)> {
        let &[batch, vocab_size] = probabilities.dims() else {
            return Err(ConfigError::ProbabilityShape(probabilities.dims().to_vec()).into());
        };
        if vocab_size == 0 {
            return Err(ConfigError::ProbabilityShape(vec![batch, vocab_size]).into());
        }
        let cutoff = self.config.cutoff(vocab_size)?;

        let rows: Vec<Vec<f32>> = probabilities.to_dtype(DType::F32)?.to_vec2()?;
        let mut sorted_preds = Vec::with_capacity(batch * cutoff);
        let mut sorted_indices = Vec::with_capacity(batch * cutoff);
        for row in &rows {
            let mut order: Vec<u32> = (0..vocab_size as u32).collect();
            order.sort_by(|&a, &b| row[b as usize].total_cmp(&row[a as usize]));
            order.truncate(cutoff);
            sorted_preds.extend(order.iter().map(|&i| row[i as usize]));
            sorted_indices.extend_from_slice(&order);
        }

        let device = probabilities.device();
        Ok((
            Tensor::from_vec(sorted_preds, (batch, cutoff), device)?,
            Tensor::from_vec(sorted_indices, (batch, cutoff), device)?,
        ))
    }

    /// `u8` mask over descending-sorted probabilities marking the nucleus.
    ///
    /// Entries whose running sum is `<= p` are kept, then the mask is shifted
    /// right by one with position 0 forced on, which pulls in the token that
    /// crosses `p` and never leaves a row empty.
    pub fn nucleus_mask(&self, sorted_preds: &Tensor) -> Result<Tensor> {
        let (batch, cutoff) = sorted_preds.dims2()?;
        let device = sorted_preds.device();
        if self.config.p >= 1.0 || cutoff <= 1 {
            return Ok(Tensor::ones((batch, cutoff), DType::U8, device)?);
        }

        // Running sum on the host, linear in cutoff per row.
        let rows: Vec<Vec<f32>> = sorted_preds.to_dtype(DType::F32)?.to_vec2()?;
        let mut mask = Vec::with_capacity(batch * cutoff);
        for row in &rows {
            mask.extend(shifted_prefix_mask(row, self.config.p));
        }
        Ok(Tensor::from_vec(mask, (batch, cutoff), device)?)
    }

    /// Draws one token id per row of a `(batch, vocab_size)` probability
    /// tensor. Returns a `u32` tensor of shape `(batch,)` and advances `stream`.
    ///
    /// Rows are expected to be non-negative and sum to 1; this is not checked.
    pub fn select(&self, probabilities: &Tensor, stream: &mut SeedStream) -> Result<Tensor> {
        if matches!(probabilities.dims(), &[0, vocab_size] if vocab_size > 0) {
            return Ok(Tensor::zeros(0, DType::U32, probabilities.device())?);
        }
        let (sorted_preds, sorted_indices) = self.top_candidates(probabilities)?;
        let (batch, cutoff) = sorted_preds.dims2()?;

        let mask = self.nucleus_mask(&sorted_preds)?;
        let truncated = mask.where_cond(&sorted_preds, &sorted_preds.zeros_like()?)?;

        // Gumbel-max categorical draw; log(0) = -inf is never the argmax.
        let log_probs = truncated.log()?;
        let noise = Tensor::from_vec(
            stream.gumbel(batch * cutoff),
            (batch, cutoff),
            probabilities.device(),
        )?;
        let choice = log_probs.add(&noise)?.argmax_keepdim(1)?;
        let tokens = sorted_indices.gather(&choice, 1)?.squeeze(1)?;

        debug!(
            "nucleus select: batch={} cutoff={} p={} word_pos={}",
            batch,
            cutoff,
            self.config.p,
            stream.word_pos()
        );
        Ok(tokens)
    }

    /// Single-row variant of [`NucleusSampler::select`] over a host slice.
    pub fn select_one(&self, probabilities: &[f32], stream: &mut SeedStream) -> Result<u32> {
        let probabilities =
            Tensor::from_slice(probabilities, (1, probabilities.len()), &Device::Cpu)?;
        let tokens = self.select(&probabilities, stream)?;
        Ok(tokens.squeeze(0)?.to_scalar::<u32>()?)
    }

    /// Applies the configured temperature softmax to `logits`, then selects.
    pub fn select_from_logits(&self, logits: &Tensor, stream: &mut SeedStream) -> Result<Tensor> {
        let probabilities = probabilities_from_logits(logits, self.config.temperature)?;
        self.select(&probabilities, stream)
    }
}

/// Keeps entries whose running sum stays `<= p`, shifted right by one with
/// the first entry always kept.
fn shifted_prefix_mask(sorted_row: &[f32], p: f32) -> impl Iterator<Item = u8> + '_ {
    let mut running = 0.0f32;
    let mut previous_kept = true;
    sorted_row.iter().map(move |&prob| {
        let keep = u8::from(previous_kept);
        running += prob;
        previous_kept = running <= p;
        keep
    })
}

pub mod config;
pub mod error;
pub mod rope;
pub mod sampler;
pub mod seed;

pub use config::{DecodingConfig, NucleusConfig, RotaryConfig};
pub use error::ConfigError;
pub use rope::RotaryEmbedding;
pub use sampler::{NucleusSampler, probabilities_from_logits};
pub use seed::SeedStream;

use anyhow::Result;

/// Both decoding-time transforms built from one [`DecodingConfig`].
pub struct DecodingPipeline {
    pub rotary: RotaryEmbedding,
    pub sampler: NucleusSampler,
    pub config: DecodingConfig,
}

impl DecodingPipeline {
    pub fn new(config: DecodingConfig) -> Result<Self> {
        let rotary = RotaryEmbedding::new(config.rotary.clone())?;
        let sampler = NucleusSampler::new(config.sampler.clone())?;

        Ok(Self {
            rotary,
            sampler,
            config,
        })
    }

    pub fn load_from_path(path: &std::path::Path) -> Result<Self> {
        Self::new(DecodingConfig::load_from_path(path)?)
    }
}

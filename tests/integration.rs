use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use std::time::{Duration, Instant};
use oxidized_rope_sampler::{
    ConfigError, DecodingConfig, DecodingPipeline, NucleusConfig, NucleusSampler, RotaryConfig,
    RotaryEmbedding, SeedStream,
};

fn nucleus(p: f32, k: Option<usize>) -> Result<NucleusSampler> {
    NucleusSampler::new(NucleusConfig {
        p,
        k,
        ..Default::default()
    })
}

#[test]
fn rotary_identity_at_position_zero() -> Result<()> {
    let rope = RotaryEmbedding::new(RotaryConfig {
        max_wavelength: 10_000.0,
        ..Default::default()
    })?;
    let x = Tensor::new(&[[1.0f32, 0.0, 1.0, 0.0]], &Device::Cpu)?.unsqueeze(0)?;
    let out = rope.apply(&x)?;
    assert_eq!(out.dims(), &[1, 1, 4]);
    assert_eq!(out.flatten_all()?.to_vec1::<f32>()?, vec![1.0, 0.0, 1.0, 0.0]);
    Ok(())
}

#[test]
fn rotary_head_axis_layouts_agree() -> Result<()> {
    let device = Device::Cpu;
    // (batch, seq, heads, dim) vs (batch, heads, seq, dim)
    let x = Tensor::randn(0f32, 1.0, (2, 5, 3, 8), &device)?;
    let seq_major = RotaryEmbedding::new(RotaryConfig::default())?;
    let head_major = RotaryEmbedding::new(RotaryConfig {
        sequence_axis: 2,
        ..Default::default()
    })?;

    let a = seq_major.apply(&x)?;
    let b = head_major
        .apply(&x.transpose(1, 2)?.contiguous()?)?
        .transpose(1, 2)?;
    let diff = (a - b)?.abs()?.flatten_all()?.max(0)?.to_scalar::<f32>()?;
    assert!(diff < 1e-6, "layouts disagree by {diff}");
    Ok(())
}

#[test]
fn rotary_feature_axis_before_sequence_axis() -> Result<()> {
    let device = Device::Cpu;
    let x = Tensor::randn(0f32, 1.0, (2, 6, 4), &device)?;
    let standard = RotaryEmbedding::new(RotaryConfig::default())?;
    // Same data stored as (batch, dim, seq).
    let channels_first = RotaryEmbedding::new(RotaryConfig {
        sequence_axis: -1,
        feature_axis: 1,
        ..Default::default()
    })?;

    let a = standard.apply(&x)?;
    let b = channels_first
        .apply(&x.transpose(1, 2)?.contiguous()?)?
        .transpose(1, 2)?;
    let diff = (a - b)?.abs()?.flatten_all()?.max(0)?.to_scalar::<f32>()?;
    assert!(diff < 1e-6, "layouts disagree by {diff}");
    Ok(())
}

#[test]
fn rotary_f64_input_stays_f64() -> Result<()> {
    let rope = RotaryEmbedding::default();
    let x = Tensor::ones((1, 3, 6), DType::F64, &Device::Cpu)?;
    let out = rope.apply(&x)?;
    assert_eq!(out.dtype(), DType::F64);
    assert_eq!(rope.output_shape(x.shape()), *out.shape());
    Ok(())
}

#[test]
fn rotary_rejects_colliding_axes() -> Result<()> {
    let rope = RotaryEmbedding::new(RotaryConfig {
        sequence_axis: 0,
        feature_axis: -2,
        ..Default::default()
    })?;
    let x = Tensor::zeros((4, 2), DType::F32, &Device::Cpu)?;
    let err = rope.apply(&x).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::SameAxes(0))
    );
    Ok(())
}

#[test]
fn rotary_config_reconstructs_layer() -> Result<()> {
    let rope = RotaryEmbedding::new(RotaryConfig {
        max_wavelength: 500_000.0,
        scaling_factor: 8.0,
        sequence_axis: 2,
        feature_axis: -1,
    })?;
    let json = serde_json::to_string(rope.config())?;
    let rebuilt = RotaryEmbedding::new(serde_json::from_str(&json)?)?;
    assert_eq!(rebuilt.config(), rope.config());
    Ok(())
}

#[test]
fn nucleus_concrete_scenario() -> Result<()> {
    let sampler = nucleus(0.5, None)?;
    let probs = Tensor::new(&[[0.05f32, 0.9, 0.05]], &Device::Cpu)?;
    for seed in [0, 1, 7, 42, 1234, u64::MAX] {
        let mut stream = SeedStream::new(seed);
        let tokens = sampler.select(&probs, &mut stream)?.to_vec1::<u32>()?;
        assert_eq!(tokens, vec![1]);
    }
    Ok(())
}

#[test]
fn nucleus_is_deterministic_per_seed() -> Result<()> {
    let sampler = nucleus(0.9, None)?;
    let probs = Tensor::new(
        &[
            [0.1f32, 0.2, 0.3, 0.4],
            [0.25, 0.25, 0.25, 0.25],
            [0.7, 0.1, 0.1, 0.1],
        ],
        &Device::Cpu,
    )?;

    let mut first = SeedStream::new(42);
    let mut second = SeedStream::new(42);
    for _ in 0..16 {
        let a = sampler.select(&probs, &mut first)?.to_vec1::<u32>()?;
        let b = sampler.select(&probs, &mut second)?.to_vec1::<u32>()?;
        assert_eq!(a, b);
        assert_eq!(first, second);
    }
    Ok(())
}

#[test]
fn nucleus_stays_inside_the_nucleus() -> Result<()> {
    let probs = [0.04f32, 0.3, 0.06, 0.2, 0.4];
    let mut stream = SeedStream::new(2024);

    // p = 0.1: the single most probable token already crosses p.
    let tight = nucleus(0.1, None)?;
    for _ in 0..200 {
        assert_eq!(tight.select_one(&probs, &mut stream)?, 4);
    }

    // p = 0.5: 0.4 stays under p, 0.3 crosses it and is included.
    let wider = nucleus(0.5, None)?;
    let boundary = 0.3f32;
    let mut counts = [0usize; 5];
    let draws = 4000;
    for _ in 0..draws {
        let token = wider.select_one(&probs, &mut stream)? as usize;
        assert!(probs[token] >= boundary, "token {token} is outside the nucleus");
        counts[token] += 1;
    }
    // Renormalized nucleus: 0.4 / 0.7 and 0.3 / 0.7.
    let share = counts[4] as f64 / draws as f64;
    assert!((share - 4.0 / 7.0).abs() < 0.04, "share of token 4 = {share}");
    assert_eq!(counts[4] + counts[1], draws);
    Ok(())
}

#[test]
fn nucleus_scales_to_large_vocabularies() -> Result<()> {
    let sampler = nucleus(0.9, None)?;
    let mut stream = SeedStream::new(31);
    for vocab_size in [32_000usize, 152_064] {
        let uniform = vec![1.0 / vocab_size as f32; vocab_size];
        let started = Instant::now();
        let token = sampler.select_one(&uniform, &mut stream)? as usize;
        let elapsed = started.elapsed();
        assert!(token < vocab_size);
        assert!(
            elapsed < Duration::from_secs(5),
            "vocab {vocab_size} took {elapsed:?}"
        );
    }

    // A peaked row over a large vocabulary still lands on the dominant token.
    let mut peaked = vec![0.0f32; 50_257];
    peaked[50_000] = 0.95;
    peaked[7] = 0.05;
    let tight = nucleus(0.5, None)?;
    assert_eq!(tight.select_one(&peaked, &mut stream)?, 50_000);
    Ok(())
}

#[test]
fn top_k_caps_the_nucleus() -> Result<()> {
    let sampler = nucleus(0.9, Some(2))?;
    let mut stream = SeedStream::new(8);
    let mut seen = [false; 4];
    for _ in 0..500 {
        let token = sampler.select_one(&[0.25, 0.25, 0.25, 0.25], &mut stream)? as usize;
        assert!(token < 2, "top-k=2 allowed token {token}");
        seen[token] = true;
    }
    assert!(seen[0] && seen[1]);
    Ok(())
}

#[test]
fn full_nucleus_reaches_every_token() -> Result<()> {
    let sampler = nucleus(1.0, None)?;
    let mut stream = SeedStream::new(99);
    let mut seen = [false; 4];
    for _ in 0..2000 {
        seen[sampler.select_one(&[0.1, 0.2, 0.3, 0.4], &mut stream)? as usize] = true;
    }
    assert!(seen.iter().all(|&s| s));
    Ok(())
}

#[test]
fn select_from_logits_applies_temperature() -> Result<()> {
    let sampler = NucleusSampler::new(NucleusConfig {
        p: 0.5,
        temperature: 0.5,
        ..Default::default()
    })?;
    let logits = Tensor::new(&[[1.0f32, 3.0, 2.0]], &Device::Cpu)?;
    let mut stream = SeedStream::new(3);
    // After a sharpening softmax token 1 holds ~0.87 of the mass.
    for _ in 0..50 {
        let tokens = sampler.select_from_logits(&logits, &mut stream)?;
        assert_eq!(tokens.to_vec1::<u32>()?, vec![1]);
    }
    Ok(())
}

#[test]
fn pipeline_builds_from_config() -> Result<()> {
    let config = DecodingConfig {
        sampler: NucleusConfig {
            p: 0.5,
            seed: Some(17),
            ..Default::default()
        },
        ..Default::default()
    };
    let pipeline = DecodingPipeline::new(config)?;
    let mut a = pipeline.sampler.seed_stream();
    let mut b = pipeline.sampler.seed_stream();
    assert_eq!(a.seed(), 17);
    assert_eq!(a.gumbel(4), b.gumbel(4));

    let x = Tensor::ones((1, 4, 2, 8), DType::F32, &Device::Cpu)?;
    assert_eq!(pipeline.rotary.apply(&x)?.dims(), x.dims());
    Ok(())
}

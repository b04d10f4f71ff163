// file: src/main.rs
// description: CLI entrypoint for drawing nucleus samples and inspecting rotary embeddings.
// author: cipher-rc5
// created: 2026-02-21
// modified: 2026-03-14

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use clap::{ArgAction, Parser, Subcommand};
use oxidized_rope_sampler::{
    DecodingConfig, NucleusConfig, NucleusSampler, RotaryConfig, RotaryEmbedding,
};
use std::path::PathBuf;
use tracing::{Level, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Rotary embedding and nucleus sampling runner")]
struct Args {
    #[arg(long, help = "Path to a decoding config JSON file")]
    config: Option<PathBuf>,

    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Draw token ids from one or more probability rows.
    Sample {
        #[arg(
            long = "probs",
            required = true,
            help = "Comma-separated probabilities; repeat the flag for more rows"
        )]
        rows: Vec<String>,

        #[arg(long)]
        p: Option<f32>,

        #[arg(long)]
        k: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, default_value_t = 1)]
        steps: usize,
    },
    /// Print the rotary encoding of an all-ones (1, seq_len, dim) tensor.
    Rope {
        #[arg(long, default_value_t = 4)]
        seq_len: usize,

        #[arg(long, default_value_t = 8)]
        dim: usize,

        #[arg(long)]
        max_wavelength: Option<f64>,

        #[arg(long)]
        scaling_factor: Option<f64>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(false)
        .init();

    let config = match &args.config {
        Some(path) => DecodingConfig::load_from_path(path)?,
        None => DecodingConfig::default(),
    };

    match args.command {
        Command::Sample {
            rows,
            p,
            k,
            seed,
            steps,
        } => {
            let sampler_config = NucleusConfig {
                p: p.unwrap_or(config.sampler.p),
                k: k.or(config.sampler.k),
                seed: seed.or(config.sampler.seed),
                ..config.sampler
            };
            run_sample(sampler_config, &rows, steps)
        }
        Command::Rope {
            seq_len,
            dim,
            max_wavelength,
            scaling_factor,
        } => {
            let rotary_config = RotaryConfig {
                max_wavelength: max_wavelength.unwrap_or(config.rotary.max_wavelength),
                scaling_factor: scaling_factor.unwrap_or(config.rotary.scaling_factor),
                sequence_axis: 1,
                feature_axis: 2,
            };
            run_rope(rotary_config, seq_len, dim)
        }
    }
}

fn parse_rows(rows: &[String]) -> Result<(Vec<f32>, usize)> {
    let mut flat = Vec::new();
    let mut vocab_size = None;
    for (row_idx, row) in rows.iter().enumerate() {
        let values = row
            .split(',')
            .map(|v| {
                v.trim()
                    .parse::<f32>()
                    .with_context(|| format!("invalid probability '{v}' in row {row_idx}"))
            })
            .collect::<Result<Vec<_>>>()?;
        let expected = *vocab_size.get_or_insert(values.len());
        anyhow::ensure!(
            values.len() == expected,
            "row {} has {} entries, expected {}",
            row_idx,
            values.len(),
            expected
        );
        flat.extend(values);
    }
    Ok((flat, vocab_size.unwrap_or(0)))
}

fn run_sample(config: NucleusConfig, rows: &[String], steps: usize) -> Result<()> {
    let (flat, vocab_size) = parse_rows(rows)?;
    let batch = rows.len();
    let probabilities = Tensor::from_vec(flat, (batch, vocab_size), &Device::Cpu)?;

    let sampler = NucleusSampler::new(config)?;
    let mut stream = sampler.seed_stream();
    info!(
        "sampling batch={} vocab={} p={} k={:?} seed={}",
        batch,
        vocab_size,
        sampler.config().p,
        sampler.config().k,
        stream.seed()
    );

    for step in 0..steps {
        let tokens: Vec<u32> = sampler.select(&probabilities, &mut stream)?.to_vec1()?;
        println!("step {step}: {tokens:?}");
    }
    Ok(())
}

fn run_rope(config: RotaryConfig, seq_len: usize, dim: usize) -> Result<()> {
    let rotary = RotaryEmbedding::new(config)?;
    let input = Tensor::ones((1, seq_len, dim), DType::F32, &Device::Cpu)?;
    let output = rotary.apply(&input)?;
    info!(
        "rotary max_wavelength={} scaling_factor={} shape={:?}",
        rotary.config().max_wavelength,
        rotary.config().scaling_factor,
        output.dims()
    );

    let rows: Vec<Vec<f32>> = output.squeeze(0)?.to_vec2()?;
    for (pos, row) in rows.iter().enumerate() {
        let formatted: Vec<String> = row.iter().map(|v| format!("{v:+.4}")).collect();
        println!("pos {pos}: [{}]", formatted.join(", "));
    }
    Ok(())
}

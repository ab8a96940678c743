//! CLI for touchstone: inspect a configuration or sample from a freshly
//! initialized model.
//!
//! There is no tokenizer here; prompts and outputs are token ids.
//!
//! ```bash
//! touchstone info --preset small --vocab-size 65
//! touchstone generate --preset tiny --vocab-size 65 --prompt 1,2,3 --max-new-tokens 20 --seed 7
//! RUST_LOG=touchstone=debug touchstone generate --config model.json --vocab-size 65 --prompt 0
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::time::Instant;
use touchstone::{Config, Device, LanguageModel};
use tracing::info;

#[derive(Parser)]
#[command(name = "touchstone")]
#[command(about = "Decoder-only transformer language model")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ModelArgs {
    /// Named preset: tiny, small, default
    #[arg(long, default_value = "tiny")]
    preset: String,

    /// JSON configuration file (overrides --preset)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Vocabulary size of the paired tokenizer
    #[arg(long, default_value = "65")]
    vocab_size: usize,

    /// Compute target: cpu or cpu-parallel
    #[arg(long)]
    device: Option<Device>,

    /// Seed for initialization and sampling
    #[arg(long, default_value = "1337")]
    seed: u64,
}

impl ModelArgs {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => Config::preset(&self.preset)?,
        };
        if let Some(device) = self.device {
            config.device = device;
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the configuration and parameter count
    Info {
        #[command(flatten)]
        model: ModelArgs,
    },

    /// Sample a continuation of a comma-separated token prompt
    Generate {
        #[command(flatten)]
        model: ModelArgs,

        /// Prompt token ids, e.g. "1,2,3"
        #[arg(long)]
        prompt: String,

        #[arg(long, default_value = "50")]
        max_new_tokens: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Info { model } => run_info(&model)?,
        Commands::Generate {
            model,
            prompt,
            max_new_tokens,
        } => run_generate(&model, &prompt, max_new_tokens)?,
    }
    Ok(())
}

fn run_info(args: &ModelArgs) -> Result<()> {
    let config = args.load_config()?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let model = LanguageModel::new(config, args.vocab_size, &mut rng)?;

    println!("{}", serde_json::to_string_pretty(model.config())?);
    let params = model.count_parameters();
    println!(
        "parameters: {} ({:.2}M), weights ≈ {:.1} MB",
        params,
        params as f64 / 1_000_000.0,
        (params * 4) as f64 / 1_000_000.0
    );
    Ok(())
}

fn parse_prompt(prompt: &str) -> Result<Vec<usize>> {
    let ids = prompt
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().with_context(|| format!("bad token id '{}'", s)))
        .collect::<Result<Vec<_>>>()?;
    if ids.is_empty() {
        bail!("prompt must contain at least one token id");
    }
    Ok(ids)
}

fn run_generate(args: &ModelArgs, prompt: &str, max_new_tokens: usize) -> Result<()> {
    let config = args.load_config()?;
    let prompt_ids = parse_prompt(prompt)?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let model = LanguageModel::new(config, args.vocab_size, &mut rng)?;

    info!("Generating {} tokens from a {}-token prompt...", max_new_tokens, prompt_ids.len());
    let start = Instant::now();
    let tokens = model.generate_tokens(vec![prompt_ids], max_new_tokens, &mut rng)?;
    let elapsed = start.elapsed();
    info!(
        "Generated in {:?} ({:.1} tokens/s)",
        elapsed,
        max_new_tokens as f64 / elapsed.as_secs_f64().max(1e-9)
    );

    let line: Vec<String> = tokens[0].iter().map(ToString::to_string).collect();
    println!("{}", line.join(","));
    Ok(())
}

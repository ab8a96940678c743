//! Model Configuration
//!
//! Architecture hyperparameters for the language model, plus the compute
//! target the model runs on. A `Config` is validated once when a model is
//! built and is immutable for the model's lifetime.
//!
//! The vocabulary size is deliberately **not** part of the configuration:
//! it belongs to whichever tokenizer the caller pairs the model with and is
//! passed to [`LanguageModel::new`](crate::LanguageModel::new) separately.
//!
//! ## Parameter Count
//!
//! ```text
//! embeddings ≈ (vocab_size + block_size) × n_embd
//! per_layer  ≈ 12 × n_embd²  (attention + feed-forward)
//! head       ≈ n_embd × vocab_size
//! ```
//!
//! ## JSON Files
//!
//! ```json
//! {
//!   "n_embd": 384,
//!   "n_head": 6,
//!   "n_layer": 6,
//!   "block_size": 256,
//!   "dropout": 0.2,
//!   "device": "cpu-parallel"
//! }
//! ```

use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Compute target for the forward pass
///
/// Both targets run on the host CPU. `CpuParallel` evaluates the attention
/// heads of a layer concurrently on the Rayon pool; `Cpu` evaluates them one
/// after another. Results are identical either way.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Device {
    Cpu,
    #[default]
    CpuParallel,
}

impl Device {
    pub fn is_parallel(self) -> bool {
        matches!(self, Device::CpuParallel)
    }
}

impl std::str::FromStr for Device {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cpu" => Ok(Device::Cpu),
            "cpu-parallel" => Ok(Device::CpuParallel),
            other => Err(ModelError::Config(format!("unknown device '{}'", other))),
        }
    }
}

/// Model configuration
///
/// # Fields
///
/// - `n_embd`: Embedding dimension (width of the residual stream)
/// - `n_head`: Number of attention heads per layer
/// - `n_layer`: Number of transformer blocks
/// - `block_size`: Maximum context length
/// - `dropout`: Dropout probability used in training mode
/// - `device`: Compute target
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub n_embd: usize,
    pub n_head: usize,
    pub n_layer: usize,
    pub block_size: usize,
    pub dropout: f32,
    #[serde(default)]
    pub device: Device,
}

impl Default for Config {
    /// The character-level setup: 6 layers of 6 heads over a 384-wide
    /// residual stream with a 256-token context.
    fn default() -> Self {
        Self {
            n_embd: 384,
            n_head: 6,
            n_layer: 6,
            block_size: 256,
            dropout: 0.2,
            device: Device::CpuParallel,
        }
    }
}

impl Config {
    /// Tiny config for tests and quick experiments
    pub fn tiny() -> Self {
        Self {
            n_embd: 32,
            n_head: 2,
            n_layer: 2,
            block_size: 16,
            dropout: 0.0,
            device: Device::Cpu,
        }
    }

    /// Small config, a few hundred thousand parameters with a small vocab
    pub fn small() -> Self {
        Self {
            n_embd: 128,
            n_head: 4,
            n_layer: 4,
            block_size: 64,
            dropout: 0.1,
            device: Device::CpuParallel,
        }
    }

    /// Look up a named preset (`tiny`, `small`, `default`)
    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "tiny" => Ok(Self::tiny()),
            "small" => Ok(Self::small()),
            "default" => Ok(Self::default()),
            other => Err(ModelError::Config(format!("unknown preset '{}'", other))),
        }
    }

    /// Dimension of a single attention head (`n_embd / n_head`)
    pub fn head_size(&self) -> usize {
        self.n_embd / self.n_head
    }

    /// Check structural invariants
    ///
    /// The embedding width must split evenly across heads, every size must be
    /// at least one, and the dropout probability must lie in `[0, 1)`.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("n_embd", self.n_embd),
            ("n_head", self.n_head),
            ("n_layer", self.n_layer),
            ("block_size", self.block_size),
        ] {
            if value == 0 {
                return Err(ModelError::Config(format!("{} must be at least 1", name)));
            }
        }

        if self.n_embd % self.n_head != 0 {
            return Err(ModelError::Config(format!(
                "n_embd ({}) must be divisible by n_head ({})",
                self.n_embd, self.n_head
            )));
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }

        Ok(())
    }

    /// Load and validate a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

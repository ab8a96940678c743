//! Touchstone: a decoder-only transformer language model in Rust
//!
//! A small GPT-style model implemented from scratch on a minimal tensor
//! type: causal self-attention, multi-head composition, pre-norm residual
//! blocks, and autoregressive sampling. Named after the clown of *As You
//! Like It*, who tests everyone's wit against his own.
//!
//! # Modules
//!
//! - [`tensor`] - Minimal dense tensor with Rayon-parallel kernels
//! - [`layers`] - Linear, embedding, layer norm, dropout, attention, blocks
//! - [`model`] - The language model, forward pass, and generation
//! - [`loss`] - Cross-entropy over vocabulary logits
//! - [`sampling`] - Softmax and multinomial sampling helpers
//! - [`config`] - Hyperparameters, presets, and JSON config files
//! - [`error`] - Error type surfaced at the model boundary
//!
//! Tokenization, data loading, and training loops live outside this crate;
//! the model consumes and produces token ids.
//!
//! # Example
//!
//! ```rust
//! use rand::{rngs::StdRng, SeedableRng};
//! use touchstone::{Config, LanguageModel, Mode};
//!
//! let mut rng = StdRng::seed_from_u64(1337);
//! let model = LanguageModel::new(Config::tiny(), 65, &mut rng)?;
//!
//! // Score a batch with next-token targets
//! let idx = vec![vec![0, 1, 2, 3]];
//! let targets = vec![vec![1, 2, 3, 4]];
//! let out = model.forward(&idx, Some(&targets), Mode::Eval, &mut rng)?;
//! assert!(out.loss.is_some());
//!
//! // Sample a continuation
//! let continued = model.generate_tokens(idx, 10, &mut rng)?;
//! assert_eq!(continued[0].len(), 14);
//! # Ok::<(), touchstone::ModelError>(())
//! ```

pub mod config;
pub mod error;
pub mod layers;
pub mod loss;
pub mod model;
pub mod sampling;
pub mod tensor;

// Re-export main types for convenience
pub use config::{Config, Device};
pub use error::{ModelError, Result};
pub use layers::{Initializer, Mode};
pub use model::{Generation, LanguageModel, ModelOutput};
pub use tensor::Tensor;

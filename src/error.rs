//! Error types for the language model.

use thiserror::Error;

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors surfaced at the model boundary.
///
/// Every variant is fatal for the call that produced it: forward passes and
/// generation are all-or-nothing and never return partial output.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The configuration violates a structural invariant
    /// (for example `n_embd` not divisible by `n_head`).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Input sequence is longer than the context window.
    #[error("sequence length {len} exceeds block size {block_size}")]
    SequenceLengthExceeded { len: usize, block_size: usize },

    /// A token or target index lies outside `[0, vocab_size)`.
    #[error("token {token} out of vocabulary range (vocab_size = {vocab_size})")]
    TokenOutOfRange { token: usize, vocab_size: usize },

    /// Empty, ragged, or mismatched input batch.
    #[error("shape error: {0}")]
    Shape(String),

    /// I/O error while reading or writing a configuration file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration JSON.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

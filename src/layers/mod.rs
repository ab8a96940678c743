//! Neural Network Layers
//!
//! Building blocks of the language model, leaf to root:
//!
//! - **init**: Gaussian parameter initializer
//! - **linear**: Fully connected layer (optional bias)
//! - **embedding**: Lookup tables for tokens and positions
//! - **layer_norm**: Layer normalization
//! - **dropout**: Dropout regularization and the train/eval [`Mode`]
//! - **activation**: ReLU
//! - **attention**: Causal mask, single attention head, multi-head attention
//! - **feed_forward**: Position-wise feed-forward network
//! - **block**: Complete transformer block
//!
//! ## Design Pattern
//!
//! Every layer is a plain struct that owns its parameters and exposes a
//! forward method borrowing `&self`:
//!
//! ```rust,ignore
//! pub struct Layer {
//!     // Parameters (weights, biases, etc.)
//! }
//!
//! impl Layer {
//!     pub fn new(..., init: &Initializer, rng: &mut R) -> Self { }
//!     pub fn forward(&self, x: &Tensor, mode: Mode, rng: &mut R) -> Tensor { }
//! }
//! ```
//!
//! Forward passes never mutate parameters, so one model can be shared across
//! threads and used by concurrent callers.

pub mod activation;
pub mod attention;
pub mod block;
pub mod dropout;
pub mod embedding;
pub mod feed_forward;
pub mod init;
pub mod layer_norm;
pub mod linear;

pub use activation::relu;
pub use attention::{AttentionHead, CausalMask, MultiHeadAttention};
pub use block::TransformerBlock;
pub use dropout::{Dropout, Mode};
pub use embedding::Embedding;
pub use feed_forward::FeedForward;
pub use init::{Initializer, DEFAULT_INIT_STD};
pub use layer_norm::LayerNorm;
pub use linear::Linear;

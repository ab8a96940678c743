//! Transformer Block
//!
//! Attention followed by a feed-forward network, each wrapped in a
//! pre-normalized residual connection.
//!
//! ## Architecture
//!
//! ```text
//! x → LayerNorm → MultiHeadAttention → (+) → LayerNorm → FeedForward → (+) → output
//! │                                     ↑                               ↑
//! └─────────────────────────────────────┘                               │
//!                                       └───────────────────────────────┘
//! ```
//!
//! ## Pre-Norm
//!
//! Normalization happens *before* each sublayer and the residual is added
//! after it, so the residual stream itself is never normalized inside a
//! block; only the final `ln_f` of the model normalizes it.

use super::attention::MultiHeadAttention;
use super::dropout::Mode;
use super::feed_forward::FeedForward;
use super::init::Initializer;
use super::layer_norm::LayerNorm;
use crate::config::Config;
use crate::tensor::Tensor;
use rand::Rng;

/// Transformer block combining attention and feed-forward with residuals
#[derive(Clone, Debug)]
pub struct TransformerBlock {
    pub ln1: LayerNorm,
    pub attn: MultiHeadAttention,
    pub ln2: LayerNorm,
    pub ffwd: FeedForward,
}

impl TransformerBlock {
    pub fn new<R: Rng + ?Sized>(config: &Config, init: &Initializer, rng: &mut R) -> Self {
        Self {
            ln1: LayerNorm::new(config.n_embd),
            attn: MultiHeadAttention::new(
                config.n_embd,
                config.n_head,
                config.block_size,
                config.dropout,
                config.device,
                init,
                rng,
            ),
            ln2: LayerNorm::new(config.n_embd),
            ffwd: FeedForward::new(config.n_embd, config.dropout, init, rng),
        }
    }

    /// Forward pass: [batch, seq_len, n_embd] -> [batch, seq_len, n_embd]
    ///
    /// The hidden state is updated in place by both residual additions.
    pub fn forward<R: Rng + ?Sized>(&self, mut x: Tensor, mode: Mode, rng: &mut R) -> Tensor {
        let attn_out = self.attn.forward(&self.ln1.forward(&x), mode, rng);
        x.add_assign(&attn_out);

        let ffwd_out = self.ffwd.forward(&self.ln2.forward(&x), mode, rng);
        x.add_assign(&ffwd_out);

        x
    }

    pub fn num_parameters(&self) -> usize {
        self.ln1.num_parameters()
            + self.attn.num_parameters()
            + self.ln2.num_parameters()
            + self.ffwd.num_parameters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_shape_preserved() {
        let config = Config::tiny();
        let mut rng = StdRng::seed_from_u64(0);
        let block = TransformerBlock::new(&config, &Initializer::default(), &mut rng);
        let x = Tensor::zeros(vec![3, 5, config.n_embd]);
        let y = block.forward(x, Mode::Eval, &mut rng);
        assert_eq!(y.shape, vec![3, 5, config.n_embd]);
        assert!(y.all_finite());
    }

    #[test]
    fn test_zeroed_sublayers_leave_residual_untouched() {
        let config = Config::tiny();
        let mut rng = StdRng::seed_from_u64(1);
        let mut block = TransformerBlock::new(&config, &Initializer::default(), &mut rng);

        // With both output projections zeroed the block is the identity
        for linear in [&mut block.attn.proj, &mut block.ffwd.fc2] {
            linear.weight.data.iter_mut().for_each(|w| *w = 0.0);
        }

        let x = Initializer::normal(1.0)
            .unwrap()
            .sample(vec![1, 4, config.n_embd], &mut rng);
        let y = block.forward(x.clone(), Mode::Eval, &mut rng);
        assert_eq!(y, x);
    }
}

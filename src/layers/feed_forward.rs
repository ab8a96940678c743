//! Position-wise Feed-Forward Network
//!
//! A two-layer network applied to every position independently. Attention is
//! the only place tokens exchange information; this sublayer transforms each
//! position's vector on its own.
//!
//! ## Architecture
//!
//! ```text
//! x → Linear(n_embd, 4·n_embd) → ReLU → Linear(4·n_embd, n_embd) → Dropout → y
//! ```

use super::activation::relu;
use super::dropout::{Dropout, Mode};
use super::init::Initializer;
use super::linear::Linear;
use crate::tensor::Tensor;
use rand::Rng;

/// Hidden-layer width multiplier
pub const EXPANSION: usize = 4;

/// Feed-forward sublayer with ReLU activation
#[derive(Clone, Debug)]
pub struct FeedForward {
    pub fc1: Linear,
    pub fc2: Linear,
    dropout: Dropout,
}

impl FeedForward {
    /// Create a feed-forward network with 4× expansion
    pub fn new<R: Rng + ?Sized>(
        n_embd: usize,
        dropout: f32,
        init: &Initializer,
        rng: &mut R,
    ) -> Self {
        let hidden = EXPANSION * n_embd;
        Self {
            fc1: Linear::new(n_embd, hidden, init, rng),
            fc2: Linear::new(hidden, n_embd, init, rng),
            dropout: Dropout::new(dropout),
        }
    }

    /// Forward pass: [batch, seq_len, n_embd] -> [batch, seq_len, n_embd]
    pub fn forward<R: Rng + ?Sized>(&self, x: &Tensor, mode: Mode, rng: &mut R) -> Tensor {
        let h = relu(&self.fc1.forward(x));
        let y = self.fc2.forward(&h);
        self.dropout.forward(&y, mode, rng)
    }

    pub fn num_parameters(&self) -> usize {
        self.fc1.num_parameters() + self.fc2.num_parameters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_shapes_and_parameter_count() {
        let mut rng = StdRng::seed_from_u64(0);
        let ff = FeedForward::new(8, 0.0, &Initializer::default(), &mut rng);
        assert_eq!(ff.fc1.out_features(), 32);
        assert_eq!(ff.num_parameters(), 8 * 32 + 32 + 32 * 8 + 8);

        let y = ff.forward(&Tensor::zeros(vec![2, 3, 8]), Mode::Eval, &mut rng);
        assert_eq!(y.shape, vec![2, 3, 8]);
    }

    #[test]
    fn test_positions_are_independent() {
        let mut rng = StdRng::seed_from_u64(1);
        let init = Initializer::normal(0.5).unwrap();
        let ff = FeedForward::new(4, 0.0, &init, &mut rng);

        let a = init.sample(vec![1, 2, 4], &mut rng);
        let mut b = a.clone();
        for v in &mut b.data[4..] {
            *v += 1.0;
        }

        let ya = ff.forward(&a, Mode::Eval, &mut rng);
        let yb = ff.forward(&b, Mode::Eval, &mut rng);
        assert_eq!(ya.data[..4], yb.data[..4]);
        assert_ne!(ya.data[4..], yb.data[4..]);
    }
}

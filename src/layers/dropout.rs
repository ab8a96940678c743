//! Dropout Layer
//!
//! Dropout randomly zeros activations during training and rescales the
//! survivors by `1 / (1 - rate)` so the expected value is unchanged. In
//! evaluation mode it is the identity.
//!
//! The mode is an explicit argument rather than a flag stored on the layer,
//! so a single model value can serve training and inference calls without
//! being mutated in between.

use crate::tensor::Tensor;
use rand::Rng;

/// Whether stochastic regularization is active for a forward call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Dropout active
    Train,
    /// Dropout disabled; forward passes are deterministic
    #[default]
    Eval,
}

impl Mode {
    pub fn is_training(self) -> bool {
        matches!(self, Mode::Train)
    }
}

/// Dropout layer
#[derive(Clone, Copy, Debug)]
pub struct Dropout {
    pub rate: f32,
}

impl Dropout {
    /// # Arguments
    ///
    /// * `rate` - Probability of zeroing each element, in `[0, 1)`
    pub fn new(rate: f32) -> Self {
        assert!(
            (0.0..1.0).contains(&rate),
            "Dropout rate must be in [0, 1), got {}",
            rate
        );
        Self { rate }
    }

    /// Apply dropout
    ///
    /// Draws from `rng` only in training mode with a non-zero rate; an
    /// evaluation call consumes no randomness.
    pub fn forward<R: Rng + ?Sized>(&self, x: &Tensor, mode: Mode, rng: &mut R) -> Tensor {
        if !mode.is_training() || self.rate == 0.0 {
            return x.clone();
        }

        let scale = 1.0 / (1.0 - self.rate);
        let data = x
            .data
            .iter()
            .map(|&v| {
                if rng.random::<f32>() < self.rate {
                    0.0
                } else {
                    v * scale
                }
            })
            .collect();

        Tensor::new(data, x.shape.clone())
    }
}

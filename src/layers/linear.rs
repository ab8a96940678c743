//! Linear Layer (Fully Connected)
//!
//! Affine transformation applied to the last axis: `y = x @ W (+ b)`.
//!
//! ```text
//! Input:  x [*, in_features]
//! Weight: W [in_features, out_features]
//! Bias:   b [out_features]          (optional)
//! Output: y [*, out_features]
//! ```
//!
//! Attention key/query/value projections have no bias; every other
//! projection in the model does.

use super::init::Initializer;
use crate::tensor::Tensor;
use rand::Rng;

/// Linear layer (fully connected)
#[derive(Clone, Debug)]
pub struct Linear {
    /// Weight matrix: [in_features, out_features]
    pub weight: Tensor,
    /// Bias vector: [out_features], absent for bias-free projections
    pub bias: Option<Tensor>,
}

impl Linear {
    /// Create a linear layer with a zero-initialized bias
    pub fn new<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        init: &Initializer,
        rng: &mut R,
    ) -> Self {
        Self {
            weight: init.sample(vec![in_features, out_features], rng),
            bias: Some(Tensor::zeros(vec![out_features])),
        }
    }

    /// Create a linear layer without a bias term
    pub fn no_bias<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        init: &Initializer,
        rng: &mut R,
    ) -> Self {
        Self {
            weight: init.sample(vec![in_features, out_features], rng),
            bias: None,
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape[0]
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape[1]
    }

    /// Forward pass: y = x @ W + b
    ///
    /// Leading axes are flattened into rows, multiplied, and restored.
    pub fn forward(&self, x: &Tensor) -> Tensor {
        let in_features = self.in_features();
        assert_eq!(
            x.last_dim(),
            in_features,
            "Linear expects last axis {} but got shape {:?}",
            in_features,
            x.shape
        );

        let rows = x.num_rows();
        let y_2d = x.reshape(&[rows, in_features]).matmul(&self.weight);

        let mut out_shape = x.shape.clone();
        if let Some(last) = out_shape.last_mut() {
            *last = self.out_features();
        }
        let y = y_2d.reshape(&out_shape);

        match &self.bias {
            Some(bias) => y.add(bias),
            None => y,
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.data.len() + self.bias.as_ref().map_or(0, |b| b.data.len())
    }
}

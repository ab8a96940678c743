//! Layer Normalization
//!
//! Normalizes each position's embedding vector to zero mean and unit
//! variance, then applies a learnable per-channel scale (gamma) and shift
//! (beta).
//!
//! ```text
//! 1. mean = sum(x) / N
//! 2. var  = sum((x - mean)²) / N
//! 3. x̂    = (x - mean) / √(var + ε)
//! 4. y    = γ * x̂ + β
//! ```
//!
//! Statistics are taken over the embedding axis only, independently for
//! every (batch, position) pair, so the result never depends on other
//! sequences in the batch.

use crate::tensor::Tensor;
use rayon::prelude::*;

/// Layer normalization layer
#[derive(Clone, Debug)]
pub struct LayerNorm {
    pub gamma: Tensor, // Scale parameter [n_embd]
    pub beta: Tensor,  // Shift parameter [n_embd]
    pub eps: f32,      // Small constant for numerical stability
}

impl LayerNorm {
    /// Create a layer norm with gamma = 1, beta = 0, eps = 1e-5
    pub fn new(normalized_shape: usize) -> Self {
        Self {
            gamma: Tensor::full(vec![normalized_shape], 1.0),
            beta: Tensor::zeros(vec![normalized_shape]),
            eps: 1e-5,
        }
    }

    /// Forward pass over the last axis
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor [batch, seq_len, n_embd]
    pub fn forward(&self, x: &Tensor) -> Tensor {
        let dim = self.gamma.data.len();
        assert_eq!(
            x.last_dim(),
            dim,
            "LayerNorm over {} channels got shape {:?}",
            dim,
            x.shape
        );

        let stats = x.mean_var_last();
        let mut out = x.data.clone();
        out.par_chunks_mut(dim)
            .zip(stats.par_iter())
            .for_each(|(row, &(mean, var))| {
                let inv_std = 1.0 / (var + self.eps).sqrt();
                for (j, v) in row.iter_mut().enumerate() {
                    *v = (*v - mean) * inv_std * self.gamma.data[j] + self.beta.data[j];
                }
            });

        Tensor::new(out, x.shape.clone())
    }

    pub fn num_parameters(&self) -> usize {
        self.gamma.data.len() + self.beta.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_each_row() {
        let ln = LayerNorm::new(4);
        let x = Tensor::new(
            vec![1.0, 2.0, 3.0, 4.0, 10.0, 10.0, 10.0, 14.0],
            vec![1, 2, 4],
        );
        let y = ln.forward(&x);

        for (mean, var) in y.mean_var_last() {
            assert!(mean.abs() < 1e-5);
            assert!((var - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_scale_and_shift() {
        let mut ln = LayerNorm::new(2);
        ln.gamma = Tensor::new(vec![2.0, 2.0], vec![2]);
        ln.beta = Tensor::new(vec![1.0, 1.0], vec![2]);
        // Row [-1, 1] normalizes to roughly [-1, 1]
        let y = ln.forward(&Tensor::new(vec![-1.0, 1.0], vec![1, 1, 2]));
        assert!((y.data[0] + 1.0).abs() < 1e-3);
        assert!((y.data[1] - 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_constant_row_is_finite() {
        let ln = LayerNorm::new(3);
        let y = ln.forward(&Tensor::full(vec![1, 1, 3], 5.0));
        assert!(y.all_finite());
        assert!(y.data.iter().all(|&v| v == 0.0));
    }
}

//! Cross-Entropy Loss
//!
//! The training objective for next-token prediction: the negative
//! log-likelihood of the true next token under the softmax of the logits,
//! averaged over every position in the batch.
//!
//! ```text
//! loss = -(1 / (B·T)) Σ log softmax(logits[b, t])[target[b, t]]
//! ```
//!
//! Computed with the log-sum-exp trick so large logits never overflow.
//! A model guessing uniformly over `V` tokens scores `ln V`.

use crate::error::{ModelError, Result};
use crate::tensor::Tensor;

/// Mean cross-entropy of `[batch, seq_len, vocab]` logits against
/// `[batch][seq_len]` targets
///
/// Targets must match the logits' batch and sequence axes and lie inside the
/// vocabulary; anything else is an error rather than being clamped.
pub fn cross_entropy(logits: &Tensor, targets: &[Vec<usize>]) -> Result<f32> {
    let vocab_size = logits.last_dim();
    let positions = logits.num_rows();

    let flat_targets: Vec<usize> = targets.iter().flatten().copied().collect();
    if flat_targets.len() != positions || positions == 0 {
        return Err(ModelError::Shape(format!(
            "expected {} targets for logits {:?}, got {}",
            positions,
            logits.shape,
            flat_targets.len()
        )));
    }

    let mut total = 0.0f64;
    for (i, &target) in flat_targets.iter().enumerate() {
        if target >= vocab_size {
            return Err(ModelError::TokenOutOfRange {
                token: target,
                vocab_size,
            });
        }

        let row = logits.row(i);
        let max_logit = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let exp_sum: f32 = row.iter().map(|&x| (x - max_logit).exp()).sum();
        let log_prob = (row[target] - max_logit) - exp_sum.ln();
        total -= log_prob as f64;
    }

    Ok((total / positions as f64) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_logits_give_ln_vocab() {
        let logits = Tensor::zeros(vec![2, 3, 8]);
        let targets = vec![vec![0, 1, 2], vec![3, 4, 7]];
        let loss = cross_entropy(&logits, &targets).unwrap();
        assert!((loss - (8.0f32).ln()).abs() < 1e-5);
    }

    #[test]
    fn test_confident_correct_prediction_is_near_zero() {
        let logits = Tensor::new(vec![20.0, 0.0, 0.0], vec![1, 1, 3]);
        let loss = cross_entropy(&logits, &[vec![0]]).unwrap();
        assert!(loss < 1e-6);
        let wrong = cross_entropy(&logits, &[vec![1]]).unwrap();
        assert!(wrong > 19.0);
    }

    #[test]
    fn test_rejects_mismatched_targets() {
        let logits = Tensor::zeros(vec![1, 2, 4]);
        assert!(matches!(
            cross_entropy(&logits, &[vec![0]]),
            Err(ModelError::Shape(_))
        ));
        assert!(matches!(
            cross_entropy(&logits, &[vec![0, 4]]),
            Err(ModelError::TokenOutOfRange { token: 4, .. })
        ));
    }
}

//! Sampling from next-token distributions
//!
//! Generation turns the logits at the last position into probabilities and
//! draws one index from them. Sampling is stochastic (multinomial), not
//! greedy.

use rand::Rng;

/// Numerically stable softmax over a single row of logits
pub fn softmax_row(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp_vals: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exp_vals.iter().sum();
    exp_vals.into_iter().map(|v| v / sum).collect()
}

/// Draw an index from a probability vector by inverse-CDF sampling
///
/// A uniform draw in `[0, 1)` is compared against the running cumulative
/// sum. If rounding leaves the total slightly below the draw, the last
/// index with non-zero probability is returned.
pub fn sample_index<R: Rng + ?Sized>(probs: &[f32], rng: &mut R) -> usize {
    let u: f32 = rng.random();

    let mut cumsum = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumsum += p;
        if u < cumsum {
            return i;
        }
    }

    probs
        .iter()
        .rposition(|&p| p > 0.0)
        .unwrap_or(probs.len().saturating_sub(1))
}

/// Index of the largest value (first one on ties)
///
/// The greedy counterpart of [`sample_index`]: callers decoding
/// deterministically pick `argmax(&logits)` at the last position instead of
/// sampling.
pub fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_argmax_first_on_ties() {
        assert_eq!(argmax(&[0.1, 3.0, -2.0, 3.0]), 1);
        assert_eq!(argmax(&[f32::NEG_INFINITY, -1.0]), 1);
        let logits = [0.5, 2.5, 1.0];
        assert_eq!(argmax(&logits), argmax(&softmax_row(&logits)));
    }

    #[test]
    fn test_softmax_row() {
        let p = softmax_row(&[0.0, 0.0, 0.0, 0.0]);
        assert!(p.iter().all(|&v| (v - 0.25).abs() < 1e-7));
    }

    #[test]
    fn test_one_hot_always_sampled() {
        let mut rng = StdRng::seed_from_u64(5);
        let probs = [0.0, 0.0, 1.0, 0.0];
        for _ in 0..100 {
            assert_eq!(sample_index(&probs, &mut rng), 2);
        }
    }

    #[test]
    fn test_empirical_frequencies() {
        let mut rng = StdRng::seed_from_u64(6);
        let probs = [0.7, 0.2, 0.1];
        let mut counts = [0usize; 3];
        for _ in 0..10_000 {
            counts[sample_index(&probs, &mut rng)] += 1;
        }
        assert!((6_700..7_300).contains(&counts[0]), "{:?}", counts);
        assert!((1_700..2_300).contains(&counts[1]), "{:?}", counts);
        assert!((700..1_300).contains(&counts[2]), "{:?}", counts);
    }
}

//! Parameter Initialization
//!
//! Every linear weight and every embedding table is drawn i.i.d. from a
//! zero-mean Gaussian with a small standard deviation (0.02 by default, as in
//! GPT-2). Biases start at zero and layer-norm scale/shift at one/zero; those
//! are fixed and not routed through the initializer.

use crate::error::{ModelError, Result};
use crate::tensor::Tensor;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Standard deviation used by [`Initializer::default`]
pub const DEFAULT_INIT_STD: f32 = 0.02;

/// Gaussian weight initializer
///
/// Construction-time hook: pass a custom one to
/// [`LanguageModel::with_initializer`](crate::LanguageModel::with_initializer)
/// to change the spread of the initial weights.
#[derive(Clone, Copy, Debug)]
pub struct Initializer {
    normal: Normal<f32>,
}

impl Initializer {
    /// Create an initializer sampling from `N(0, std²)`
    ///
    /// `std` must be finite and non-negative; zero gives all-zero weights.
    pub fn normal(std: f32) -> Result<Self> {
        if !(std >= 0.0 && std.is_finite()) {
            return Err(ModelError::Config(format!(
                "init std must be finite and non-negative, got {}",
                std
            )));
        }
        let normal = Normal::new(0.0, std).map_err(|e| {
            ModelError::Config(format!("invalid init std {}: {}", std, e))
        })?;
        Ok(Self { normal })
    }

    pub fn std(&self) -> f32 {
        self.normal.std_dev()
    }

    /// Sample a tensor of the given shape
    pub fn sample<R: Rng + ?Sized>(&self, shape: Vec<usize>, rng: &mut R) -> Tensor {
        let size: usize = shape.iter().product();
        let data: Vec<f32> = (0..size).map(|_| self.normal.sample(rng)).collect();
        Tensor::new(data, shape)
    }
}

impl Default for Initializer {
    fn default() -> Self {
        Self {
            normal: Normal::new(0.0, DEFAULT_INIT_STD).expect("0.02 is a valid std"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sample_statistics() {
        let init = Initializer::default();
        let mut rng = StdRng::seed_from_u64(7);
        let t = init.sample(vec![100, 100], &mut rng);

        let n = t.data.len() as f32;
        let mean = t.data.iter().sum::<f32>() / n;
        let var = t.data.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / n;

        assert!(mean.abs() < 0.002, "mean {}", mean);
        assert!((var.sqrt() - 0.02).abs() < 0.002, "std {}", var.sqrt());
    }

    #[test]
    fn test_rejects_negative_std() {
        assert!(matches!(
            Initializer::normal(-1.0),
            Err(ModelError::Config(_))
        ));
        assert!(Initializer::normal(f32::NAN).is_err());
        assert!(Initializer::normal(f32::INFINITY).is_err());
        assert_eq!(Initializer::normal(0.5).unwrap().std(), 0.5);
    }

    #[test]
    fn test_zero_std_gives_zero_weights() {
        let init = Initializer::normal(0.0).unwrap();
        let t = init.sample(vec![4, 4], &mut StdRng::seed_from_u64(1));
        assert!(t.data.iter().all(|&v| v == 0.0));
    }
}

//! Activation Functions
//!
//! The feed-forward sublayer uses the rectified linear unit:
//!
//! ```text
//! ReLU(x) = max(0, x)
//! ```

use crate::tensor::Tensor;

/// ReLU activation applied element-wise
pub fn relu(x: &Tensor) -> Tensor {
    x.map(|v| v.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu() {
        let x = Tensor::new(vec![-2.0, -0.0, 0.5, 3.0], vec![4]);
        assert_eq!(relu(&x).data, vec![0.0, 0.0, 0.5, 3.0]);
    }
}

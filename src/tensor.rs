//! Tensor Operations for the Transformer
//!
//! A minimal dense tensor: a flat `Vec<f32>` in row-major order plus a shape
//! and the strides derived from it. Only the operations the language model
//! actually needs are provided, and every one of them works on the **last
//! axis** or on **batched matrices**, which is all a decoder-only transformer
//! requires.
//!
//! ## Core Concepts
//!
//! - **Data**: Flat `Vec<f32>` storing all elements in row-major order
//! - **Shape**: Dimensions of the tensor (e.g., `[batch, seq, dim]`)
//! - **Strides**: Step sizes for each dimension to compute flat indices
//!
//! ## Example
//!
//! ```rust
//! use touchstone::Tensor;
//!
//! // Create a 2x3 matrix
//! let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
//! let tensor = Tensor::new(data, vec![2, 3]);
//!
//! // Matrix multiplication
//! let other = Tensor::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], vec![3, 2]);
//! let result = tensor.matmul(&other);
//! assert_eq!(result.shape, vec![2, 2]);
//! ```
//!
//! ## Parallelism
//!
//! Element-wise operations, softmax rows, and the matrix products are spread
//! over the Rayon thread pool. Every operation is a pure function of its
//! inputs, so parallel evaluation never changes results: each output element
//! is computed by exactly one task with a fixed summation order.
//!
//! ## Preconditions
//!
//! Shape mismatches are programmer errors and panic with a descriptive
//! message. The model validates user input before any tensor is built, so
//! these panics are unreachable through the public model API.

use rayon::prelude::*;

/// A multi-dimensional array for neural network computations
///
/// # Memory Layout
///
/// For shape `[2, 3]`, data is stored as
/// `[row0_col0, row0_col1, row0_col2, row1_col0, row1_col1, row1_col2]`
/// and the strides are `[3, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Flat storage of all tensor elements
    pub data: Vec<f32>,
    /// Shape of the tensor (dimensions)
    pub shape: Vec<usize>,
    /// Strides for each dimension (computed from shape)
    pub strides: Vec<usize>,
}

impl Tensor {
    /// Create a new tensor with given data and shape
    ///
    /// # Panics
    ///
    /// Panics if the product of shape dimensions doesn't equal data length
    ///
    /// # Example
    ///
    /// ```rust
    /// # use touchstone::Tensor;
    /// let tensor = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
    /// assert_eq!(tensor.shape, vec![2, 2]);
    /// ```
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        let expected_size: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_size,
            "Data length ({}) doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_size
        );

        let strides = Self::compute_strides(&shape);
        Self {
            data,
            shape,
            strides,
        }
    }

    /// Create a tensor filled with zeros
    pub fn zeros(shape: Vec<usize>) -> Self {
        let size: usize = shape.iter().product();
        Self::new(vec![0.0; size], shape)
    }

    /// Create a tensor filled with a constant
    pub fn full(shape: Vec<usize>, value: f32) -> Self {
        let size: usize = shape.iter().product();
        Self::new(vec![value; size], shape)
    }

    /// Compute strides from shape (row-major layout)
    ///
    /// For shape `[d0, d1, d2]`, strides are `[d1*d2, d2, 1]`
    fn compute_strides(shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    /// Size of the last axis (1 for a scalar-shaped tensor)
    pub fn last_dim(&self) -> usize {
        self.shape.last().copied().unwrap_or(1)
    }

    /// Number of rows when the tensor is viewed as `[*, last_dim]`
    pub fn num_rows(&self) -> usize {
        let last = self.last_dim();
        if last == 0 {
            0
        } else {
            self.data.len() / last
        }
    }

    /// Borrow one row of the `[*, last_dim]` view
    ///
    /// For a `[batch, seq, vocab]` logits tensor, row `b * seq + t` is the
    /// distribution over the vocabulary at position `t` of sequence `b`.
    pub fn row(&self, index: usize) -> &[f32] {
        let last = self.last_dim();
        &self.data[index * last..(index + 1) * last]
    }

    /// Whether every element is finite (no NaN or ±∞)
    pub fn all_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Inner loop of the blocked matmul: `result[j] += a_val * b[j]`
    ///
    /// Kept as a plain zip so LLVM auto-vectorizes it.
    #[inline(always)]
    fn matmul_inner_simd(a_val: f32, b: &[f32], result: &mut [f32]) {
        for (r, &b_val) in result.iter_mut().zip(b.iter()) {
            *r += a_val * b_val;
        }
    }

    /// 2D matrix multiplication: `[m, k] @ [k, n] -> [m, n]`
    ///
    /// Small products run sequentially; larger ones use the parallel
    /// cache-blocked kernel.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use touchstone::Tensor;
    /// let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
    /// let b = Tensor::new(vec![1.0, 0.0, 0.0, 1.0], vec![2, 2]);
    /// let c = a.matmul(&b);
    /// assert_eq!(c.data, vec![1.0, 2.0, 3.0, 4.0]);
    /// ```
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert!(
            self.shape.len() == 2 && other.shape.len() == 2,
            "matmul expects 2D operands, got {:?} @ {:?}",
            self.shape,
            other.shape
        );
        assert_eq!(
            self.shape[1], other.shape[0],
            "Matrix dimensions incompatible: [{}, {}] @ [{}, {}]",
            self.shape[0], self.shape[1], other.shape[0], other.shape[1]
        );

        let m = self.shape[0];
        let k = self.shape[1];
        let n = other.shape[1];

        if m * n * k >= 1_000 {
            return self.matmul_parallel_blocked(other, m, n, k);
        }

        let mut result = vec![0.0; m * n];
        for i in 0..m {
            for l in 0..k {
                let a_val = self.data[i * k + l];
                Self::matmul_inner_simd(
                    a_val,
                    &other.data[l * n..(l + 1) * n],
                    &mut result[i * n..(i + 1) * n],
                );
            }
        }

        Tensor::new(result, vec![m, n])
    }

    /// Parallel cache-blocked matrix multiplication
    ///
    /// Output rows are split into blocks of 8 and distributed over the
    /// thread pool; within a block the `k` loop is tiled so the touched
    /// slices of `other` stay in L1.
    fn matmul_parallel_blocked(&self, other: &Tensor, m: usize, n: usize, k: usize) -> Tensor {
        const BLOCK_SIZE: usize = 8;

        let mut result = vec![0.0; m * n];

        result
            .par_chunks_mut(BLOCK_SIZE * n)
            .enumerate()
            .for_each(|(block_i, result_block)| {
                let i_start = block_i * BLOCK_SIZE;
                let i_end = (i_start + BLOCK_SIZE).min(m);

                for j_start in (0..n).step_by(BLOCK_SIZE) {
                    let j_end = (j_start + BLOCK_SIZE).min(n);

                    for k_start in (0..k).step_by(BLOCK_SIZE) {
                        let k_end = (k_start + BLOCK_SIZE).min(k);

                        for i in i_start..i_end {
                            let row_offset = (i - i_start) * n;
                            for k_idx in k_start..k_end {
                                let a_val = self.data[i * k + k_idx];
                                Self::matmul_inner_simd(
                                    a_val,
                                    &other.data[k_idx * n + j_start..k_idx * n + j_end],
                                    &mut result_block[row_offset + j_start..row_offset + j_end],
                                );
                            }
                        }
                    }
                }
            });

        Tensor::new(result, vec![m, n])
    }

    /// Batched matrix multiplication: `[b, m, k] @ [b, k, n] -> [b, m, n]`
    ///
    /// Used by attention for `Q @ K^T` and `weights @ V`. Each batch entry is
    /// an independent matrix product, so batches run in parallel.
    pub fn bmm(&self, other: &Tensor) -> Tensor {
        assert!(
            self.shape.len() == 3 && other.shape.len() == 3,
            "bmm expects 3D operands, got {:?} @ {:?}",
            self.shape,
            other.shape
        );
        assert_eq!(
            self.shape[0], other.shape[0],
            "Batch dimensions must match for bmm"
        );
        assert_eq!(
            self.shape[2], other.shape[1],
            "Inner dimensions must match for bmm: {:?} @ {:?}",
            self.shape, other.shape
        );

        let batch = self.shape[0];
        let m = self.shape[1];
        let k = self.shape[2];
        let n = other.shape[2];

        let mut result = vec![0.0; batch * m * n];
        if m * n == 0 {
            return Tensor::new(result, vec![batch, m, n]);
        }

        result
            .par_chunks_mut(m * n)
            .enumerate()
            .for_each(|(b, chunk)| {
                let a = &self.data[b * m * k..(b + 1) * m * k];
                let bt = &other.data[b * k * n..(b + 1) * k * n];
                for i in 0..m {
                    for l in 0..k {
                        Self::matmul_inner_simd(
                            a[i * k + l],
                            &bt[l * n..(l + 1) * n],
                            &mut chunk[i * n..(i + 1) * n],
                        );
                    }
                }
            });

        Tensor::new(result, vec![batch, m, n])
    }

    /// Softmax along the last axis
    ///
    /// Uses the stable form `exp(x - max) / sum(exp(x - max))`. Entries equal
    /// to `-inf` become exactly `0.0` as long as the row holds at least one
    /// finite value, which is what causal masking relies on.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use touchstone::Tensor;
    /// let tensor = Tensor::new(vec![1.0, 2.0, f32::NEG_INFINITY], vec![1, 3]);
    /// let probs = tensor.softmax();
    /// assert_eq!(probs.data[2], 0.0);
    /// assert!((probs.data.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    /// ```
    pub fn softmax(&self) -> Tensor {
        let cols = self.last_dim();
        let mut result = self.data.clone();
        if cols == 0 {
            return Tensor::new(result, self.shape.clone());
        }

        result.par_chunks_mut(cols).for_each(|row| {
            let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            let mut sum = 0.0;
            for v in row.iter_mut() {
                *v = (*v - max).exp();
                sum += *v;
            }
            for v in row.iter_mut() {
                *v /= sum;
            }
        });

        Tensor::new(result, self.shape.clone())
    }

    /// Element-wise addition with broadcasting support
    ///
    /// 1. **Exact match**: Same shape
    /// 2. **Broadcast batch**: `[batch, seq, dim] + [seq, dim]` (position embeddings)
    /// 3. **Broadcast last dim**: `[*, n] + [n]` (bias)
    ///
    /// # Example
    ///
    /// ```rust
    /// # use touchstone::Tensor;
    /// let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
    /// let bias = Tensor::new(vec![10.0, 20.0], vec![2]);
    /// assert_eq!(a.add(&bias).data, vec![11.0, 22.0, 13.0, 24.0]);
    /// ```
    pub fn add(&self, other: &Tensor) -> Tensor {
        if self.shape == other.shape {
            let result = self
                .data
                .par_iter()
                .zip(&other.data)
                .map(|(a, b)| a + b)
                .collect();
            return Tensor::new(result, self.shape.clone());
        }

        if self.shape.len() == 3 && other.shape.len() == 2 {
            assert_eq!(
                &self.shape[1..],
                &other.shape[..],
                "Trailing dimensions must match for batch broadcasting"
            );
            let per_batch = other.data.len();
            let result = self
                .data
                .par_iter()
                .enumerate()
                .map(|(i, a)| a + other.data[i % per_batch])
                .collect();
            return Tensor::new(result, self.shape.clone());
        }

        if self.shape.len() > other.shape.len() && other.data.len() == self.last_dim() {
            let last_dim = self.last_dim();
            let result = self
                .data
                .par_iter()
                .enumerate()
                .map(|(i, a)| a + other.data[i % last_dim])
                .collect();
            return Tensor::new(result, self.shape.clone());
        }

        panic!(
            "Unsupported broadcast for add: {:?} + {:?}",
            self.shape, other.shape
        );
    }

    /// In-place addition of a same-shaped tensor (residual connections)
    pub fn add_assign(&mut self, other: &Tensor) {
        assert_eq!(
            self.shape, other.shape,
            "Shapes must match for in-place addition"
        );
        self.data
            .par_iter_mut()
            .zip(&other.data)
            .for_each(|(a, b)| *a += b);
    }

    /// Multiply all elements by scalar
    pub fn mul_scalar(&self, scalar: f32) -> Tensor {
        let result = self.data.par_iter().map(|&x| x * scalar).collect();
        Tensor::new(result, self.shape.clone())
    }

    /// Apply a function to every element
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        let result = self.data.par_iter().map(|&x| f(x)).collect();
        Tensor::new(result, self.shape.clone())
    }

    /// Reshape tensor to new shape
    ///
    /// Total number of elements must remain the same.
    pub fn reshape(&self, new_shape: &[usize]) -> Tensor {
        let new_size: usize = new_shape.iter().product();
        assert_eq!(
            self.data.len(),
            new_size,
            "Cannot reshape {:?} into {:?}: element count mismatch",
            self.shape,
            new_shape
        );
        Tensor::new(self.data.clone(), new_shape.to_vec())
    }

    /// Transpose two dimensions
    ///
    /// Supports negative indexing, so `transpose(-2, -1)` swaps the two
    /// innermost axes of a tensor of any rank.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use touchstone::Tensor;
    /// let tensor = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
    /// let transposed = tensor.transpose(-2, -1);
    /// assert_eq!(transposed.shape, vec![3, 2]);
    /// assert_eq!(transposed.data, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    /// ```
    pub fn transpose(&self, dim1: isize, dim2: isize) -> Tensor {
        let ndim = self.shape.len() as isize;
        let d1 = if dim1 < 0 { ndim + dim1 } else { dim1 } as usize;
        let d2 = if dim2 < 0 { ndim + dim2 } else { dim2 } as usize;

        let mut new_shape = self.shape.clone();
        new_shape.swap(d1, d2);

        // Walk the output in order, reading the input through swapped strides
        let mut permuted_strides = self.strides.clone();
        permuted_strides.swap(d1, d2);
        let out_strides = Self::compute_strides(&new_shape);

        let result = (0..self.data.len())
            .into_par_iter()
            .map(|i| {
                let mut remaining = i;
                let mut src = 0;
                for (&out_stride, &in_stride) in out_strides.iter().zip(&permuted_strides) {
                    let coord = remaining / out_stride;
                    remaining %= out_stride;
                    src += coord * in_stride;
                }
                self.data[src]
            })
            .collect();

        Tensor::new(result, new_shape)
    }

    /// Replace values where `mask` is true with `value`
    ///
    /// The mask covers the last two axes (`[rows, cols]`) and is broadcast
    /// across every leading axis, so a `[T, T]` causal mask applies to a
    /// `[B, T, T]` score tensor.
    pub fn masked_fill(&self, mask: &[bool], rows: usize, cols: usize, value: f32) -> Tensor {
        assert!(
            self.shape.len() >= 2
                && self.shape[self.shape.len() - 2] == rows
                && self.shape[self.shape.len() - 1] == cols,
            "Mask [{}, {}] doesn't cover trailing axes of {:?}",
            rows,
            cols,
            self.shape
        );
        assert_eq!(mask.len(), rows * cols, "Mask length must be rows * cols");

        let plane = rows * cols;
        let result = self
            .data
            .par_iter()
            .enumerate()
            .map(|(i, &x)| if mask[i % plane] { value } else { x })
            .collect();
        Tensor::new(result, self.shape.clone())
    }

    /// Concatenate tensors along the last axis
    ///
    /// All inputs must agree on every axis except the last. Used to stitch
    /// attention head outputs back into the embedding width.
    pub fn concat_last(parts: &[Tensor]) -> Tensor {
        assert!(!parts.is_empty(), "concat_last needs at least one tensor");
        let lead = &parts[0].shape[..parts[0].shape.len() - 1];
        for part in parts {
            assert_eq!(
                &part.shape[..part.shape.len() - 1],
                lead,
                "Leading dimensions must match for concatenation"
            );
        }

        let rows: usize = lead.iter().product();
        let widths: Vec<usize> = parts.iter().map(|p| p.last_dim()).collect();
        let total: usize = widths.iter().sum();

        let mut result = vec![0.0; rows * total];
        if total > 0 {
            result
                .par_chunks_mut(total)
                .enumerate()
                .for_each(|(r, out_row)| {
                    let mut offset = 0;
                    for (part, &w) in parts.iter().zip(&widths) {
                        out_row[offset..offset + w].copy_from_slice(&part.data[r * w..(r + 1) * w]);
                        offset += w;
                    }
                });
        }

        let mut shape = lead.to_vec();
        shape.push(total);
        Tensor::new(result, shape)
    }

    /// Per-row mean and variance along the last axis
    ///
    /// Variance is the biased (population) estimate, as used by layer norm.
    pub fn mean_var_last(&self) -> Vec<(f32, f32)> {
        let dim = self.last_dim();
        if dim == 0 {
            return Vec::new();
        }
        self.data
            .par_chunks(dim)
            .map(|row| {
                let mean = row.iter().sum::<f32>() / dim as f32;
                let var = row
                    .iter()
                    .map(|&x| {
                        let diff = x - mean;
                        diff * diff
                    })
                    .sum::<f32>()
                    / dim as f32;
                (mean, var)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: &[f32], b: &[f32]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn test_strides_row_major() {
        let t = Tensor::zeros(vec![2, 3, 4]);
        assert_eq!(t.strides, vec![12, 4, 1]);
    }

    #[test]
    fn test_matmul_small_and_blocked_agree() {
        // 16 x 16 x 16 crosses the parallel threshold
        let n = 16;
        let a: Vec<f32> = (0..n * n).map(|i| (i % 7) as f32 - 3.0).collect();
        let b: Vec<f32> = (0..n * n).map(|i| (i % 5) as f32 * 0.5).collect();
        let ta = Tensor::new(a.clone(), vec![n, n]);
        let tb = Tensor::new(b.clone(), vec![n, n]);

        let mut naive = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                for l in 0..n {
                    naive[i * n + j] += a[i * n + l] * b[l * n + j];
                }
            }
        }

        assert!(approx_eq(&ta.matmul(&tb).data, &naive));
    }

    #[test]
    fn test_bmm_matches_per_batch_matmul() {
        let a = Tensor::new((0..12).map(|x| x as f32).collect(), vec![2, 2, 3]);
        let b = Tensor::new((0..12).map(|x| (x as f32) * 0.1).collect(), vec![2, 3, 2]);
        let out = a.bmm(&b);
        assert_eq!(out.shape, vec![2, 2, 2]);

        for batch in 0..2 {
            let a2 = Tensor::new(a.data[batch * 6..(batch + 1) * 6].to_vec(), vec![2, 3]);
            let b2 = Tensor::new(b.data[batch * 6..(batch + 1) * 6].to_vec(), vec![3, 2]);
            let expected = a2.matmul(&b2);
            assert!(approx_eq(
                &out.data[batch * 4..(batch + 1) * 4],
                &expected.data
            ));
        }
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let t = Tensor::new(vec![1.0, 2.0, 3.0, -1.0, 0.0, 1000.0], vec![2, 3]);
        let s = t.softmax();
        for r in 0..2 {
            let sum: f32 = s.row(r).iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }
        assert!(s.all_finite());
    }

    #[test]
    fn test_softmax_neg_infinity_is_zero() {
        let t = Tensor::new(vec![0.5, f32::NEG_INFINITY, f32::NEG_INFINITY], vec![1, 3]);
        let s = t.softmax();
        assert_eq!(s.data, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_add_broadcast_batch() {
        let x = Tensor::zeros(vec![2, 2, 2]);
        let pos = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
        let y = x.add(&pos);
        assert_eq!(y.data, vec![1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_transpose_last_two_axes_3d() {
        let t = Tensor::new((0..6).map(|x| x as f32).collect(), vec![1, 2, 3]);
        let tt = t.transpose(-2, -1);
        assert_eq!(tt.shape, vec![1, 3, 2]);
        assert_eq!(tt.data, vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn test_masked_fill_broadcasts_over_batch() {
        let t = Tensor::zeros(vec![2, 2, 2]);
        let mask = [false, true, false, false];
        let filled = t.masked_fill(&mask, 2, 2, -1.0);
        assert_eq!(
            filled.data,
            vec![0.0, -1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_concat_last() {
        let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
        let b = Tensor::new(vec![9.0, 8.0], vec![2, 1]);
        let c = Tensor::concat_last(&[a, b]);
        assert_eq!(c.shape, vec![2, 3]);
        assert_eq!(c.data, vec![1.0, 2.0, 9.0, 3.0, 4.0, 8.0]);
    }

    #[test]
    fn test_mean_var_last() {
        let t = Tensor::new(vec![1.0, 3.0, 2.0, 2.0], vec![2, 2]);
        let stats = t.mean_var_last();
        assert_eq!(stats, vec![(2.0, 1.0), (2.0, 0.0)]);
    }

    #[test]
    #[should_panic(expected = "Data length")]
    fn test_new_rejects_bad_shape() {
        let _ = Tensor::new(vec![1.0, 2.0, 3.0], vec![2, 2]);
    }
}

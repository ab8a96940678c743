//! Causal Self-Attention
//!
//! Attention lets every position gather information from the positions
//! before it. One [`AttentionHead`] performs a single scaled dot-product
//! attention; [`MultiHeadAttention`] runs several heads side by side and
//! recombines them.
//!
//! ## Scaled Dot-Product Attention
//!
//! ```text
//! Q, K, V = x @ W_q, x @ W_k, x @ W_v        (no bias)
//! scores  = (Q @ K^T) / √head_size
//! weights = softmax(mask(scores))            (row-wise over keys)
//! output  = dropout(weights) @ V
//! ```
//!
//! Dividing by √head_size keeps the scores' variance independent of the head
//! width; without it softmax saturates as heads get wider.
//!
//! ## Causal Masking
//!
//! Position `i` may attend to positions `j ≤ i` only. Disallowed scores are
//! set to `-inf` before softmax, which turns them into exactly zero weight.
//! The diagonal is always allowed, so every row keeps at least one finite
//! score and the softmax is well defined.
//!
//! For `T = 4` the allowed pattern is:
//! ```text
//! [1 0 0 0]  position 0 sees itself
//! [1 1 0 0]  position 1 sees 0,1
//! [1 1 1 0]  position 2 sees 0,1,2
//! [1 1 1 1]  position 3 sees all
//! ```

use super::dropout::{Dropout, Mode};
use super::init::Initializer;
use super::linear::Linear;
use crate::config::Device;
use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Lower-triangular mask sized for the full context window
///
/// Built once when a head is constructed and never modified afterwards.
/// Each forward call takes the top-left `T × T` window.
#[derive(Clone, Debug)]
pub struct CausalMask {
    block_size: usize,
    /// `true` where attention is **not** allowed (`j > i`), row-major
    disallowed: Vec<bool>,
}

impl CausalMask {
    pub fn new(block_size: usize) -> Self {
        let disallowed = (0..block_size * block_size)
            .map(|idx| idx % block_size > idx / block_size)
            .collect();
        Self {
            block_size,
            disallowed,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Whether query position `i` may attend to key position `j`
    pub fn allowed(&self, i: usize, j: usize) -> bool {
        !self.disallowed[i * self.block_size + j]
    }

    /// The `[t, t]` top-left window, `true` where attention is blocked
    pub fn window(&self, t: usize) -> Vec<bool> {
        assert!(
            t <= self.block_size,
            "Sequence length {} exceeds mask size {}",
            t,
            self.block_size
        );
        (0..t)
            .flat_map(|i| {
                let start = i * self.block_size;
                self.disallowed[start..start + t].iter().copied()
            })
            .collect()
    }
}

/// One head of causal self-attention
#[derive(Clone, Debug)]
pub struct AttentionHead {
    pub key: Linear,
    pub query: Linear,
    pub value: Linear,
    mask: CausalMask,
    dropout: Dropout,
    head_size: usize,
}

impl AttentionHead {
    /// Create a head projecting `n_embd` inputs down to `head_size`
    pub fn new<R: Rng + ?Sized>(
        n_embd: usize,
        head_size: usize,
        block_size: usize,
        dropout: f32,
        init: &Initializer,
        rng: &mut R,
    ) -> Self {
        Self {
            key: Linear::no_bias(n_embd, head_size, init, rng),
            query: Linear::no_bias(n_embd, head_size, init, rng),
            value: Linear::no_bias(n_embd, head_size, init, rng),
            mask: CausalMask::new(block_size),
            dropout: Dropout::new(dropout),
            head_size,
        }
    }

    pub fn head_size(&self) -> usize {
        self.head_size
    }

    pub fn mask(&self) -> &CausalMask {
        &self.mask
    }

    /// Post-softmax attention weights, before dropout
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor [batch, seq_len, n_embd]
    ///
    /// # Returns
    ///
    /// Weights [batch, seq_len, seq_len]; row `i` is a distribution over key
    /// positions `0..=i` and is zero beyond.
    pub fn attention_weights(&self, x: &Tensor) -> Tensor {
        let seq_len = x.shape[1];

        // Project to K, Q: [batch, seq_len, head_size]
        let k = self.key.forward(x);
        let q = self.query.forward(x);

        // Scores: Q @ K^T / √head_size -> [batch, seq_len, seq_len]
        let scale = (self.head_size as f32).powf(-0.5);
        let scores = q.bmm(&k.transpose(-2, -1)).mul_scalar(scale);

        // Causal mask: future keys get -inf, so softmax gives them zero weight
        let blocked = self.mask.window(seq_len);
        scores
            .masked_fill(&blocked, seq_len, seq_len, f32::NEG_INFINITY)
            .softmax()
    }

    /// Forward pass: [batch, seq_len, n_embd] -> [batch, seq_len, head_size]
    pub fn forward<R: Rng + ?Sized>(&self, x: &Tensor, mode: Mode, rng: &mut R) -> Tensor {
        let weights = self.attention_weights(x);
        // Dropout on the weights themselves (identity in Eval)
        let weights = self.dropout.forward(&weights, mode, rng);

        // Weighted sum of values
        let v = self.value.forward(x);
        weights.bmm(&v)
    }

    pub fn num_parameters(&self) -> usize {
        self.key.num_parameters() + self.query.num_parameters() + self.value.num_parameters()
    }
}

/// Multi-head causal self-attention
///
/// The heads see the identical input and share nothing, so they may be
/// evaluated concurrently. Their outputs are concatenated in head order,
/// restoring the embedding width, then projected and passed through dropout.
///
/// ```text
/// x ─┬─ head 0 ─┐
///    ├─ head 1 ─┼─ concat → proj → dropout
///    └─ head n ─┘
/// ```
#[derive(Clone, Debug)]
pub struct MultiHeadAttention {
    pub heads: Vec<AttentionHead>,
    pub proj: Linear,
    dropout: Dropout,
    device: Device,
}

impl MultiHeadAttention {
    /// # Arguments
    ///
    /// * `n_embd` - Embedding dimension
    /// * `n_head` - Number of heads; `n_embd` must be divisible by it
    /// * `block_size` - Maximum sequence length (sizes each head's mask)
    /// * `dropout` - Dropout probability
    /// * `device` - Whether heads run concurrently
    pub fn new<R: Rng + ?Sized>(
        n_embd: usize,
        n_head: usize,
        block_size: usize,
        dropout: f32,
        device: Device,
        init: &Initializer,
        rng: &mut R,
    ) -> Self {
        assert_eq!(n_embd % n_head, 0, "n_embd must be divisible by n_head");
        let head_size = n_embd / n_head;

        let heads = (0..n_head)
            .map(|_| AttentionHead::new(n_embd, head_size, block_size, dropout, init, rng))
            .collect();

        Self {
            heads,
            proj: Linear::new(head_size * n_head, n_embd, init, rng),
            dropout: Dropout::new(dropout),
            device,
        }
    }

    /// Forward pass: [batch, seq_len, n_embd] -> [batch, seq_len, n_embd]
    ///
    /// In training mode each head gets its own RNG seeded from `rng` before
    /// any head runs, so dropout masks depend only on the caller's seed and
    /// not on how the thread pool schedules the heads.
    pub fn forward<R: Rng + ?Sized>(&self, x: &Tensor, mode: Mode, rng: &mut R) -> Tensor {
        // Seeds first, so dropout does not depend on scheduling
        let seeds: Vec<u64> = if mode.is_training() {
            (0..self.heads.len()).map(|_| rng.random()).collect()
        } else {
            vec![0; self.heads.len()]
        };

        let run_head = |(head, seed): (&AttentionHead, u64)| {
            let mut head_rng = StdRng::seed_from_u64(seed);
            head.forward(x, mode, &mut head_rng)
        };

        let outputs: Vec<Tensor> = if self.device.is_parallel() {
            self.heads.par_iter().zip(seeds).map(run_head).collect()
        } else {
            self.heads.iter().zip(seeds).map(run_head).collect()
        };

        // Concatenate heads: [batch, seq_len, n_head * head_size]
        let out = self.proj.forward(&Tensor::concat_last(&outputs));
        self.dropout.forward(&out, mode, rng)
    }

    /// Attention weights of every head, in head order
    pub fn attention_weights(&self, x: &Tensor) -> Vec<Tensor> {
        self.heads.iter().map(|h| h.attention_weights(x)).collect()
    }

    pub fn num_parameters(&self) -> usize {
        self.heads
            .iter()
            .map(AttentionHead::num_parameters)
            .sum::<usize>()
            + self.proj.num_parameters()
    }
}

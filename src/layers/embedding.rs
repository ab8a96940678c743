//! Embedding Table
//!
//! A learnable lookup table mapping an index to a dense vector. The model
//! owns two: one indexed by token id (`[vocab_size, n_embd]`) and one indexed
//! by position (`[block_size, n_embd]`).

use super::init::Initializer;
use crate::error::{ModelError, Result};
use crate::tensor::Tensor;
use rand::Rng;

/// Embedding table
#[derive(Clone, Debug)]
pub struct Embedding {
    /// Embedding weight matrix: [num_embeddings, n_embd]
    pub weight: Tensor,
}

impl Embedding {
    pub fn new<R: Rng + ?Sized>(
        num_embeddings: usize,
        n_embd: usize,
        init: &Initializer,
        rng: &mut R,
    ) -> Self {
        Self {
            weight: init.sample(vec![num_embeddings, n_embd], rng),
        }
    }

    pub fn num_embeddings(&self) -> usize {
        self.weight.shape[0]
    }

    pub fn dim(&self) -> usize {
        self.weight.shape[1]
    }

    /// Look up a rectangular batch of indices
    ///
    /// # Arguments
    ///
    /// * `ids` - Shape [batch, seq_len]
    ///
    /// # Returns
    ///
    /// Embedding vectors of shape [batch, seq_len, n_embd], or
    /// `TokenOutOfRange` for the first index past the end of the table.
    pub fn forward(&self, ids: &[Vec<usize>]) -> Result<Tensor> {
        let batch_size = ids.len();
        let seq_len = ids.first().map_or(0, Vec::len);
        let n_embd = self.dim();

        let mut output = Vec::with_capacity(batch_size * seq_len * n_embd);
        for row in ids {
            for &id in row {
                if id >= self.num_embeddings() {
                    return Err(ModelError::TokenOutOfRange {
                        token: id,
                        vocab_size: self.num_embeddings(),
                    });
                }
                output.extend_from_slice(self.weight.row(id));
            }
        }

        Ok(Tensor::new(output, vec![batch_size, seq_len, n_embd]))
    }

    /// Rows `0..len` of the table as a `[len, n_embd]` tensor
    ///
    /// Used for position embeddings, which depend only on the position index
    /// and are broadcast across the batch.
    pub fn prefix(&self, len: usize) -> Result<Tensor> {
        if len > self.num_embeddings() {
            return Err(ModelError::SequenceLengthExceeded {
                len,
                block_size: self.num_embeddings(),
            });
        }
        let n_embd = self.dim();
        Ok(Tensor::new(
            self.weight.data[..len * n_embd].to_vec(),
            vec![len, n_embd],
        ))
    }
}

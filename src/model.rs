//! Language Model
//!
//! A decoder-only transformer: token and position embeddings, a stack of
//! transformer blocks, a final layer norm, and a projection to vocabulary
//! logits.
//!
//! ## Architecture Overview
//!
//! ```text
//! Input tokens [batch, seq_len]
//!     ↓
//! Token Embedding [batch, seq_len, n_embd]
//!     + Position Embedding [seq_len, n_embd]   (broadcast over batch)
//!     ↓
//! Transformer Block 1 … N
//!     ↓
//! Layer Norm
//!     ↓
//! Linear → logits [batch, seq_len, vocab_size]
//! ```
//!
//! ## Generation
//!
//! [`LanguageModel::generate`] returns a lazy [`Generation`] iterator. Each
//! step crops the running sequence to the last `block_size` tokens, runs the
//! forward pass in evaluation mode, turns the final position's logits into
//! probabilities and samples one token per sequence. Steps are strictly
//! sequential; the sequences of a batch are processed together inside each
//! step.
//!
//! Every step re-runs the full forward pass over the cropped window. No
//! key/value cache is kept, so a step costs the same as a fresh forward over
//! at most `block_size` tokens.
//!
//! ## Example
//!
//! ```rust
//! use rand::{rngs::StdRng, SeedableRng};
//! use touchstone::{Config, LanguageModel, Mode};
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let model = LanguageModel::new(Config::tiny(), 64, &mut rng)?;
//!
//! let out = model.forward(&[vec![1, 2, 3]], None, Mode::Eval, &mut rng)?;
//! assert_eq!(out.logits.shape, vec![1, 3, 64]);
//!
//! let tokens = model.generate_tokens(vec![vec![1, 2, 3]], 5, &mut rng)?;
//! assert_eq!(tokens[0].len(), 8);
//! # Ok::<(), touchstone::ModelError>(())
//! ```

use crate::config::Config;
use crate::error::{ModelError, Result};
use crate::layers::{Embedding, Initializer, LayerNorm, Linear, Mode, TransformerBlock};
use crate::loss::cross_entropy;
use crate::sampling::{sample_index, softmax_row};
use crate::tensor::Tensor;
use rand::Rng;

/// Result of a forward pass
#[derive(Clone, Debug)]
pub struct ModelOutput {
    /// Logits over the vocabulary: [batch, seq_len, vocab_size]
    pub logits: Tensor,
    /// Mean cross-entropy, present when targets were supplied
    pub loss: Option<f32>,
}

/// Decoder-only transformer language model
///
/// Parameters are created once by [`LanguageModel::new`] and never mutated by
/// forward passes or generation, so a model can be shared by reference
/// between threads.
#[derive(Clone, Debug)]
pub struct LanguageModel {
    config: Config,
    vocab_size: usize,
    /// Token embedding table: [vocab_size, n_embd]
    pub token_embedding: Embedding,
    /// Position embedding table: [block_size, n_embd]
    pub position_embedding: Embedding,
    /// Stack of transformer blocks, applied in order
    pub blocks: Vec<TransformerBlock>,
    /// Final layer normalization
    pub ln_f: LayerNorm,
    /// Output projection to vocabulary
    pub lm_head: Linear,
}

impl LanguageModel {
    /// Create a model with the default N(0, 0.02) initialization
    ///
    /// # Errors
    ///
    /// `ModelError::Config` if the configuration is invalid (for example
    /// `n_embd` not divisible by `n_head`) or `vocab_size` is zero.
    pub fn new<R: Rng + ?Sized>(config: Config, vocab_size: usize, rng: &mut R) -> Result<Self> {
        Self::with_initializer(config, vocab_size, &Initializer::default(), rng)
    }

    /// Create a model drawing every weight and embedding from `init`
    ///
    /// Biases start at zero, layer-norm gamma at one and beta at zero.
    pub fn with_initializer<R: Rng + ?Sized>(
        config: Config,
        vocab_size: usize,
        init: &Initializer,
        rng: &mut R,
    ) -> Result<Self> {
        config.validate()?;
        if vocab_size == 0 {
            return Err(ModelError::Config("vocab_size must be at least 1".into()));
        }

        let token_embedding = Embedding::new(vocab_size, config.n_embd, init, rng);
        let position_embedding = Embedding::new(config.block_size, config.n_embd, init, rng);
        let blocks = (0..config.n_layer)
            .map(|_| TransformerBlock::new(&config, init, rng))
            .collect();
        let ln_f = LayerNorm::new(config.n_embd);
        let lm_head = Linear::new(config.n_embd, vocab_size, init, rng);

        let model = Self {
            config,
            vocab_size,
            token_embedding,
            position_embedding,
            blocks,
            ln_f,
            lm_head,
        };

        tracing::info!(
            n_embd = model.config.n_embd,
            n_head = model.config.n_head,
            n_layer = model.config.n_layer,
            block_size = model.config.block_size,
            vocab_size,
            parameters = model.count_parameters(),
            device = ?model.config.device,
            "initialized language model"
        );

        Ok(model)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// Forward pass: tokens → logits (and loss when targets are given)
    ///
    /// # Arguments
    ///
    /// * `idx` - Token ids [batch][seq_len], `1 ≤ seq_len ≤ block_size`
    /// * `targets` - Optional next-token labels with the same shape
    /// * `mode` - `Train` enables dropout; `Eval` is deterministic
    /// * `rng` - Randomness for dropout (untouched in `Eval`)
    ///
    /// # Errors
    ///
    /// - `Shape` for an empty or ragged batch, empty sequences, or targets
    ///   of another shape
    /// - `SequenceLengthExceeded` if `seq_len > block_size`
    /// - `TokenOutOfRange` for any id or target outside the vocabulary
    pub fn forward<R: Rng + ?Sized>(
        &self,
        idx: &[Vec<usize>],
        targets: Option<&[Vec<usize>]>,
        mode: Mode,
        rng: &mut R,
    ) -> Result<ModelOutput> {
        let (batch_size, seq_len) = self.check_batch(idx)?;
        if seq_len == 0 {
            return Err(ModelError::Shape("sequences must not be empty".into()));
        }
        if seq_len > self.config.block_size {
            return Err(ModelError::SequenceLengthExceeded {
                len: seq_len,
                block_size: self.config.block_size,
            });
        }
        if let Some(targets) = targets {
            self.check_targets(targets, batch_size, seq_len)?;
        }

        // Token + position embeddings: [batch, seq_len, n_embd]
        let tok_emb = self.token_embedding.forward(idx)?;
        let pos_emb = self.position_embedding.prefix(seq_len)?;
        let mut x = tok_emb.add(&pos_emb);

        // Transformer blocks
        for block in &self.blocks {
            x = block.forward(x, mode, rng);
        }

        // Final layer norm and projection to vocabulary
        let x = self.ln_f.forward(&x);
        let logits = self.lm_head.forward(&x);

        let loss = match targets {
            Some(targets) => Some(cross_entropy(&logits, targets)?),
            None => None,
        };

        Ok(ModelOutput { logits, loss })
    }

    /// Start autoregressive generation
    ///
    /// Returns a lazy iterator yielding, per step, one sampled token for each
    /// sequence in the batch. It runs for exactly `max_new_tokens` steps;
    /// there is no end-of-sequence detection.
    ///
    /// The prompt may be longer than `block_size`; only its most recent
    /// `block_size` tokens are ever fed to the model.
    ///
    /// # Errors
    ///
    /// Input validation happens here, before any step runs: an empty or
    /// ragged batch, an empty prompt, or an out-of-vocabulary token is
    /// rejected.
    pub fn generate<R: Rng>(
        &self,
        idx: Vec<Vec<usize>>,
        max_new_tokens: usize,
        rng: R,
    ) -> Result<Generation<'_, R>> {
        let (_, seq_len) = self.check_batch(&idx)?;
        if seq_len == 0 && max_new_tokens > 0 {
            return Err(ModelError::Shape(
                "generation needs at least one prompt token".into(),
            ));
        }
        for &token in idx.iter().flatten() {
            self.check_token(token)?;
        }

        tracing::debug!(
            batch = idx.len(),
            prompt_len = seq_len,
            max_new_tokens,
            "starting generation"
        );

        Ok(Generation {
            model: self,
            tokens: idx,
            remaining: max_new_tokens,
            step: 0,
            rng,
            failed: false,
        })
    }

    /// Generate eagerly and return the prompt followed by the new tokens
    ///
    /// Output shape is [batch][prompt_len + max_new_tokens]; with
    /// `max_new_tokens == 0` the prompt comes back unchanged.
    pub fn generate_tokens<R: Rng>(
        &self,
        idx: Vec<Vec<usize>>,
        max_new_tokens: usize,
        rng: R,
    ) -> Result<Vec<Vec<usize>>> {
        self.generate(idx, max_new_tokens, rng)?.finish()
    }

    /// Named views of every parameter tensor, in construction order
    ///
    /// Read-only access for collaborators such as checkpoint writers and
    /// trainers.
    pub fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        fn linear<'a>(params: &mut Vec<(String, &'a Tensor)>, name: &str, layer: &'a Linear) {
            params.push((format!("{}.weight", name), &layer.weight));
            if let Some(bias) = &layer.bias {
                params.push((format!("{}.bias", name), bias));
            }
        }
        fn norm<'a>(params: &mut Vec<(String, &'a Tensor)>, name: &str, ln: &'a LayerNorm) {
            params.push((format!("{}.gamma", name), &ln.gamma));
            params.push((format!("{}.beta", name), &ln.beta));
        }

        let mut params = vec![
            ("token_embedding".to_string(), &self.token_embedding.weight),
            (
                "position_embedding".to_string(),
                &self.position_embedding.weight,
            ),
        ];

        for (i, block) in self.blocks.iter().enumerate() {
            norm(&mut params, &format!("blocks.{}.ln1", i), &block.ln1);
            for (h, head) in block.attn.heads.iter().enumerate() {
                let prefix = format!("blocks.{}.attn.heads.{}", i, h);
                linear(&mut params, &format!("{}.key", prefix), &head.key);
                linear(&mut params, &format!("{}.query", prefix), &head.query);
                linear(&mut params, &format!("{}.value", prefix), &head.value);
            }
            linear(&mut params, &format!("blocks.{}.attn.proj", i), &block.attn.proj);
            norm(&mut params, &format!("blocks.{}.ln2", i), &block.ln2);
            linear(&mut params, &format!("blocks.{}.ffwd.fc1", i), &block.ffwd.fc1);
            linear(&mut params, &format!("blocks.{}.ffwd.fc2", i), &block.ffwd.fc2);
        }

        norm(&mut params, "ln_f", &self.ln_f);
        linear(&mut params, "lm_head", &self.lm_head);
        params
    }

    /// Total number of learnable parameters
    pub fn count_parameters(&self) -> usize {
        self.token_embedding.weight.data.len()
            + self.position_embedding.weight.data.len()
            + self
                .blocks
                .iter()
                .map(TransformerBlock::num_parameters)
                .sum::<usize>()
            + self.ln_f.num_parameters()
            + self.lm_head.num_parameters()
    }

    /// Validate a token batch and return (batch_size, seq_len)
    fn check_batch(&self, idx: &[Vec<usize>]) -> Result<(usize, usize)> {
        let first = idx
            .first()
            .ok_or_else(|| ModelError::Shape("batch must contain at least one sequence".into()))?;
        let seq_len = first.len();

        if let Some((row, bad)) = idx.iter().enumerate().find(|(_, r)| r.len() != seq_len) {
            return Err(ModelError::Shape(format!(
                "ragged batch: sequence {} has length {}, expected {}",
                row,
                bad.len(),
                seq_len
            )));
        }

        Ok((idx.len(), seq_len))
    }

    fn check_targets(&self, targets: &[Vec<usize>], batch_size: usize, seq_len: usize) -> Result<()> {
        if targets.len() != batch_size || targets.iter().any(|r| r.len() != seq_len) {
            return Err(ModelError::Shape(format!(
                "targets must have shape [{}, {}]",
                batch_size, seq_len
            )));
        }
        targets
            .iter()
            .flatten()
            .try_for_each(|&t| self.check_token(t))
    }

    fn check_token(&self, token: usize) -> Result<()> {
        if token >= self.vocab_size {
            return Err(ModelError::TokenOutOfRange {
                token,
                vocab_size: self.vocab_size,
            });
        }
        Ok(())
    }
}

/// Lazy autoregressive sampling over a batch of sequences
///
/// Created by [`LanguageModel::generate`]. Each call to `next` runs one
/// forward pass and yields the tokens sampled for every sequence in the
/// batch (one per sequence). The iterator is finite and cannot be restarted.
/// Dropping it between steps cancels generation; the model is unaffected.
pub struct Generation<'m, R> {
    model: &'m LanguageModel,
    tokens: Vec<Vec<usize>>,
    remaining: usize,
    step: usize,
    rng: R,
    failed: bool,
}

impl<'m, R: Rng> Generation<'m, R> {
    /// Sequences so far: the prompt plus every token sampled up to now
    pub fn tokens(&self) -> &[Vec<usize>] {
        &self.tokens
    }

    /// Steps still to run
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Run the remaining steps and return the full sequences
    pub fn finish(mut self) -> Result<Vec<Vec<usize>>> {
        for step in self.by_ref() {
            step?;
        }
        Ok(self.tokens)
    }

    fn sample_step(&mut self) -> Result<Vec<usize>> {
        // Crop each sequence to the last block_size tokens
        let block_size = self.model.block_size();
        let context: Vec<Vec<usize>> = self
            .tokens
            .iter()
            .map(|seq| seq[seq.len().saturating_sub(block_size)..].to_vec())
            .collect();
        let context_len = context[0].len();

        let output = self
            .model
            .forward(&context, None, Mode::Eval, &mut self.rng)?;

        // Sample from the distribution at the last position of each row
        let mut next_tokens = Vec::with_capacity(self.tokens.len());
        for (b, seq) in self.tokens.iter_mut().enumerate() {
            let last_logits = output.logits.row(b * context_len + context_len - 1);
            let probs = softmax_row(last_logits);
            let next = sample_index(&probs, &mut self.rng);
            seq.push(next);
            next_tokens.push(next);
        }

        tracing::trace!(step = self.step, context_len, tokens = ?next_tokens, "sampled");
        Ok(next_tokens)
    }
}

impl<'m, R: Rng> Iterator for Generation<'m, R> {
    type Item = Result<Vec<usize>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.failed {
            return None;
        }

        let result = self.sample_step();
        match &result {
            Ok(_) => {
                self.remaining -= 1;
                self.step += 1;
            }
            Err(_) => self.failed = true,
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            (0, Some(0))
        } else {
            (self.remaining, Some(self.remaining))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Device;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_model(seed: u64) -> LanguageModel {
        let config = Config {
            n_embd: 16,
            n_head: 2,
            n_layer: 1,
            block_size: 8,
            dropout: 0.0,
            device: Device::Cpu,
        };
        LanguageModel::new(config, 10, &mut StdRng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn test_rejects_indivisible_config() {
        let config = Config {
            n_embd: 15,
            n_head: 2,
            ..Config::tiny()
        };
        let err = LanguageModel::new(config, 10, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, ModelError::Config(_)));
    }

    #[test]
    fn test_rejects_zero_vocab() {
        assert!(LanguageModel::new(Config::tiny(), 0, &mut StdRng::seed_from_u64(0)).is_err());
    }

    #[test]
    fn test_forward_validates_input() {
        let model = small_model(0);
        let mut rng = StdRng::seed_from_u64(1);

        assert!(matches!(
            model.forward(&[], None, Mode::Eval, &mut rng),
            Err(ModelError::Shape(_))
        ));
        assert!(matches!(
            model.forward(&[vec![1, 2], vec![3]], None, Mode::Eval, &mut rng),
            Err(ModelError::Shape(_))
        ));
        assert!(matches!(
            model.forward(&[vec![0; 9]], None, Mode::Eval, &mut rng),
            Err(ModelError::SequenceLengthExceeded {
                len: 9,
                block_size: 8
            })
        ));
        assert!(matches!(
            model.forward(&[vec![1, 10]], None, Mode::Eval, &mut rng),
            Err(ModelError::TokenOutOfRange {
                token: 10,
                vocab_size: 10
            })
        ));
        assert!(matches!(
            model.forward(&[vec![1, 2]], Some(&[vec![1]]), Mode::Eval, &mut rng),
            Err(ModelError::Shape(_))
        ));
        assert!(matches!(
            model.forward(&[vec![1, 2]], Some(&[vec![1, 11]]), Mode::Eval, &mut rng),
            Err(ModelError::TokenOutOfRange { token: 11, .. })
        ));
    }

    #[test]
    fn test_loss_only_with_targets() {
        let model = small_model(2);
        let mut rng = StdRng::seed_from_u64(3);
        let idx = vec![vec![1, 2, 3]];

        let without = model.forward(&idx, None, Mode::Eval, &mut rng).unwrap();
        assert!(without.loss.is_none());

        let with = model
            .forward(&idx, Some(&[vec![2, 3, 4]]), Mode::Eval, &mut rng)
            .unwrap();
        let loss = with.loss.unwrap();
        // Freshly initialized weights are close to uniform over 10 tokens
        assert!((loss - (10.0f32).ln()).abs() < 0.5, "loss {}", loss);
        assert_eq!(with.logits, without.logits);
    }

    #[test]
    fn test_parameter_count_matches_named_parameters() {
        let model = small_model(4);
        let named: usize = model
            .named_parameters()
            .iter()
            .map(|(_, t)| t.data.len())
            .sum();
        assert_eq!(named, model.count_parameters());

        // tok 10*16 + pos 8*16
        // block: ln 2*32, heads 2*3*16*8, proj 16*16+16, ffwd 16*64+64 + 64*16+16
        // ln_f 32, head 16*10+10
        let expected = 160 + 128 + (64 + 768 + 272 + 1088 + 1040) + 32 + 170;
        assert_eq!(model.count_parameters(), expected);
    }

    #[test]
    fn test_named_parameters_are_unique() {
        let model = small_model(5);
        let mut names: Vec<String> = model
            .named_parameters()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert!(names.contains(&"blocks.0.attn.heads.1.query.weight".to_string()));
        assert!(!names.iter().any(|n| n.ends_with("key.bias")));
    }

    #[test]
    fn test_generation_iterator_yields_one_token_per_sequence() {
        let model = small_model(6);
        let mut generation = model
            .generate(vec![vec![1, 2], vec![3, 4]], 3, StdRng::seed_from_u64(7))
            .unwrap();

        assert_eq!(generation.size_hint(), (3, Some(3)));
        let first = generation.next().unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(generation.remaining(), 2);
        assert_eq!(generation.tokens()[0].len(), 3);
        assert_eq!(generation.tokens()[0][2], first[0]);
        assert_eq!(generation.tokens()[1][2], first[1]);

        assert_eq!(generation.by_ref().count(), 2);
        assert!(generation.next().is_none());
    }

    #[test]
    fn test_generation_rejects_empty_prompt() {
        let model = small_model(8);
        assert!(model
            .generate(vec![vec![]], 2, StdRng::seed_from_u64(0))
            .is_err());
        assert_eq!(
            model
                .generate_tokens(vec![vec![]], 0, StdRng::seed_from_u64(0))
                .unwrap(),
            vec![Vec::<usize>::new()]
        );
    }

    #[test]
    fn test_generation_same_seed_same_tokens() {
        let model = small_model(9);
        let a = model
            .generate_tokens(vec![vec![5]], 6, StdRng::seed_from_u64(42))
            .unwrap();
        let b = model
            .generate_tokens(vec![vec![5]], 6, StdRng::seed_from_u64(42))
            .unwrap();
        assert_eq!(a, b);
    }
}

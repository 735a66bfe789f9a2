//! Weighted pooling, FiLM conditioning and the classification head.

use candle_core::{Module, Tensor};
use candle_nn::{layer_norm, linear, Dropout, LayerNorm, Linear, VarBuilder};

use crate::config::ModelConfig;
use crate::film::FilmConditioning;
use crate::pooling::{apply_receptor_weights, masked_max_pool};
use crate::{ModelError, Result};

/// Linear(D → D/2) → LayerNorm → ReLU → Dropout → Linear(D/2 → classes)
#[derive(Debug, Clone)]
pub struct ClassificationHead {
    fc1: Linear,
    norm: LayerNorm,
    dropout: Dropout,
    fc2: Linear,
}

impl ClassificationHead {
    pub fn new(hidden_size: usize, num_classes: usize, dropout: f32, eps: f64, vb: VarBuilder) -> Result<Self> {
        let reduced = hidden_size / 2;
        Ok(Self {
            fc1: linear(hidden_size, reduced, vb.pp("0"))?,
            norm: layer_norm(reduced, eps, vb.pp("1"))?,
            dropout: Dropout::new(dropout),
            fc2: linear(reduced, num_classes, vb.pp("4"))?,
        })
    }

    pub fn forward_t(&self, pooled: &Tensor, train: bool) -> Result<Tensor> {
        let h = self.norm.forward(&self.fc1.forward(pooled)?)?.relu()?;
        let h = self.dropout.forward(&h, train)?;
        Ok(self.fc2.forward(&h)?)
    }
}

/// Intermediate tensors of one classifier pass.
#[derive(Debug, Clone)]
pub struct ClassifierOutput {
    /// Embeddings with receptor positions scaled by structural weight (batch, seq_len, D)
    pub weighted_embeddings: Tensor,
    /// Masked max-pool of the weighted embeddings (batch, D)
    pub context: Tensor,
    /// Masked max-pool of the conditioned embeddings (batch, D)
    pub pooled: Tensor,
    /// Unnormalised class scores (batch, num_classes)
    pub logits: Tensor,
}

#[derive(Debug, Clone)]
pub struct PoolingClassifier {
    film: FilmConditioning,
    head: ClassificationHead,
}

impl PoolingClassifier {
    pub fn new(hidden_size: usize, config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        if hidden_size < 2 {
            return Err(ModelError::Config(format!("hidden size {hidden_size} is too small")));
        }
        Ok(Self {
            film: FilmConditioning::new(
                hidden_size,
                config.chemical_hidden,
                config.film_dropout,
                config.layer_norm_eps,
                vb.pp("film"),
            )?,
            head: ClassificationHead::new(
                hidden_size,
                config.num_classes,
                config.head_dropout,
                config.layer_norm_eps,
                vb.pp("classifier"),
            )?,
        })
    }

    /// # Arguments
    /// * `embeddings` - raw encoder output (batch, seq_len, D)
    /// * `attention_mask` - (batch, seq_len), non-zero for real tokens
    /// * `receptor_mask` - (batch, seq_len) u8
    /// * `weights` - structural weights (batch, seq_len)
    /// * `chemical` - assembled feature matrix (batch, seq_len, 6)
    pub fn forward_t(
        &self,
        embeddings: &Tensor,
        attention_mask: &Tensor,
        receptor_mask: &Tensor,
        weights: &Tensor,
        chemical: &Tensor,
        train: bool,
    ) -> Result<ClassifierOutput> {
        let weighted_embeddings = apply_receptor_weights(embeddings, receptor_mask, weights)?;
        let context = masked_max_pool(&weighted_embeddings, attention_mask)?;

        let conditioned = self.film.forward_t(&weighted_embeddings, &context, chemical, train)?;
        let pooled = masked_max_pool(&conditioned, attention_mask)?;
        let logits = self.head.forward_t(&pooled, train)?;

        Ok(ClassifierOutput {
            weighted_embeddings,
            context,
            pooled,
            logits,
        })
    }
}

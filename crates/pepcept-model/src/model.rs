//! The full peptide-receptor interaction model.

use std::path::Path;
use std::sync::Arc;

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use tracing::{debug, info};

use crate::batch::Batch;
use crate::bfactor::BFactorWeightTable;
use crate::classifier::{ClassifierOutput, PoolingClassifier};
use crate::encoder::SequenceEncoder;
use crate::features::FeatureAssembler;
use crate::segment::SequenceSegmenter;
use crate::{ModelConfig, ModelError, Result};

/// Encoder + structural weighting + chemical conditioning + classifier.
///
/// Holds no per-batch state, so one instance can serve concurrent batches.
pub struct InteractionModel<E: SequenceEncoder> {
    encoder: E,
    bfactors: Arc<BFactorWeightTable>,
    segmenter: SequenceSegmenter,
    assembler: FeatureAssembler,
    classifier: PoolingClassifier,
}

impl<E: SequenceEncoder> InteractionModel<E> {
    /// Build the model. Fails before any batch is seen when the configuration
    /// is invalid, including a missing separator token id.
    pub fn new(
        encoder: E,
        bfactors: Arc<BFactorWeightTable>,
        config: &ModelConfig,
        vb: VarBuilder,
    ) -> Result<Self> {
        config.validate()?;
        let separator = config.separator()?;
        let classifier = PoolingClassifier::new(encoder.hidden_size(), config, vb)?;

        info!(
            "Interaction model ready: hidden size {}, separator id {}, {} structural profiles",
            encoder.hidden_size(),
            separator,
            bfactors.len()
        );

        Ok(Self {
            encoder,
            bfactors,
            segmenter: SequenceSegmenter::new(separator),
            assembler: FeatureAssembler,
            classifier,
        })
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn bfactors(&self) -> &BFactorWeightTable {
        &self.bfactors
    }

    /// Run every stage and keep the intermediate tensors.
    pub fn forward_t(&self, batch: &Batch, train: bool) -> Result<ClassifierOutput> {
        batch.validate()?;
        let device = self.encoder.device();
        let batch = batch.to_device(device)?;
        let (batch_size, seq_len) = batch.input_ids.dims2()?;

        let embeddings = self.encoder.encode(&batch.input_ids, &batch.attention_mask)?;
        let expected = [batch_size, seq_len, self.encoder.hidden_size()];
        if embeddings.dims() != expected {
            return Err(ModelError::Inference(format!(
                "encoder returned {:?}, expected {:?}",
                embeddings.dims(),
                expected
            )));
        }

        let receptor_mask = self.segmenter.receptor_mask(&batch.input_ids)?;
        let weights = self
            .bfactors
            .weight_matrix(&batch.receptor_ids, seq_len, device)?
            .to_dtype(embeddings.dtype())?;
        let chemical = self
            .assembler
            .assemble(&batch.chemistry, &receptor_mask, &weights)?
            .to_dtype(embeddings.dtype())?;

        debug!("Classifying batch of {} samples, {} tokens each", batch_size, seq_len);
        self.classifier.forward_t(
            &embeddings,
            &batch.attention_mask,
            &receptor_mask,
            &weights,
            &chemical,
            train,
        )
    }

    /// Inference logits (batch, num_classes).
    pub fn forward(&self, batch: &Batch) -> Result<Tensor> {
        Ok(self.forward_t(batch, false)?.logits)
    }
}

/// Variables for the conditioning and classification layers.
///
/// Reads trained weights from a safetensors file when given; otherwise the
/// layers are freshly initialised.
pub fn head_parameters(weights: Option<&Path>, device: &Device) -> Result<VarBuilder<'static>> {
    match weights {
        Some(path) => {
            info!("Loading classifier weights from {:?}", path);
            Ok(unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)? })
        }
        None => {
            let varmap = VarMap::new();
            Ok(VarBuilder::from_varmap(&varmap, DType::F32, device))
        }
    }
}

/// Softmax over the class axis.
pub fn probabilities(logits: &Tensor) -> Result<Tensor> {
    Ok(candle_nn::ops::softmax_last_dim(&logits.to_dtype(DType::F32)?)?)
}

/// Index of the highest-scoring class per sample.
pub fn predicted_labels(logits: &Tensor) -> Result<Vec<u32>> {
    Ok(logits.argmax(D::Minus1)?.to_vec1::<u32>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probabilities_sum_to_one() {
        let logits = Tensor::new(&[[1.0f32, 2.0, 3.0], [0.0, 0.0, 0.0]], &Device::Cpu).unwrap();
        let probs = probabilities(&logits).unwrap().to_vec2::<f32>().unwrap();
        for row in &probs {
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
        assert!((probs[1][0] - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(predicted_labels(&logits).unwrap()[0], 2);
    }
}

//! Raw samples to an aligned numeric [`Batch`].

use candle_core::{Device, Tensor};
use pepcept_model::{Batch, ChemicalChannels, ModelConfig};
use tracing::debug;

use crate::dataset::InteractionSample;
use crate::report::BatchMetadata;
use crate::tokenize::PairTokenizer;
use crate::{DataError, Result};

/// Tokenizes, truncates, pads and aligns a group of samples.
#[derive(Debug, Clone)]
pub struct BatchAssembler {
    max_length: usize,
    pad_token_id: u32,
    num_classes: usize,
    device: Device,
}

impl BatchAssembler {
    pub fn new(config: &ModelConfig, device: Device) -> Self {
        Self {
            max_length: config.max_length,
            pad_token_id: config.pad_token_id,
            num_classes: config.num_classes,
            device,
        }
    }

    /// Override the configured padding id, e.g. with the tokenizer's own.
    pub fn with_pad_token(mut self, pad_token_id: u32) -> Self {
        self.pad_token_id = pad_token_id;
        self
    }

    /// Build the model input and its reporting metadata.
    ///
    /// Rows longer than `max_length` are truncated; shorter rows are padded to
    /// the longest row. Chemical channels are zero-padded or truncated to the
    /// tokenized length. Labels are attached only when every sample has one.
    pub fn assemble(
        &self,
        samples: &[InteractionSample],
        tokenizer: &dyn PairTokenizer,
    ) -> Result<(Batch, BatchMetadata)> {
        if samples.is_empty() {
            return Err(DataError::EmptyBatch);
        }

        let pairs: Vec<(&str, &str)> = samples
            .iter()
            .map(|s| (s.peptide.as_str(), s.receptor_sequence.as_str()))
            .collect();
        let mut rows = tokenizer.encode_pairs(&pairs)?;

        for (i, row) in rows.iter_mut().enumerate() {
            if row.len() > self.max_length {
                debug!("Truncating sample {} from {} to {} tokens", i, row.len(), self.max_length);
                row.truncate(self.max_length);
            }
        }
        let len = rows.iter().map(Vec::len).max().unwrap_or(0);
        let n = rows.len();

        let mut ids = Vec::with_capacity(n * len);
        let mut mask = Vec::with_capacity(n * len);
        for row in &rows {
            ids.extend_from_slice(row);
            ids.extend(std::iter::repeat(self.pad_token_id).take(len - row.len()));
            mask.extend(std::iter::repeat(1u8).take(row.len()));
            mask.extend(std::iter::repeat(0u8).take(len - row.len()));
        }

        let batch = Batch {
            input_ids: Tensor::from_vec(ids, (n, len), &self.device)?,
            attention_mask: Tensor::from_vec(mask, (n, len), &self.device)?,
            chemistry: ChemicalChannels::from_profiles(
                samples.iter().map(|s| &s.chemistry),
                len,
                &self.device,
            )?,
            receptor_ids: samples.iter().map(InteractionSample::receptor_id).collect(),
            labels: self.labels(samples)?,
        };

        Ok((batch, BatchMetadata::from_samples(samples)))
    }

    fn labels(&self, samples: &[InteractionSample]) -> Result<Option<Tensor>> {
        let labelled = samples.iter().filter(|s| s.label.is_some()).count();
        if labelled == 0 {
            return Ok(None);
        }

        let labels = samples
            .iter()
            .enumerate()
            .map(|(row, s)| match s.label {
                Some(y) if (y as usize) < self.num_classes => Ok(y),
                Some(y) => Err(DataError::InvalidSample {
                    row,
                    message: format!("label {y} is outside 0..{}", self.num_classes),
                }),
                None => Err(DataError::InvalidSample {
                    row,
                    message: "missing label in a labelled batch".to_string(),
                }),
            })
            .collect::<Result<Vec<u32>>>()?;

        Ok(Some(Tensor::new(labels.as_slice(), &self.device)?))
    }
}

//! Per-sample prediction artifact and scoring hooks.

use std::path::Path;

use candle_core::Tensor;
use pepcept_model::{predicted_labels, probabilities};
use tracing::{info, warn};

use crate::dataset::InteractionSample;
use crate::{DataError, Result};

/// Pass-through identification of the samples in a batch.
///
/// Only used for reporting; none of it reaches the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchMetadata {
    pub header_names: Vec<String>,
    pub plant_species: Vec<String>,
    pub receptors: Vec<String>,
    pub locus_ids: Vec<String>,
    pub peptide_sequences: Vec<String>,
    pub receptor_sequences: Vec<String>,
}

impl BatchMetadata {
    pub fn from_samples(samples: &[InteractionSample]) -> Self {
        fn column(samples: &[InteractionSample], f: fn(&InteractionSample) -> &String) -> Vec<String> {
            samples.iter().map(|s| f(s).clone()).collect()
        }
        Self {
            header_names: column(samples, |s| &s.header_name),
            plant_species: column(samples, |s| &s.plant_species),
            receptors: column(samples, |s| &s.receptor),
            locus_ids: column(samples, |s| &s.locus_id),
            peptide_sequences: column(samples, |s| &s.peptide),
            receptor_sequences: column(samples, |s| &s.receptor_sequence),
        }
    }

    pub fn len(&self) -> usize {
        self.header_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.header_names.is_empty()
    }

    pub fn extend(&mut self, other: BatchMetadata) {
        self.header_names.extend(other.header_names);
        self.plant_species.extend(other.plant_species);
        self.receptors.extend(other.receptors);
        self.locus_ids.extend(other.locus_ids);
        self.peptide_sequences.extend(other.peptide_sequences);
        self.receptor_sequences.extend(other.receptor_sequences);
    }

    /// Pad with empty strings or truncate every column to `len`.
    fn fit(&mut self, len: usize) {
        for column in [
            &mut self.header_names,
            &mut self.plant_species,
            &mut self.receptors,
            &mut self.locus_ids,
            &mut self.peptide_sequences,
            &mut self.receptor_sequences,
        ] {
            column.resize(len, String::new());
        }
    }
}

/// Class probabilities, decisions and identification for an evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionReport {
    pub probabilities: Vec<Vec<f32>>,
    pub predicted: Vec<u32>,
    pub ground_truth: Option<Vec<u32>>,
    pub metadata: BatchMetadata,
}

/// Evaluation split, used to prefix score names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn prefix(self) -> &'static str {
        match self {
            Split::Train => "train_",
            Split::Test => "test_",
        }
    }
}

/// Opaque metric: `(ground_truth, predicted, probabilities) -> score`.
pub type Scorer = dyn Fn(&[u32], &[u32], &[Vec<f32>]) -> f64 + Send + Sync;

impl PredictionReport {
    /// Build from a batch of logits `(batch, classes)`.
    ///
    /// Metadata of a different length than the predictions is padded or
    /// truncated to match, with a warning. Labels must have one entry per
    /// prediction.
    pub fn new(logits: &Tensor, labels: Option<&Tensor>, mut metadata: BatchMetadata) -> Result<Self> {
        let probabilities = probabilities(logits)?.to_vec2::<f32>()?;
        let predicted = predicted_labels(logits)?;
        let ground_truth = labels
            .map(|l| l.to_dtype(candle_core::DType::U32)?.flatten_all()?.to_vec1::<u32>())
            .transpose()?;

        if let Some(truth) = &ground_truth {
            if truth.len() != predicted.len() {
                return Err(DataError::LengthMismatch {
                    what: "ground truth labels",
                    expected: predicted.len(),
                    actual: truth.len(),
                });
            }
        }

        if metadata.len() != predicted.len() {
            warn!(
                "Metadata length mismatch: expected {}, got {}. Padding or truncating.",
                predicted.len(),
                metadata.len()
            );
        }
        metadata.fit(predicted.len());

        Ok(Self {
            probabilities,
            predicted,
            ground_truth,
            metadata,
        })
    }

    pub fn len(&self) -> usize {
        self.predicted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicted.is_empty()
    }

    /// Append another batch. Ground truth is kept only if both sides have it.
    pub fn extend(&mut self, other: PredictionReport) {
        let was_empty = self.is_empty();
        self.ground_truth = match (self.ground_truth.take(), other.ground_truth) {
            (Some(mut mine), Some(theirs)) => {
                mine.extend(theirs);
                Some(mine)
            }
            (None, theirs) if was_empty => theirs,
            _ => None,
        };
        self.probabilities.extend(other.probabilities);
        self.predicted.extend(other.predicted);
        self.metadata.extend(other.metadata);
    }

    /// Every column must line up with the predictions.
    fn check_lengths(&self) -> Result<()> {
        let expected = self.predicted.len();
        let columns = [
            ("probabilities", Some(self.probabilities.len())),
            ("ground truth labels", self.ground_truth.as_ref().map(Vec::len)),
            ("header names", Some(self.metadata.len())),
            ("plant species", Some(self.metadata.plant_species.len())),
            ("receptors", Some(self.metadata.receptors.len())),
            ("locus ids", Some(self.metadata.locus_ids.len())),
            ("peptide sequences", Some(self.metadata.peptide_sequences.len())),
            ("receptor sequences", Some(self.metadata.receptor_sequences.len())),
        ];
        for (what, len) in columns {
            if let Some(actual) = len.filter(|&n| n != expected) {
                return Err(DataError::LengthMismatch { what, expected, actual });
            }
        }
        Ok(())
    }

    /// Write one row per sample.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.check_lengths()?;
        let classes = self.probabilities.first().map_or(0, Vec::len);
        let mut writer = csv::Writer::from_path(path)?;

        let mut header: Vec<String> = (0..classes).map(|c| format!("prob_class{c}")).collect();
        header.push("predicted_label".to_string());
        if self.ground_truth.is_some() {
            header.push("ground_truth".to_string());
        }
        header.extend(
            ["Header_Name", "plant_species", "receptor", "locus_id", "Sequence", "receptor_sequence"]
                .map(String::from),
        );
        writer.write_record(&header)?;

        let m = &self.metadata;
        for (i, probs) in self.probabilities.iter().enumerate() {
            let mut record: Vec<String> = probs.iter().map(|p| p.to_string()).collect();
            record.push(self.predicted[i].to_string());
            if let Some(truth) = &self.ground_truth {
                record.push(truth[i].to_string());
            }
            record.extend([
                m.header_names[i].clone(),
                m.plant_species[i].clone(),
                m.receptors[i].clone(),
                m.locus_ids[i].clone(),
                m.peptide_sequences[i].clone(),
                m.receptor_sequences[i].clone(),
            ]);
            writer.write_record(&record)?;
        }
        writer.flush()?;

        info!("Wrote {} predictions to {:?}", self.len(), path);
        Ok(())
    }

    /// Run each named scorer; `None` without ground truth.
    pub fn score(&self, scorers: &[(&str, &Scorer)], split: Split) -> Option<Vec<(String, f64)>> {
        let truth = self.ground_truth.as_deref()?;
        Some(
            scorers
                .iter()
                .map(|(name, scorer)| {
                    let value = scorer(truth, &self.predicted, &self.probabilities);
                    (format!("{}{}", split.prefix(), name), value)
                })
                .collect(),
        )
    }
}

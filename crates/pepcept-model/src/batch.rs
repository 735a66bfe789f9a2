//! Numeric model input for a batch of peptide-receptor pairs.

use candle_core::{Device, Tensor};

use crate::features::ChemicalChannels;
use crate::{ModelError, Result};

/// Aligned tensors for N samples of length L.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Token ids (N, L) u32
    pub input_ids: Tensor,
    /// 1 for real tokens, 0 for padding (N, L) u8
    pub attention_mask: Tensor,
    /// Raw chemical channels, each (N, L)
    pub chemistry: ChemicalChannels,
    /// `species|locus|receptor` per sample
    pub receptor_ids: Vec<String>,
    /// Interaction class per sample (N,) u32
    pub labels: Option<Tensor>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.receptor_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receptor_ids.is_empty()
    }

    pub fn seq_len(&self) -> Result<usize> {
        Ok(self.input_ids.dim(1)?)
    }

    /// Check that every component agrees on (N, L).
    pub fn validate(&self) -> Result<()> {
        let (n, l) = self.input_ids.dims2()?;
        let mismatch = |what: &str, dims: &[usize]| {
            ModelError::InvalidInput(format!("{what} has shape {dims:?}, expected ({n}, {l})"))
        };

        if self.attention_mask.dims() != [n, l] {
            return Err(mismatch("attention mask", self.attention_mask.dims()));
        }
        for channel in self.chemistry.peptide.iter().chain(self.chemistry.receptor.iter()) {
            if channel.dims() != [n, l] {
                return Err(mismatch("chemical channel", channel.dims()));
            }
        }
        if self.receptor_ids.len() != n {
            return Err(ModelError::InvalidInput(format!(
                "{} receptor ids for {n} samples",
                self.receptor_ids.len()
            )));
        }
        if let Some(labels) = &self.labels {
            if labels.dims() != [n] {
                return Err(ModelError::InvalidInput(format!(
                    "labels have shape {:?}, expected ({n},)",
                    labels.dims()
                )));
            }
        }
        Ok(())
    }

    /// Move every tensor to `device`.
    pub fn to_device(&self, device: &Device) -> Result<Self> {
        let move_all = |ts: &[Tensor; 3]| -> Result<[Tensor; 3]> {
            Ok([
                ts[0].to_device(device)?,
                ts[1].to_device(device)?,
                ts[2].to_device(device)?,
            ])
        };
        Ok(Self {
            input_ids: self.input_ids.to_device(device)?,
            attention_mask: self.attention_mask.to_device(device)?,
            chemistry: ChemicalChannels {
                peptide: move_all(&self.chemistry.peptide)?,
                receptor: move_all(&self.chemistry.receptor)?,
            },
            receptor_ids: self.receptor_ids.clone(),
            labels: self.labels.as_ref().map(|l| l.to_device(device)).transpose()?,
        })
    }
}

//! Per-residue physicochemical channels and their structural weighting.

use candle_core::{Device, Tensor, D};

use crate::Result;

/// Properties carried for both the peptide and the receptor, in channel order.
pub const CHEMICAL_PROPERTIES: [&str; 3] = ["bulkiness", "charge", "hydrophobicity"];

/// Number of channels in an assembled feature matrix (peptide x3, receptor x3).
pub const NUM_CHEMICAL_CHANNELS: usize = 2 * CHEMICAL_PROPERTIES.len();

/// Raw per-residue values of one sample, in [`CHEMICAL_PROPERTIES`] order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChemicalProfile {
    pub peptide: [Vec<f32>; 3],
    pub receptor: [Vec<f32>; 3],
}

/// Zero-pad or truncate `values` to exactly `len` entries.
pub fn fit_to_length(values: &[f32], len: usize) -> Vec<f32> {
    let mut out: Vec<f32> = values.iter().take(len).copied().collect();
    out.resize(len, 0.0);
    out
}

/// Batched raw channels, each `(batch, len)`.
#[derive(Debug, Clone)]
pub struct ChemicalChannels {
    pub peptide: [Tensor; 3],
    pub receptor: [Tensor; 3],
}

impl ChemicalChannels {
    /// Align every sample's arrays to the tokenized length and stack them.
    pub fn from_profiles<'a, I>(profiles: I, len: usize, device: &Device) -> Result<Self>
    where
        I: IntoIterator<Item = &'a ChemicalProfile>,
        I::IntoIter: Clone,
    {
        let profiles = profiles.into_iter();
        let batch = profiles.clone().count();
        let channel = |index: usize, receptor: bool| -> Result<Tensor> {
            let rows: Vec<f32> = profiles
                .clone()
                .flat_map(|p| {
                    let values = if receptor { &p.receptor[index] } else { &p.peptide[index] };
                    fit_to_length(values, len)
                })
                .collect();
            Ok(Tensor::from_vec(rows, (batch, len), device)?)
        };

        Ok(Self {
            peptide: [channel(0, false)?, channel(1, false)?, channel(2, false)?],
            receptor: [channel(0, true)?, channel(1, true)?, channel(2, true)?],
        })
    }

    pub fn dims(&self) -> Result<(usize, usize)> {
        Ok(self.peptide[0].dims2()?)
    }
}

/// Combines raw chemical channels with receptor weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureAssembler;

impl FeatureAssembler {
    /// Build the `(batch, len, 6)` feature matrix.
    ///
    /// Receptor channels are multiplied by `weights` on receptor positions
    /// only; every other position keeps its raw value. Output channel order is
    /// the three peptide properties followed by the three weighted receptor
    /// properties.
    pub fn assemble(
        &self,
        channels: &ChemicalChannels,
        receptor_mask: &Tensor,
        weights: &Tensor,
    ) -> Result<Tensor> {
        let mut stacked: Vec<Tensor> = channels.peptide.to_vec();
        for raw in &channels.receptor {
            let weighted = raw.mul(weights)?;
            stacked.push(receptor_mask.where_cond(&weighted, raw)?);
        }
        Ok(Tensor::stack(&stacked, D::Minus1)?)
    }
}

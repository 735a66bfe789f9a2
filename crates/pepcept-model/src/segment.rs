//! Peptide / receptor split of a jointly encoded token grid.

use candle_core::{DType, Tensor};
use tracing::warn;

use crate::Result;

/// Finds the separator in each row and marks the receptor positions after it.
#[derive(Debug, Clone, Copy)]
pub struct SequenceSegmenter {
    separator: u32,
}

impl SequenceSegmenter {
    pub fn new(separator: u32) -> Self {
        Self { separator }
    }

    pub fn separator(&self) -> u32 {
        self.separator
    }

    /// Column of the first separator per row; `len` where there is none.
    fn first_separator(&self, input_ids: &Tensor) -> Result<(Tensor, Tensor)> {
        let (batch, len) = input_ids.dims2()?;
        let device = input_ids.device();

        let positions = Tensor::arange(0u32, len as u32, device)?
            .unsqueeze(0)?
            .broadcast_as((batch, len))?
            .contiguous()?;
        let separator = Tensor::full(self.separator, (batch, len), device)?;
        let not_found = Tensor::full(len as u32, (batch, len), device)?;

        let first = input_ids
            .to_dtype(DType::U32)?
            .eq(&separator)?
            .where_cond(&positions, &not_found)?
            .min(1)?;
        Ok((positions, first))
    }

    /// Column of the first separator in each row, if any.
    pub fn separator_positions(&self, input_ids: &Tensor) -> Result<Vec<Option<usize>>> {
        let (_, len) = input_ids.dims2()?;
        if len == 0 {
            return Ok(vec![None; input_ids.dim(0)?]);
        }
        let (_, first) = self.first_separator(input_ids)?;
        Ok(first
            .to_vec1::<u32>()?
            .into_iter()
            .map(|p| ((p as usize) < len).then_some(p as usize))
            .collect())
    }

    /// `(batch, len)` u8 mask, 1 on the positions after the first separator.
    ///
    /// The separator itself belongs to neither segment. Rows without a
    /// separator get an all-zero mask and a warning.
    pub fn receptor_mask(&self, input_ids: &Tensor) -> Result<Tensor> {
        let (batch, len) = input_ids.dims2()?;
        if len == 0 {
            return Ok(Tensor::zeros((batch, 0), DType::U8, input_ids.device())?);
        }

        let (positions, first) = self.first_separator(input_ids)?;
        for (i, p) in first.to_vec1::<u32>()?.into_iter().enumerate() {
            if p as usize == len {
                warn!("Separator token not found for batch item {}. Receptor mask will be empty.", i);
            }
        }

        Ok(positions.broadcast_gt(&first.unsqueeze(1)?)?)
    }
}

//! Masked pooling and receptor weighting of per-token embeddings.

use candle_core::{DType, Tensor};

use crate::{ModelError, Result};

/// Max pooling over non-padding tokens.
///
/// Padding positions are replaced by negative infinity before the reduction so
/// they can never win. A row without any non-padding position is rejected.
///
/// # Arguments
/// * `embeddings` - Tensor of shape (batch_size, seq_len, hidden_dim)
/// * `attention_mask` - Tensor of shape (batch_size, seq_len), non-zero for real tokens
///
/// # Returns
/// Tensor of shape (batch_size, hidden_dim)
pub fn masked_max_pool(embeddings: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let mask = attention_mask.ne(&attention_mask.zeros_like()?)?;

    let counts = mask.to_dtype(DType::U32)?.sum(1)?.to_vec1::<u32>()?;
    if let Some(index) = counts.iter().position(|&c| c == 0) {
        return Err(ModelError::EmptySample { index });
    }

    let shape = embeddings.shape();
    let mask_expanded = mask.unsqueeze(2)?.broadcast_as(shape)?;
    let neg_inf = Tensor::full(f32::NEG_INFINITY, shape, embeddings.device())?
        .to_dtype(embeddings.dtype())?;

    Ok(mask_expanded.where_cond(embeddings, &neg_inf)?.max(1)?)
}

/// Scale receptor positions of `embeddings` by their structural weight.
///
/// `receptor_mask` and `weights` are `(batch, seq_len)`; the weight of a
/// position is broadcast over the hidden dimension. Positions outside the
/// receptor segment are returned unchanged.
pub fn apply_receptor_weights(
    embeddings: &Tensor,
    receptor_mask: &Tensor,
    weights: &Tensor,
) -> Result<Tensor> {
    let ones = weights.ones_like()?;
    let scale = receptor_mask
        .where_cond(weights, &ones)?
        .to_dtype(embeddings.dtype())?
        .unsqueeze(2)?;
    Ok(embeddings.broadcast_mul(&scale)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_max_pool_ignores_padding() {
        let device = Device::Cpu;

        // padding holds huge values that would win an unmasked max
        let embeddings = Tensor::from_vec(
            vec![
                // Seq 1: one real token holding the sentinel
                -7.5f32, 3.25,
                100.0, 100.0,
                100.0, 100.0,
                // Seq 2: all real
                1.0, -1.0,
                2.0, -2.0,
                0.5, 4.0,
            ],
            (2, 3, 2),
            &device,
        ).unwrap();

        let attention_mask = Tensor::new(&[[1u8, 0, 0], [1, 1, 1]], &device).unwrap();

        let pooled = masked_max_pool(&embeddings, &attention_mask).unwrap();
        let result = pooled.to_vec2::<f32>().unwrap();

        assert_eq!(result[0], vec![-7.5, 3.25]);
        assert_eq!(result[1], vec![2.0, 4.0]);
    }

    #[test]
    fn test_max_pool_rejects_all_padding_row() {
        let device = Device::Cpu;
        let embeddings = Tensor::zeros((2, 2, 3), DType::F32, &device).unwrap();
        let attention_mask = Tensor::new(&[[1u8, 1], [0, 0]], &device).unwrap();

        let err = masked_max_pool(&embeddings, &attention_mask).unwrap_err();
        assert!(matches!(err, ModelError::EmptySample { index: 1 }));
    }

    #[test]
    fn test_receptor_weights_leave_other_positions() {
        let device = Device::Cpu;
        let embeddings = Tensor::ones((1, 3, 2), DType::F32, &device).unwrap();
        let receptor_mask = Tensor::new(&[[0u8, 1, 1]], &device).unwrap();
        let weights = Tensor::new(&[[9.0f32, 2.0, 0.5]], &device).unwrap();

        let weighted = apply_receptor_weights(&embeddings, &receptor_mask, &weights).unwrap();
        let rows = weighted.squeeze(0).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(rows, vec![vec![1.0, 1.0], vec![2.0, 2.0], vec![0.5, 0.5]]);
    }
}

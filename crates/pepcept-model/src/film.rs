//! Feature-wise linear modulation (FiLM) of sequence embeddings by chemistry.
//!
//! Architecture:
//! - chemical projection: Linear(3 → hidden) → ReLU → Linear(hidden → D) → LayerNorm(D),
//!   shared by the peptide and receptor channel groups
//! - context: pooled vector broadcast over positions plus both projected groups
//! - modulation: Linear(2D → 2D) over `[LayerNorm(x), context]`, split into `gamma`, `beta`
//! - output: `dropout(gamma * x + beta)`

use candle_core::{Module, Tensor, D};
use candle_nn::{layer_norm, linear, Dropout, LayerNorm, Linear, VarBuilder};

use crate::features::{CHEMICAL_PROPERTIES, NUM_CHEMICAL_CHANNELS};
use crate::{ModelError, Result};

/// Projects one 3-channel chemical group into embedding space.
#[derive(Debug, Clone)]
pub struct ChemicalProjection {
    fc1: Linear,
    fc2: Linear,
    norm: LayerNorm,
}

impl ChemicalProjection {
    pub fn new(hidden: usize, out_dim: usize, eps: f64, vb: VarBuilder) -> Result<Self> {
        let group = CHEMICAL_PROPERTIES.len();
        Ok(Self {
            fc1: linear(group, hidden, vb.pp("0"))?,
            fc2: linear(hidden, out_dim, vb.pp("2"))?,
            norm: layer_norm(out_dim, eps, vb.pp("3"))?,
        })
    }
}

impl Module for ChemicalProjection {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let h = self.fc1.forward(xs)?.relu()?;
        self.norm.forward(&self.fc2.forward(&h)?)
    }
}

/// Conditions per-position embeddings on a pooled context and chemical features.
///
/// Stateless across calls: the output depends only on the inputs and the
/// learned parameters, and is deterministic when `train` is false.
#[derive(Debug, Clone)]
pub struct FilmConditioning {
    chemical_proj: ChemicalProjection,
    film: Linear,
    norm: LayerNorm,
    dropout: Dropout,
    hidden_size: usize,
}

impl FilmConditioning {
    pub fn new(
        hidden_size: usize,
        chemical_hidden: usize,
        dropout: f32,
        eps: f64,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            chemical_proj: ChemicalProjection::new(chemical_hidden, hidden_size, eps, vb.pp("chemical_proj"))?,
            film: linear(hidden_size * 2, hidden_size * 2, vb.pp("film_layer"))?,
            norm: layer_norm(hidden_size, eps, vb.pp("layer_norm"))?,
            dropout: Dropout::new(dropout),
            hidden_size,
        })
    }

    /// # Arguments
    /// * `x` - embeddings (batch, seq_len, D)
    /// * `z` - pooled context (batch, D)
    /// * `chemical` - features (batch, seq_len, 6): peptide group then receptor group
    /// * `train` - enables dropout
    pub fn forward_t(&self, x: &Tensor, z: &Tensor, chemical: &Tensor, train: bool) -> Result<Tensor> {
        let (batch, seq_len, dim) = x.dims3()?;
        if dim != self.hidden_size {
            return Err(ModelError::InvalidInput(format!(
                "embedding width {dim} does not match conditioning width {}",
                self.hidden_size
            )));
        }
        if chemical.dims() != [batch, seq_len, NUM_CHEMICAL_CHANNELS] {
            return Err(ModelError::InvalidInput(format!(
                "chemical features must be ({batch}, {seq_len}, {NUM_CHEMICAL_CHANNELS}), got {:?}",
                chemical.dims()
            )));
        }

        let x = self.norm.forward(x)?;
        let z = z.unsqueeze(1)?.broadcast_as((batch, seq_len, dim))?;

        let group = CHEMICAL_PROPERTIES.len();
        let peptide = self.chemical_proj.forward(&chemical.narrow(D::Minus1, 0, group)?)?;
        let receptor = self.chemical_proj.forward(&chemical.narrow(D::Minus1, group, group)?)?;
        let context = ((peptide + receptor)? + z)?;

        let gamma_beta = self.film.forward(&Tensor::cat(&[&x, &context], D::Minus1)?)?;
        let gamma = gamma_beta.narrow(D::Minus1, 0, dim)?;
        let beta = gamma_beta.narrow(D::Minus1, dim, dim)?;

        let output = ((gamma * &x)? + beta)?;
        Ok(self.dropout.forward(&output, train)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn layer(dim: usize) -> (VarMap, FilmConditioning) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let film = FilmConditioning::new(dim, 8, 0.1, 1e-5, vb).unwrap();
        (varmap, film)
    }

    fn inputs(dim: usize) -> (Tensor, Tensor, Tensor) {
        let device = Device::Cpu;
        let x = Tensor::randn(0f32, 1.0, (2, 5, dim), &device).unwrap();
        let z = Tensor::randn(0f32, 1.0, (2, dim), &device).unwrap();
        let chem = Tensor::randn(0f32, 1.0, (2, 5, 6), &device).unwrap();
        (x, z, chem)
    }

    /// `chem` with `delta` added to the three channels starting at `offset`.
    fn shifted(chem: &Tensor, offset: usize, delta: f32) -> Tensor {
        let mut step = [0f32; NUM_CHEMICAL_CHANNELS];
        step[offset..offset + 3].fill(delta);
        let step = Tensor::new(&step, &Device::Cpu).unwrap();
        chem.broadcast_add(&step).unwrap()
    }

    fn max_abs_diff(a: &Tensor, b: &Tensor) -> f32 {
        (a - b)
            .unwrap()
            .abs()
            .unwrap()
            .flatten_all()
            .unwrap()
            .max(0)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap()
    }

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-3, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn test_output_shape() {
        let (_varmap, film) = layer(16);
        let (x, z, chem) = inputs(16);
        let out = film.forward_t(&x, &z, &chem, false).unwrap();
        assert_eq!(out.dims(), &[2, 5, 16]);
    }

    #[test]
    fn test_deterministic_without_dropout() {
        let (_varmap, film) = layer(16);
        let (x, z, chem) = inputs(16);
        let a = film.forward_t(&x, &z, &chem, false).unwrap().flatten_all().unwrap();
        let b = film.forward_t(&x, &z, &chem, false).unwrap().flatten_all().unwrap();
        assert_eq!(a.to_vec1::<f32>().unwrap(), b.to_vec1::<f32>().unwrap());
    }

    #[test]
    fn test_rejects_wrong_channel_count() {
        let (_varmap, film) = layer(16);
        let (x, z, _) = inputs(16);
        let chem = Tensor::zeros((2, 5, 4), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            film.forward_t(&x, &z, &chem, false),
            Err(ModelError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_each_chemical_group_changes_output() {
        let (_varmap, film) = layer(16);
        let (x, z, chem) = inputs(16);
        let base = film.forward_t(&x, &z, &chem, false).unwrap();

        let peptide = film.forward_t(&x, &z, &shifted(&chem, 0, 3.0), false).unwrap();
        assert!(max_abs_diff(&base, &peptide) > 1e-4);

        let receptor = film.forward_t(&x, &z, &shifted(&chem, 3, 3.0), false).unwrap();
        assert!(max_abs_diff(&base, &receptor) > 1e-4);
    }

    #[test]
    fn test_pooled_context_changes_output() {
        let (_varmap, film) = layer(16);
        let (x, z, chem) = inputs(16);
        let base = film.forward_t(&x, &z, &chem, false).unwrap();
        let moved = film.forward_t(&x, &(&z + 2.0).unwrap(), &chem, false).unwrap();
        assert!(max_abs_diff(&base, &moved) > 1e-4);
    }

    #[test]
    fn test_modulates_normalized_embedding() {
        let (mut varmap, film) = layer(2);
        let device = Device::Cpu;
        // gamma = [2, 2], beta = [1, 1] whatever the context
        varmap.set_one("film_layer.weight", Tensor::zeros((4, 4), DType::F32, &device).unwrap()).unwrap();
        varmap.set_one("film_layer.bias", Tensor::new(&[2f32, 2., 1., 1.], &device).unwrap()).unwrap();

        let x = Tensor::new(&[[[1f32, 3.]]], &device).unwrap();
        let z = Tensor::zeros((1, 2), DType::F32, &device).unwrap();
        let chem = Tensor::zeros((1, 1, 6), DType::F32, &device).unwrap();
        let out = film.forward_t(&x, &z, &chem, false).unwrap();

        // LayerNorm([1, 3]) = [-1, 1]
        assert_close(&out.flatten_all().unwrap().to_vec1::<f32>().unwrap(), &[-1.0, 3.0]);
    }

    #[test]
    fn test_context_sums_both_projections_and_pooled_vector() {
        let (mut varmap, film) = layer(2);
        let device = Device::Cpu;
        // each chemical projection is LayerNorm([0, 1]) = [-1, 1]
        varmap.set_one("chemical_proj.0.weight", Tensor::zeros((8, 3), DType::F32, &device).unwrap()).unwrap();
        varmap.set_one("chemical_proj.0.bias", Tensor::zeros(8, DType::F32, &device).unwrap()).unwrap();
        varmap.set_one("chemical_proj.2.weight", Tensor::zeros((2, 8), DType::F32, &device).unwrap()).unwrap();
        varmap.set_one("chemical_proj.2.bias", Tensor::new(&[0f32, 1.], &device).unwrap()).unwrap();
        // gamma = [c1 / 2, c1 / 2], beta = [c0, 0] over context c
        let weight = Tensor::new(
            &[
                [0f32, 0., 0., 0.5],
                [0., 0., 0., 0.5],
                [0., 0., 1., 0.],
                [0., 0., 0., 0.],
            ],
            &device,
        )
        .unwrap();
        varmap.set_one("film_layer.weight", weight).unwrap();
        varmap.set_one("film_layer.bias", Tensor::zeros(4, DType::F32, &device).unwrap()).unwrap();

        let x = Tensor::new(&[[[1f32, 3.]]], &device).unwrap();
        let chem = Tensor::ones((1, 1, 6), DType::F32, &device).unwrap();

        // c = [-1, 1] + [-1, 1] + [0, 0]
        let z = Tensor::zeros((1, 2), DType::F32, &device).unwrap();
        let out = film.forward_t(&x, &z, &chem, false).unwrap();
        assert_close(&out.flatten_all().unwrap().to_vec1::<f32>().unwrap(), &[-3.0, 1.0]);

        // c = [-2, 2] + [1, 2]
        let z = Tensor::new(&[[1f32, 2.]], &device).unwrap();
        let out = film.forward_t(&x, &z, &chem, false).unwrap();
        assert_close(&out.flatten_all().unwrap().to_vec1::<f32>().unwrap(), &[-3.0, 2.0]);
    }
}

//! Configuration for the interaction model.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ModelError, Result};

/// Where the structural data file is looked for when no path is configured.
pub const DEFAULT_BFACTOR_CSV: &str = "intermediate_files/bfactor_winding_lrr_segments.csv";

/// Bounds for per-position structural weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightRange {
    /// Weight given to positions without positive B-factor data (default: 0.5)
    #[serde(default = "default_min_weight")]
    pub min_weight: f32,

    /// Weight given to the largest positive B-factor of a profile (default: 2.0)
    #[serde(default = "default_max_weight")]
    pub max_weight: f32,
}

fn default_min_weight() -> f32 { 0.5 }
fn default_max_weight() -> f32 { 2.0 }

impl Default for WeightRange {
    fn default() -> Self {
        Self {
            min_weight: default_min_weight(),
            max_weight: default_max_weight(),
        }
    }
}

impl WeightRange {
    pub fn new(min_weight: f32, max_weight: f32) -> Result<Self> {
        let range = Self { min_weight, max_weight };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.min_weight.is_finite() || !self.max_weight.is_finite() {
            return Err(ModelError::Config("weight bounds must be finite".to_string()));
        }
        if self.min_weight < 0.0 || self.min_weight > self.max_weight {
            return Err(ModelError::Config(format!(
                "invalid weight range [{}, {}]",
                self.min_weight, self.max_weight
            )));
        }
        Ok(())
    }

    /// Map a positive B-factor onto the range, relative to the profile maximum.
    pub fn scale(&self, value: f64, max_positive: f64) -> f32 {
        let span = (self.max_weight - self.min_weight) as f64;
        let weight = self.min_weight as f64 + span * (value / max_positive);
        (weight as f32).clamp(self.min_weight, self.max_weight)
    }
}

/// Configuration for [`crate::InteractionModel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Hugging Face model ID of the BERT-family protein encoder
    #[serde(default = "default_encoder_model")]
    pub encoder_model_id: String,

    /// Use GPU if available (default: true)
    #[serde(default = "default_true")]
    pub use_gpu: bool,

    /// Structural weight bounds
    #[serde(default)]
    pub weights: WeightRange,

    /// Structural data file; falls back to [`DEFAULT_BFACTOR_CSV`]
    #[serde(default)]
    pub bfactor_csv_path: Option<PathBuf>,

    /// Token id separating the peptide from the receptor. Required.
    #[serde(default)]
    pub separator_token_id: Option<u32>,

    /// Token id used for padding rows (default: 0)
    #[serde(default)]
    pub pad_token_id: u32,

    /// Maximum tokenized length (default: 1024)
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Hidden width of the chemical projection network (default: 64)
    #[serde(default = "default_chemical_hidden")]
    pub chemical_hidden: usize,

    /// Dropout after feature-wise modulation (default: 0.1)
    #[serde(default = "default_film_dropout")]
    pub film_dropout: f32,

    /// Dropout inside the classification head (default: 0.2)
    #[serde(default = "default_head_dropout")]
    pub head_dropout: f32,

    /// Number of interaction classes (default: 3)
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,

    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
}

fn default_encoder_model() -> String { "Rostlab/prot_bert".to_string() }
fn default_true() -> bool { true }
fn default_max_length() -> usize { 1024 }
fn default_chemical_hidden() -> usize { 64 }
fn default_film_dropout() -> f32 { 0.1 }
fn default_head_dropout() -> f32 { 0.2 }
fn default_num_classes() -> usize { 3 }
fn default_layer_norm_eps() -> f64 { 1e-5 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            encoder_model_id: default_encoder_model(),
            use_gpu: true,
            weights: WeightRange::default(),
            bfactor_csv_path: None,
            separator_token_id: None,
            pad_token_id: 0,
            max_length: default_max_length(),
            chemical_hidden: default_chemical_hidden(),
            film_dropout: default_film_dropout(),
            head_dropout: default_head_dropout(),
            num_classes: default_num_classes(),
            layer_norm_eps: default_layer_norm_eps(),
        }
    }
}

impl ModelConfig {
    /// Create config for CPU-only inference.
    pub fn cpu() -> Self {
        Self {
            use_gpu: false,
            ..Default::default()
        }
    }

    pub fn with_separator(mut self, token_id: u32) -> Self {
        self.separator_token_id = Some(token_id);
        self
    }

    pub fn with_bfactor_csv(mut self, path: impl Into<PathBuf>) -> Self {
        self.bfactor_csv_path = Some(path.into());
        self
    }

    pub fn with_weights(mut self, weights: WeightRange) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.encoder_model_id = model_id.into();
        self
    }

    /// The configured separator id. A missing id is fatal.
    pub fn separator(&self) -> Result<u32> {
        self.separator_token_id.ok_or_else(|| {
            ModelError::Config("separator token id is not configured".to_string())
        })
    }

    /// Structural data path, honouring the default search location.
    pub fn resolve_bfactor_path(&self) -> Option<PathBuf> {
        match &self.bfactor_csv_path {
            Some(path) => Some(path.clone()),
            None => {
                let fallback = Path::new(DEFAULT_BFACTOR_CSV);
                fallback.exists().then(|| fallback.to_path_buf())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        self.separator()?;
        for (name, p) in [("film_dropout", self.film_dropout), ("head_dropout", self.head_dropout)] {
            if !(0.0..1.0).contains(&p) {
                return Err(ModelError::Config(format!("{name} must be in [0, 1), got {p}")));
            }
        }
        if self.max_length == 0 || self.chemical_hidden == 0 || self.num_classes == 0 {
            return Err(ModelError::Config(
                "max_length, chemical_hidden and num_classes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Load from YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load from JSON file
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to YAML file
    pub fn to_yaml(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

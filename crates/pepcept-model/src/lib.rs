//! Pepcept Interaction Model
//!
//! Three-class peptide-receptor interaction prediction on Candle.
//!
//! # Features
//! - Pretrained BERT-family protein encoder loaded from the Hugging Face Hub
//! - Receptor residues weighted by crystallographic B-factor flexibility
//! - Per-residue chemistry (bulkiness, charge, hydrophobicity) fed through FiLM conditioning
//! - Masked max-pooling classifier emitting logits for no interaction, weak and strong
//!
//! # Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use pepcept_model::{
//!     head_parameters, BFactorWeightTable, HubBertEncoder, InteractionModel, ModelConfig, SequenceEncoder,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ModelConfig::cpu().with_separator(3);
//!     let encoder = HubBertEncoder::new(&config).await?;
//!     let table = BFactorWeightTable::load_or_empty(
//!         config.resolve_bfactor_path().as_deref(),
//!         config.weights,
//!     );
//!
//!     let vb = head_parameters(None, encoder.device())?;
//!     let model = InteractionModel::new(encoder, Arc::new(table), &config, vb)?;
//!     println!("{} structural profiles", model.bfactors().len());
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod bfactor;
pub mod classifier;
pub mod config;
pub mod encoder;
pub mod error;
pub mod features;
pub mod film;
pub mod model;
pub mod pooling;
pub mod segment;

pub use batch::Batch;
pub use bfactor::{BFactorProfile, BFactorWeightTable, ProteinKey, WeightVector};
pub use classifier::{ClassifierOutput, PoolingClassifier};
pub use config::{ModelConfig, WeightRange};
pub use encoder::{HubBertEncoder, SequenceEncoder};
pub use error::{BFactorLoadError, ModelError, Result};
pub use features::{ChemicalChannels, ChemicalProfile, FeatureAssembler};
pub use film::FilmConditioning;
pub use model::{head_parameters, predicted_labels, probabilities, InteractionModel};
pub use segment::SequenceSegmenter;

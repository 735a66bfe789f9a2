//! Pepcept Data
//!
//! Everything between a dataset file and the interaction model.
//!
//! # Features
//! - CSV dataset loading with optional per-residue chemistry and labels
//! - Joint peptide-receptor tokenization over Hugging Face vocabularies
//! - Batch assembly: truncation, padding, attention masks, aligned chemical channels
//! - Prediction reports written as CSV, with pluggable scoring
//!
//! # Example
//! ```rust,no_run
//! use pepcept_data::{load_samples, BatchAssembler, BatchIterator, HubPairTokenizer, SpecialTokens};
//! use pepcept_model::ModelConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let tokenizer = HubPairTokenizer::from_hub("Rostlab/prot_bert", &SpecialTokens::default(), true).await?;
//!     let config = ModelConfig::cpu();
//!     let assembler = BatchAssembler::new(&config, candle_core::Device::Cpu);
//!
//!     let samples = load_samples("data/test.csv")?;
//!     for chunk in BatchIterator::new(samples.into_iter(), 16) {
//!         let (batch, _metadata) = assembler.assemble(&chunk, &tokenizer)?;
//!         println!("batch of {} x {}", batch.len(), batch.seq_len()?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod assemble;
pub mod dataset;
pub mod error;
pub mod report;
pub mod tokenize;

pub use assemble::BatchAssembler;
pub use dataset::{load_samples, read_samples, BatchIterator, InteractionSample};
pub use error::{DataError, Result};
pub use report::{BatchMetadata, PredictionReport, Scorer, Split};
pub use tokenize::{HubPairTokenizer, PairTokenizer, SpecialTokens};

//! Score a dataset CSV with the interaction model and write the predictions.
//!
//! ```text
//! cargo run --example predict -- data/test.csv [config.yaml] [head.safetensors]
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use pepcept_data::{
    load_samples, BatchAssembler, BatchIterator, HubPairTokenizer, PairTokenizer, PredictionReport,
    SpecialTokens,
};
use pepcept_model::{head_parameters, BFactorWeightTable, HubBertEncoder, InteractionModel, ModelConfig, SequenceEncoder};
use tracing::info;
use tracing_subscriber::EnvFilter;

const BATCH_SIZE: usize = 8;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pepcept=debug,info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let dataset = PathBuf::from(args.next().unwrap_or_else(|| "data/test.csv".to_string()));
    let config = match args.next() {
        Some(path) => ModelConfig::from_yaml(path)?,
        None => ModelConfig::default(),
    };
    let head_weights = args.next().map(PathBuf::from);

    let tokenizer = HubPairTokenizer::from_hub(&config.encoder_model_id, &SpecialTokens::default(), true).await?;
    let config = config.with_separator(tokenizer.separator_id());

    let encoder = HubBertEncoder::new(&config).await?;
    let device = encoder.device().clone();
    let table = BFactorWeightTable::load_or_empty(config.resolve_bfactor_path().as_deref(), config.weights);
    let vb = head_parameters(head_weights.as_deref(), &device)?;
    let model = InteractionModel::new(encoder, Arc::new(table), &config, vb)?;

    let assembler = BatchAssembler::new(&config, device).with_pad_token(tokenizer.pad_id());
    let samples = load_samples(&dataset)?;

    let mut report = PredictionReport::default();
    for chunk in BatchIterator::new(samples.into_iter(), BATCH_SIZE) {
        let (batch, metadata) = assembler.assemble(&chunk, &tokenizer)?;
        let logits = model.forward(&batch)?;
        report.extend(PredictionReport::new(&logits, batch.labels.as_ref(), metadata)?);
    }

    let output = dataset.with_file_name("test_predictions.csv");
    report.write_csv(&output)?;
    info!("Scored {} samples", report.len());
    Ok(())
}

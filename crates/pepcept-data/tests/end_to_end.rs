//! Dataset file to prediction artifact with a fixed-output encoder.

use std::collections::HashMap;
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use pepcept_data::{
    read_samples, BatchAssembler, BatchIterator, HubPairTokenizer, PairTokenizer, PredictionReport,
    SpecialTokens, Split,
};
use pepcept_model::{
    head_parameters, BFactorProfile, BFactorWeightTable, InteractionModel, ModelConfig,
    SequenceEncoder, WeightRange,
};
use pretty_assertions::assert_eq;
use tokenizers::models::wordpiece::WordPieceBuilder;
use tokenizers::Tokenizer;

const DATASET: &str = "\
Header_Name,Sequence,receptor_sequence,plant_species,locus_id,receptor,y,Receptor_Charge
p1,ACD,EEC,Sp,L1,R1,1,\"1.0,1.0,1.0,1.0,1.0,1.0,1.0,1.0,1.0\"
p2,CA,DDDE,Sp,L2,R2,0,
p3,E,A,Other,L3,R3,2,
";

struct TokenEncoder {
    device: Device,
}

impl SequenceEncoder for TokenEncoder {
    /// Embedding of a token is its id repeated over the hidden width.
    fn encode(&self, input_ids: &Tensor, _attention_mask: &Tensor) -> pepcept_model::Result<Tensor> {
        let (b, l) = input_ids.dims2()?;
        Ok(input_ids
            .to_dtype(DType::F32)?
            .unsqueeze(2)?
            .broadcast_as((b, l, 8))?
            .contiguous()?)
    }

    fn hidden_size(&self) -> usize {
        8
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

fn tokenizer() -> HubPairTokenizer {
    let vocab: HashMap<String, u32> = ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "A", "C", "D", "E"]
        .iter()
        .enumerate()
        .map(|(i, t)| (t.to_string(), i as u32))
        .collect();
    let wordpiece = WordPieceBuilder::new()
        .vocab(vocab)
        .unk_token("[UNK]".to_string())
        .build()
        .unwrap();
    HubPairTokenizer::new(Tokenizer::new(wordpiece), &SpecialTokens::default(), true).unwrap()
}

#[test]
fn test_dataset_to_prediction_csv() {
    let tokenizer = tokenizer();
    let config = ModelConfig::cpu().with_separator(tokenizer.separator_id());

    let table = BFactorWeightTable::from_profiles(
        [("Sp_L1_R1".to_string(), BFactorProfile::new(vec![(5, 4.0), (6, 8.0)]))],
        WeightRange::default(),
    );
    let device = Device::Cpu;
    let vb = head_parameters(None, &device).unwrap();
    let model = InteractionModel::new(TokenEncoder { device: device.clone() }, Arc::new(table), &config, vb)
        .unwrap();

    let assembler = BatchAssembler::new(&config, device).with_pad_token(tokenizer.pad_id());
    let samples = read_samples(DATASET.as_bytes()).unwrap();

    let mut report = PredictionReport::default();
    for chunk in BatchIterator::new(samples.into_iter(), 2) {
        let (batch, metadata) = assembler.assemble(&chunk, &tokenizer).unwrap();
        let logits = model.forward(&batch).unwrap();
        report.extend(PredictionReport::new(&logits, batch.labels.as_ref(), metadata).unwrap());
    }

    assert_eq!(report.len(), 3);
    assert_eq!(report.ground_truth, Some(vec![1, 0, 2]));
    assert_eq!(report.metadata.header_names, vec!["p1", "p2", "p3"]);
    for probs in &report.probabilities {
        assert_eq!(probs.len(), 3);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test_predictions.csv");
    report.write_csv(&path).unwrap();
    let mut reader = csv::Reader::from_path(&path).unwrap();
    assert_eq!(reader.records().count(), 3);

    let always_one: &pepcept_data::Scorer = &|_, _, _| 1.0;
    let scores = report.score(&[("constant", always_one)], Split::Train).unwrap();
    assert_eq!(scores[0].0, "train_constant");
}

#[test]
fn test_structural_weights_reach_the_receptor_segment() {
    let tokenizer = tokenizer();
    let config = ModelConfig::cpu().with_separator(tokenizer.separator_id());
    let table = BFactorWeightTable::from_profiles(
        [("Sp_L1_R1".to_string(), BFactorProfile::new(vec![(5, 4.0), (6, 8.0)]))],
        WeightRange::default(),
    );
    let device = Device::Cpu;
    let vb = head_parameters(None, &device).unwrap();
    let model = InteractionModel::new(TokenEncoder { device: device.clone() }, Arc::new(table), &config, vb)
        .unwrap();

    let samples = read_samples(DATASET.as_bytes()).unwrap();
    let (batch, _) = BatchAssembler::new(&config, device)
        .assemble(&samples[..1], &tokenizer)
        .unwrap();
    // [CLS] A C D [SEP] E E C [SEP]
    assert_eq!(
        batch.input_ids.to_vec2::<u32>().unwrap()[0],
        vec![2, 4, 5, 6, 3, 7, 7, 5, 3]
    );

    let out = model.forward_t(&batch, false).unwrap();
    let first_feature = out
        .weighted_embeddings
        .narrow(2, 0, 1)
        .unwrap()
        .squeeze(2)
        .unwrap()
        .to_vec2::<f32>()
        .unwrap();
    // peptide untouched, receptor scaled by min_weight except the profiled residues
    assert_eq!(
        first_feature[0],
        vec![2.0, 4.0, 5.0, 6.0, 3.0, 7.0 * 1.25, 7.0 * 2.0, 5.0 * 0.5, 3.0 * 0.5]
    );
}

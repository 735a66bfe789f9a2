//! Pretrained protein sequence encoders.

use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, HiddenAct, PositionEmbeddingType};
use hf_hub::api::sync::Api;
use tracing::{debug, info};

use crate::{ModelConfig, ModelError, Result};

/// Produces one embedding per token position.
pub trait SequenceEncoder: Send + Sync {
    /// # Arguments
    /// * `input_ids` - (batch, seq_len) u32 token ids
    /// * `attention_mask` - (batch, seq_len), non-zero for real tokens
    ///
    /// # Returns
    /// Tensor of shape (batch, seq_len, hidden_size)
    fn encode(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor>;

    fn hidden_size(&self) -> usize;

    fn device(&self) -> &Device;
}

/// BERT-architecture protein language model loaded from the Hugging Face Hub.
pub struct HubBertEncoder {
    model: BertModel,
    hidden_size: usize,
    device: Device,
    model_id: String,
}

impl HubBertEncoder {
    /// Download (or reuse the cached) encoder named by `config.encoder_model_id`.
    pub async fn new(config: &ModelConfig) -> Result<Self> {
        let start = Instant::now();
        info!("Loading sequence encoder: {}", config.encoder_model_id);

        let device = Self::select_device(config.use_gpu);
        debug!("Using device: {:?}", device);

        let model_id = config.encoder_model_id.clone();
        let (bert_config, weights_path) = tokio::task::spawn_blocking(move || {
            use hf_hub::{Repo, RepoType};

            let api = Api::new().map_err(|e| ModelError::Download(format!("API init: {}", e)))?;
            let api_repo = api.repo(Repo::new(model_id, RepoType::Model));

            let config_path = api_repo.get("config.json")
                .map_err(|e| ModelError::Download(format!("config.json: {}", e)))?;
            let bert_config = load_config(&config_path)?;

            let weights_path = api_repo.get("model.safetensors")
                .or_else(|_| api_repo.get("pytorch_model.bin"))
                .map_err(|e| ModelError::Download(format!("model weights: {}", e)))?;
            info!("Weights at: {:?}", weights_path);

            Ok::<_, ModelError>((bert_config, weights_path))
        }).await.map_err(|e| ModelError::Download(e.to_string()))??;

        let encoder = Self::from_files(&bert_config, &weights_path, device, &config.encoder_model_id)?;
        info!("Encoder loaded in {:.2}s", start.elapsed().as_secs_f32());
        Ok(encoder)
    }

    /// Load from a local config and weights file.
    pub fn from_files(config: &Config, weights_path: &Path, device: Device, model_id: &str) -> Result<Self> {
        let vb = if weights_path.extension().map(|e| e == "safetensors").unwrap_or(false) {
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)? }
        } else {
            VarBuilder::from_pth(weights_path, DType::F32, &device)?
        };

        let model = BertModel::load(vb.clone(), config)
            .or_else(|_| BertModel::load(vb.pp("bert"), config))
            .map_err(|e| ModelError::ModelLoad(format!("BertModel: {}", e)))?;

        Ok(Self {
            model,
            hidden_size: config.hidden_size,
            device,
            model_id: model_id.to_string(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_id
    }

    /// Check if GPU is being used.
    pub fn is_gpu(&self) -> bool {
        matches!(self.device, Device::Cuda(_) | Device::Metal(_))
    }

    /// First device that opens among the compiled-in GPU backends, else CPU.
    pub fn select_device(use_gpu: bool) -> Device {
        if use_gpu {
            #[cfg(feature = "cuda")]
            {
                match Device::new_cuda(0) {
                    Ok(device) => return device,
                    Err(e) => debug!("No CUDA device for the encoder: {}", e),
                }
            }
            #[cfg(feature = "metal")]
            {
                match Device::new_metal(0) {
                    Ok(device) => return device,
                    Err(e) => debug!("No Metal device for the encoder: {}", e),
                }
            }
            info!("GPU requested but none usable, encoding on CPU");
        }
        Device::Cpu
    }
}

impl SequenceEncoder for HubBertEncoder {
    fn encode(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let token_type_ids = input_ids.zeros_like()?;
        let attention_mask = attention_mask.to_dtype(DType::F32)?;
        Ok(self.model.forward(input_ids, &token_type_ids, Some(&attention_mask))?)
    }

    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// Load a BERT config, tolerating missing fields.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let json: serde_json::Value = serde_json::from_str(&content)?;

    let hidden_act = match json.get("hidden_act").and_then(|v| v.as_str()) {
        Some("relu") => HiddenAct::Relu,
        Some("gelu_new") | Some("gelu_approximate") => HiddenAct::GeluApproximate,
        _ => HiddenAct::Gelu,
    };

    let usize_or = |key: &str, default: usize| {
        json.get(key).and_then(|v| v.as_u64()).map(|v| v as usize).unwrap_or(default)
    };
    let f64_or = |key: &str, default: f64| json.get(key).and_then(|v| v.as_f64()).unwrap_or(default);

    Ok(Config {
        vocab_size: usize_or("vocab_size", 30),
        hidden_size: usize_or("hidden_size", 1024),
        num_hidden_layers: usize_or("num_hidden_layers", 30),
        num_attention_heads: usize_or("num_attention_heads", 16),
        intermediate_size: usize_or("intermediate_size", 4096),
        hidden_act,
        hidden_dropout_prob: f64_or("hidden_dropout_prob", 0.0),
        max_position_embeddings: usize_or("max_position_embeddings", 40000),
        type_vocab_size: usize_or("type_vocab_size", 2),
        initializer_range: f64_or("initializer_range", 0.02),
        layer_norm_eps: f64_or("layer_norm_eps", 1e-12),
        pad_token_id: usize_or("pad_token_id", 0),
        position_embedding_type: PositionEmbeddingType::Absolute,
        use_cache: true,
        classifier_dropout: None,
        model_type: Some("bert".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_defaults_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"hidden_size": 32, "num_hidden_layers": 2, "hidden_act": "relu"}}"#).unwrap();
        file.flush().unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.hidden_size, 32);
        assert_eq!(config.num_hidden_layers, 2);
        assert_eq!(config.vocab_size, 30);
        assert!(matches!(config.hidden_act, HiddenAct::Relu));
    }

    #[test]
    fn test_cpu_selected_without_gpu() {
        assert!(matches!(HubBertEncoder::select_device(false), Device::Cpu));
    }

    #[tokio::test]
    #[ignore] // Requires network access to download the model
    async fn test_hub_encoder_creation() {
        let encoder = HubBertEncoder::new(&ModelConfig::cpu()).await.unwrap();
        assert_eq!(encoder.hidden_size(), 1024);
        assert!(!encoder.is_gpu());
    }
}

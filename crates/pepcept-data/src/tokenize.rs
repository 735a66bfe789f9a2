//! Joint tokenization of peptide-receptor pairs.

use std::collections::HashMap;
use std::path::Path;

use hf_hub::api::sync::Api;
use tokenizers::models::wordpiece::WordPieceBuilder;
use tokenizers::{EncodeInput, InputSequence, Tokenizer};
use tracing::{debug, info};

use crate::{DataError, Result};

/// Longest word WordPiece tokenizes before giving up on it as unknown.
///
/// Unsplit receptors are a single word, so this sits at the encoder's
/// position limit rather than at a natural-language word length.
const MAX_INPUT_CHARS_PER_WORD: usize = 40_000;

/// Turns (peptide, receptor) pairs into unpadded token-id rows.
///
/// The first separator of every row sits between the peptide and the
/// receptor tokens.
pub trait PairTokenizer: Send + Sync {
    fn encode_pairs(&self, pairs: &[(&str, &str)]) -> Result<Vec<Vec<u32>>>;

    fn separator_id(&self) -> u32;

    fn pad_id(&self) -> u32;
}

/// Special token strings of a vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialTokens {
    /// Prepended to every row when present
    pub start: Option<String>,
    /// Placed between peptide and receptor, and after the receptor
    pub separator: String,
    pub pad: String,
    /// Stands in for out-of-vocabulary residues
    pub unk: String,
}

impl Default for SpecialTokens {
    /// BERT-style `[CLS]` / `[SEP]` / `[PAD]` / `[UNK]`.
    fn default() -> Self {
        Self {
            start: Some("[CLS]".to_string()),
            separator: "[SEP]".to_string(),
            pad: "[PAD]".to_string(),
            unk: "[UNK]".to_string(),
        }
    }
}

impl SpecialTokens {
    /// ESM-style `<cls>` / `<eos>` / `<pad>` / `<unk>`.
    pub fn esm() -> Self {
        Self {
            start: Some("<cls>".to_string()),
            separator: "<eos>".to_string(),
            pad: "<pad>".to_string(),
            unk: "<unk>".to_string(),
        }
    }
}

/// [`PairTokenizer`] over a Hugging Face `tokenizers` vocabulary.
pub struct HubPairTokenizer {
    tokenizer: Tokenizer,
    start_id: Option<u32>,
    separator_id: u32,
    pad_id: u32,
    split_residues: bool,
}

impl HubPairTokenizer {
    /// Wrap a tokenizer, resolving the special token ids.
    ///
    /// With `split_residues` each residue letter is tokenized on its own,
    /// which per-residue protein vocabularies expect.
    pub fn new(tokenizer: Tokenizer, special: &SpecialTokens, split_residues: bool) -> Result<Self> {
        let require = |token: &str| {
            tokenizer
                .token_to_id(token)
                .ok_or_else(|| DataError::Tokenizer(format!("token {token:?} is not in the vocabulary")))
        };

        let separator_id = require(&special.separator)?;
        let pad_id = require(&special.pad)?;
        let start_id = special.start.as_deref().and_then(|t| tokenizer.token_to_id(t));
        debug!(
            "Special tokens resolved: start {:?}, separator {}, pad {}",
            start_id, separator_id, pad_id
        );

        Ok(Self {
            tokenizer,
            start_id,
            separator_id,
            pad_id,
            split_residues,
        })
    }

    pub fn from_file(path: impl AsRef<Path>, special: &SpecialTokens, split_residues: bool) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)?;
        Self::new(tokenizer, special, split_residues)
    }

    /// WordPiece over a plain `token -> id` vocabulary, as read from `vocab.txt`.
    pub fn from_vocab(vocab: HashMap<String, u32>, special: &SpecialTokens, split_residues: bool) -> Result<Self> {
        Self::new(wordpiece(vocab, &special.unk)?, special, split_residues)
    }

    /// Fetch the vocabulary of `model_id` from the Hugging Face Hub.
    pub async fn from_hub(model_id: &str, special: &SpecialTokens, split_residues: bool) -> Result<Self> {
        info!("Loading tokenizer for {}", model_id);
        let model_id = model_id.to_string();
        let unk = special.unk.clone();

        let tokenizer = tokio::task::spawn_blocking(move || -> Result<Tokenizer> {
            use hf_hub::{Repo, RepoType};

            let api = Api::new().map_err(|e| DataError::Download(format!("API init: {}", e)))?;
            let api_repo = api.repo(Repo::new(model_id, RepoType::Model));

            // Try tokenizer.json first, fall back to vocab.txt
            if let Ok(tokenizer_path) = api_repo.get("tokenizer.json") {
                info!("Found tokenizer.json");
                return Ok(Tokenizer::from_file(&tokenizer_path)?);
            }

            info!("tokenizer.json not found, building from vocab.txt");
            let vocab_path = api_repo
                .get("vocab.txt")
                .map_err(|e| DataError::Download(format!("vocab.txt: {}", e)))?;
            let vocab: HashMap<String, u32> = std::fs::read_to_string(&vocab_path)?
                .lines()
                .enumerate()
                .map(|(i, line)| (line.trim().to_string(), i as u32))
                .collect();
            info!("Loaded vocab with {} tokens", vocab.len());

            wordpiece(vocab, &unk)
        })
        .await
        .map_err(|e| DataError::Download(e.to_string()))??;

        Self::new(tokenizer, special, split_residues)
    }

    /// Vocabulary id of `token`, e.g. to configure the model separator.
    pub fn token_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }

    pub fn inner(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Token rows back to `(peptide, receptor)` text, split at the first separator.
    ///
    /// Start, separator and padding tokens are dropped from both sides. A row
    /// without a separator decodes entirely into the peptide.
    pub fn decode_pairs(&self, rows: &[Vec<u32>]) -> Result<Vec<(String, String)>> {
        rows.iter()
            .map(|row| {
                let split = row
                    .iter()
                    .position(|&id| id == self.separator_id)
                    .unwrap_or(row.len());
                let (peptide, receptor) = row.split_at(split);
                Ok((self.decode_segment(peptide)?, self.decode_segment(receptor)?))
            })
            .collect()
    }

    fn decode_segment(&self, ids: &[u32]) -> Result<String> {
        let ids: Vec<u32> = ids
            .iter()
            .copied()
            .filter(|&id| id != self.separator_id && id != self.pad_id && Some(id) != self.start_id)
            .collect();
        let text = self.tokenizer.decode(&ids, true)?;
        Ok(text.split_whitespace().collect())
    }

    fn encode_segments(&self, segments: &[&str]) -> Result<Vec<Vec<u32>>> {
        let split: Vec<Vec<&str>> = if self.split_residues {
            segments.iter().map(|s| residues(s)).collect()
        } else {
            Vec::new()
        };

        let inputs: Vec<EncodeInput> = if self.split_residues {
            split
                .iter()
                .map(|r| EncodeInput::Single(InputSequence::from(r.as_slice())))
                .collect()
        } else {
            segments
                .iter()
                .map(|s| EncodeInput::Single(InputSequence::from(*s)))
                .collect()
        };

        let encodings = self.tokenizer.encode_batch(inputs, false)?;
        Ok(encodings.iter().map(|e| e.get_ids().to_vec()).collect())
    }
}

fn wordpiece(vocab: HashMap<String, u32>, unk: &str) -> Result<Tokenizer> {
    let wordpiece = WordPieceBuilder::new()
        .vocab(vocab)
        .continuing_subword_prefix("##".to_string())
        .max_input_chars_per_word(MAX_INPUT_CHARS_PER_WORD)
        .unk_token(unk.to_string())
        .build()
        .map_err(|e| DataError::Tokenizer(format!("WordPiece build: {}", e)))?;
    Ok(Tokenizer::new(wordpiece))
}

/// One slice per non-whitespace character.
fn residues(sequence: &str) -> Vec<&str> {
    sequence
        .char_indices()
        .filter(|(_, c)| !c.is_whitespace())
        .map(|(i, c)| &sequence[i..i + c.len_utf8()])
        .collect()
}

impl PairTokenizer for HubPairTokenizer {
    fn encode_pairs(&self, pairs: &[(&str, &str)]) -> Result<Vec<Vec<u32>>> {
        let segments: Vec<&str> = pairs.iter().flat_map(|(p, r)| [*p, *r]).collect();
        let encoded = self.encode_segments(&segments)?;

        Ok(encoded
            .chunks(2)
            .map(|pair| {
                let (peptide, receptor) = (&pair[0], &pair[1]);
                let mut row = Vec::with_capacity(peptide.len() + receptor.len() + 3);
                row.extend(self.start_id);
                row.extend_from_slice(peptide);
                row.push(self.separator_id);
                row.extend_from_slice(receptor);
                row.push(self.separator_id);
                row
            })
            .collect())
    }

    fn separator_id(&self) -> u32 {
        self.separator_id
    }

    fn pad_id(&self) -> u32 {
        self.pad_id
    }
}

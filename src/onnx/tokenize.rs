//! Batch tokenization into rectangular model inputs

use tokenizers::Tokenizer;
use tracing::debug;

use crate::models::{EmbeddingError, EmbeddingResult, HandlerVariant, SparseVector, TokenizerConfig};

/// Row-major `[batch_size, seq_len]` model inputs
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizedBatch {
    pub batch_size: usize,
    pub seq_len: usize,
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

impl TokenizedBatch {
    pub fn shape(&self) -> [i64; 2] {
        [self.batch_size as i64, self.seq_len as i64]
    }
}

/// Apply the configured padding and truncation to a freshly loaded tokenizer
pub fn configure_tokenizer(
    tokenizer: &mut Tokenizer,
    config: &TokenizerConfig,
    variant: HandlerVariant,
) -> EmbeddingResult<()> {
    let padding = config.padding_params(variant).map(|mut params| {
        // Keep the pad token the tokenizer ships with
        if let Some(existing) = tokenizer.get_padding() {
            params.pad_id = existing.pad_id;
            params.pad_type_id = existing.pad_type_id;
            params.pad_token = existing.pad_token.clone();
        }
        params
    });
    tokenizer.with_padding(padding);

    tokenizer
        .with_truncation(config.truncation_params(variant))
        .map_err(|e| EmbeddingError::ConfigError {
            message: format!("Failed to configure truncation: {}", e),
        })?;

    Ok(())
}

/// Tokenize texts and lay them out as one rectangular batch
///
/// Sequences shorter than the longest one are padded with id 0 and mask 0,
/// so the result is rectangular even when the tokenizer does not pad.
pub fn tokenize_batch(
    tokenizer: &Tokenizer,
    texts: &[String],
    add_special_tokens: bool,
) -> EmbeddingResult<TokenizedBatch> {
    let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let encodings = tokenizer
        .encode_batch(inputs, add_special_tokens)
        .map_err(|e| EmbeddingError::EmbeddingFailed {
            error: format!("Tokenization failed: {}", e),
        })?;

    let batch_size = encodings.len();
    let seq_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);

    let mut batch = TokenizedBatch {
        batch_size,
        seq_len,
        input_ids: vec![0; batch_size * seq_len],
        attention_mask: vec![0; batch_size * seq_len],
        token_type_ids: vec![0; batch_size * seq_len],
    };

    for (row, encoding) in encodings.iter().enumerate() {
        let offset = row * seq_len;
        let ids = encoding.get_ids();
        let mask = encoding.get_attention_mask();
        let type_ids = encoding.get_type_ids();
        for col in 0..ids.len() {
            batch.input_ids[offset + col] = ids[col] as i64;
            batch.attention_mask[offset + col] = mask[col] as i64;
            batch.token_type_ids[offset + col] = type_ids[col] as i64;
        }
    }

    debug!("Tokenized {} texts into [{}, {}]", batch_size, batch_size, seq_len);
    Ok(batch)
}

/// Token strings indexed by id, and the sorted ids of special tokens
pub fn vocabulary(tokenizer: &Tokenizer) -> (Vec<String>, Vec<u32>) {
    let vocab = tokenizer.get_vocab(true);

    let size = vocab.values().map(|&id| id as usize + 1).max().unwrap_or(0);
    let mut id_to_token = vec![String::new(); size];
    for (token, id) in vocab {
        id_to_token[id as usize] = token;
    }

    let mut special_ids: Vec<u32> = tokenizer
        .get_added_tokens_decoder()
        .into_iter()
        .filter(|(_, token)| token.special)
        .map(|(id, _)| id)
        .collect();
    special_ids.sort_unstable();

    (id_to_token, special_ids)
}

/// Name the weighted ids; ids without a token string are dropped
pub fn sparse_vector(id_to_token: &[String], weights: Vec<(u32, f32)>) -> SparseVector {
    weights
        .into_iter()
        .filter_map(|(id, weight)| {
            id_to_token
                .get(id as usize)
                .filter(|token| !token.is_empty())
                .map(|token| (token.clone(), weight))
        })
        .collect()
}

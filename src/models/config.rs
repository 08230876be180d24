//! Configuration for the served model and its tokenizer
//!
//! These are the `[model]` and `[tokenizer]` sections of the server TOML.
//! Both sections have defaults, so a config file may omit them entirely.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};

use crate::models::{EmbeddingError, EmbeddingResult};

/// Dense model served when the config names none
pub const DEFAULT_DENSE_MODEL: &str = "sentence-transformers/msmarco-distilbert-base-tas-b";
/// Sparse model served when the config names none
pub const DEFAULT_SPARSE_MODEL: &str = "opensearch-project/opensearch-neural-sparse-encoding-v1";

/// Which handler the host instantiates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HandlerVariant {
    /// Raw nested lists of CLS vectors per request
    #[default]
    Embedding,
    /// One `sentence_embedding` record per request
    Record,
    /// Token-weight maps from the masked-LM sparse encoder
    Sparse,
}

impl HandlerVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerVariant::Embedding => "embedding",
            HandlerVariant::Record => "record",
            HandlerVariant::Sparse => "sparse",
        }
    }

    /// Model output tensor read by this variant
    pub fn default_output_name(&self) -> &'static str {
        match self {
            HandlerVariant::Embedding | HandlerVariant::Record => "last_hidden_state",
            HandlerVariant::Sparse => "logits",
        }
    }

    pub fn default_model_id(&self) -> &'static str {
        match self {
            HandlerVariant::Embedding | HandlerVariant::Record => DEFAULT_DENSE_MODEL,
            HandlerVariant::Sparse => DEFAULT_SPARSE_MODEL,
        }
    }
}

/// Model artifact location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub variant: HandlerVariant,
    /// Fixed identifier of the pretrained encoder/tokenizer pair
    #[serde(default)]
    pub model_id: Option<String>,
    /// Root directory holding one sub-directory per model id
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    #[serde(default = "default_model_file")]
    pub model_file: String,
    #[serde(default = "default_tokenizer_file")]
    pub tokenizer_file: String,
    /// Output tensor name; falls back to the variant's default
    #[serde(default)]
    pub output_name: Option<String>,
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_model_file() -> String {
    "model.onnx".to_string()
}

fn default_tokenizer_file() -> String {
    "tokenizer.json".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            variant: HandlerVariant::default(),
            model_id: None,
            model_dir: default_model_dir(),
            model_file: default_model_file(),
            tokenizer_file: default_tokenizer_file(),
            output_name: None,
        }
    }
}

impl ModelConfig {
    pub fn model_id(&self) -> &str {
        self.model_id
            .as_deref()
            .unwrap_or_else(|| self.variant.default_model_id())
    }

    pub fn output_name(&self) -> &str {
        self.output_name
            .as_deref()
            .unwrap_or_else(|| self.variant.default_output_name())
    }

    /// Directory of this model's artifacts
    pub fn artifact_dir(&self) -> PathBuf {
        self.model_dir.join(self.model_id())
    }

    pub fn model_path(&self) -> PathBuf {
        self.artifact_dir().join(&self.model_file)
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.artifact_dir().join(&self.tokenizer_file)
    }

    /// Resolve both artifact paths, failing if either is missing
    pub fn resolve(&self) -> EmbeddingResult<(PathBuf, PathBuf)> {
        let model_path = self.model_path();
        let tokenizer_path = self.tokenizer_path();
        for path in [&model_path, &tokenizer_path] {
            if !Path::new(path).exists() {
                return Err(EmbeddingError::ModelNotFound {
                    model_name: format!("{} ({} missing)", self.model_id(), path.display()),
                });
            }
        }
        Ok((model_path, tokenizer_path))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaddingStrategyConfig {
    /// Pad to the longest sequence in the batch
    #[default]
    Longest,
    /// Pad every sequence to `max_length`
    MaxLength,
    DoNotPad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TruncationStrategyConfig {
    #[default]
    LongestFirst,
    OnlyFirst,
    DoNotTruncate,
}

/// Tokenization options applied to every batch
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenizerConfig {
    /// Truncation/padding length cap; defaults per variant when unset
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub padding: PaddingStrategyConfig,
    #[serde(default)]
    pub truncation: TruncationStrategyConfig,
    #[serde(default = "default_true")]
    pub add_special_tokens: bool,
    #[serde(default = "default_true")]
    pub return_attention_mask: bool,
    #[serde(default)]
    pub return_token_type_ids: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            max_length: None,
            padding: PaddingStrategyConfig::default(),
            truncation: TruncationStrategyConfig::default(),
            add_special_tokens: true,
            return_attention_mask: true,
            return_token_type_ids: false,
        }
    }
}

impl TokenizerConfig {
    /// Length cap, 128 for dense encoders and 512 for the sparse one
    pub fn max_length(&self, variant: HandlerVariant) -> usize {
        self.max_length.unwrap_or(match variant {
            HandlerVariant::Embedding | HandlerVariant::Record => 128,
            HandlerVariant::Sparse => 512,
        })
    }

    /// Padding parameters for the `tokenizers` crate
    pub fn padding_params(&self, variant: HandlerVariant) -> Option<PaddingParams> {
        let strategy = match self.padding {
            PaddingStrategyConfig::Longest => PaddingStrategy::BatchLongest,
            PaddingStrategyConfig::MaxLength => PaddingStrategy::Fixed(self.max_length(variant)),
            PaddingStrategyConfig::DoNotPad => return None,
        };
        Some(PaddingParams {
            strategy,
            ..Default::default()
        })
    }

    /// Truncation parameters for the `tokenizers` crate
    pub fn truncation_params(&self, variant: HandlerVariant) -> Option<TruncationParams> {
        let strategy = match self.truncation {
            TruncationStrategyConfig::LongestFirst => TruncationStrategy::LongestFirst,
            TruncationStrategyConfig::OnlyFirst => TruncationStrategy::OnlyFirst,
            TruncationStrategyConfig::DoNotTruncate => return None,
        };
        Some(TruncationParams {
            max_length: self.max_length(variant),
            strategy,
            ..Default::default()
        })
    }

    pub fn validate(&self) -> EmbeddingResult<()> {
        if self.max_length == Some(0) {
            return Err(EmbeddingError::ConfigError {
                message: "tokenizer.max_length must be greater than zero".to_string(),
            });
        }
        if !self.return_attention_mask {
            // Padded batches are meaningless to the encoder without a mask
            return Err(EmbeddingError::ConfigError {
                message: "tokenizer.return_attention_mask cannot be disabled".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_defaults() {
        let config = ModelConfig::default();
        assert_eq!(config.variant, HandlerVariant::Embedding);
        assert_eq!(config.model_id(), DEFAULT_DENSE_MODEL);
        assert_eq!(config.output_name(), "last_hidden_state");

        let sparse = ModelConfig {
            variant: HandlerVariant::Sparse,
            ..Default::default()
        };
        assert_eq!(sparse.model_id(), DEFAULT_SPARSE_MODEL);
        assert_eq!(sparse.output_name(), "logits");
    }

    #[test]
    fn test_artifact_paths() {
        let config = ModelConfig {
            model_id: Some("acme/encoder".to_string()),
            model_dir: PathBuf::from("/opt/models"),
            ..Default::default()
        };
        assert_eq!(config.model_path(), PathBuf::from("/opt/models/acme/encoder/model.onnx"));
        assert_eq!(config.tokenizer_path(), PathBuf::from("/opt/models/acme/encoder/tokenizer.json"));
    }

    #[test]
    fn test_resolve_missing_artifact() {
        let config = ModelConfig {
            model_dir: PathBuf::from("/definitely/not/here"),
            ..Default::default()
        };
        assert!(matches!(config.resolve(), Err(EmbeddingError::ModelNotFound { .. })));
    }

    #[test]
    fn test_tokenizer_defaults() {
        let config = TokenizerConfig::default();
        assert_eq!(config.max_length(HandlerVariant::Embedding), 128);
        assert_eq!(config.max_length(HandlerVariant::Sparse), 512);
        assert!(config.add_special_tokens);
        assert!(!config.return_token_type_ids);

        let padding = config.padding_params(HandlerVariant::Embedding).unwrap();
        assert!(matches!(padding.strategy, PaddingStrategy::BatchLongest));

        let truncation = config.truncation_params(HandlerVariant::Embedding).unwrap();
        assert_eq!(truncation.max_length, 128);
        assert!(matches!(truncation.strategy, TruncationStrategy::LongestFirst));
    }

    #[test]
    fn test_tokenizer_from_toml() {
        let config: TokenizerConfig = toml::from_str(
            r#"
            max_length = 64
            padding = "max_length"
            truncation = "do_not_truncate"
            "#,
        )
        .unwrap();

        let padding = config.padding_params(HandlerVariant::Embedding).unwrap();
        assert!(matches!(padding.strategy, PaddingStrategy::Fixed(64)));
        assert!(config.truncation_params(HandlerVariant::Embedding).is_none());
    }

    #[test]
    fn test_tokenizer_validation() {
        let config = TokenizerConfig {
            max_length: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TokenizerConfig {
            return_attention_mask: false,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        assert!(TokenizerConfig::default().validate().is_ok());
    }
}

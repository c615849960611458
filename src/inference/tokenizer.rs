use std::path::{Path, PathBuf};

use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::processors::bert::BertProcessing;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::debug;

use super::error::EngineError;

/// Upper bound on tokens fed to the encoder, special tokens included.
pub const MAX_SEQUENCE_LENGTH: usize = 512;

/// Tokenizer definition found next to a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizerFile {
    /// Serialized `tokenizers` pipeline
    Json(PathBuf),
    /// Bare WordPiece vocabulary, one token per line
    Vocab(PathBuf),
}

impl TokenizerFile {
    /// Looks for `tokenizer.json`, then `vocab.txt`, in a checkpoint directory.
    pub fn find_in(dir: &Path) -> Option<Self> {
        let json = dir.join("tokenizer.json");
        if json.is_file() {
            return Some(TokenizerFile::Json(json));
        }
        let vocab = dir.join("vocab.txt");
        if vocab.is_file() {
            return Some(TokenizerFile::Vocab(vocab));
        }
        None
    }
}

/// Loads the tokenizer and configures right-truncation to `max_length`.
/// Padding is disabled since requests are scored one at a time.
pub fn load_tokenizer(file: &TokenizerFile, max_length: usize) -> Result<Tokenizer, EngineError> {
    let mut tokenizer = match file {
        TokenizerFile::Json(path) => {
            debug!("Loading tokenizer from {}", path.display());
            Tokenizer::from_file(path).map_err(|e| {
                EngineError::configuration(format!(
                    "Failed to load tokenizer {}: {}",
                    path.display(),
                    e
                ))
            })?
        }
        TokenizerFile::Vocab(path) => {
            debug!("Building WordPiece tokenizer from {}", path.display());
            wordpiece_from_vocab(path)?
        }
    };

    tokenizer.with_padding(None);
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| EngineError::configuration(format!("Invalid truncation settings: {}", e)))?;

    Ok(tokenizer)
}

fn wordpiece_from_vocab(path: &Path) -> Result<Tokenizer, EngineError> {
    let wordpiece = WordPiece::from_file(&path.to_string_lossy())
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(|e| EngineError::configuration(format!("Failed to build WordPiece model: {}", e)))?;

    let mut tokenizer = Tokenizer::new(wordpiece);
    tokenizer.with_normalizer(Some(BertNormalizer::default()));
    tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));

    let special = |token: &str| {
        tokenizer
            .token_to_id(token)
            .map(|id| (token.to_string(), id))
            .ok_or_else(|| {
                EngineError::configuration(format!("Vocabulary {} has no {} token", path.display(), token))
            })
    };
    let cls = special("[CLS]")?;
    let sep = special("[SEP]")?;
    tokenizer.with_post_processor(Some(BertProcessing::new(sep, cls)));

    Ok(tokenizer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn vocab_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("phishscan-tok-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("vocab.txt"),
            "[PAD]\n[UNK]\n[CLS]\n[SEP]\nplease\nverify\nyour\naccount\nnow\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_find_prefers_tokenizer_json() {
        let dir = vocab_dir("prefer");
        assert_eq!(
            TokenizerFile::find_in(&dir),
            Some(TokenizerFile::Vocab(dir.join("vocab.txt")))
        );
        fs::write(dir.join("tokenizer.json"), "{}").unwrap();
        assert_eq!(
            TokenizerFile::find_in(&dir),
            Some(TokenizerFile::Json(dir.join("tokenizer.json")))
        );
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_vocab_tokenizer_wraps_with_cls_and_sep() {
        let dir = vocab_dir("wrap");
        let tokenizer = load_tokenizer(&TokenizerFile::Vocab(dir.join("vocab.txt")), 16).unwrap();
        let encoding = tokenizer.encode("Please verify your account", true).unwrap();
        assert_eq!(encoding.get_ids(), &[2, 4, 5, 6, 7, 3]);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_long_input_is_truncated_not_rejected() {
        let dir = vocab_dir("truncate");
        let tokenizer =
            load_tokenizer(&TokenizerFile::Vocab(dir.join("vocab.txt")), MAX_SEQUENCE_LENGTH).unwrap();
        let text = "verify your account now ".repeat(400);
        let encoding = tokenizer.encode(text.as_str(), true).unwrap();
        assert_eq!(encoding.get_ids().len(), MAX_SEQUENCE_LENGTH);
        assert_eq!(encoding.get_ids().first(), Some(&2));
        assert_eq!(encoding.get_ids().last(), Some(&3));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_tokenizer_file_is_configuration_error() {
        let missing = TokenizerFile::Json(PathBuf::from("/nonexistent/tokenizer.json"));
        let err = load_tokenizer(&missing, 512).unwrap_err();
        assert!(err.is_fatal());
    }
}

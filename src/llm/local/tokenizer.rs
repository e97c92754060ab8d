use std::path::Path;

use serde_json::Value as JsonValue;
use tokenizers::models::bpe::BPE;
use tokenizers::pre_tokenizers::byte_level::ByteLevel;
use tokenizers::{ AddedToken, Tokenizer };

use super::loader::TokenizerFiles;
use super::TokenCodec;
use crate::error::{ ResponderError, Result };

pub const DEFAULT_EOS_TOKEN: &str = "<|endoftext|>";

/// `tokenizers` wrapper that knows the checkpoint's end-of-turn token.
pub struct HfTokenCodec {
    tokenizer: Tokenizer,
    eos_token: String,
    eos_token_id: u32,
}

impl HfTokenCodec {
    pub fn new(mut tokenizer: Tokenizer, eos_token: String) -> Result<Self> {
        // Make sure the marker is matched as one special token inside raw text.
        tokenizer.add_special_tokens(&[AddedToken::from(eos_token.clone(), true)]);
        let eos_token_id = tokenizer
            .token_to_id(&eos_token)
            .ok_or_else(||
                ResponderError::Tokenizer(
                    format!("end-of-turn token '{}' is not in the vocabulary", eos_token)
                )
            )?;
        Ok(Self { tokenizer, eos_token, eos_token_id })
    }

    pub fn load(files: &TokenizerFiles, tokenizer_config: Option<&Path>) -> Result<Self> {
        let tokenizer = match files {
            TokenizerFiles::Json(path) => Tokenizer::from_file(path)?,
            TokenizerFiles::VocabMerges { vocab, merges } => byte_level_bpe(vocab, merges)?,
        };
        let eos_token = match tokenizer_config {
            Some(path) => read_eos_token(path)?,
            None => None,
        };
        Self::new(tokenizer, eos_token.unwrap_or_else(|| DEFAULT_EOS_TOKEN.to_string()))
    }
}

fn byte_level_bpe(vocab: &Path, merges: &Path) -> Result<Tokenizer> {
    let vocab = vocab
        .to_str()
        .ok_or_else(|| ResponderError::Tokenizer(format!("non UTF-8 path {:?}", vocab)))?;
    let merges = merges
        .to_str()
        .ok_or_else(|| ResponderError::Tokenizer(format!("non UTF-8 path {:?}", merges)))?;
    let bpe = BPE::from_file(vocab, merges).build()?;

    let mut tokenizer = Tokenizer::new(bpe);
    tokenizer.with_pre_tokenizer(Some(ByteLevel::default().add_prefix_space(false)));
    tokenizer.with_decoder(Some(ByteLevel::default()));
    Ok(tokenizer)
}

/// Reads `eos_token` from a `tokenizer_config.json`, which stores it either as a
/// plain string or as an added-token object with a `content` field.
fn read_eos_token(path: &Path) -> Result<Option<String>> {
    let raw = std::fs::read_to_string(path)?;
    let config: JsonValue = serde_json::from_str(&raw)?;
    let eos = match config.get("eos_token") {
        Some(JsonValue::String(s)) => Some(s.clone()),
        Some(JsonValue::Object(obj)) =>
            obj
                .get("content")
                .and_then(|v| v.as_str())
                .map(str::to_owned),
        _ => None,
    };
    Ok(eos)
}

impl TokenCodec for HfTokenCodec {
    fn eos_token(&self) -> &str {
        &self.eos_token
    }

    fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self.tokenizer.encode(text, true)?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        Ok(self.tokenizer.decode(ids, true)?)
    }
}

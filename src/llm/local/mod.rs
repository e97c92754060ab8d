pub mod gpt2;
pub mod loader;
pub mod sampling;
pub mod tokenizer;

use std::time::Instant;

use candle_core::{ DType, Device };
use candle_nn::VarBuilder;
use log::{ debug, info, warn };

use self::gpt2::{ Gpt2, Gpt2Config };
use self::loader::{ CheckpointFiles, WeightsFile };
use self::sampling::LogitsSampler;
use self::tokenizer::HfTokenCodec;
use super::{ GenerationConfig, LlmConfig };
use crate::error::{ ResponderError, Result };
use crate::models::chat::GeneratedReply;

/// Text <-> token id conversion for one checkpoint.
pub trait TokenCodec: Send + Sync {
    /// Text form of the end-of-turn marker appended to every input.
    fn eos_token(&self) -> &str;
    fn eos_token_id(&self) -> u32;
    fn encode(&self, text: &str) -> Result<Vec<u32>>;
    /// Decodes with special tokens skipped.
    fn decode(&self, ids: &[u32]) -> Result<String>;
}

/// Incremental decoding state for one generation call.
pub trait LogitsSession {
    /// Feeds tokens not yet seen by the session and returns the logits of the
    /// last one.
    fn next_logits(&mut self, tokens: &[u32]) -> Result<Vec<f32>>;
}

pub trait CausalLm: Send + Sync {
    fn max_positions(&self) -> usize;
    fn session(&self) -> Result<Box<dyn LogitsSession + '_>>;
}

/// Extends `input_ids` until the sequence holds `max_length` tokens or the
/// end-of-turn token is produced. Returns the whole sequence, input included.
pub fn generate(
    model: &dyn CausalLm,
    input_ids: &[u32],
    config: &GenerationConfig,
    eos_token_id: u32
) -> Result<Vec<u32>> {
    if input_ids.is_empty() {
        return Err(ResponderError::Tokenizer("input encoded to no tokens".into()));
    }
    let max_length = config.max_length.min(model.max_positions());
    let mut tokens = input_ids.to_vec();
    if tokens.len() >= max_length {
        return Ok(tokens);
    }

    let mut sampler = LogitsSampler::new(config);
    let mut session = model.session()?;
    let mut pending = tokens.clone();
    while tokens.len() < max_length {
        let logits = session.next_logits(&pending)?;
        let next = sampler.sample(&logits)?;
        tokens.push(next);
        if next == eos_token_id {
            break;
        }
        pending.clear();
        pending.push(next);
    }
    Ok(tokens)
}

pub fn parse_device(name: &str) -> Result<Device> {
    let name = name.trim().to_lowercase();
    match name.as_str() {
        "cpu" => Ok(Device::Cpu),
        "cuda" => Ok(Device::cuda_if_available(0)?),
        other => {
            let ordinal = other
                .strip_prefix("cuda:")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| ResponderError::Config(format!("Unsupported device: '{}'", name)))?;
            Ok(Device::cuda_if_available(ordinal)?)
        }
    }
}

/// Tokenizer and model loaded once and shared read-only by every request.
pub struct ModelHandle {
    codec: Box<dyn TokenCodec>,
    model: Box<dyn CausalLm>,
    generation: GenerationConfig,
}

impl ModelHandle {
    pub fn new(
        codec: Box<dyn TokenCodec>,
        model: Box<dyn CausalLm>,
        generation: GenerationConfig
    ) -> Self {
        Self { codec, model, generation }
    }

    /// Resolves and loads the checkpoint. Blocking: reads (and possibly
    /// downloads) the weights.
    pub fn load(config: &LlmConfig) -> Result<Self> {
        config.generation.validate()?;
        let device = parse_device(&config.device)?;
        let files = loader::resolve(&config.model, &config.revision)?;
        Self::from_files(&files, &device, config.generation.clone())
    }

    pub fn from_files(
        files: &CheckpointFiles,
        device: &Device,
        generation: GenerationConfig
    ) -> Result<Self> {
        let raw = std::fs::read_to_string(&files.config)?;
        let model_config: Gpt2Config = serde_json::from_str(&raw)?;

        let vb = match &files.weights {
            WeightsFile::SafeTensors(path) => unsafe {
                VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)?
            }
            WeightsFile::Pytorch(path) => VarBuilder::from_pth(path, DType::F32, device)?,
        };
        let model = Gpt2::load(vb, &model_config)?;
        let codec = HfTokenCodec::load(&files.tokenizer, files.tokenizer_config.as_deref())?;

        if let Some(expected) = model_config.eos_token_id {
            if expected != codec.eos_token_id() {
                warn!(
                    "Tokenizer end-of-turn id {} differs from model config eos_token_id {}",
                    codec.eos_token_id(),
                    expected
                );
            }
        }
        info!(
            "Model loaded: layers={}, heads={}, embd={}, vocab={}, positions={}, device={:?}",
            model_config.n_layer,
            model_config.n_head,
            model_config.n_embd,
            model_config.vocab_size,
            model_config.n_positions,
            device
        );

        Ok(Self::new(Box::new(codec), Box::new(model), generation))
    }

    pub fn generation(&self) -> &GenerationConfig {
        &self.generation
    }

    /// One stateless chat turn: appends the end-of-turn marker, generates, and
    /// decodes only the tokens produced after the input.
    pub fn respond(&self, input_text: &str) -> Result<GeneratedReply> {
        let started = Instant::now();
        let prompt = format!("{}{}", input_text, self.codec.eos_token());
        let input_ids = self.codec.encode(&prompt)?;

        let max_length = self.generation.max_length.min(self.model.max_positions());
        if input_ids.len() >= max_length {
            warn!(
                "Input of {} tokens leaves no room under the {} token cap; replying with empty text",
                input_ids.len(),
                max_length
            );
            return Ok(GeneratedReply::new(String::new(), 0, started.elapsed()));
        }

        let output = generate(
            self.model.as_ref(),
            &input_ids,
            &self.generation,
            self.codec.eos_token_id()
        )?;
        let new_tokens = &output[input_ids.len()..];
        let text = self.codec.decode(new_tokens)?;
        debug!(
            "Generated {} tokens for {} input tokens in {:?}",
            new_tokens.len(),
            input_ids.len(),
            started.elapsed()
        );
        Ok(GeneratedReply::new(text, new_tokens.len(), started.elapsed()))
    }
}

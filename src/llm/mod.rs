pub mod chat;
pub mod local;
use std::str::FromStr;
use std::fmt;

use crate::cli::Args;
use crate::error::ResponderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Local,
    Ollama,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendType::Local => write!(f, "local"),
            BackendType::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseBackendTypeError {
    message: String,
}

impl fmt::Display for ParseBackendTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseBackendTypeError {}

impl FromStr for BackendType {
    type Err = ParseBackendTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "candle" => Ok(BackendType::Local),
            "ollama" => Ok(BackendType::Ollama),
            _ =>
                Err(ParseBackendTypeError {
                    message: format!("Invalid backend type: '{}'", s),
                }),
        }
    }
}

/// Decoding settings shared by every backend.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    /// Cap on input plus generated tokens.
    pub max_length: usize,
    pub do_sample: bool,
    pub temperature: f64,
    pub top_k: usize,
    pub top_p: f64,
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_length: 1000,
            do_sample: false,
            temperature: 1.0,
            top_k: 50,
            top_p: 1.0,
            seed: None,
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), ResponderError> {
        if self.max_length == 0 {
            return Err(ResponderError::Config("max_length must be greater than 0".into()));
        }
        if self.do_sample && !(self.temperature > 0.0) {
            return Err(
                ResponderError::Config(
                    format!("temperature must be positive when sampling, got {}", self.temperature)
                )
            );
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(ResponderError::Config(format!("top_p must be in (0, 1], got {}", self.top_p)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: BackendType,
    pub model: String,
    pub revision: String,
    pub device: String,
    pub base_url: Option<String>,
    pub generation: GenerationConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Local,
            model: "microsoft/DialoGPT-small".to_string(),
            revision: "main".to_string(),
            device: "cpu".to_string(),
            base_url: None,
            generation: GenerationConfig::default(),
        }
    }
}

impl LlmConfig {
    pub fn from_args(args: &Args) -> Result<Self, ResponderError> {
        let backend = args.backend
            .parse::<BackendType>()
            .map_err(|e| ResponderError::Config(e.to_string()))?;
        let generation = GenerationConfig {
            max_length: args.max_length,
            do_sample: args.do_sample,
            temperature: args.temperature,
            top_k: args.top_k,
            top_p: args.top_p,
            seed: args.seed,
        };
        generation.validate()?;

        Ok(Self {
            backend,
            model: args.model.clone(),
            revision: args.revision.clone(),
            device: args.device.clone(),
            base_url: Some(args.ollama_base_url.clone()),
            generation,
        })
    }
}

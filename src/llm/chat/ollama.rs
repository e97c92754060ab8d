use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use async_trait::async_trait;
use std::time::Instant;
use super::ChatClient;
use crate::error::ResponderError;
use crate::llm::{ BackendType, GenerationConfig, LlmConfig };
use crate::models::chat::{ ConversationTurn, GeneratedReply };
use log::debug;

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
    generation: GenerationConfig,
}

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize, Debug, PartialEq)]
struct GenerateOptions {
    num_ctx: usize,
    /// Ollama generates without limit unless this is set.
    num_predict: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

impl GenerateOptions {
    fn from_generation(config: &GenerationConfig) -> Self {
        // Greedy decoding maps to temperature 0 on Ollama.
        let (temperature, top_k, top_p) = if config.do_sample {
            (Some(config.temperature), Some(config.top_k).filter(|k| *k > 0), Some(config.top_p))
        } else {
            (Some(0.0), None, None)
        };
        Self {
            num_ctx: config.max_length,
            num_predict: config.max_length,
            temperature,
            top_k,
            top_p,
            seed: config.seed,
        }
    }
}

#[derive(Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    #[serde(default)]
    pub eval_count: Option<usize>,
}

impl OllamaClient {
    pub fn new(
        base_url: Option<String>,
        completion_model: String,
        generation: GenerationConfig
    ) -> Self {
        let url = base_url.unwrap_or_else(|| "http://localhost:11434".into());

        Self {
            http: HttpClient::new(),
            base_url: url.trim_end_matches('/').to_string(),
            completion_model,
            generation,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ResponderError> {
        if config.backend != BackendType::Ollama {
            return Err(ResponderError::Config("Invalid config type for OllamaClient".into()));
        }

        Ok(Self::new(config.base_url.clone(), config.model.clone(), config.generation.clone()))
    }

    fn request_for(&self, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: self.completion_model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: GenerateOptions::from_generation(&self.generation),
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<GenerateResponse, ResponderError> {
        let url = format!("{}/api/generate", self.base_url);
        let req = self.request_for(prompt);
        debug!("POST {} model={}", url, req.model);
        let resp = self.http.post(&url).json(&req).send().await?.error_for_status()?;
        let data = resp.json::<GenerateResponse>().await?;
        Ok(data)
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn complete(
        &self,
        turn: &ConversationTurn
    ) -> Result<GeneratedReply, ResponderError> {
        let started = Instant::now();
        let gen_resp = self.generate(&turn.text).await?;
        Ok(
            GeneratedReply::new(
                gen_resp.response,
                gen_resp.eval_count.unwrap_or(0),
                started.elapsed()
            )
        )
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn get_backend(&self) -> BackendType {
        BackendType::Ollama
    }
}

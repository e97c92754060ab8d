use async_trait::async_trait;
use log::info;
use std::sync::Arc;

use super::ChatClient;
use crate::error::ResponderError;
use crate::llm::local::ModelHandle;
use crate::llm::{ BackendType, LlmConfig };
use crate::models::chat::{ ConversationTurn, GeneratedReply };

/// Runs the checkpoint in-process. Generation is compute-bound, so each turn
/// runs on the blocking pool.
pub struct LocalChatClient {
    handle: Arc<ModelHandle>,
    model: String,
}

impl LocalChatClient {
    pub fn new(handle: Arc<ModelHandle>, model: String) -> Self {
        Self { handle, model }
    }

    pub async fn load(config: &LlmConfig) -> Result<Self, ResponderError> {
        if config.backend != BackendType::Local {
            return Err(ResponderError::Config("Invalid config type for LocalChatClient".into()));
        }
        info!("Loading checkpoint '{}' (revision {})", config.model, config.revision);
        let load_config = config.clone();
        let handle = tokio::task::spawn_blocking(move || ModelHandle::load(&load_config)).await??;
        info!(
            "Checkpoint '{}' ready, max_length={}, do_sample={}",
            config.model,
            handle.generation().max_length,
            handle.generation().do_sample
        );
        Ok(Self::new(Arc::new(handle), config.model.clone()))
    }
}

#[async_trait]
impl ChatClient for LocalChatClient {
    async fn complete(
        &self,
        turn: &ConversationTurn
    ) -> Result<GeneratedReply, ResponderError> {
        let handle = Arc::clone(&self.handle);
        let text = turn.text.clone();
        tokio::task::spawn_blocking(move || handle.respond(&text)).await?
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_backend(&self) -> BackendType {
        BackendType::Local
    }
}

pub mod local;
pub mod ollama;

use async_trait::async_trait;
use std::sync::Arc;
use super::{ BackendType, LlmConfig };
use self::local::LocalChatClient;
use self::ollama::OllamaClient;
use crate::error::ResponderError;
use crate::models::chat::{ ConversationTurn, GeneratedReply };

/// A text generation capability the responder delegates each turn to.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        turn: &ConversationTurn
    ) -> Result<GeneratedReply, ResponderError>;

    fn get_model(&self) -> String;
    fn get_backend(&self) -> BackendType;
}

/// Builds the configured backend. For the local backend this loads the whole
/// checkpoint, so any failure here is a startup failure.
pub async fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, ResponderError> {
    let client: Arc<dyn ChatClient> = match config.backend {
        BackendType::Local => {
            let specific_client = LocalChatClient::load(config).await?;
            Arc::new(specific_client)
        }
        BackendType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

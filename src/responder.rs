use crate::cli::Args;
use crate::error::ResponderError;
use crate::llm::chat::{ ChatClient, new_client as new_chat_client };
use crate::llm::{ BackendType, LlmConfig };
use crate::models::chat::{ ConversationTurn, GeneratedReply };

use log::{ info, error };
use std::sync::Arc;

/// Answers a single chat turn. Holds no per-conversation state: every call
/// sees only its own input and the shared, read-only generation backend.
#[derive(Clone)]
pub struct ChatResponder {
    chat_client: Arc<dyn ChatClient>,
}

impl ChatResponder {
    pub fn new(chat_client: Arc<dyn ChatClient>) -> Self {
        Self { chat_client }
    }

    pub async fn from_args(args: &Args) -> Result<Self, ResponderError> {
        let config = LlmConfig::from_args(args)?;
        let chat_client = new_chat_client(&config).await?;
        info!(
            "Chat client configured: Backend={}, Model={}",
            chat_client.get_backend(),
            chat_client.get_model()
        );
        Ok(Self::new(chat_client))
    }

    pub async fn respond(&self, input_text: &str) -> Result<GeneratedReply, ResponderError> {
        let turn = ConversationTurn::from(input_text);
        match self.chat_client.complete(&turn).await {
            Ok(reply) => {
                info!(
                    "Replied to {} chars with {} chars ({} tokens) in {:.2}s",
                    turn.text.chars().count(),
                    reply.text.chars().count(),
                    reply.generated_tokens,
                    reply.duration.as_secs_f64()
                );
                Ok(reply)
            }
            Err(e) => {
                error!("Generation failed: {}", e);
                Err(e)
            }
        }
    }

    pub fn model(&self) -> String {
        self.chat_client.get_model()
    }

    pub fn backend(&self) -> BackendType {
        self.chat_client.get_backend()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Replies by reversing the input, or fails when the input is "fail".
    pub struct EchoClient;

    #[async_trait]
    impl ChatClient for EchoClient {
        async fn complete(
            &self,
            turn: &ConversationTurn
        ) -> Result<GeneratedReply, ResponderError> {
            if turn.text == "fail" {
                return Err(ResponderError::Tokenizer("boom".into()));
            }
            let text: String = turn.text.chars().rev().collect();
            Ok(GeneratedReply::new(text, 1, Duration::from_millis(5)))
        }

        fn get_model(&self) -> String {
            "echo".to_string()
        }

        fn get_backend(&self) -> BackendType {
            BackendType::Local
        }
    }

    pub fn echo_responder() -> ChatResponder {
        ChatResponder::new(Arc::new(EchoClient))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::echo_responder;
    use super::*;
    use crate::llm::local::testing::handle;
    use crate::llm::chat::local::LocalChatClient;
    use crate::llm::GenerationConfig;
    use clap::Parser;

    #[tokio::test]
    async fn hello_gets_a_string_reply() {
        let responder = echo_responder();
        assert_eq!(responder.respond("Hello").await.unwrap().text, "olleH");
    }

    #[tokio::test]
    async fn empty_input_does_not_fail() {
        let responder = echo_responder();
        assert_eq!(responder.respond("").await.unwrap().text, "");
    }

    #[tokio::test]
    async fn backend_errors_pass_through_unchanged() {
        let responder = echo_responder();
        let err = responder.respond("fail").await.unwrap_err();
        assert_eq!(err.to_string(), "tokenizer error: boom");
    }

    #[tokio::test]
    async fn deterministic_backend_gives_identical_replies() {
        let handle = handle(&["Hello", "hi", "there"], vec![2, 3, 0], GenerationConfig::default());
        let client = LocalChatClient::new(Arc::new(handle), "scripted".into());
        let responder = ChatResponder::new(Arc::new(client));
        let first = responder.respond("Hello").await.unwrap();
        let second = responder.respond("Hello").await.unwrap();
        assert_eq!(first.text, "hi there");
        assert_eq!(first.text, second.text);
    }

    #[tokio::test]
    async fn unresolvable_checkpoint_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nowhere");
        std::fs::create_dir(&missing).unwrap();
        let args = Args::try_parse_from([
            "chat-responder",
            "--model",
            missing.to_str().unwrap(),
        ]).unwrap();
        assert!(ChatResponder::from_args(&args).await.is_err());
    }
}

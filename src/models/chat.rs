use serde::{ Serialize, Deserialize };
use std::time::Duration;

/// One user utterance. Nothing from earlier turns is carried along.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub text: String,
}

impl From<&str> for ConversationTurn {
    fn from(text: &str) -> Self {
        Self { text: text.to_string() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedReply {
    pub text: String,
    /// Tokens produced after the input, end-of-turn marker included.
    pub generated_tokens: usize,
    pub duration: Duration,
}

impl GeneratedReply {
    pub fn new(text: String, generated_tokens: usize, duration: Duration) -> Self {
        Self { text, generated_tokens, duration }
    }
}

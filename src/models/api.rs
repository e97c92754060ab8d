use serde::{ Serialize, Deserialize };
use serde_json::Value as JsonValue;

/// Body of `POST /api/predict`, shaped like a Gradio interface call:
/// `{"data": ["Hello"]}`.
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub data: Vec<JsonValue>,
}

impl PredictRequest {
    /// The text input component is the first element and must be a string.
    pub fn input_text(&self) -> Option<&str> {
        self.data.first().and_then(|v| v.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub data: Vec<String>,
    /// Seconds spent generating.
    pub duration: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
    pub model: String,
}

/// Form field of the HTML page.
#[derive(Debug, Deserialize)]
pub struct ChatForm {
    #[serde(default)]
    pub input_text: String,
}

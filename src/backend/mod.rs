//! Generative backends: the black box that turns a prompt plus a tool
//! registry into final text.

mod gemini;

use assist_core::{ToolCollection, ToolError};
use async_trait::async_trait;
use serde::Serialize;

pub use gemini::{DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_URL, DEFAULT_MAX_TURNS, GeminiBackend};

/// Tracing target for model calls.
pub const TRACING_TARGET_BACKEND: &str = "docit_functions::backend";

pub const MAX_OUTPUT_TOKENS: u32 = 400;
pub const TEMPERATURE: f32 = 1.2;
pub const TOP_P: f32 = 0.4;
pub const TOP_K: u32 = 50;
pub const STOP_SEQUENCES: [&str; 2] = ["<end>", "<fin>"];

/// Decoding parameters sent with every generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: MAX_OUTPUT_TOKENS,
            temperature: TEMPERATURE,
            top_p: TOP_P,
            top_k: TOP_K,
            stop_sequences: STOP_SEQUENCES.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

/// Everything a backend needs besides the tools.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub system: String,
    pub prompt: String,
    pub config: GenerationConfig,
}

/// A generation failed or was refused.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("generation blocked: {0}")]
    Blocked(String),

    #[error("model kept requesting tools after {0} turns")]
    TurnLimit(usize),
}

/// A hosted model that may call tools from `tools` any number of times, in
/// any order, before returning its final text.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate(
        &self,
        request: &GenerateRequest,
        tools: &ToolCollection,
    ) -> Result<String, GenerationError>;
}

//! Builds the augmented prompt and runs one generation against the backend.

use std::sync::Arc;

use crate::backend::{GenerateRequest, GenerationConfig, GenerationError, GenerativeBackend};
use crate::tools::{DataTools, Toolset};

/// Tracing target for generation orchestration.
pub const TRACING_TARGET_ORCHESTRATOR: &str = "docit_functions::orchestrator";

/// Persona every generation runs under.
pub const SYSTEM_PROMPT: &str =
    "You are Kian, an assistant for an AI documentation tool called DocIt.";

/// Appends the caller's id to the prompt so the model can pass it to tools.
pub fn augment_prompt(prompt: &str, user_id: &str) -> String {
    format!("{prompt}\n\nMy userId is {user_id}.")
}

/// Runs generations for authenticated callers.
///
/// Every generation gets its own tool collection bound to the caller, so the
/// model can only ever read the caller's records.
pub struct Orchestrator {
    backend: Arc<dyn GenerativeBackend>,
    tools: DataTools,
    toolset: Toolset,
    system: String,
    config: GenerationConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("toolset", &self.toolset)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn GenerativeBackend>, tools: DataTools, toolset: Toolset) -> Self {
        Self {
            backend,
            tools,
            toolset,
            system: SYSTEM_PROMPT.to_owned(),
            config: GenerationConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn toolset(&self) -> Toolset {
        self.toolset
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Generates a reply to `prompt` on behalf of `user_id`.
    pub async fn generate(&self, prompt: &str, user_id: &str) -> Result<String, GenerationError> {
        let tools = self.tools.collection(self.toolset, user_id)?;
        let request = GenerateRequest {
            system: self.system.clone(),
            prompt: augment_prompt(prompt, user_id),
            config: self.config.clone(),
        };

        tracing::info!(
            target: TRACING_TARGET_ORCHESTRATOR,
            user_id,
            tools = tools.len(),
            "starting generation"
        );

        match self.backend.generate(&request, &tools).await {
            Ok(text) => {
                tracing::info!(
                    target: TRACING_TARGET_ORCHESTRATOR,
                    user_id,
                    chars = text.len(),
                    "generation completed"
                );
                Ok(text)
            }
            Err(error) => {
                tracing::error!(
                    target: TRACING_TARGET_ORCHESTRATOR,
                    user_id,
                    error = %error,
                    "generation failed"
                );
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assist_core::ToolCollection;
    use async_trait::async_trait;

    use super::*;
    use crate::store::MemoryStore;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<GenerateRequest>>,
    }

    #[async_trait]
    impl GenerativeBackend for Recording {
        async fn generate(
            &self,
            request: &GenerateRequest,
            _tools: &ToolCollection,
        ) -> Result<String, GenerationError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok("hello".to_owned())
        }
    }

    #[test]
    fn prompt_carries_user_id() {
        let prompt = augment_prompt("Summarize my lists", "u1");
        assert!(prompt.starts_with("Summarize my lists"));
        assert!(prompt.ends_with("My userId is u1."));
    }

    #[tokio::test]
    async fn passes_persona_and_decoding_config() {
        let backend = Arc::new(Recording::default());
        let tools = DataTools::new(Arc::new(MemoryStore::new()));
        let orchestrator = Orchestrator::new(backend.clone(), tools, Toolset::All);

        let text = orchestrator.generate("What is your name", "u1").await.unwrap();
        assert_eq!(text, "hello");

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].system, SYSTEM_PROMPT);
        assert_eq!(seen[0].config, GenerationConfig::default());
        assert!(seen[0].prompt.contains("u1"));
    }
}

mod openai;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::LlmConfig;
use crate::error::Result;
use crate::flags::RuntimeFlags;

pub use openai::OpenAiEngine;

// -- Backend trait ----------------------------------------------------------

/// A chat-completions API that answers a single prompt with a given model.
#[async_trait::async_trait]
pub trait LlmBackend: Send + Sync {
    /// Human-readable name of this backend (e.g. "OpenAI API").
    fn name(&self) -> &str;

    async fn generate(&self, model: &str, prompt: &str) -> Result<String>;
}

#[async_trait::async_trait]
impl LlmBackend for OpenAiEngine {
    fn name(&self) -> &str {
        "OpenAI API"
    }
    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        self.generate(model, prompt).await
    }
}

// -- Completion service -----------------------------------------------------

/// What the relay worker calls to turn a question into an answer.
#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, question: &str) -> Result<String>;
}

/// Completion service over an [`LlmBackend`] with model selection and a
/// single bounded retry.
pub struct CompletionEngine {
    backend: Arc<dyn LlmBackend>,
    flags: Arc<RuntimeFlags>,
    model: String,
    downgrade_model: String,
    retry_delay: Duration,
}

impl CompletionEngine {
    pub fn new(backend: Arc<dyn LlmBackend>, config: &LlmConfig, flags: Arc<RuntimeFlags>) -> Self {
        info!(
            backend = backend.name(),
            model = %config.model,
            downgrade_model = %config.downgrade_model,
            "completion engine initialized"
        );
        Self {
            backend,
            flags,
            model: config.model.clone(),
            downgrade_model: config.downgrade_model.clone(),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Model for the next request, honouring downgrade mode.
    pub fn current_model(&self) -> &str {
        if self.flags.downgraded() {
            &self.downgrade_model
        } else {
            &self.model
        }
    }
}

#[async_trait::async_trait]
impl CompletionService for CompletionEngine {
    async fn complete(&self, question: &str) -> Result<String> {
        let model = self.current_model().to_string();
        match self.backend.generate(&model, question).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                warn!(model = %model, err = %e, "completion failed, retrying once");
                tokio::time::sleep(self.retry_delay).await;
                self.backend.generate(&model, question).await
            }
        }
    }
}

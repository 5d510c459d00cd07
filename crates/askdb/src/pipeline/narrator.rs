use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::ModelSettings;
use crate::database::QueryResult;
use crate::error::{AssistantError, Result};
use crate::llm::prompt::{narration_prompt, render_history};
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel};
use crate::metrics;
use crate::session::ConversationTurn;

/// Explains a successful result in prose.
pub struct ResponseNarrator {
    model: Arc<dyn LanguageModel>,
    settings: ModelSettings,
}

impl ResponseNarrator {
    pub fn new(model: Arc<dyn LanguageModel>, settings: ModelSettings) -> Self {
        Self { model, settings }
    }

    pub async fn narrate(
        &self,
        question: &str,
        schema: &str,
        sql: &str,
        result: &QueryResult,
        history: &[ConversationTurn],
    ) -> Result<String> {
        if let QueryResult::ExecutionFailure { message } = result {
            return Err(AssistantError::InvalidRequest(format!(
                "cannot narrate a failed statement: {}",
                message
            )));
        }

        let history = render_history(history, self.settings.history_window, self.settings.result_preview_rows);
        let prompt = narration_prompt(question, schema, sql, result, &history, self.settings.result_preview_rows);
        debug!("Narration prompt is {} chars", prompt.len());

        let request = CompletionRequest {
            model: self.settings.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let started = Instant::now();
        let outcome = self.model.complete(request).await;
        metrics::observe_model_latency("narrate", started.elapsed().as_secs_f64());

        match outcome {
            Ok(text) => {
                metrics::inc_model_request("narrate", "ok");
                Ok(text.trim().to_string())
            }
            Err(e) => {
                metrics::inc_model_request("narrate", "error");
                warn!("Narration failed: {}", e);
                Err(e)
            }
        }
    }
}

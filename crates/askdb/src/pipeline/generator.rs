use std::sync::Arc;
use std::time::Instant;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use super::ModelSettings;
use crate::error::Result;
use crate::llm::prompt::{render_history, sql_prompt};
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel};
use crate::metrics;
use crate::session::ConversationTurn;

lazy_static! {
    static ref OPENING_FENCE: Regex = Regex::new(r"^```([A-Za-z0-9_+-]*[ \t]*\r?\n)?").unwrap();
    static ref CLOSING_FENCE: Regex = Regex::new(r"(\r?\n)?[ \t]*```$").unwrap();
}

/// Turns a question into one SQL statement. Generation is deterministic:
/// the sampling temperature is always 0.
pub struct QueryGenerator {
    model: Arc<dyn LanguageModel>,
    settings: ModelSettings,
}

impl QueryGenerator {
    pub const TEMPERATURE: f32 = 0.0;

    pub fn new(model: Arc<dyn LanguageModel>, settings: ModelSettings) -> Self {
        Self { model, settings }
    }

    pub async fn generate_sql(
        &self,
        question: &str,
        schema: &str,
        history: &[ConversationTurn],
    ) -> Result<String> {
        let history = render_history(history, self.settings.history_window, self.settings.result_preview_rows);
        let prompt = sql_prompt(question, schema, &history);
        debug!("SQL prompt is {} chars", prompt.len());

        let request = CompletionRequest {
            model: self.settings.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: Self::TEMPERATURE,
            max_tokens: self.settings.max_tokens,
        };

        let started = Instant::now();
        let outcome = self.model.complete(request).await;
        metrics::observe_model_latency("generate", started.elapsed().as_secs_f64());

        match outcome {
            Ok(text) => {
                metrics::inc_model_request("generate", "ok");
                let sql = clean_sql(&text);
                debug!("Generated SQL: {}", sql);
                Ok(sql)
            }
            Err(e) => {
                metrics::inc_model_request("generate", "error");
                warn!("SQL generation failed: {}", e);
                Err(e)
            }
        }
    }
}

/// Trim, drop a surrounding code fence (with or without a language tag) and
/// trim again.
pub fn clean_sql(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_open = OPENING_FENCE.replace(trimmed, "");
    let without_close = CLOSING_FENCE.replace(&without_open, "");
    without_close.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AssistantError, GenerationFailureKind};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedModel {
        reply: Result<String>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(AssistantError::Generation { kind, message }) => {
                    Err(AssistantError::generation(*kind, message.clone()))
                }
                Err(other) => Err(AssistantError::InvalidRequest(other.to_string())),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn generator(reply: Result<String>) -> (Arc<ScriptedModel>, QueryGenerator) {
        let model = Arc::new(ScriptedModel {
            reply,
            seen: Mutex::new(Vec::new()),
        });
        let settings = ModelSettings {
            temperature: 0.7,
            ..ModelSettings::default()
        };
        (model.clone(), QueryGenerator::new(model, settings))
    }

    #[test]
    fn test_clean_sql_strips_fences() {
        assert_eq!(clean_sql("  SELECT 1;  "), "SELECT 1;");
        assert_eq!(clean_sql("```sql\nSELECT Name FROM Artist;\n```"), "SELECT Name FROM Artist;");
        assert_eq!(clean_sql("```\nSELECT 1\n```\n"), "SELECT 1");
        assert_eq!(clean_sql("```SELECT 1```"), "SELECT 1");
        assert_eq!(clean_sql("SELECT '```' AS tick"), "SELECT '```' AS tick");
    }

    #[tokio::test]
    async fn test_generation_pins_temperature_and_threads_history() {
        let (model, generator) = generator(Ok("```sql\nSELECT Name FROM Artist LIMIT 10;\n```".into()));
        let history = vec![
            ConversationTurn::UserQuestion("How many artists?".into()),
            ConversationTurn::GeneratedSql("SELECT count(*) FROM Artist;".into()),
        ];

        let sql = generator
            .generate_sql("Name 10 artists", "- Artist(ArtistId, Name)", &history)
            .await
            .unwrap();
        assert_eq!(sql, "SELECT Name FROM Artist LIMIT 10;");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].temperature, 0.0);
        let prompt = &seen[0].messages[0].content;
        assert!(prompt.contains("User: How many artists?"));
        assert!(prompt.contains("SQL: SELECT count(*) FROM Artist;"));
        assert!(prompt.contains("<SCHEMA>- Artist(ArtistId, Name)</SCHEMA>"));
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let (_, generator) = generator(Err(AssistantError::generation(
            GenerationFailureKind::Timeout,
            "deadline elapsed",
        )));
        let err = generator.generate_sql("q", "", &[]).await.unwrap_err();
        assert!(matches!(err, AssistantError::Generation { kind: GenerationFailureKind::Timeout, .. }));
    }
}

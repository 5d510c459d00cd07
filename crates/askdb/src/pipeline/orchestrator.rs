use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use super::generator::QueryGenerator;
use super::narrator::ResponseNarrator;
use super::state::ExchangeState;
use super::ModelSettings;
use crate::config::Config;
use crate::database::{DatabaseConnection, QueryExecutor, QueryResult, SchemaDescription, SchemaIntrospector};
use crate::error::{AssistantError, Result};
use crate::llm::{ChatCompletionsClient, LanguageModel};
use crate::metrics;
use crate::session::{AssistantSession, ConversationTurn};

/// Outcome of one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exchange {
    pub question: String,
    pub sql: String,
    pub result: QueryResult,
    pub narration: Option<String>,
    pub state: ExchangeState,
}

/// Drives one exchange through introspection, generation, execution and
/// optional narration.
pub struct Assistant {
    introspector: SchemaIntrospector,
    generator: QueryGenerator,
    executor: QueryExecutor,
    narrator: ResponseNarrator,
}

impl Assistant {
    pub fn new(model: Arc<dyn LanguageModel>, settings: ModelSettings, query_timeout: Duration) -> Self {
        Self {
            introspector: SchemaIntrospector::new(query_timeout),
            generator: QueryGenerator::new(Arc::clone(&model), settings.clone()),
            executor: QueryExecutor::new(query_timeout),
            narrator: ResponseNarrator::new(model, settings),
        }
    }

    /// Build an assistant backed by the hosted chat-completions endpoint.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.llm_api_key.as_deref().unwrap_or_default();
        let client = ChatCompletionsClient::new(&config.llm_base_url, api_key, config.llm_timeout())?;
        Ok(Self::new(Arc::new(client), config.model_settings(), config.query_timeout()))
    }

    /// Answer `question` against the session's database.
    ///
    /// The generated SQL runs exactly as the model wrote it, without
    /// parameterization. The model is treated as a trusted component; the
    /// only guard is that a single statement is executed per exchange.
    ///
    /// Turns are committed to the conversation only when the exchange reaches
    /// `Done` or `ExecutionFailed`. A generation or narration error, or
    /// dropping the returned future, leaves the conversation untouched.
    pub async fn ask(&self, session: &mut AssistantSession, question: &str, narrate: bool) -> Result<Exchange> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AssistantError::InvalidRequest("question is empty".to_string()));
        }
        let connection = Self::require_connection(session)?;

        let mut state = ExchangeState::Idle;
        advance(&mut state, ExchangeState::GeneratingSql);

        let schema = self.introspector.describe_schema(&connection).await?.to_string();
        let history = session.conversation().history();

        let sql = match self.generator.generate_sql(question, &schema, history).await {
            Ok(sql) => sql,
            Err(e) => {
                advance(&mut state, ExchangeState::GenerationFailed);
                metrics::inc_exchange(state.as_str());
                return Err(e);
            }
        };

        advance(&mut state, ExchangeState::ExecutingQuery);
        let mut turns = vec![
            ConversationTurn::UserQuestion(question.to_string()),
            ConversationTurn::GeneratedSql(sql.clone()),
        ];
        let result = self.executor.execute(&connection, &sql).await;

        let narration = match &result {
            QueryResult::ExecutionFailure { message } => {
                turns.push(ConversationTurn::ExecutionError(message.clone()));
                advance(&mut state, ExchangeState::ExecutionFailed);
                None
            }
            QueryResult::Rows { columns, rows } => {
                turns.push(ConversationTurn::ExecutionResult {
                    columns: columns.clone(),
                    rows: rows.clone(),
                });
                if narrate {
                    advance(&mut state, ExchangeState::Narrating);
                    match self.narrator.narrate(question, &schema, &sql, &result, history).await {
                        Ok(text) => Some(text),
                        Err(e) => {
                            advance(&mut state, ExchangeState::GenerationFailed);
                            metrics::inc_exchange(state.as_str());
                            return Err(e);
                        }
                    }
                } else {
                    None
                }
            }
        };

        if let Some(text) = &narration {
            turns.push(ConversationTurn::Narration(text.clone()));
        }
        if !state.is_terminal() {
            advance(&mut state, ExchangeState::Done);
        }

        session.conversation_mut().extend(turns);
        metrics::inc_exchange(state.as_str());
        info!("Exchange finished in state {}", state);

        Ok(Exchange {
            question: question.to_string(),
            sql,
            result,
            narration,
            state,
        })
    }

    /// Run `sql` directly, bypassing the model. The conversation is not touched.
    pub async fn run_sql(&self, session: &AssistantSession, sql: &str) -> Result<QueryResult> {
        let connection = Self::require_connection(session)?;
        Ok(self.executor.execute(&connection, sql).await)
    }

    pub async fn describe(&self, session: &AssistantSession) -> Result<SchemaDescription> {
        let connection = Self::require_connection(session)?;
        self.introspector.describe_schema(&connection).await
    }

    fn require_connection(session: &AssistantSession) -> Result<DatabaseConnection> {
        session.connection().cloned().ok_or_else(|| {
            AssistantError::Configuration("no database connection; connect to a database first".to_string())
        })
    }
}

fn advance(state: &mut ExchangeState, next: ExchangeState) {
    debug_assert!(state.can_advance_to(next), "illegal transition {} -> {}", state, next);
    debug!("Exchange {} -> {}", state, next);
    *state = next;
}

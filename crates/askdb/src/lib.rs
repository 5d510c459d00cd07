//! Natural-language questions over a relational database.
//!
//! An exchange introspects the connected schema, asks a hosted language model
//! for one SQL statement, runs it, and can narrate the result back in prose.
//! The conversation so far is threaded into every prompt.

pub mod config;
pub mod database;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod render;
pub mod session;
pub mod telemetry;

#[cfg(feature = "cli")]
pub mod api;
#[cfg(feature = "cli")]
pub mod repl;
#[cfg(feature = "cli")]
pub mod server;

pub use config::Config;
pub use database::{DatabaseConnection, DatabaseTarget, QueryResult, ScalarValue, SchemaDescription};
pub use error::{AssistantError, GenerationFailureKind, Result};
pub use llm::{ChatCompletionsClient, CompletionRequest, LanguageModel};
pub use pipeline::{Assistant, Exchange, ExchangeState, ModelSettings};
pub use session::{AssistantSession, ConversationSession, ConversationTurn, SessionRegistry};

#[cfg(feature = "cli")]
pub use server::{build_router, run_server};

//! Error taxonomy shared by every pipeline component.
//!
//! Each component returns exactly its own category. Driver-level SQL failures
//! are not errors here: they travel as [`crate::database::QueryResult::ExecutionFailure`]
//! so they can be recorded in the conversation.

use std::fmt;
use thiserror::Error;

/// Why a language-model call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationFailureKind {
    Timeout,
    RateLimited,
    Unauthorized,
    Transport,
    Backend,
    MalformedResponse,
}

impl fmt::Display for GenerationFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GenerationFailureKind::Timeout => "timeout",
            GenerationFailureKind::RateLimited => "rate limited",
            GenerationFailureKind::Unauthorized => "unauthorized",
            GenerationFailureKind::Transport => "transport",
            GenerationFailureKind::Backend => "backend",
            GenerationFailureKind::MalformedResponse => "malformed response",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("schema introspection failed: {0}")]
    SchemaIntrospection(String),

    #[error("generation failed ({kind}): {message}")]
    Generation {
        kind: GenerationFailureKind,
        message: String,
    },

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl AssistantError {
    pub fn generation(kind: GenerationFailureKind, message: impl Into<String>) -> Self {
        AssistantError::Generation {
            kind,
            message: message.into(),
        }
    }

    /// Short machine-readable label, used for metrics and API payloads.
    pub fn category(&self) -> &'static str {
        match self {
            AssistantError::SchemaIntrospection(_) => "schema_introspection",
            AssistantError::Generation { .. } => "generation",
            AssistantError::Execution(_) => "execution",
            AssistantError::Configuration(_) => "configuration",
            AssistantError::InvalidRequest(_) => "invalid_request",
        }
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_error_message_includes_kind() {
        let err = AssistantError::generation(GenerationFailureKind::RateLimited, "slow down");
        assert_eq!(err.to_string(), "generation failed (rate limited): slow down");
        assert_eq!(err.category(), "generation");
    }

    #[test]
    fn test_categories_are_distinct() {
        let errors = [
            AssistantError::SchemaIntrospection("x".into()),
            AssistantError::generation(GenerationFailureKind::Timeout, "x"),
            AssistantError::Execution("x".into()),
            AssistantError::Configuration("x".into()),
            AssistantError::InvalidRequest("x".into()),
        ];
        let mut labels: Vec<_> = errors.iter().map(|e| e.category()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), errors.len());
    }
}

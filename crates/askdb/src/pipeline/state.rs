use serde::Serialize;
use std::fmt;

/// Lifecycle of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeState {
    Idle,
    GeneratingSql,
    ExecutingQuery,
    Narrating,
    Done,
    GenerationFailed,
    ExecutionFailed,
}

impl ExchangeState {
    pub fn can_advance_to(self, next: ExchangeState) -> bool {
        use ExchangeState::*;
        matches!(
            (self, next),
            (Idle, GeneratingSql)
                | (GeneratingSql, ExecutingQuery)
                | (GeneratingSql, GenerationFailed)
                | (ExecutingQuery, Narrating)
                | (ExecutingQuery, Done)
                | (ExecutingQuery, ExecutionFailed)
                | (Narrating, Done)
                | (Narrating, GenerationFailed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExchangeState::Done | ExchangeState::GenerationFailed | ExchangeState::ExecutionFailed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExchangeState::Idle => "idle",
            ExchangeState::GeneratingSql => "generating_sql",
            ExchangeState::ExecutingQuery => "executing_query",
            ExchangeState::Narrating => "narrating",
            ExchangeState::Done => "done",
            ExchangeState::GenerationFailed => "generation_failed",
            ExchangeState::ExecutionFailed => "execution_failed",
        }
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

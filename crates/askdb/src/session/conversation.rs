use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::database::ScalarValue;
use crate::render::render_table;

/// One entry in the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum ConversationTurn {
    UserQuestion(String),
    GeneratedSql(String),
    ExecutionResult {
        columns: Vec<String>,
        rows: Vec<Vec<ScalarValue>>,
    },
    ExecutionError(String),
    Narration(String),
}

impl ConversationTurn {
    pub fn speaker(&self) -> &'static str {
        match self {
            ConversationTurn::UserQuestion(_) => "User",
            ConversationTurn::GeneratedSql(_) => "SQL",
            ConversationTurn::ExecutionResult { .. } => "Result",
            ConversationTurn::ExecutionError(_) => "Error",
            ConversationTurn::Narration(_) => "Assistant",
        }
    }

    /// Single-entry text form with result tables cut to `max_rows`.
    pub fn render(&self, max_rows: Option<usize>) -> String {
        match self {
            ConversationTurn::UserQuestion(text)
            | ConversationTurn::GeneratedSql(text)
            | ConversationTurn::ExecutionError(text)
            | ConversationTurn::Narration(text) => format!("{}: {}", self.speaker(), text),
            ConversationTurn::ExecutionResult { columns, rows } => {
                format!("{}:\n{}", self.speaker(), render_table(columns, rows, max_rows))
            }
        }
    }
}

impl fmt::Display for ConversationTurn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(None))
    }
}

/// Ordered, append-only log of one interactive session.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    turns: Vec<ConversationTurn>,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            turns: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Commit a whole exchange in one step.
    pub(crate) fn extend(&mut self, turns: Vec<ConversationTurn>) {
        self.turns.extend(turns);
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Plain-text transcript for download.
    pub fn export_text(&self) -> String {
        let mut out = format!(
            "Conversation {}\nStarted {}\n",
            self.id,
            self.started_at.to_rfc3339()
        );
        for turn in &self.turns {
            out.push('\n');
            out.push_str(&turn.to_string());
            out.push('\n');
        }
        out
    }

    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}

//! Prompt templates for SQL generation and result narration.

use crate::database::QueryResult;
use crate::render::render_table;
use crate::session::ConversationTurn;

const SQL_TEMPLATE: &str = "\
You are a data analyst at a company. You are interacting with a user who is asking you questions about the company's database.
Based on the table schema below, write a SQL query that would answer the user's question. Take the conversation history into account.

<SCHEMA>{schema}</SCHEMA>

Conversation History:
{history}

Guidelines:
- Use standard SQL syntax only.
- Wrap string literals in single quotes.
- Use explicit JOINs where more than one table is needed.
- Do not include code fences (```) or any text around the query.
- Return exactly one SQL statement and nothing else.

For example:
Question: which 3 artists have the most tracks?
SQL Query: SELECT ArtistId, COUNT(*) as track_count FROM Track GROUP BY ArtistId ORDER BY track_count DESC LIMIT 3;
Question: Name 10 artists
SQL Query: SELECT Name FROM Artist LIMIT 10;

Your turn:

Question: {question}
SQL Query:";

const NARRATION_TEMPLATE: &str = "\
You are a data analyst at a company. You are interacting with a user who is asking you questions about the company's database.
Based on the table schema below, question, sql query, and sql response, write a natural language response.

<SCHEMA>{schema}</SCHEMA>

Conversation History:
{history}

SQL Query: <SQL>{query}</SQL>
User question: {question}
SQL Response:
{response}";

/// Serialize the most recent `window` turns (all when `window` is 0).
pub fn render_history(turns: &[ConversationTurn], window: usize, preview_rows: usize) -> String {
    let start = if window == 0 { 0 } else { turns.len().saturating_sub(window) };
    let recent = &turns[start..];
    if recent.is_empty() {
        return "(none)".to_string();
    }
    recent
        .iter()
        .map(|turn| turn.render(Some(preview_rows)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Single-pass placeholder substitution: inserted values are never rescanned.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let hit = values.iter().find_map(|(key, value)| {
            let close = key.len() + 1;
            let matches = tail.len() > close
                && tail[1..].starts_with(key)
                && tail.as_bytes()[close] == b'}';
            matches.then_some((close + 1, *value))
        });
        match hit {
            Some((consumed, value)) => {
                out.push_str(value);
                rest = &tail[consumed..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn sql_prompt(question: &str, schema: &str, history: &str) -> String {
    fill(
        SQL_TEMPLATE,
        &[("schema", schema), ("history", history), ("question", question)],
    )
}

pub fn narration_prompt(
    question: &str,
    schema: &str,
    sql: &str,
    result: &QueryResult,
    history: &str,
    preview_rows: usize,
) -> String {
    let response = match result {
        QueryResult::Rows { columns, rows } => render_table(columns, rows, Some(preview_rows)),
        QueryResult::ExecutionFailure { message } => format!("Error: {}", message),
    };
    fill(
        NARRATION_TEMPLATE,
        &[
            ("schema", schema),
            ("history", history),
            ("query", sql),
            ("question", question),
            ("response", &response),
        ],
    )
}

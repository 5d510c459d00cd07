//! Interactive chat loop over stdin/stdout.

use std::path::Path;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::database::{DatabaseTarget, QueryResult};
use crate::pipeline::{Assistant, Exchange};
use crate::render::render_table;
use crate::session::AssistantSession;

const HELP: &str = "\
Ask a question in plain English, or use a command:
  :schema              show the tables of the connected database
  :sql <statement>     run SQL directly (not recorded in the conversation)
  :history             show the conversation so far
  :export <path>       save the conversation (.json for JSON, anything else for text)
  :clear               forget the conversation
  :connect <target>    connect to a database (path, :memory:, mysql://..., postgres://...)
  :narrate on|off      toggle natural-language answers
  :help                show this message
  :quit                leave";

pub enum Reply {
    Output(String),
    Quit,
}

pub struct Repl {
    assistant: Assistant,
    session: AssistantSession,
    narrate: bool,
    preview_rows: usize,
}

impl Repl {
    pub fn new(assistant: Assistant, session: AssistantSession, narrate: bool, preview_rows: usize) -> Self {
        Self {
            assistant,
            session,
            narrate,
            preview_rows,
        }
    }

    pub fn session(&self) -> &AssistantSession {
        &self.session
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        let banner = match self.session.connection() {
            Some(conn) => format!("Connected to {}. Type :help for commands.\n", conn.target()),
            None => "No database connected. Use :connect <target>. Type :help for commands.\n".to_string(),
        };
        stdout.write_all(banner.as_bytes()).await?;

        loop {
            stdout.write_all(b"askdb> ").await?;
            stdout.flush().await?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            match self.handle(&line).await {
                Reply::Output(text) if text.is_empty() => {}
                Reply::Output(text) => {
                    stdout.write_all(text.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                }
                Reply::Quit => break,
            }
        }
        Ok(())
    }

    /// Handle one input line. Failures are reported in the reply text.
    pub async fn handle(&mut self, line: &str) -> Reply {
        let line = line.trim();
        if line.is_empty() {
            return Reply::Output(String::new());
        }
        if !line.starts_with(':') {
            return Reply::Output(self.ask(line).await);
        }

        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };
        debug!("REPL command {}", command);

        let output = match command {
            ":quit" | ":exit" | ":q" => return Reply::Quit,
            ":help" => HELP.to_string(),
            ":schema" => match self.assistant.describe(&self.session).await {
                Ok(schema) if schema.is_empty() => "(no tables)".to_string(),
                Ok(schema) => schema.to_string(),
                Err(e) => format!("error: {}", e),
            },
            ":sql" if arg.is_empty() => "usage: :sql <statement>".to_string(),
            ":sql" => match self.assistant.run_sql(&self.session, arg).await {
                Ok(result) => self.format_result(&result),
                Err(e) => format!("error: {}", e),
            },
            ":history" => {
                let history = self.session.conversation().history();
                if history.is_empty() {
                    "(empty)".to_string()
                } else {
                    history
                        .iter()
                        .map(|turn| turn.render(Some(self.preview_rows)))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            ":export" if arg.is_empty() => "usage: :export <path>".to_string(),
            ":export" => match self.export(Path::new(arg)) {
                Ok(()) => format!("Saved conversation to {}", arg),
                Err(e) => format!("error: {:#}", e),
            },
            ":clear" => {
                self.session.conversation_mut().clear();
                "Conversation cleared.".to_string()
            }
            ":connect" if arg.is_empty() => "usage: :connect <target>".to_string(),
            ":connect" => match DatabaseTarget::parse(arg) {
                Ok(target) => match self.session.connect(&target).await {
                    Ok(()) => format!("Connected to {}", target),
                    Err(e) => format!("error: {}", e),
                },
                Err(e) => format!("error: {}", e),
            },
            ":narrate" => match arg {
                "on" => {
                    self.narrate = true;
                    "Narration on.".to_string()
                }
                "off" => {
                    self.narrate = false;
                    "Narration off.".to_string()
                }
                _ => format!("Narration is {}. Use :narrate on|off", if self.narrate { "on" } else { "off" }),
            },
            other => format!("unknown command {}; type :help", other),
        };
        Reply::Output(output)
    }

    async fn ask(&mut self, question: &str) -> String {
        match self.assistant.ask(&mut self.session, question, self.narrate).await {
            Ok(exchange) => format_exchange(&exchange, self.preview_rows),
            Err(e) => format!("error: {}", e),
        }
    }

    fn format_result(&self, result: &QueryResult) -> String {
        match result {
            QueryResult::Rows { columns, .. } if columns.is_empty() => "OK".to_string(),
            QueryResult::Rows { columns, rows } => render_table(columns, rows, Some(self.preview_rows)),
            QueryResult::ExecutionFailure { message } => format!("error: {}", message),
        }
    }

    fn export(&self, path: &Path) -> anyhow::Result<()> {
        let conversation = self.session.conversation();
        let body = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => conversation.export_json()?,
            _ => conversation.export_text(),
        };
        std::fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Text shown for one finished exchange.
pub fn format_exchange(exchange: &Exchange, preview_rows: usize) -> String {
    let mut out = format!("SQL: {}\n", exchange.sql);
    match &exchange.result {
        QueryResult::Rows { columns, .. } if columns.is_empty() => out.push_str("OK"),
        QueryResult::Rows { columns, rows } => out.push_str(&render_table(columns, rows, Some(preview_rows))),
        QueryResult::ExecutionFailure { message } => out.push_str(&format!("error: {}", message)),
    }
    if let Some(narration) = &exchange.narration {
        out.push_str("\n\n");
        out.push_str(narration);
    }
    out
}

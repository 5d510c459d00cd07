//! Lexical checks on statement text: read/write classification and
//! multi-statement detection.

/// How the executor treats a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Row-returning statement (`SELECT` prefix).
    Read,
    /// Everything else: DML, DDL, pragmas.
    Write,
}

impl StatementKind {
    /// Case-insensitive `SELECT` prefix check on the trimmed text.
    pub fn classify(sql: &str) -> Self {
        let trimmed = sql.trim_start().as_bytes();
        if trimmed.len() >= 6 && trimmed[..6].eq_ignore_ascii_case(b"select") {
            StatementKind::Read
        } else {
            StatementKind::Write
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Read => "read",
            StatementKind::Write => "write",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LexState {
    Normal,
    Quoted(char),
    Bracket,
    LineComment,
    BlockComment,
}

/// True when another statement follows a top-level `;`.
///
/// String literals, quoted identifiers and comments are skipped, so
/// `SELECT ';'` is a single statement, and a trailing `;` (optionally followed
/// by whitespace or comments) does not count as a second statement.
pub fn is_multi_statement(sql: &str) -> bool {
    let mut state = LexState::Normal;
    let mut terminated = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            LexState::Normal => match c {
                ';' => terminated = true,
                c if c.is_whitespace() => {}
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = LexState::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = LexState::BlockComment;
                }
                _ => {
                    if terminated {
                        return true;
                    }
                    match c {
                        '\'' | '"' | '`' => state = LexState::Quoted(c),
                        '[' => state = LexState::Bracket,
                        _ => {}
                    }
                }
            },
            LexState::Quoted(quote) => {
                if c == quote {
                    // A doubled quote is an escaped quote inside the literal.
                    if chars.peek() == Some(&quote) {
                        chars.next();
                    } else {
                        state = LexState::Normal;
                    }
                }
            }
            LexState::Bracket => {
                if c == ']' {
                    state = LexState::Normal;
                }
            }
            LexState::LineComment => {
                if c == '\n' {
                    state = LexState::Normal;
                }
            }
            LexState::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = LexState::Normal;
                }
            }
        }
    }

    false
}

/// True when the text holds nothing but whitespace, semicolons and comments.
pub fn is_blank_statement(sql: &str) -> bool {
    let mut state = LexState::Normal;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            LexState::Normal => match c {
                ';' => {}
                c if c.is_whitespace() => {}
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = LexState::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = LexState::BlockComment;
                }
                _ => return false,
            },
            LexState::LineComment => {
                if c == '\n' {
                    state = LexState::Normal;
                }
            }
            LexState::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = LexState::Normal;
                }
            }
            LexState::Quoted(_) | LexState::Bracket => return false,
        }
    }

    true
}

/// Statements that run outside an executor-managed transaction: transaction
/// control itself, and commands SQLite refuses inside one.
pub fn manages_own_transaction(sql: &str) -> bool {
    let keyword: String = sql
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    matches!(
        keyword.to_ascii_uppercase().as_str(),
        "BEGIN" | "START" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" | "VACUUM" | "ATTACH" | "DETACH"
            | "PRAGMA"
    )
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};

use askdb::{
    Assistant, AssistantError, AssistantSession, CompletionRequest, ConversationTurn, DatabaseConnection,
    ExchangeState, GenerationFailureKind, LanguageModel, ModelSettings, QueryResult, ScalarValue,
};

/// Answers SQL prompts with the queued statements in order and narration
/// prompts with a fixed sentence. Every prompt is recorded.
struct StubModel {
    sql: Vec<String>,
    sql_calls: AtomicUsize,
    narration_calls: AtomicUsize,
    fail_generation: bool,
    prompts: Mutex<Vec<String>>,
}

impl StubModel {
    fn new(sql: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            sql: sql.iter().map(|s| s.to_string()).collect(),
            sql_calls: AtomicUsize::new(0),
            narration_calls: AtomicUsize::new(0),
            fail_generation: false,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            sql: Vec::new(),
            sql_calls: AtomicUsize::new(0),
            narration_calls: AtomicUsize::new(0),
            fail_generation: true,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.sql_calls.load(Ordering::SeqCst) + self.narration_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete(&self, request: CompletionRequest) -> askdb::Result<String> {
        let prompt = request.messages[0].content.clone();
        let narration = prompt.contains("SQL Response:");
        self.prompts.lock().unwrap().push(prompt);

        if narration {
            self.narration_calls.fetch_add(1, Ordering::SeqCst);
            return Ok("Here is what I found.".to_string());
        }
        let i = self.sql_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_generation {
            return Err(AssistantError::generation(GenerationFailureKind::Timeout, "deadline elapsed"));
        }
        Ok(self.sql.get(i).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "stub"
    }
}

fn assistant(model: &Arc<StubModel>) -> Assistant {
    Assistant::new(model.clone(), ModelSettings::default(), Duration::from_secs(5))
}

fn chinook_session() -> AssistantSession {
    let db = DatabaseConnection::open_in_memory().unwrap();
    db.with_connection(|conn| {
        conn.execute_batch(
            "CREATE TABLE Artist (ArtistId INTEGER PRIMARY KEY, Name TEXT);
             CREATE TABLE Track (TrackId INTEGER PRIMARY KEY, Name TEXT, ArtistId INTEGER REFERENCES Artist(ArtistId));
             INSERT INTO Artist (Name) VALUES ('AC/DC'), ('Accept'), ('Aerosmith');",
        )
    })
    .unwrap()
    .unwrap();
    AssistantSession::with_connection(db)
}

#[tokio::test]
async fn test_artist_question_end_to_end() {
    let model = StubModel::new(&["SELECT Name FROM Artist LIMIT 10;"]);
    let assistant = assistant(&model);
    let mut session = chinook_session();

    let exchange = assert_ok!(assistant.ask(&mut session, "Name 10 artists", true).await);

    assert_eq!(exchange.state, ExchangeState::Done);
    assert_eq!(exchange.sql, "SELECT Name FROM Artist LIMIT 10;");
    assert_eq!(
        exchange.result,
        QueryResult::Rows {
            columns: vec!["Name".into()],
            rows: vec![
                vec![ScalarValue::Text("AC/DC".into())],
                vec![ScalarValue::Text("Accept".into())],
                vec![ScalarValue::Text("Aerosmith".into())],
            ],
        }
    );
    assert_eq!(exchange.narration.as_deref(), Some("Here is what I found."));

    let history = session.conversation().history();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0], ConversationTurn::UserQuestion("Name 10 artists".into()));
    assert_eq!(history[1], ConversationTurn::GeneratedSql("SELECT Name FROM Artist LIMIT 10;".into()));
    assert!(matches!(&history[2], ConversationTurn::ExecutionResult { rows, .. } if rows.len() == 3));
    assert_eq!(history[3], ConversationTurn::Narration("Here is what I found.".into()));

    let prompts = model.prompts.lock().unwrap();
    assert!(prompts[0].contains("- Artist(ArtistId, Name)\n- Track(TrackId, Name, ArtistId)"));
    assert!(prompts[1].contains("| Aerosmith |"));
}

#[tokio::test]
async fn test_no_connection_short_circuits() {
    let model = StubModel::new(&["SELECT 1"]);
    let assistant = assistant(&model);
    let mut session = AssistantSession::new();

    let err = assert_err!(assistant.ask(&mut session, "Name 10 artists", true).await);
    assert!(matches!(err, AssistantError::Configuration(_)));
    assert_eq!(model.calls(), 0);
    assert!(session.conversation().is_empty());
}

#[tokio::test]
async fn test_generation_failure_commits_nothing() {
    let model = StubModel::failing();
    let assistant = assistant(&model);
    let mut session = chinook_session();

    let err = assert_err!(assistant.ask(&mut session, "Name 10 artists", true).await);
    assert!(matches!(err, AssistantError::Generation { kind: GenerationFailureKind::Timeout, .. }));
    assert!(session.conversation().is_empty());
}

#[tokio::test]
async fn test_execution_failure_is_recorded_and_not_narrated() {
    let model = StubModel::new(&["SELECT Nme FROM Artist"]);
    let assistant = assistant(&model);
    let mut session = chinook_session();

    let exchange = assert_ok!(assistant.ask(&mut session, "Name the artists", true).await);
    assert_eq!(exchange.state, ExchangeState::ExecutionFailed);
    assert!(exchange.narration.is_none());
    assert_eq!(model.narration_calls.load(Ordering::SeqCst), 0);

    let history = session.conversation().history();
    assert_eq!(history.len(), 3);
    match &history[2] {
        ConversationTurn::ExecutionError(message) => assert!(message.contains("no such column")),
        other => panic!("expected an execution error turn, got {:?}", other),
    }
}

#[tokio::test]
async fn test_narrate_flag_off_skips_second_call() {
    let model = StubModel::new(&["SELECT count(*) AS n FROM Artist"]);
    let assistant = assistant(&model);
    let mut session = chinook_session();

    let exchange = assert_ok!(assistant.ask(&mut session, "How many artists?", false).await);
    assert_eq!(exchange.state, ExchangeState::Done);
    assert!(exchange.narration.is_none());
    assert_eq!(model.calls(), 1);
    assert_eq!(session.conversation().len(), 3);
}

#[tokio::test]
async fn test_write_then_schema_reflects_change() {
    let model = StubModel::new(&["CREATE TABLE t(x INT);", "SELECT * FROM t"]);
    let assistant = assistant(&model);
    let mut session = chinook_session();

    let created = assert_ok!(assistant.ask(&mut session, "make a table t", false).await);
    assert_eq!(created.result, QueryResult::empty());

    let schema = assert_ok!(assistant.describe(&session).await);
    assert_eq!(schema.table("t").unwrap().columns, vec!["x".to_string()]);

    let read = assert_ok!(assistant.ask(&mut session, "what is in t?", false).await);
    assert_eq!(
        read.result,
        QueryResult::Rows {
            columns: vec!["x".into()],
            rows: vec![],
        }
    );

    // The second prompt sees the new table and the earlier exchange.
    let prompts = model.prompts.lock().unwrap();
    assert!(prompts[1].contains("- t(x)"));
    assert!(prompts[1].contains("User: make a table t"));
    assert!(prompts[1].contains("SQL: CREATE TABLE t(x INT);"));
}

#[tokio::test]
async fn test_history_window_bounds_prompt() {
    let model = StubModel::new(&["SELECT 1", "SELECT 2", "SELECT 3"]);
    let settings = ModelSettings {
        history_window: 2,
        ..ModelSettings::default()
    };
    let assistant = Assistant::new(model.clone(), settings, Duration::from_secs(5));
    let mut session = chinook_session();

    assert_ok!(assistant.ask(&mut session, "first question", false).await);
    assert_ok!(assistant.ask(&mut session, "second question", false).await);
    assert_ok!(assistant.ask(&mut session, "third question", false).await);

    let prompts = model.prompts.lock().unwrap();
    let last = &prompts[2];
    assert!(!last.contains("first question"));
    assert!(!last.contains("User: second question"));
    assert!(last.contains("SQL: SELECT 2"));
}

#[tokio::test]
async fn test_multi_statement_output_is_refused() {
    let model = StubModel::new(&["DELETE FROM Artist; DROP TABLE Artist;"]);
    let assistant = assistant(&model);
    let mut session = chinook_session();

    let exchange = assert_ok!(assistant.ask(&mut session, "wipe everything", true).await);
    assert_eq!(exchange.state, ExchangeState::ExecutionFailed);

    let count = assert_ok!(assistant.run_sql(&session, "SELECT count(*) FROM Artist").await);
    assert_eq!(count.row_count(), 1);
    match count {
        QueryResult::Rows { rows, .. } => assert_eq!(rows[0][0], ScalarValue::Integer(3)),
        other => panic!("expected rows, got {:?}", other),
    }
}

#[tokio::test]
async fn test_file_backed_database_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let target = askdb::DatabaseTarget::Sqlite {
        path: dir.path().join("playground.db"),
    };
    let model = StubModel::new(&[]);
    let assistant = assistant(&model);

    let mut session = AssistantSession::new();
    assert_ok!(session.connect(&target).await);
    assert_ok!(assistant.run_sql(&session, "CREATE TABLE notes(body TEXT)").await);
    assert_ok!(assistant.run_sql(&session, "INSERT INTO notes VALUES ('kept')").await);

    session.disconnect();
    assert_ok!(session.connect(&target).await);
    let result = assert_ok!(assistant.run_sql(&session, "SELECT body FROM notes").await);
    assert_eq!(result.row_count(), 1);
}

#[tokio::test]
async fn test_unreadable_schema_fails_before_the_model_is_asked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-a-database.db");
    std::fs::write(&path, vec![0x5a_u8; 2048]).unwrap();

    let model = StubModel::new(&["SELECT 1"]);
    let assistant = assistant(&model);
    let mut session = AssistantSession::new();
    assert_ok!(session.connect(&askdb::DatabaseTarget::Sqlite { path }).await);

    let err = assert_err!(assistant.ask(&mut session, "Name 10 artists", true).await);
    assert!(matches!(err, AssistantError::SchemaIntrospection(_)));
    assert_eq!(model.calls(), 0);
    assert!(session.conversation().is_empty());

    let err = assert_err!(assistant.describe(&session).await);
    assert!(matches!(err, AssistantError::SchemaIntrospection(_)));
}

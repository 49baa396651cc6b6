//! Core orchestrator for Sage.
//!
//! Routes each question to one of three branches: a listing of the stored
//! schema, a free-text answer from the LLM, or the SQL pipeline (rank
//! tables, assemble the prompt, generate, sanitize, guard, execute).

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::db::{DatabaseClient, QueryResult};
use crate::error::{Result, SageError};
use crate::llm::LlmClient;
use crate::prompt::{assemble, general_messages, intent_messages};
use crate::relevance::RelevanceScorer;
use crate::safety::ensure_read_only;
use crate::sanitize::{sanitize, SanitizedQuery};
use crate::schema::{format_schema_listing, refresh_all, RefreshSummary, SchemaStore};

/// Phrases that mark a question as being about the schema itself.
pub const SCHEMA_KEYWORDS: &[&str] = &[
    "schema",
    "tables",
    "columns",
    "structure",
    "what tables",
    "show tables",
    "list tables",
];

/// Keywords that start a new line when SQL is displayed.
const BREAK_KEYWORDS: &[&str] = &["SELECT", "FROM", "JOIN", "WHERE"];

/// Words kept on the same line as a following JOIN.
const JOIN_MODIFIERS: &[&str] = &["LEFT", "RIGHT", "INNER", "OUTER", "FULL", "CROSS", "NATURAL"];

/// What a question is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// The structure of the database.
    SchemaInfo,
    /// Something answerable without running a query.
    General,
    /// Data that requires a query.
    Data,
}

impl Intent {
    /// Returns the intent as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaInfo => "schema",
            Self::General => "general",
            Self::Data => "data",
        }
    }
}

/// The response to one question.
#[derive(Debug, Clone)]
pub enum Answer {
    /// Rendered listing of every stored table.
    SchemaInfo(String),
    /// Free-text answer from the LLM.
    General(String),
    /// The executed query and its rows.
    Data {
        sql: SanitizedQuery,
        result: QueryResult,
    },
}

impl Answer {
    /// Renders the answer as a human-readable block.
    pub fn render(&self) -> String {
        match self {
            Self::SchemaInfo(text) | Self::General(text) => text.clone(),
            Self::Data { sql, result } => format!(
                "SQL Query:\n{}\n\nResult:\n{}",
                format_sql(sql.as_str()),
                result.format_rows()
            ),
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Returns true when the question asks about the schema itself.
pub fn is_schema_question(question: &str) -> bool {
    let lowered = question.to_lowercase();
    SCHEMA_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Interprets the intent classifier's reply. Only a literal "true" means data.
fn parse_intent_reply(reply: &str) -> Intent {
    let normalized = reply
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.')
        .to_lowercase();
    if normalized == "true" {
        Intent::Data
    } else {
        Intent::General
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn break_keyword_at(rest: &str) -> Option<&'static str> {
    BREAK_KEYWORDS.iter().copied().find(|kw| {
        rest.get(..kw.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(kw))
            && !rest[kw.len()..].chars().next().is_some_and(is_word_char)
    })
}

/// Moves `out` to a new line, carrying trailing JOIN modifiers along.
fn break_line(out: &mut String, carry_join_modifiers: bool) {
    out.truncate(out.trim_end().len());

    let mut split = out.len();
    if carry_join_modifiers {
        loop {
            let head = out[..split].trim_end();
            let word_start = head
                .char_indices()
                .rev()
                .find(|(_, c)| !is_word_char(*c))
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(0);
            let word = &head[word_start..];
            if word.is_empty() || !JOIN_MODIFIERS.iter().any(|m| m.eq_ignore_ascii_case(word)) {
                break;
            }
            split = word_start;
        }
    }

    let carried = out.split_off(split);
    out.truncate(out.trim_end().len());
    if !out.is_empty() {
        out.push('\n');
    }
    if !carried.is_empty() {
        out.push_str(&carried);
        out.push(' ');
    }
}

/// Pretty-prints SQL for display by starting each top-level SELECT, FROM,
/// JOIN and WHERE on its own line.
///
/// Keywords inside parentheses or quotes are left in place, and only
/// whitespace changes.
pub fn format_sql(sql: &str) -> String {
    let sql = sql.trim();
    let mut out = String::with_capacity(sql.len() + 16);
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;

    for (idx, c) in sql.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
        } else {
            match c {
                '\'' | '"' | '`' => quote = Some(c),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ => {}
            }

            let word_start = is_word_char(c) && !prev.is_some_and(is_word_char);
            if depth == 0 && word_start && idx > 0 {
                if let Some(keyword) = break_keyword_at(&sql[idx..]) {
                    break_line(&mut out, keyword == "JOIN");
                }
            }
        }

        out.push(c);
        prev = Some(c);
    }

    out
}

/// The main orchestrator that coordinates all components.
pub struct Orchestrator {
    /// Source database for introspection and execution.
    db: Box<dyn DatabaseClient>,
    /// LLM client for intent, general answers and SQL generation.
    llm: Arc<dyn LlmClient>,
    /// Persistent schema metadata.
    store: SchemaStore,
    /// Table relevance scorer and its caches.
    scorer: RelevanceScorer,
    /// Tables included in each SQL prompt.
    max_tables: usize,
}

impl Orchestrator {
    /// Creates a new orchestrator with the given components.
    pub fn new(
        db: Box<dyn DatabaseClient>,
        llm: Arc<dyn LlmClient>,
        store: SchemaStore,
        scorer: RelevanceScorer,
    ) -> Self {
        let max_tables = scorer.config().max_tables;
        Self {
            db,
            llm,
            store,
            scorer,
            max_tables,
        }
    }

    /// Returns the schema store.
    pub fn store(&self) -> &SchemaStore {
        &self.store
    }

    /// Returns the relevance scorer.
    pub fn scorer(&self) -> &RelevanceScorer {
        &self.scorer
    }

    /// Re-reads the source schema into the store.
    pub async fn refresh_schema(&self) -> Result<RefreshSummary> {
        refresh_all(self.db.as_ref(), &self.store, self.scorer.keyword_index()).await
    }

    /// Decides which branch handles the question.
    pub async fn classify_intent(&self, question: &str) -> Result<Intent> {
        if is_schema_question(question) {
            return Ok(Intent::SchemaInfo);
        }

        let reply = self.llm.complete(&intent_messages(question)).await?;
        debug!(reply = %reply, "Intent classifier reply");
        Ok(parse_intent_reply(&reply))
    }

    /// Answers a question.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let start = Instant::now();
        let intent = self.classify_intent(question).await?;
        debug!(intent = intent.as_str(), "Classified question");

        let answer = match intent {
            Intent::SchemaInfo => {
                Answer::SchemaInfo(format_schema_listing(&self.store.list_all().await?))
            }
            Intent::General => {
                let reply = self.llm.complete(&general_messages(question)).await?;
                Answer::General(reply.trim().to_string())
            }
            Intent::Data => {
                let sql = self.generate_sql(question).await?;
                let result = self.execute(&sql).await?;
                Answer::Data { sql, result }
            }
        };

        info!(
            intent = intent.as_str(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Answered question"
        );
        Ok(answer)
    }

    /// Answers a question unless `token` is cancelled first.
    ///
    /// Dropping the in-flight pipeline leaves the caches consistent: only
    /// completed classifier calls are ever stored.
    pub async fn answer_with_cancel(
        &self,
        question: &str,
        token: CancellationToken,
    ) -> Result<Answer> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!("Question cancelled");
                Err(SageError::Cancelled)
            }
            result = self.answer(question) => result,
        }
    }

    /// Produces a sanitized, read-only SQL statement for the question.
    pub async fn generate_sql(&self, question: &str) -> Result<SanitizedQuery> {
        let snapshot = self.store.list_all().await?;
        let ranked = self.scorer.rank(question, &snapshot, self.max_tables).await;
        debug!(tables = ?ranked, "Ranked tables for prompt");

        let messages = assemble(question, &ranked, &snapshot);
        let reply = self.llm.complete(&messages).await?;
        debug!(reply = %reply, "SQL generation reply");

        let sql = sanitize(&reply).inspect_err(|e| warn!("Unusable model reply: {e}"))?;
        ensure_read_only(sql.as_str())?;
        Ok(sql)
    }

    async fn execute(&self, sql: &SanitizedQuery) -> Result<QueryResult> {
        let result = self.db.execute_query(sql.as_str()).await.map_err(|e| {
            warn!(sql = %sql, "Query execution failed: {e}");
            match e {
                SageError::ExecutionFailed(_) => e,
                other => SageError::execution(other.to_string()),
            }
        })?;

        debug!(
            rows = result.row_count(),
            truncated = result.was_truncated,
            elapsed_ms = result.execution_time.as_millis() as u64,
            "Query executed"
        );
        Ok(result)
    }

    /// Closes the source database connection and the store.
    pub async fn close(&self) -> Result<()> {
        self.db.close().await?;
        self.store.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MockDatabaseClient, Value};
    use crate::llm::{Message, MockLlmClient};
    use crate::relevance::{MockClassifier, RelevanceConfig, SemanticClassifier};
    use crate::schema::{ColumnDescriptor, TableDescription};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::TempDir;

    fn devices_db() -> MockDatabaseClient {
        MockDatabaseClient::new()
            .with_table(
                "devices",
                TableDescription {
                    columns: vec![
                        ColumnDescriptor::new("device_id", "INTEGER")
                            .nullable(false)
                            .primary_key(),
                        ColumnDescriptor::new("location", "TEXT"),
                    ],
                    foreign_keys: vec![],
                },
            )
            .with_result(
                "from devices",
                QueryResult::with_data(
                    vec!["device_id".into(), "location".into()],
                    vec![vec![Value::Int(7), Value::from("us-east")]],
                ),
            )
    }

    async fn orchestrator(
        db: MockDatabaseClient,
        llm: Arc<MockLlmClient>,
        classifier: Option<Arc<dyn SemanticClassifier>>,
    ) -> (Orchestrator, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SchemaStore::open(&dir.path().join("schema.db")).await.unwrap();
        let scorer = RelevanceScorer::new(RelevanceConfig::default(), classifier);
        let orch = Orchestrator::new(Box::new(db), llm, store, scorer);
        orch.refresh_schema().await.unwrap();
        (orch, dir)
    }

    #[test]
    fn test_schema_question_detection() {
        assert!(is_schema_question("What tables do we have?"));
        assert!(is_schema_question("describe the SCHEMA"));
        assert!(!is_schema_question("How many devices are in us-east?"));
    }

    #[test]
    fn test_intent_reply_parsing() {
        assert_eq!(parse_intent_reply("true"), Intent::Data);
        assert_eq!(parse_intent_reply(" True.\n"), Intent::Data);
        assert_eq!(parse_intent_reply("false"), Intent::General);
        assert_eq!(parse_intent_reply("yes, it is true"), Intent::General);
    }

    #[test]
    fn test_format_sql() {
        assert_eq!(
            format_sql("SELECT * FROM load_balancer WHERE location COLLATE NOCASE = 'us-east';"),
            "SELECT *\nFROM load_balancer\nWHERE location COLLATE NOCASE = 'us-east';"
        );
        assert_eq!(
            format_sql("SELECT a.x FROM a LEFT OUTER JOIN b ON a.id = b.id;"),
            "SELECT a.x\nFROM a\nLEFT OUTER JOIN b ON a.id = b.id;"
        );
    }

    #[test]
    fn test_format_sql_leaves_nested_and_quoted_keywords() {
        assert_eq!(
            format_sql("SELECT n FROM (SELECT id AS n FROM t) s WHERE note = 'from where';"),
            "SELECT n\nFROM (SELECT id AS n FROM t) s\nWHERE note = 'from where';"
        );
        assert_eq!(
            format_sql("select selected_from from t;"),
            "select selected_from\nfrom t;"
        );
    }

    #[tokio::test]
    async fn test_schema_branch_skips_llm() {
        let llm = Arc::new(MockLlmClient::new());
        let (orch, _dir) = orchestrator(devices_db(), llm.clone(), None).await;

        let answer = orch.answer("show tables").await.unwrap();
        let Answer::SchemaInfo(text) = &answer else {
            panic!("expected schema listing, got {answer:?}");
        };
        assert!(text.starts_with("Table: devices"));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_general_branch_returns_llm_text() {
        let llm = Arc::new(
            MockLlmClient::new()
                .with_intent(false)
                .with_general_answer("  A primary key identifies a row.  "),
        );
        let (orch, _dir) = orchestrator(devices_db(), llm.clone(), None).await;

        let answer = orch.answer("What is a primary key?").await.unwrap();
        assert_eq!(answer.render(), "A primary key identifies a row.");
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_data_branch_executes_sanitized_sql() {
        let llm = Arc::new(MockLlmClient::new().with_intent(true).with_response(
            "us-east",
            "Sure! ```sql\nSELECT * FROM devices WHERE location COLLATE NOCASE = 'us-east'\n```",
        ));
        let (orch, _dir) = orchestrator(devices_db(), llm.clone(), None).await;

        let answer = orch.answer("devices in us-east").await.unwrap();
        let Answer::Data { sql, result } = &answer else {
            panic!("expected data answer, got {answer:?}");
        };
        assert_eq!(
            sql.as_str(),
            "SELECT * FROM devices WHERE location COLLATE NOCASE = 'us-east';"
        );
        assert_eq!(result.row_count(), 1);
        assert_eq!(
            answer.render(),
            "SQL Query:\nSELECT *\nFROM devices\nWHERE location COLLATE NOCASE = 'us-east';\n\n\
             Result:\n{device_id: 7, location: us-east}"
        );

        let sql_prompt = &llm.requests()[1][0];
        assert!(sql_prompt.content.contains("Table: devices"));
        assert!(sql_prompt.content.contains("COLLATE NOCASE"));
    }

    #[tokio::test]
    async fn test_sanitizer_rejection_is_surfaced() {
        let llm = Arc::new(
            MockLlmClient::new()
                .with_intent(true)
                .with_response("devices", "I cannot help with that."),
        );
        let db = devices_db();
        let (orch, _dir) = orchestrator(db, llm, None).await;

        let err = orch.answer("count devices").await.unwrap_err();
        assert!(matches!(err, SageError::NoSelectFound));
        assert!(err.is_user_correctable());
    }

    #[tokio::test]
    async fn test_read_only_violation_never_executes() {
        let llm = Arc::new(
            MockLlmClient::new()
                .with_intent(true)
                .with_response("backup", "SELECT * INTO devices_backup FROM devices;"),
        );
        let (orch, _dir) = orchestrator(devices_db(), llm, None).await;

        let err = orch.answer("backup devices").await.unwrap_err();
        assert!(matches!(err, SageError::ReadOnlyViolation(_)));
    }

    #[tokio::test]
    async fn test_execution_failure_is_wrapped() {
        let llm = Arc::new(MockLlmClient::new().with_intent(true));
        let db = devices_db().failing_queries("no such column: colour");
        let (orch, _dir) = orchestrator(db, llm, None).await;

        let err = orch.answer("list devices by colour").await.unwrap_err();
        let SageError::ExecutionFailed(message) = &err else {
            panic!("expected execution failure, got {err:?}");
        };
        assert!(message.contains("no such column"));
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let llm = Arc::new(MockLlmClient::new().failing("rate limited"));
        let (orch, _dir) = orchestrator(devices_db(), llm, None).await;

        let err = orch.answer("how many devices").await.unwrap_err();
        assert!(matches!(err, SageError::Llm(_)));
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let llm = Arc::new(MockLlmClient::new());
        let (orch, _dir) = orchestrator(devices_db(), llm.clone(), None).await;

        let token = CancellationToken::new();
        token.cancel();
        let err = orch.answer_with_cancel("how many devices", token).await.unwrap_err();
        assert!(matches!(err, SageError::Cancelled));
        assert_eq!(llm.call_count(), 0);
    }

    /// Classifier that never finishes within a test.
    struct StalledClassifier;

    #[async_trait]
    impl SemanticClassifier for StalledClassifier {
        async fn classify(&self, _premise: &str, labels: &[String]) -> Result<Vec<(String, f64)>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(labels.iter().map(|l| (l.clone(), 0.9)).collect())
        }
    }

    #[tokio::test]
    async fn test_cancel_mid_ranking_caches_nothing() {
        let llm = Arc::new(MockLlmClient::new().with_intent(true));
        let (orch, _dir) =
            orchestrator(devices_db(), llm, Some(Arc::new(StalledClassifier))).await;

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = orch
            .answer_with_cancel("what is stored about hardware", token)
            .await
            .unwrap_err();
        assert!(matches!(err, SageError::Cancelled));
        assert!(orch.scorer().oracle_cache().is_empty());
    }

    #[tokio::test]
    async fn test_semantic_ranking_feeds_prompt() {
        let db = devices_db().with_table(
            "audit_log",
            TableDescription {
                columns: vec![ColumnDescriptor::new("entry_id", "INTEGER")],
                foreign_keys: vec![],
            },
        );
        let classifier = MockClassifier::new().with_score("devices", 0.8);
        let llm = Arc::new(MockLlmClient::new().with_intent(true));
        let (orch, _dir) = orchestrator(db, llm.clone(), Some(Arc::new(classifier))).await;

        orch.answer("what hardware is deployed").await.unwrap();

        let prompt = &llm.requests()[1][0];
        assert!(prompt.content.contains("Table: devices"));
        assert!(!prompt.content.contains("Table: audit_log"));
        assert_eq!(llm.requests()[1][1], Message::user("what hardware is deployed"));
    }
}

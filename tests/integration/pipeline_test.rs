//! End-to-end pipeline tests.
//!
//! Each test introspects a temporary SQLite database into a fresh schema
//! store and answers questions with mock LLM and classifier oracles.

use std::sync::Arc;

use db_sage::app::{Answer, Orchestrator};
use db_sage::db::{self, Value};
use db_sage::error::SageError;
use db_sage::llm::{MockLlmClient, Role};
use db_sage::relevance::{MockClassifier, RelevanceConfig, RelevanceScorer, SemanticClassifier};
use db_sage::sanitize::sanitize;
use db_sage::schema::SchemaStore;
use pretty_assertions::assert_eq;
use tempfile::{tempdir, TempDir};

use super::create_inventory_db;

const EAST_QUERY: &str = "SELECT * FROM load_balancer WHERE location COLLATE NOCASE = 'us-east';";

fn inventory_classifier() -> Arc<dyn SemanticClassifier> {
    Arc::new(
        MockClassifier::new()
            .with_score("load_balancer", 0.86)
            .with_score("vip", 0.12)
            .with_default_score(0.02),
    )
}

async fn build(
    llm: Arc<MockLlmClient>,
    classifier: Option<Arc<dyn SemanticClassifier>>,
) -> (Orchestrator, TempDir) {
    let dir = tempdir().unwrap();
    let url = create_inventory_db(&dir).await;
    let source = db::connect(&url).await.unwrap();
    let store = SchemaStore::open(&dir.path().join("schema.db")).await.unwrap();
    let scorer = RelevanceScorer::new(RelevanceConfig::default(), classifier);

    let orchestrator = Orchestrator::new(source, llm, store, scorer);
    let summary = orchestrator.refresh_schema().await.unwrap();
    assert_eq!(summary.refreshed.len(), 3);
    (orchestrator, dir)
}

#[tokio::test]
async fn test_load_balancers_in_us_east() {
    let llm = Arc::new(MockLlmClient::new().with_response("us-east", EAST_QUERY));
    let (orchestrator, _dir) = build(llm.clone(), Some(inventory_classifier())).await;
    let question = "Show me all load balancers in us-east";

    let snapshot = orchestrator.store().list_all().await.unwrap();
    let ranked = orchestrator.scorer().rank(question, &snapshot, 5).await;
    assert_eq!(ranked.first().map(String::as_str), Some("load_balancer"));
    assert!(!ranked.contains(&"vip".to_string()));

    let answer = orchestrator.answer(question).await.unwrap();
    let Answer::Data { sql, result } = &answer else {
        panic!("expected a data answer, got {answer:?}");
    };
    assert_eq!(sql.as_str(), EAST_QUERY);
    assert_eq!(sanitize(EAST_QUERY).unwrap().as_str(), EAST_QUERY);

    // COLLATE NOCASE matches both spellings of the region
    assert_eq!(result.row_count(), 2);
    let names: Vec<&Value> = result.rows.iter().map(|row| &row[1]).collect();
    assert_eq!(
        names,
        vec![&Value::from("lb-east-1"), &Value::from("lb-east-2")]
    );

    let requests = llm.requests();
    let system = &requests[1][0];
    assert_eq!(system.role, Role::System);
    assert!(system.content.contains("Table: load_balancer"));
    assert!(system.content.contains("COLLATE NOCASE"));
    assert!(system.content.contains("- vip_id -> vip.vip_id"));
    assert!(!system.content.contains("Table: maintenance_window"));
}

#[tokio::test]
async fn test_rendered_answer() {
    let llm = Arc::new(MockLlmClient::new().with_response("us-west", "```sql\nSELECT device_name FROM load_balancer WHERE location = 'us-west'\n```"));
    let (orchestrator, _dir) = build(llm, Some(inventory_classifier())).await;

    let answer = orchestrator
        .answer("List the load_balancer devices in us-west")
        .await
        .unwrap();

    assert_eq!(
        answer.render(),
        "SQL Query:\nSELECT device_name\nFROM load_balancer\nWHERE location = 'us-west';\n\n\
         Result:\n{device_name: lb-west-1}"
    );
}

#[tokio::test]
async fn test_lexical_ranking_without_classifier() {
    let llm = Arc::new(MockLlmClient::new());
    let (orchestrator, _dir) = build(llm, None).await;
    let snapshot = orchestrator.store().list_all().await.unwrap();

    let ranked = orchestrator
        .scorer()
        .rank("Which vip has port 443?", &snapshot, 5)
        .await;
    assert_eq!(ranked.first().map(String::as_str), Some("vip"));

    // Nothing matches and there is no classifier: store order fallback
    let fallback = orchestrator
        .scorer()
        .rank("anything unrelated", &snapshot, 2)
        .await;
    assert_eq!(fallback, vec!["load_balancer", "maintenance_window"]);
}

#[tokio::test]
async fn test_classifier_results_are_cached_across_questions() {
    let classifier = Arc::new(MockClassifier::new().with_score("load_balancer", 0.9));
    let llm = Arc::new(MockLlmClient::new().with_intent(true));
    let (orchestrator, _dir) = build(llm, Some(classifier.clone())).await;

    orchestrator.answer("what hardware do we run").await.unwrap();
    let first = classifier.call_count();
    assert!(first > 0);

    orchestrator.answer("what hardware do we run").await.unwrap();
    assert_eq!(classifier.call_count(), first);
    assert_eq!(orchestrator.scorer().oracle_cache().len(), first);
}

#[tokio::test]
async fn test_schema_question_lists_stored_tables() {
    let llm = Arc::new(MockLlmClient::new());
    let (orchestrator, _dir) = build(llm.clone(), None).await;

    let answer = orchestrator.answer("What tables are available?").await.unwrap();
    let Answer::SchemaInfo(listing) = answer else {
        panic!("expected schema listing");
    };
    assert!(listing.contains("Table: load_balancer"));
    assert!(listing.contains("Table: maintenance_window"));
    assert!(listing.contains("Table: vip"));
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_general_question_is_not_executed() {
    let llm = Arc::new(MockLlmClient::new().with_intent(false));
    let (orchestrator, _dir) = build(llm, None).await;

    let answer = orchestrator
        .answer("What does COLLATE NOCASE mean?")
        .await
        .unwrap();
    assert_eq!(
        answer.render(),
        "Mock answer to: What does COLLATE NOCASE mean?"
    );
}

#[tokio::test]
async fn test_unknown_column_surfaces_execution_error() {
    let llm = Arc::new(
        MockLlmClient::new()
            .with_intent(true)
            .with_response("colour", "SELECT colour FROM load_balancer;"),
    );
    let (orchestrator, _dir) = build(llm, None).await;

    let err = orchestrator
        .answer("list load_balancer colour")
        .await
        .unwrap_err();
    assert!(matches!(err, SageError::ExecutionFailed(_)), "got {err:?}");
}

#[tokio::test]
async fn test_write_attempts_are_blocked_before_execution() {
    let llm = Arc::new(MockLlmClient::new().with_intent(true).with_response(
        "archive",
        "SELECT * INTO archived FROM load_balancer;",
    ));
    let (orchestrator, _dir) = build(llm, None).await;

    let err = orchestrator
        .answer("archive every load_balancer")
        .await
        .unwrap_err();
    assert!(matches!(err, SageError::ReadOnlyViolation(_)));
    assert!(err.is_user_correctable());
}

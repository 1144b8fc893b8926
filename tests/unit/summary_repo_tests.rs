use std::sync::Arc;

use chrono::{Duration, Utc};

use chat_orchestrator::artifacts::ArtifactSink;
use chat_orchestrator::models::session::{ChatSession, SessionStatus};
use chat_orchestrator::models::summary::{ManualInstruction, SessionSummary};
use chat_orchestrator::persistence::{db, summary_repo::SqliteSummaryStore};

fn summary(role: &str, status: SessionStatus) -> SessionSummary {
    let start = Utc::now();
    let mut session = ChatSession::new(role.into(), format!("{role} prompt"), start);
    session.status = status;
    session.message_count = 7;
    session.error_count = 1;
    session.loop_detected = status == SessionStatus::Looped;
    session.last_error = Some("loop detected".into());
    SessionSummary::from_session(&session, start + Duration::seconds(30))
}

#[tokio::test]
async fn in_memory_connect_creates_summary_table() {
    let pool = db::connect_memory()
        .await
        .expect("in-memory connect should succeed");

    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM session_summary")
        .fetch_one(&pool)
        .await
        .expect("table should be queryable");
    assert_eq!(row.0, 0);
}

#[tokio::test]
async fn insert_and_read_back() {
    let store = SqliteSummaryStore::new(Arc::new(db::connect_memory().await.expect("db")));
    let record = summary("executor", SessionStatus::Looped);

    store.insert(&record).await.expect("insert");

    let stored = store
        .list_for_session(&record.session_id)
        .await
        .expect("list");
    assert_eq!(stored, vec![record]);
}

#[tokio::test]
async fn list_by_status_filters() {
    let store = SqliteSummaryStore::new(Arc::new(db::connect_memory().await.expect("db")));
    store
        .insert(&summary("architect", SessionStatus::Completed))
        .await
        .expect("insert");
    store
        .insert(&summary("executor", SessionStatus::Timeout))
        .await
        .expect("insert");
    store
        .insert(&summary("reviewer", SessionStatus::Timeout))
        .await
        .expect("insert");

    let timeouts = store
        .list_by_status(SessionStatus::Timeout)
        .await
        .expect("list");
    assert_eq!(timeouts.len(), 2);
    assert!(timeouts.iter().all(|s| s.status == SessionStatus::Timeout));
    assert_eq!(store.count().await.expect("count"), 3);
}

#[tokio::test]
async fn same_session_and_status_is_replaced() {
    let store = SqliteSummaryStore::new(Arc::new(db::connect_memory().await.expect("db")));
    let mut record = summary("executor", SessionStatus::Completed);
    store.insert(&record).await.expect("insert");
    record.message_count = 99;
    store.insert(&record).await.expect("insert again");

    assert_eq!(store.count().await.expect("count"), 1);
    let stored = store
        .list_for_session(&record.session_id)
        .await
        .expect("list");
    assert_eq!(stored[0].message_count, 99);
}

#[tokio::test]
async fn works_as_artifact_sink() {
    let store = SqliteSummaryStore::new(Arc::new(db::connect_memory().await.expect("db")));
    let sink: Arc<dyn ArtifactSink> = Arc::new(store.clone());
    let record = summary("architect", SessionStatus::Interrupted);

    sink.record_summary(&record).await.expect("record");
    let session = ChatSession::new("architect".into(), "prompt".into(), Utc::now());
    sink.record_manual_instructions(&ManualInstruction::for_session(&session, Utc::now()))
        .await
        .expect("manual instructions are accepted");

    assert_eq!(store.count().await.expect("count"), 1);
}

#[tokio::test]
async fn file_database_is_created_with_schema() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("nested").join("summaries.db");

    let pool = db::connect(&path).await.expect("file db");
    let store = SqliteSummaryStore::new(Arc::new(pool));
    store
        .insert(&summary("architect", SessionStatus::Completed))
        .await
        .expect("insert");

    assert!(path.exists());
    assert_eq!(store.count().await.expect("count"), 1);
}

use std::{path::PathBuf, sync::Arc};

use serde_json::json;
use session_pacer::{
    Database, ManualClock, NewMessage, SegmentInput, SessionConfig, SessionController,
    SessionState, Summary,
};

fn temp_db_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("session-pacer-{}", uuid::Uuid::new_v4()))
        .join("transcripts.sqlite3")
}

fn summary(session_id: &str, aborted: bool) -> Arc<Summary> {
    let clock = ManualClock::default();
    let segments: Vec<SegmentInput> = serde_json::from_value(json!([30, 30])).unwrap();
    let mut controller = SessionController::with_clock(
        SessionConfig {
            session_id: Some(session_id.into()),
            scenario_id: Some("url-shortener".into()),
            ..SessionConfig::with_segments(segments)
        },
        Arc::new(clock.clone()),
    );
    controller.begin();
    controller.advance();
    controller
        .record_message(NewMessage::user("How many writes per second?"))
        .unwrap();
    clock.advance_secs(10);
    if aborted {
        controller.exit_early("candidate-ended")
    } else {
        controller.finish()
    }
}

#[tokio::test]
async fn save_get_and_overwrite() {
    let path = temp_db_path();
    let db = Database::new(path.clone()).unwrap();
    assert_eq!(db.path(), path.as_path());

    let first = summary("sess-1", true);
    let saved = db.save_transcript("user-1", &first).await.unwrap();
    assert_eq!(saved.status, SessionState::Aborted);
    assert_eq!(saved.scenario_id.as_deref(), Some("url-shortener"));
    assert_eq!(saved.summary, *first);

    let fetched = db.get_transcript("user-1", "sess-1").await.unwrap().unwrap();
    assert_eq!(fetched, saved);
    assert!(db.get_transcript("user-2", "sess-1").await.unwrap().is_none());

    let replacement = summary("sess-1", false);
    let updated = db.save_transcript("user-1", &replacement).await.unwrap();
    assert_eq!(updated.status, SessionState::Completed);
    assert_eq!(updated.created_at, saved.created_at);
    assert!(updated.updated_at >= saved.updated_at);
    assert_eq!(db.list_transcripts("user-1").await.unwrap().len(), 1);

    drop(db);
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[tokio::test]
async fn list_is_newest_first_and_scoped_to_user() {
    let path = temp_db_path();
    let db = Database::new(path.clone()).unwrap();

    db.save_transcript("user-1", &summary("sess-old", false))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    db.save_transcript("user-1", &summary("sess-new", false))
        .await
        .unwrap();
    db.save_transcript("user-2", &summary("sess-other", false))
        .await
        .unwrap();

    let listed: Vec<String> = db
        .list_transcripts("user-1")
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.session_id)
        .collect();
    assert_eq!(listed, vec!["sess-new", "sess-old"]);
    assert!(db.list_transcripts("nobody").await.unwrap().is_empty());

    drop(db);
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[tokio::test]
async fn delete_reports_whether_a_row_was_removed() {
    let path = temp_db_path();
    let db = Database::new(path.clone()).unwrap();
    db.save_transcript("user-1", &summary("sess-1", false))
        .await
        .unwrap();

    assert!(db.delete_transcript("user-1", "sess-1").await.unwrap());
    assert!(!db.delete_transcript("user-1", "sess-1").await.unwrap());
    assert!(db.get_transcript("user-1", "sess-1").await.unwrap().is_none());

    drop(db);
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[tokio::test]
async fn blank_user_id_is_rejected() {
    let path = temp_db_path();
    let db = Database::new(path.clone()).unwrap();
    assert!(db.save_transcript("  ", &summary("sess-1", false)).await.is_err());
    assert!(db.list_transcripts("").await.unwrap().is_empty());

    drop(db);
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[tokio::test]
async fn reopening_keeps_saved_transcripts() {
    let path = temp_db_path();
    {
        let db = Database::new(path.clone()).unwrap();
        db.save_transcript("user-1", &summary("sess-1", false))
            .await
            .unwrap();
    }
    let db = Database::new(path.clone()).unwrap();
    assert_eq!(db.list_transcripts("user-1").await.unwrap().len(), 1);

    drop(db);
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[tokio::test]
async fn store_from_a_newer_build_is_refused() {
    let path = temp_db_path();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.pragma_update(None, "user_version", 99).unwrap();
    }

    let err = Database::new(path.clone()).err().unwrap();
    assert!(format!("{err:#}").contains("newer than this build"));

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

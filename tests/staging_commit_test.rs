mod common;

use bytes::Bytes;
use casefile_backend::AppState;
use casefile_backend::config::UploadConfig;
use casefile_backend::entities::{draft_files, prelude::*};
use casefile_backend::services::quota::SessionQuota;
use casefile_backend::services::staging::{NewDraft, StagingRepository};
use casefile_backend::services::upload_service::IncomingFile;
use common::{pdf_bytes, test_state, test_state_with};
use sea_orm::{ConnectionTrait, EntityTrait, Statement};
use std::sync::atomic::Ordering;

async fn stage_pdf(
    state: &AppState,
    session: &str,
    case_id: &str,
    folder_id: &str,
    name: &str,
) -> draft_files::Model {
    let policy = state.config.policy();
    let batch = state
        .uploads
        .validate_and_stage(
            session,
            case_id,
            folder_id,
            vec![IncomingFile {
                file_name: name.to_string(),
                mime_type: "application/pdf".to_string(),
                bytes: Bytes::from(pdf_bytes()),
            }],
            &policy,
        )
        .await
        .unwrap();
    assert!(batch.violations.is_empty(), "{:?}", batch.violations);
    batch.staged.into_iter().next().unwrap()
}

#[tokio::test]
async fn commit_of_an_empty_scope_is_a_repeatable_noop() {
    let (state, _store) = test_state().await;

    for _ in 0..2 {
        let count = state
            .commits
            .commit("session-a", "case-1", "folder-1")
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
    assert_eq!(CaseFiles::find().all(&state.db).await.unwrap().len(), 0);
}

#[tokio::test]
async fn failed_commit_leaves_drafts_untouched() {
    let (state, _store) = test_state().await;
    stage_pdf(&state, "session-a", "case-1", "folder-1", "first.pdf").await;
    stage_pdf(&state, "session-a", "case-1", "folder-1", "second.pdf").await;

    // force the permanent-insert half of the transaction to fail
    state
        .db
        .execute(Statement::from_string(
            state.db.get_database_backend(),
            "DROP TABLE case_files",
        ))
        .await
        .unwrap();

    let result = state.commits.commit("session-a", "case-1", "folder-1").await;
    assert!(result.is_err());

    let drafts = state
        .uploads
        .list_drafts("session-a", "case-1", "folder-1")
        .await
        .unwrap();
    assert_eq!(drafts.len(), 2);
}

#[tokio::test]
async fn commit_consumes_only_its_own_scope() {
    let (state, _store) = test_state().await;
    stage_pdf(&state, "session-a", "case-1", "folder-1", "first.pdf").await;
    stage_pdf(&state, "session-a", "case-1", "folder-2", "second.pdf").await;

    let count = state
        .commits
        .commit("session-a", "case-1", "folder-1")
        .await
        .unwrap();
    assert_eq!(count, 1);

    let remaining = state
        .uploads
        .list_drafts("session-a", "case-1", "folder-2")
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(CaseFiles::find().all(&state.db).await.unwrap().len(), 1);
}

#[tokio::test]
async fn quota_check_is_monotonic() {
    let (state, _store) = test_state().await;
    let staging = StagingRepository::new(state.db.clone());
    let quota = SessionQuota::new(staging.clone());

    staging
        .insert(NewDraft {
            session_key: "session-a".to_string(),
            case_id: "case-1".to_string(),
            folder_id: "folder-1".to_string(),
            file_name: "existing.pdf".to_string(),
            blob_key: StagingRepository::new_blob_key("case-1"),
            size_bytes: 700,
            mime_type: "application/pdf".to_string(),
        })
        .await
        .unwrap();

    let quota_bytes = 1000;
    assert!(
        !quota
            .would_exceed_quota("session-a", "case-1", &[200], quota_bytes)
            .await
            .unwrap()
    );
    assert!(
        quota
            .would_exceed_quota("session-a", "case-1", &[400], quota_bytes)
            .await
            .unwrap()
    );
    // adding any further file to a failing batch must keep it failing
    assert!(
        quota
            .would_exceed_quota("session-a", "case-1", &[400, 1], quota_bytes)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn empty_staging_scope_counts_as_zero_quota_used() {
    let (state, _store) = test_state().await;
    let quota = SessionQuota::new(StagingRepository::new(state.db.clone()));
    assert!(
        !quota
            .would_exceed_quota("session-a", "case-1", &[999], 1000)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn violations_from_all_checks_are_merged() {
    let (state, _store) = test_state().await;
    stage_pdf(&state, "session-a", "case-1", "folder-1", "report.pdf").await;

    let mut exe = b"MZ".to_vec();
    exe.resize(256, 0);
    let policy = state.config.policy();
    let batch = state
        .uploads
        .validate_and_stage(
            "session-a",
            "case-1",
            "folder-1",
            vec![
                IncomingFile {
                    file_name: "report.pdf".to_string(),
                    mime_type: "application/pdf".to_string(),
                    bytes: Bytes::from(pdf_bytes()),
                },
                IncomingFile {
                    file_name: "image.png".to_string(),
                    mime_type: "image/png".to_string(),
                    bytes: Bytes::from(exe),
                },
            ],
            &policy,
        )
        .await
        .unwrap();

    // one round trip reports both the duplicate and the spoofed signature
    assert_eq!(batch.staged.len(), 0);
    assert_eq!(batch.violations.len(), 2);
}

#[tokio::test]
async fn quota_violation_blocks_staging() {
    let config = UploadConfig {
        session_quota_bytes: 16,
        ..UploadConfig::default()
    };
    let (state, store) = test_state_with(config).await;

    let policy = state.config.policy();
    let batch = state
        .uploads
        .validate_and_stage(
            "session-a",
            "case-1",
            "folder-1",
            vec![IncomingFile {
                file_name: "big.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
                bytes: Bytes::from(pdf_bytes()),
            }],
            &policy,
        )
        .await
        .unwrap();

    assert_eq!(batch.staged.len(), 0);
    assert_eq!(batch.violations.len(), 1);
    assert!(batch.violations[0].message.contains("quota"));
    assert_eq!(store.len(), 0);
}

#[tokio::test]
async fn drafts_are_invisible_to_other_sessions() {
    let (state, store) = test_state().await;
    let draft = stage_pdf(&state, "session-a", "case-1", "folder-1", "memo.pdf").await;

    // another session cannot list it
    let listed = state
        .uploads
        .list_drafts("session-b", "case-1", "folder-1")
        .await
        .unwrap();
    assert_eq!(listed.len(), 0);

    // and deleting it from another session is a silent no-op
    state
        .uploads
        .delete_draft("session-b", &draft.id)
        .await
        .unwrap();
    assert_eq!(
        state
            .uploads
            .list_drafts("session-a", "case-1", "folder-1")
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(store.contains(&draft.blob_key));
}

#[tokio::test]
async fn blob_delete_failure_does_not_fail_the_draft_delete() {
    let (state, store) = test_state().await;
    let draft = stage_pdf(&state, "session-a", "case-1", "folder-1", "memo.pdf").await;

    store.fail_deletes.store(true, Ordering::SeqCst);
    state
        .uploads
        .delete_draft("session-a", &draft.id)
        .await
        .unwrap();

    // the record is authoritative and gone; the blob is an orphaned leak
    assert_eq!(DraftFiles::find().all(&state.db).await.unwrap().len(), 0);
    assert!(store.contains(&draft.blob_key));
}

#[tokio::test]
async fn storage_write_failure_stages_nothing() {
    let (state, store) = test_state().await;
    store.fail_writes.store(true, Ordering::SeqCst);

    let policy = state.config.policy();
    let result = state
        .uploads
        .validate_and_stage(
            "session-a",
            "case-1",
            "folder-1",
            vec![IncomingFile {
                file_name: "memo.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
                bytes: Bytes::from(pdf_bytes()),
            }],
            &policy,
        )
        .await;

    assert!(result.is_err());
    assert_eq!(DraftFiles::find().all(&state.db).await.unwrap().len(), 0);
}

#[tokio::test]
async fn delete_all_clears_exactly_one_scope() {
    let (state, _store) = test_state().await;
    stage_pdf(&state, "session-a", "case-1", "folder-1", "first.pdf").await;
    stage_pdf(&state, "session-a", "case-1", "folder-1", "second.pdf").await;
    stage_pdf(&state, "session-a", "case-1", "folder-2", "third.pdf").await;

    let staging = StagingRepository::new(state.db.clone());
    let removed = staging
        .delete_all("session-a", "case-1", "folder-1")
        .await
        .unwrap();
    assert_eq!(removed, 2);

    assert_eq!(
        staging.list("session-a", "case-1", "folder-1").await.unwrap().len(),
        0
    );
    assert_eq!(
        staging.list("session-a", "case-1", "folder-2").await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn blob_keys_are_unique_for_identical_uploads() {
    let (state, _store) = test_state().await;
    let first = stage_pdf(&state, "session-a", "case-1", "folder-1", "scan-a.pdf").await;
    let second = stage_pdf(&state, "session-b", "case-1", "folder-1", "scan-a.pdf").await;

    assert_ne!(first.blob_key, second.blob_key);
    assert!(first.blob_key.starts_with("cases/case-1/"));
}

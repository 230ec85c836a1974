use crate::api::error::AppError;
use crate::entities::{case_files, draft_files, prelude::*};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use uuid::Uuid;

/// Promotes every staged draft of one (session, case, folder) scope into
/// permanent case files. The permanent inserts and the draft cleanup share
/// one transaction; a partial commit must never be observable.
pub struct CommitCoordinator {
    db: DatabaseConnection,
}

impl CommitCoordinator {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Returns how many drafts were promoted. An empty scope is a no-op
    /// returning 0, not an error, and never touches the write path. On any
    /// failure the transaction rolls back and the drafts stay untouched,
    /// so a retry re-runs both halves identically.
    pub async fn commit(
        &self,
        session_key: &str,
        case_id: &str,
        folder_id: &str,
    ) -> Result<u64, AppError> {
        let drafts = DraftFiles::find()
            .filter(draft_files::Column::SessionKey.eq(session_key))
            .filter(draft_files::Column::CaseId.eq(case_id))
            .filter(draft_files::Column::FolderId.eq(folder_id))
            .all(&self.db)
            .await?;

        if drafts.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin().await?;

        for draft in &drafts {
            // fields are copied verbatim; the blob was written at staging
            // time and is immutable, so it is never re-uploaded
            case_files::ActiveModel {
                id: Set(Uuid::new_v4().to_string()),
                case_id: Set(draft.case_id.clone()),
                folder_id: Set(draft.folder_id.clone()),
                file_name: Set(draft.file_name.clone()),
                blob_key: Set(draft.blob_key.clone()),
                size_bytes: Set(draft.size_bytes),
                mime_type: Set(draft.mime_type.clone()),
                created_at: Set(Some(Utc::now())),
            }
            .insert(&txn)
            .await?;
        }

        let ids: Vec<String> = drafts.iter().map(|d| d.id.clone()).collect();
        let deleted = DraftFiles::delete_many()
            .filter(draft_files::Column::SessionKey.eq(session_key))
            .filter(draft_files::Column::CaseId.eq(case_id))
            .filter(draft_files::Column::FolderId.eq(folder_id))
            .filter(draft_files::Column::Id.is_in(ids))
            .exec(&txn)
            .await?
            .rows_affected;

        // The delete is conditioned on the drafts still being present. If a
        // racing commit consumed any of them under weak isolation, the
        // counts disagree and this attempt must not land.
        if deleted != drafts.len() as u64 {
            txn.rollback().await?;
            return Err(AppError::TransactionFailure(format!(
                "expected to consume {} drafts but matched {}",
                drafts.len(),
                deleted
            )));
        }

        txn.commit().await?;

        tracing::info!(case_id, folder_id, count = drafts.len(), "committed staged files");
        Ok(drafts.len() as u64)
    }
}

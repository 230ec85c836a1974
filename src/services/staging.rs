use crate::entities::{draft_files, prelude::*};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QuerySelect, Set,
};
use std::collections::HashSet;
use uuid::Uuid;

/// Fields the caller provides for a new draft; the id and timestamp are
/// generated on insert.
pub struct NewDraft {
    pub session_key: String,
    pub case_id: String,
    pub folder_id: String,
    pub file_name: String,
    pub blob_key: String,
    pub size_bytes: i64,
    pub mime_type: String,
}

/// CRUD over uploaded-but-unconfirmed files, scoped by
/// (session, case, folder). Sole owner of the `draft_files` table.
#[derive(Clone)]
pub struct StagingRepository {
    db: DatabaseConnection,
}

impl StagingRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Object-store keys carry a case-scoped prefix and an otherwise random
    /// suffix, never the file name, so same-named uploads or retries cannot
    /// collide in the store.
    pub fn new_blob_key(case_id: &str) -> String {
        format!("cases/{}/{}", case_id, Uuid::new_v4())
    }

    pub async fn insert(&self, draft: NewDraft) -> Result<draft_files::Model, DbErr> {
        let model = draft_files::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            session_key: Set(draft.session_key),
            case_id: Set(draft.case_id),
            folder_id: Set(draft.folder_id),
            file_name: Set(draft.file_name),
            blob_key: Set(draft.blob_key),
            size_bytes: Set(draft.size_bytes),
            mime_type: Set(draft.mime_type),
            created_at: Set(Some(Utc::now())),
        };
        model.insert(&self.db).await
    }

    pub async fn list(
        &self,
        session_key: &str,
        case_id: &str,
        folder_id: &str,
    ) -> Result<Vec<draft_files::Model>, DbErr> {
        DraftFiles::find()
            .filter(draft_files::Column::SessionKey.eq(session_key))
            .filter(draft_files::Column::CaseId.eq(case_id))
            .filter(draft_files::Column::FolderId.eq(folder_id))
            .all(&self.db)
            .await
    }

    /// Looks a draft up only within the owning session, so one session can
    /// never reach another session's drafts.
    pub async fn find_scoped(
        &self,
        session_key: &str,
        id: &str,
    ) -> Result<Option<draft_files::Model>, DbErr> {
        DraftFiles::find_by_id(id)
            .filter(draft_files::Column::SessionKey.eq(session_key))
            .one(&self.db)
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<u64, DbErr> {
        DraftFiles::delete_many()
            .filter(draft_files::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map(|r| r.rows_affected)
    }

    pub async fn delete_all(
        &self,
        session_key: &str,
        case_id: &str,
        folder_id: &str,
    ) -> Result<u64, DbErr> {
        DraftFiles::delete_many()
            .filter(draft_files::Column::SessionKey.eq(session_key))
            .filter(draft_files::Column::CaseId.eq(case_id))
            .filter(draft_files::Column::FolderId.eq(folder_id))
            .exec(&self.db)
            .await
            .map(|r| r.rows_affected)
    }

    /// Total staged bytes for one session and case. Summed client-side so
    /// the result type is the same on SQLite and Postgres; staging scopes
    /// stay small enough for that.
    pub async fn sum_sizes(&self, session_key: &str, case_id: &str) -> Result<i64, DbErr> {
        let sizes: Vec<i64> = DraftFiles::find()
            .select_only()
            .column(draft_files::Column::SizeBytes)
            .filter(draft_files::Column::SessionKey.eq(session_key))
            .filter(draft_files::Column::CaseId.eq(case_id))
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(sizes.into_iter().sum())
    }

    pub async fn names_in_case(
        &self,
        session_key: &str,
        case_id: &str,
    ) -> Result<HashSet<String>, DbErr> {
        let names: Vec<String> = DraftFiles::find()
            .select_only()
            .column(draft_files::Column::FileName)
            .filter(draft_files::Column::SessionKey.eq(session_key))
            .filter(draft_files::Column::CaseId.eq(case_id))
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(names.into_iter().collect())
    }
}

use crate::api::error::AppError;
use crate::config::UploadConfig;
use crate::entities::draft_files;
use crate::services::quota::SessionQuota;
use crate::services::staging::{NewDraft, StagingRepository};
use crate::services::storage::ObjectStore;
use crate::utils::validation::{self, FileCheck, Policy, Violation};
use bytes::Bytes;
use std::sync::Arc;

/// One file of an upload batch, as handed over by the web layer.
pub struct IncomingFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

/// Outcome of `validate_and_stage`: either every file in the batch was
/// staged, or nothing was and the violations say why.
pub struct StagedBatch {
    pub staged: Vec<draft_files::Model>,
    pub violations: Vec<Violation>,
}

/// Front door for the upload lifecycle: gate, stage, list, abandon.
/// Committing is the `CommitCoordinator`'s job.
pub struct UploadService {
    staging: StagingRepository,
    quota: SessionQuota,
    storage: Arc<dyn ObjectStore>,
    config: UploadConfig,
}

impl UploadService {
    pub fn new(
        staging: StagingRepository,
        quota: SessionQuota,
        storage: Arc<dyn ObjectStore>,
        config: UploadConfig,
    ) -> Self {
        Self {
            staging,
            quota,
            storage,
            config,
        }
    }

    /// Validates the whole batch and stages it only when no file raised a
    /// violation. Content checks and the two staging queries are read-only
    /// and independent, so they run concurrently and their findings are
    /// merged into one report.
    pub async fn validate_and_stage(
        &self,
        session_key: &str,
        case_id: &str,
        folder_id: &str,
        files: Vec<IncomingFile>,
        policy: &Policy,
    ) -> Result<StagedBatch, AppError> {
        let names: Vec<String> = files
            .iter()
            .map(|f| validation::sanitize_file_name(&f.file_name))
            .collect();
        let sizes: Vec<i64> = files.iter().map(|f| f.bytes.len() as i64).collect();

        let content_checks =
            futures::future::join_all(files.iter().zip(&names).map(|(file, name)| async move {
                validation::validate_file(
                    &FileCheck {
                        file_name: name,
                        declared_mime: &file.mime_type,
                        declared_size: file.bytes.len() as u64,
                        bytes: &file.bytes,
                    },
                    policy,
                )
            }));

        let (per_file, duplicate, over_quota) = tokio::join!(
            content_checks,
            self.quota.has_duplicate_name(session_key, case_id, &names),
            self.quota.would_exceed_quota(
                session_key,
                case_id,
                &sizes,
                self.config.session_quota_bytes as i64
            ),
        );

        let mut violations: Vec<Violation> = per_file.into_iter().flatten().collect();
        if duplicate? {
            violations.push(Violation::new(
                "fileName",
                "A file with the same name is already staged for this case",
            ));
        }
        if over_quota? {
            violations.push(Violation::new(
                "files",
                format!(
                    "Staged files would exceed the {} byte session quota",
                    self.config.session_quota_bytes
                ),
            ));
        }

        if !violations.is_empty() {
            return Ok(StagedBatch {
                staged: Vec::new(),
                violations,
            });
        }

        // The blob is written before the draft row exists, so a draft can
        // never reference a blob that is missing from the store.
        let mut staged = Vec::with_capacity(files.len());
        for (file, name) in files.into_iter().zip(names) {
            let blob_key = StagingRepository::new_blob_key(case_id);
            self.storage
                .write(&blob_key, &file.mime_type, file.bytes.to_vec())
                .await?;

            let draft = self
                .staging
                .insert(NewDraft {
                    session_key: session_key.to_string(),
                    case_id: case_id.to_string(),
                    folder_id: folder_id.to_string(),
                    file_name: name,
                    blob_key,
                    size_bytes: file.bytes.len() as i64,
                    mime_type: file.mime_type.clone(),
                })
                .await?;
            tracing::debug!(draft_id = %draft.id, blob_key = %draft.blob_key, "staged upload");
            staged.push(draft);
        }

        Ok(StagedBatch {
            staged,
            violations: Vec::new(),
        })
    }

    pub async fn list_drafts(
        &self,
        session_key: &str,
        case_id: &str,
        folder_id: &str,
    ) -> Result<Vec<draft_files::Model>, AppError> {
        Ok(self.staging.list(session_key, case_id, folder_id).await?)
    }

    /// Abandons one staged draft. The relational record is authoritative
    /// and is deleted first; the blob delete afterwards is best effort.
    /// An orphaned blob is a recoverable leak, while a live record pointing
    /// at a deleted blob would be a correctness bug.
    pub async fn delete_draft(&self, session_key: &str, draft_id: &str) -> Result<(), AppError> {
        let Some(draft) = self.staging.find_scoped(session_key, draft_id).await? else {
            tracing::info!(draft_id, "draft not found for this session, delete is a no-op");
            return Ok(());
        };

        self.staging.delete(&draft.id).await?;

        if let Err(e) = self.storage.delete_if_exists(&draft.blob_key).await {
            tracing::warn!(
                blob_key = %draft.blob_key,
                error = %e,
                "blob delete failed after record delete; leaving orphan for cleanup"
            );
        }
        Ok(())
    }
}

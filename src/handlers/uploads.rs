use crate::api::error::AppError;
use crate::entities::draft_files;
use crate::middleware::session::SessionKey;
use crate::services::upload_service::IncomingFile;
use crate::utils::validation::Violation;
use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use serde::Serialize;
use utoipa::ToSchema;

/// Draft file shape returned to the web layer. The session key stays
/// server-side.
#[derive(Serialize, ToSchema)]
pub struct DraftFileView {
    pub id: String,
    pub case_id: String,
    pub folder_id: String,
    pub file_name: String,
    pub size_bytes: i64,
    pub mime_type: String,
}

impl From<draft_files::Model> for DraftFileView {
    fn from(model: draft_files::Model) -> Self {
        Self {
            id: model.id,
            case_id: model.case_id,
            folder_id: model.folder_id,
            file_name: model.file_name,
            size_bytes: model.size_bytes,
            mime_type: model.mime_type,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct StageResponse {
    pub staged: Vec<DraftFileView>,
    pub violations: Vec<Violation>,
}

#[derive(Serialize, ToSchema)]
pub struct CommitResponse {
    pub count: u64,
}

#[utoipa::path(
    post,
    path = "/cases/{case_id}/folders/{folder_id}/files",
    request_body(content = String, description = "Multipart upload; every part named 'file' is one candidate"),
    params(
        ("case_id" = String, Path, description = "Case the files belong to"),
        ("folder_id" = String, Path, description = "Folder the files will be committed into")
    ),
    responses(
        (status = 200, description = "Batch staged, or rejected with violations", body = StageResponse),
        (status = 401, description = "Missing session key")
    )
)]
pub async fn stage_files(
    State(state): State<crate::AppState>,
    Extension(session): Extension<SessionKey>,
    Path((case_id, folder_id)): Path<(String, String)>,
    mut multipart: Multipart,
) -> Result<Json<StageResponse>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("unnamed").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        files.push(IncomingFile {
            file_name,
            mime_type,
            bytes,
        });
    }

    if files.is_empty() {
        return Err(AppError::BadRequest("No file provided".to_string()));
    }

    let policy = state.config.policy();
    let batch = state
        .uploads
        .validate_and_stage(&session.0, &case_id, &folder_id, files, &policy)
        .await?;

    Ok(Json(StageResponse {
        staged: batch.staged.into_iter().map(Into::into).collect(),
        violations: batch.violations,
    }))
}

#[utoipa::path(
    get,
    path = "/cases/{case_id}/folders/{folder_id}/files",
    params(
        ("case_id" = String, Path, description = "Case the drafts belong to"),
        ("folder_id" = String, Path, description = "Folder the drafts are staged for")
    ),
    responses(
        (status = 200, description = "Drafts staged by this session", body = [DraftFileView]),
        (status = 401, description = "Missing session key")
    )
)]
pub async fn list_drafts(
    State(state): State<crate::AppState>,
    Extension(session): Extension<SessionKey>,
    Path((case_id, folder_id)): Path<(String, String)>,
) -> Result<Json<Vec<DraftFileView>>, AppError> {
    let drafts = state
        .uploads
        .list_drafts(&session.0, &case_id, &folder_id)
        .await?;
    Ok(Json(drafts.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/cases/{case_id}/folders/{folder_id}/commit",
    params(
        ("case_id" = String, Path, description = "Case the drafts belong to"),
        ("folder_id" = String, Path, description = "Folder the drafts are committed into")
    ),
    responses(
        (status = 200, description = "Number of drafts promoted", body = CommitResponse),
        (status = 401, description = "Missing session key"),
        (status = 409, description = "Commit lost a race and was rolled back; safe to retry")
    )
)]
pub async fn commit_drafts(
    State(state): State<crate::AppState>,
    Extension(session): Extension<SessionKey>,
    Path((case_id, folder_id)): Path<(String, String)>,
) -> Result<Json<CommitResponse>, AppError> {
    let count = state
        .commits
        .commit(&session.0, &case_id, &folder_id)
        .await?;
    Ok(Json(CommitResponse { count }))
}

#[utoipa::path(
    delete,
    path = "/drafts/{draft_id}",
    params(
        ("draft_id" = String, Path, description = "Draft to abandon")
    ),
    responses(
        (status = 204, description = "Draft removed, or was already gone"),
        (status = 401, description = "Missing session key")
    )
)]
pub async fn delete_draft(
    State(state): State<crate::AppState>,
    Extension(session): Extension<SessionKey>,
    Path(draft_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.uploads.delete_draft(&session.0, &draft_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

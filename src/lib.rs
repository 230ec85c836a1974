pub mod api;
pub mod config;
pub mod entities;
pub mod handlers;
pub mod infrastructure;
pub mod middleware;
pub mod services;
pub mod utils;

use crate::config::UploadConfig;
use crate::services::commit::CommitCoordinator;
use crate::services::quota::SessionQuota;
use crate::services::staging::StagingRepository;
use crate::services::storage::ObjectStore;
use crate::services::upload_service::UploadService;
use axum::{
    Router,
    middleware::from_fn,
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::uploads::stage_files,
        handlers::uploads::list_drafts,
        handlers::uploads::commit_drafts,
        handlers::uploads::delete_draft,
        handlers::health::health,
    ),
    components(
        schemas(
            handlers::uploads::DraftFileView,
            handlers::uploads::StageResponse,
            handlers::uploads::CommitResponse,
            utils::validation::Violation,
        )
    ),
    tags(
        (name = "uploads", description = "Staged upload lifecycle: validate, stage, commit, abandon")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn ObjectStore>,
    pub uploads: Arc<UploadService>,
    pub commits: Arc<CommitCoordinator>,
    pub config: UploadConfig,
}

impl AppState {
    pub fn new(db: DatabaseConnection, storage: Arc<dyn ObjectStore>, config: UploadConfig) -> Self {
        let staging = StagingRepository::new(db.clone());
        let quota = SessionQuota::new(staging.clone());
        let uploads = Arc::new(UploadService::new(
            staging,
            quota,
            storage.clone(),
            config.clone(),
        ));
        let commits = Arc::new(CommitCoordinator::new(db.clone()));
        Self {
            db,
            storage,
            uploads,
            commits,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handlers::health::health))
        .route(
            "/cases/:case_id/folders/:folder_id/files",
            post(handlers::uploads::stage_files)
                .get(handlers::uploads::list_drafts)
                .layer(from_fn(middleware::session::session_middleware)),
        )
        .route(
            "/cases/:case_id/folders/:folder_id/commit",
            post(handlers::uploads::commit_drafts)
                .layer(from_fn(middleware::session::session_middleware)),
        )
        .route(
            "/drafts/:draft_id",
            delete(handlers::uploads::delete_draft)
                .layer(from_fn(middleware::session::session_middleware)),
        )
        .with_state(state)
}

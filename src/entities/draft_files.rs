use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A file that was uploaded and validated but not yet confirmed into a
/// case folder. Owned exclusively by the staging repository; consumed by
/// the commit coordinator or removed by an explicit delete.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "draft_files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub session_key: String,
    pub case_id: String,
    pub folder_id: String,
    pub file_name: String,
    /// Opaque object-store key. Never derived from the file name so that
    /// same-named uploads (or retries) can never collide in the store.
    #[sea_orm(unique)]
    pub blob_key: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub created_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A confirmed file attached to a case folder. Only ever written by the
/// commit coordinator, from exactly one draft; the blob key is copied
/// verbatim so the object-store bytes are never re-uploaded.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "case_files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub case_id: String,
    pub folder_id: String,
    pub file_name: String,
    pub blob_key: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub created_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

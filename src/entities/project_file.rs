//! Project file entity - metadata for an uploaded attachment.
//!
//! The bytes live in object storage under `storage_path`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Project file database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_files")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning project
    #[sea_orm(indexed)]
    pub project_id: i64,
    /// Stage the file was attached under, if any
    pub stage_id: Option<i64>,
    /// Sub-stage the file was attached under, if any
    pub sub_stage_id: Option<i64>,
    /// Original file name
    pub file_name: String,
    /// Key in object storage
    pub storage_path: String,
    /// Stable public URL
    pub public_url: String,
    /// Size of the stored object
    pub size_bytes: i64,
    /// Uploader's profile id
    pub uploaded_by: Option<String>,
    /// Upload time
    pub created_at: DateTimeUtc,
}

/// Defines relationships between `ProjectFile` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each file belongs to one project
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id",
        on_delete = "Cascade"
    )]
    Project,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

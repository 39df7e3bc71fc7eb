//! Sub-stage detail entity - per-project completion state of one task.
//!
//! At most one row exists per `(project_id, stage_id, sub_stage_id)`; a composite
//! unique index is created alongside the table. Stage and sub-stage ids are weak
//! references and may point at deleted definitions.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sub-stage detail database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sub_stage_details")]
pub struct Model {
    /// Unique identifier for the detail row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Project this record belongs to
    pub project_id: i64,
    /// Stage of the task
    pub stage_id: i64,
    /// The task itself
    pub sub_stage_id: i64,
    /// Whether the task is done for this project
    pub is_completed: bool,
    /// Optional working notes for the task
    pub notes: Option<String>,
    /// When the row was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between `SubStageDetail` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each detail belongs to one project
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

//! Project comment entity - discussion attached to a project or one of its tasks.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Project comment database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_comments")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning project
    #[sea_orm(indexed)]
    pub project_id: i64,
    /// Stage the comment was posted under, if any
    pub stage_id: Option<i64>,
    /// Sub-stage the comment was posted under, if any
    pub sub_stage_id: Option<i64>,
    /// Author's profile id
    pub author_id: Option<String>,
    /// Comment text
    pub body: String,
    /// Posting time
    pub created_at: DateTimeUtc,
}

/// Defines relationships between `ProjectComment` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each comment belongs to one project
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

//! Activity entry entity - append-only audit trail.
//!
//! `user_id` is `None` for system-generated entries. `project_id` is `None` for
//! events that are not scoped to a project (workflow, roles, staff, settings).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of domain event an entry records
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    /// Something was created
    #[sea_orm(string_value = "create")]
    Create,
    /// Something was deleted
    #[sea_orm(string_value = "delete")]
    Delete,
    /// Something was edited
    #[sea_orm(string_value = "update")]
    Update,
    /// Income was recorded
    #[sea_orm(string_value = "payment")]
    Payment,
    /// A file was uploaded
    #[sea_orm(string_value = "file")]
    File,
    /// A comment was posted
    #[sea_orm(string_value = "comment")]
    Comment,
    /// Workflow progress changed
    #[sea_orm(string_value = "stage")]
    Stage,
    /// Informational
    #[sea_orm(string_value = "info")]
    Info,
}

/// Activity entry database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "activity_entries")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Project the event belongs to
    #[sea_orm(indexed)]
    pub project_id: Option<i64>,
    /// Acting profile, `None` for system entries
    pub user_id: Option<String>,
    /// Event kind
    pub activity_type: ActivityType,
    /// Short headline
    pub title: String,
    /// Human-readable detail
    pub description: String,
    /// Open key/value payload
    pub metadata: Json,
    /// Whether description or metadata carry amounts
    pub financial: bool,
    /// When the event was recorded
    pub created_at: DateTimeUtc,
}

/// Activity entries reference projects weakly and have no relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

//! Stage entity - a top-level phase of the shared workflow definition.
//!
//! Stages are global: every project progresses through the same ordered list.
//! `order_index` is dense and 1-based once a reorder has committed.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Stage database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stages")]
pub struct Model {
    /// Unique identifier for the stage
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name (e.g. "Design", "Production")
    pub name: String,
    /// Position in the workflow, 1-based
    pub order_index: i32,
}

/// Defines relationships between Stage and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One stage owns many sub-stages
    #[sea_orm(has_many = "super::sub_stage::Entity")]
    SubStages,
}

impl Related<super::sub_stage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SubStages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

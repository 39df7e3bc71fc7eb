//! Sub-stage entity - a task inside a stage.
//!
//! Ordering is scoped to the owning stage; deleting the stage removes its sub-stages.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sub-stage database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sub_stages")]
pub struct Model {
    /// Unique identifier for the sub-stage
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning stage
    #[sea_orm(indexed)]
    pub stage_id: i64,
    /// Display name of the task
    pub name: String,
    /// Position within the owning stage, 1-based
    pub order_index: i32,
}

/// Defines relationships between `SubStage` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each sub-stage belongs to one stage
    #[sea_orm(
        belongs_to = "super::stage::Entity",
        from = "Column::StageId",
        to = "super::stage::Column::Id",
        on_delete = "Cascade"
    )]
    Stage,
}

impl Related<super::stage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Stage.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

//! Payment entity - an income entry recorded against a project.
//!
//! Entries are immutable once created; the only mutation is deletion.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payment database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Project the entry is booked against
    #[sea_orm(indexed)]
    pub project_id: i64,
    /// Amount, always positive
    pub amount: f64,
    /// Booking date
    pub date: Date,
    /// How the customer paid (e.g. "cash", "transfer")
    pub payment_type: String,
    /// Optional free-form notes
    pub notes: Option<String>,
    /// Profile id of the staff member who recorded it
    pub created_by: Option<String>,
    /// When the entry was recorded
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Payment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each entry belongs to one project
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

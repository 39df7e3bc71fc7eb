//! Project entity - one customer order moving through the workflow.
//!
//! `current_stage_id` and `current_sub_stage_id` are a cache of the cursor derived
//! from the completion details. They carry no foreign key: a deleted stage leaves the
//! reference dangling and readers render it as "Unknown".

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Project database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    /// Unique identifier for the project
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Customer the furniture is built for
    pub customer_name: String,
    /// Customer phone number
    pub phone: String,
    /// Optional customer email
    pub email: Option<String>,
    /// Delivery address
    pub address: String,
    /// Agreed contract amount
    pub total_amount: f64,
    /// Cached active stage (see module docs)
    pub current_stage_id: Option<i64>,
    /// Cached active sub-stage (see module docs)
    pub current_sub_stage_id: Option<i64>,
    /// Free-form rich text notes
    pub notes: String,
    /// When the project was created
    pub created_at: DateTimeUtc,
    /// When the project was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Project and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Income entries
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
    /// Expense entries
    #[sea_orm(has_many = "super::expense::Entity")]
    Expenses,
    /// Per sub-stage completion records
    #[sea_orm(has_many = "super::sub_stage_detail::Entity")]
    Details,
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl Related<super::expense::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl Related<super::sub_stage_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Details.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

//! Role entity - a named bundle of capability flags.
//!
//! `permissions` is stored as a JSON object of capability name to boolean. Keys the
//! crate does not recognise are ignored on read; missing keys mean "not granted".

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Role database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "roles")]
pub struct Model {
    /// Unique identifier for the role
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Role name, unique
    #[sea_orm(unique)]
    pub name: String,
    /// Capability map
    pub permissions: Json,
    /// When the role was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Role and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Profiles holding this role
    #[sea_orm(has_many = "super::profile::Entity")]
    Profiles,
}

impl Related<super::profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Profiles.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

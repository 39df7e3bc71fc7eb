//! Profile entity - a staff account as seen by the application.
//!
//! The id is issued by the external account service. A profile without a role
//! resolves to an empty permission set.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Profile database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "profiles")]
pub struct Model {
    /// Account id from the account service
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Login email
    #[sea_orm(unique)]
    pub email: String,
    /// Given name
    pub first_name: Option<String>,
    /// Family name
    pub last_name: Option<String>,
    /// Assigned role, if any
    pub role_id: Option<i64>,
    /// Linked Discord user id for the chat surface
    #[sea_orm(unique)]
    pub discord_user_id: Option<String>,
    /// When the profile was created
    pub created_at: DateTimeUtc,
}

impl Model {
    /// Returns "First Last", falling back to the email when no name is set.
    #[must_use]
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            self.email.clone()
        } else {
            name
        }
    }
}

/// Defines relationships between Profile and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each profile holds at most one role
    #[sea_orm(
        belongs_to = "super::role::Entity",
        from = "Column::RoleId",
        to = "super::role::Column::Id",
        on_delete = "SetNull"
    )]
    Role,
}

impl Related<super::role::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Role.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

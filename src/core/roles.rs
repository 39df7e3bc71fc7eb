//! Permission store - roles and the capabilities they grant.
//!
//! Roles are edited by principals holding `can_manage_settings`; assigning a role
//! to a staff member is a staff-management action. The Administrator role is
//! protected: it cannot be renamed, deleted, or stripped of any capability.

use crate::{
    core::{
        activity::{Activity, ActivityLog},
        rbac::{Capability, PermissionSet, Session},
    },
    entities::{ActivityType, Profile, Role, profile, role},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{
    ConnectionTrait, QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr,
};
use serde_json::json;
use tracing::info;

/// Name of the built-in role that always holds every capability.
pub const ADMIN_ROLE_NAME: &str = "Yönetici";

/// A role with its decoded permission set.
#[derive(Clone, Debug)]
pub struct RoleView {
    /// Role id
    pub id: i64,
    /// Role name
    pub name: String,
    /// Granted capabilities
    pub permissions: PermissionSet,
}

impl From<role::Model> for RoleView {
    fn from(model: role::Model) -> Self {
        Self {
            id: model.id,
            permissions: PermissionSet::from_json(&model.permissions),
            name: model.name,
        }
    }
}

impl RoleView {
    /// Whether this is the protected Administrator role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.name == ADMIN_ROLE_NAME
    }
}

/// All roles by name.
pub async fn list_roles(db: &DatabaseConnection) -> Result<Vec<RoleView>> {
    let roles = Role::find().order_by_asc(role::Column::Name).all(db).await?;
    Ok(roles.into_iter().map(RoleView::from).collect())
}

/// Finds a role by exact name.
pub async fn find_role_by_name<C>(db: &C, name: &str) -> Result<Option<role::Model>>
where
    C: ConnectionTrait,
{
    Role::find()
        .filter(role::Column::Name.eq(name.trim()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Makes sure the Administrator role exists and grants every capability.
pub async fn ensure_admin_role<C>(db: &C) -> Result<role::Model>
where
    C: ConnectionTrait,
{
    let full = PermissionSet::all();
    match find_role_by_name(db, ADMIN_ROLE_NAME).await? {
        Some(existing) if PermissionSet::from_json(&existing.permissions) == full => Ok(existing),
        Some(existing) => {
            info!("Restoring full permissions on the administrator role");
            let mut active: role::ActiveModel = existing.into();
            active.permissions = Set(full.to_json());
            active.update(db).await.map_err(Into::into)
        }
        None => {
            info!("Creating administrator role");
            role::ActiveModel {
                name: Set(ADMIN_ROLE_NAME.to_string()),
                permissions: Set(full.to_json()),
                created_at: Set(Utc::now()),
                ..Default::default()
            }
            .insert(db)
            .await
            .map_err(Into::into)
        }
    }
}

async fn require_role(db: &DatabaseConnection, role_id: i64) -> Result<role::Model> {
    Role::find_by_id(role_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Role", role_id))
}

async fn validated_role_name(db: &DatabaseConnection, name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("Role name cannot be empty"));
    }
    if find_role_by_name(db, trimmed).await?.is_some() {
        return Err(Error::validation(format!("A role named '{trimmed}' already exists")));
    }
    Ok(trimmed.to_string())
}

fn reject_admin(role: &role::Model, action: &str) -> Result<()> {
    if role.name == ADMIN_ROLE_NAME {
        return Err(Error::validation(format!(
            "The {ADMIN_ROLE_NAME} role cannot be {action}"
        )));
    }
    Ok(())
}

/// Creates a role granting `permissions`.
pub async fn create_role(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    name: &str,
    permissions: &PermissionSet,
) -> Result<RoleView> {
    session.require(Capability::ManageSettings)?;
    let name = validated_role_name(db, name).await?;

    let role = role::ActiveModel {
        name: Set(name),
        permissions: Set(permissions.to_json()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(role_id = role.id, name = %role.name, "Role created");
    log.record(
        session,
        Activity::new(ActivityType::Create, "Role created", format!("Role '{}' created", role.name))
            .with_metadata(json!({ "role_id": role.id, "permissions": role.permissions })),
    );
    Ok(role.into())
}

/// Renames a role.
pub async fn rename_role(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    role_id: i64,
    name: &str,
) -> Result<RoleView> {
    session.require(Capability::ManageSettings)?;
    let existing = require_role(db, role_id).await?;
    reject_admin(&existing, "renamed")?;
    let name = validated_role_name(db, name).await?;
    let old_name = existing.name.clone();

    let mut active: role::ActiveModel = existing.into();
    active.name = Set(name);
    let role = active.update(db).await?;

    log.record(
        session,
        Activity::new(
            ActivityType::Update,
            "Role renamed",
            format!("Role '{old_name}' renamed to '{}'", role.name),
        )
        .with_metadata(json!({ "role_id": role_id })),
    );
    Ok(role.into())
}

/// Replaces the capabilities a role grants. Open sessions keep their snapshot until
/// they refresh.
pub async fn set_role_permissions(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    role_id: i64,
    permissions: &PermissionSet,
) -> Result<RoleView> {
    session.require(Capability::ManageSettings)?;
    let existing = require_role(db, role_id).await?;
    if existing.name == ADMIN_ROLE_NAME && *permissions != PermissionSet::all() {
        return Err(Error::validation(format!(
            "The {ADMIN_ROLE_NAME} role always holds every capability"
        )));
    }

    let mut active: role::ActiveModel = existing.into();
    active.permissions = Set(permissions.to_json());
    let role = active.update(db).await?;

    info!(role_id, name = %role.name, "Role permissions updated");
    log.record(
        session,
        Activity::new(
            ActivityType::Update,
            "Permissions updated",
            format!("Permissions of role '{}' updated", role.name),
        )
        .with_metadata(json!({ "role_id": role_id, "permissions": role.permissions })),
    );
    Ok(role.into())
}

/// Deletes a role. Profiles that held it fall back to no role, and so to no
/// permissions.
pub async fn delete_role(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    role_id: i64,
) -> Result<()> {
    session.require(Capability::ManageSettings)?;

    let txn = db.begin().await?;
    let role = Role::find_by_id(role_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Role", role_id))?;
    reject_admin(&role, "deleted")?;
    let detached = Profile::update_many()
        .col_expr(profile::Column::RoleId, Expr::value(Option::<i64>::None))
        .filter(profile::Column::RoleId.eq(role_id))
        .exec(&txn)
        .await?
        .rows_affected;
    Role::delete_by_id(role_id).exec(&txn).await?;
    txn.commit().await?;

    info!(role_id, detached, "Role deleted");
    log.record(
        session,
        Activity::new(
            ActivityType::Delete,
            "Role deleted",
            format!("Role '{}' deleted, {detached} staff member(s) left without a role", role.name),
        )
        .with_metadata(json!({ "role_id": role_id })),
    );
    Ok(())
}

/// Assigns `role_id` (or no role) to a staff profile.
pub async fn assign_role(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    profile_id: &str,
    role_id: Option<i64>,
) -> Result<profile::Model> {
    session.require(Capability::ManageStaff)?;
    let role_name = match role_id {
        Some(id) => Some(require_role(db, id).await?.name),
        None => None,
    };
    let existing = Profile::find_by_id(profile_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Profile", profile_id))?;

    let mut active: profile::ActiveModel = existing.into();
    active.role_id = Set(role_id);
    let profile = active.update(db).await?;

    log.record(
        session,
        Activity::new(
            ActivityType::Update,
            "Role assigned",
            format!(
                "{} now has role {}",
                profile.display_name(),
                role_name.as_deref().unwrap_or("(none)")
            ),
        )
        .with_metadata(json!({ "profile_id": profile.id, "role_id": role_id })),
    );
    Ok(profile)
}

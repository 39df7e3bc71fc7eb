//! Seed configuration loading from config.toml
//!
//! The workflow and roles declared in config.toml seed the database on first run.
//! Stages are only inserted while the workflow definition is still empty, so edits
//! made at runtime are never overwritten; roles are inserted by name when missing.
//! The Administrator role is ensured on every start.

use crate::{
    core::{
        rbac::{Capability, PermissionSet},
        roles,
    },
    entities::{Profile, Role, Stage, profile, role, stage, sub_stage},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Initial workflow, in order
    #[serde(default)]
    pub stages: Vec<StageConfig>,
    /// Initial roles
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
}

/// One stage of the initial workflow
#[derive(Debug, Deserialize, Clone)]
pub struct StageConfig {
    /// Stage name
    pub name: String,
    /// Sub-stage names, in order
    #[serde(default)]
    pub tasks: Vec<String>,
}

/// One initial role
#[derive(Debug, Deserialize, Clone)]
pub struct RoleConfig {
    /// Role name
    pub name: String,
    /// Capability names the role grants, e.g. `can_view_financials`
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl RoleConfig {
    /// Parses the capability names. Unknown names are a configuration error.
    pub fn permission_set(&self) -> Result<PermissionSet> {
        let granted = self
            .permissions
            .iter()
            .map(|name| {
                name.parse::<Capability>().map_err(|_| Error::Config {
                    message: format!("Role '{}' grants unknown capability '{name}'", self.name),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(PermissionSet::from_granted(granted))
    }
}

/// Loads seed configuration from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read, the TOML syntax is invalid, or
/// required fields are missing.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// What a seeding run inserted.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    /// Stages inserted
    pub stages: usize,
    /// Sub-stages inserted
    pub sub_stages: usize,
    /// Roles inserted
    pub roles: usize,
}

/// Seeds the database from `config` in one transaction.
pub async fn seed_database(db: &DatabaseConnection, config: &Config) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();
    let txn = db.begin().await?;

    if Stage::find().count(&txn).await? == 0 {
        for (stage_index, stage_config) in (1..).zip(&config.stages) {
            let stage = stage::ActiveModel {
                name: Set(stage_config.name.trim().to_string()),
                order_index: Set(stage_index),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            summary.stages += 1;

            for (task_index, task) in (1..).zip(&stage_config.tasks) {
                sub_stage::ActiveModel {
                    stage_id: Set(stage.id),
                    name: Set(task.trim().to_string()),
                    order_index: Set(task_index),
                    ..Default::default()
                }
                .insert(&txn)
                .await?;
                summary.sub_stages += 1;
            }
        }
    }

    for role_config in &config.roles {
        if roles::find_role_by_name(&txn, &role_config.name).await?.is_some() {
            continue;
        }
        let permissions = role_config.permission_set()?;
        role::ActiveModel {
            name: Set(role_config.name.trim().to_string()),
            permissions: Set(permissions.to_json()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        summary.roles += 1;
    }

    roles::ensure_admin_role(&txn).await?;
    txn.commit().await?;

    let total_roles = Role::find().count(db).await?;
    info!(
        stages = summary.stages,
        sub_stages = summary.sub_stages,
        roles = summary.roles,
        total_roles,
        "Seeding finished"
    );
    Ok(summary)
}

/// Makes sure the Discord user `discord_user_id` is linked to an administrator profile.
///
/// An existing profile with that Discord id or with `email` is promoted and linked;
/// otherwise a local profile `discord-{id}` is created. Used to get the first
/// administrator onto a fresh deployment.
pub async fn ensure_bootstrap_admin(
    db: &DatabaseConnection,
    discord_user_id: &str,
    email: &str,
) -> Result<profile::Model> {
    let discord_user_id = discord_user_id.trim();
    let email = email.trim().to_lowercase();
    if discord_user_id.is_empty() || email.is_empty() {
        return Err(Error::Config {
            message: "Bootstrap admin needs both a Discord id and an email".to_string(),
        });
    }

    let txn = db.begin().await?;
    let admin_role = roles::ensure_admin_role(&txn).await?;

    let existing = match Profile::find()
        .filter(profile::Column::DiscordUserId.eq(discord_user_id))
        .one(&txn)
        .await?
    {
        Some(found) => Some(found),
        None => {
            Profile::find()
                .filter(profile::Column::Email.eq(email.as_str()))
                .one(&txn)
                .await?
        }
    };

    let admin = if let Some(found) = existing {
        let mut active: profile::ActiveModel = found.into();
        active.role_id = Set(Some(admin_role.id));
        active.discord_user_id = Set(Some(discord_user_id.to_string()));
        active.update(&txn).await?
    } else {
        profile::ActiveModel {
            id: Set(format!("discord-{discord_user_id}")),
            email: Set(email),
            first_name: Set(None),
            last_name: Set(None),
            role_id: Set(Some(admin_role.id)),
            discord_user_id: Set(Some(discord_user_id.to_string())),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?
    };
    txn.commit().await?;

    info!(profile = %admin.id, discord_user_id, "Bootstrap administrator ready");
    Ok(admin)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{core::workflow::load_workflow, test_utils::setup_test_db};

    const SAMPLE: &str = r#"
        [[stages]]
        name = "Tasarım"
        tasks = ["Ölçü", "Çizim"]

        [[stages]]
        name = "Üretim"
        tasks = ["Kesim", "Montaj", "Boya"]

        [[stages]]
        name = "Teslimat"

        [[roles]]
        name = "Muhasebe"
        permissions = ["can_view_financials", "can_manage_expenses"]

        [[roles]]
        name = "Usta"
    "#;

    #[test]
    fn test_parse_seed_config() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.stages.len(), 3);
        assert_eq!(config.stages[1].tasks, vec!["Kesim", "Montaj", "Boya"]);
        assert!(config.stages[2].tasks.is_empty());

        let accounting = config.roles[0].permission_set().unwrap();
        assert!(accounting.contains(Capability::ViewFinancials));
        assert!(accounting.contains(Capability::ManageExpenses));
        assert!(!accounting.contains(Capability::DeletePayment));
        assert_eq!(config.roles[1].permission_set().unwrap(), PermissionSet::none());
    }

    #[test]
    fn test_unknown_capability_is_config_error() {
        let role = RoleConfig {
            name: "X".to_string(),
            permissions: vec!["can_fly".to_string()],
        };
        assert!(matches!(role.permission_set(), Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        let config: Config = toml::from_str(SAMPLE).unwrap();

        let first = seed_database(&db, &config).await?;
        assert_eq!(
            first,
            SeedSummary {
                stages: 3,
                sub_stages: 5,
                roles: 2
            }
        );
        let second = seed_database(&db, &config).await?;
        assert_eq!(second, SeedSummary::default());

        let workflow = load_workflow(&db).await?;
        let names: Vec<&str> = workflow.stages().iter().map(|s| s.stage.name.as_str()).collect();
        assert_eq!(names, vec!["Tasarım", "Üretim", "Teslimat"]);
        assert_eq!(workflow.stages()[1].sub_stages[2].name, "Boya");
        assert_eq!(workflow.stages()[1].sub_stages[2].order_index, 3);

        // Muhasebe, Usta and the administrator role
        assert_eq!(Role::find().count(&db).await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_config_still_ensures_admin() -> Result<()> {
        let db = setup_test_db().await?;
        seed_database(&db, &Config::default()).await?;
        let admin = roles::find_role_by_name(&db, roles::ADMIN_ROLE_NAME).await?.unwrap();
        assert_eq!(PermissionSet::from_json(&admin.permissions), PermissionSet::all());
        Ok(())
    }

    #[tokio::test]
    async fn test_bootstrap_admin_creates_then_reuses() -> Result<()> {
        let db = setup_test_db().await?;
        let created = ensure_bootstrap_admin(&db, "4242", "Owner@Example.com").await?;
        assert_eq!(created.id, "discord-4242");
        assert_eq!(created.email, "owner@example.com");
        assert_eq!(created.discord_user_id.as_deref(), Some("4242"));

        let again = ensure_bootstrap_admin(&db, "4242", "owner@example.com").await?;
        assert_eq!(again.id, created.id);
        assert_eq!(Profile::find().count(&db).await?, 1);

        let admin_role = roles::find_role_by_name(&db, roles::ADMIN_ROLE_NAME).await?.unwrap();
        assert_eq!(again.role_id, Some(admin_role.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_bootstrap_admin_promotes_existing_profile() -> Result<()> {
        let db = setup_test_db().await?;
        crate::test_utils::create_test_profile(&db, "acc-7", None).await?;

        let promoted = ensure_bootstrap_admin(&db, "99", "acc-7@example.com").await?;
        assert_eq!(promoted.id, "acc-7");
        assert_eq!(promoted.discord_user_id.as_deref(), Some("99"));
        assert!(promoted.role_id.is_some());

        assert!(matches!(
            ensure_bootstrap_admin(&db, " ", "x@example.com").await,
            Err(Error::Config { .. })
        ));
        Ok(())
    }
}

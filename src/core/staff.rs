//! Staff management - provisioning accounts and mirroring them into profiles.
//!
//! Account changes go through the external [`IdentityProvisioner`]; only once it
//! reports success is the local profile row written. A provisioning failure leaves
//! the profiles table untouched, and an account whose profile cannot be written is
//! deleted again.

use crate::{
    core::{
        activity::{Activity, ActivityLog},
        rbac::{Capability, Session},
    },
    entities::{ActivityType, Profile, Role, profile, role},
    errors::{Error, Result},
    services::{AccountUpdate, IdentityProvisioner, NewAccount},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use serde_json::json;
use tracing::{info, warn};

/// Shortest password the identity service accepts.
pub const MIN_PASSWORD_LEN: usize = 6;

/// A new staff account.
#[derive(Clone, Debug, Default)]
pub struct StaffInput {
    /// Login email
    pub email: String,
    /// Initial password
    pub password: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Role to assign
    pub role_id: i64,
}

/// Changes to an existing staff account. `None` leaves a field unchanged.
#[derive(Clone, Debug, Default)]
pub struct StaffUpdate {
    /// New login email
    pub email: Option<String>,
    /// New password
    pub password: Option<String>,
    /// New given name
    pub first_name: Option<String>,
    /// New family name
    pub last_name: Option<String>,
    /// New role
    pub role_id: Option<i64>,
}

/// Rejects anything that is not shaped like `local@domain.tld`.
pub fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    let well_formed = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && !domain.contains('@')
            && domain.split('.').count() >= 2
            && domain.split('.').all(|part| !part.is_empty())
    }) && !email.chars().any(char::is_whitespace);
    if well_formed {
        Ok(())
    } else {
        Err(Error::validation(format!("'{email}' is not a valid email address")))
    }
}

/// Rejects passwords shorter than [`MIN_PASSWORD_LEN`].
pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

async fn require_role(db: &DatabaseConnection, role_id: i64) -> Result<role::Model> {
    Role::find_by_id(role_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::validation(format!("Role {role_id} does not exist")))
}

async fn require_profile(db: &DatabaseConnection, profile_id: &str) -> Result<profile::Model> {
    Profile::find_by_id(profile_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Profile", profile_id))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Staff members with their roles, oldest account first.
pub async fn list_staff(
    db: &DatabaseConnection,
) -> Result<Vec<(profile::Model, Option<role::Model>)>> {
    Profile::find()
        .find_also_related(Role)
        .order_by_asc(profile::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Finds the profile linked to a chat user id.
pub async fn find_by_discord_id(
    db: &DatabaseConnection,
    discord_user_id: &str,
) -> Result<Option<profile::Model>> {
    Profile::find()
        .filter(profile::Column::DiscordUserId.eq(discord_user_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Provisions an account and records its profile.
pub async fn create_staff(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    identity: &dyn IdentityProvisioner,
    input: StaffInput,
) -> Result<profile::Model> {
    session.require(Capability::ManageStaff)?;
    validate_email(&input.email)?;
    validate_password(&input.password)?;
    let first_name = non_empty(&input.first_name)
        .ok_or_else(|| Error::validation("First name cannot be empty"))?;
    let role = require_role(db, input.role_id).await?;

    let account = NewAccount {
        email: input.email.trim().to_lowercase(),
        password: input.password,
        first_name,
        last_name: input.last_name.trim().to_string(),
        role_id: role.id,
    };
    let id = identity.create_account(&account).await?;

    let inserted = profile::ActiveModel {
        id: Set(id.clone()),
        email: Set(account.email),
        first_name: Set(Some(account.first_name)),
        last_name: Set(non_empty(&account.last_name)),
        role_id: Set(Some(role.id)),
        discord_user_id: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await;
    let profile = match inserted {
        Ok(profile) => profile,
        Err(e) => {
            if let Err(cleanup) = identity.delete_account(&id).await {
                warn!(account_id = %id, "Failed to remove orphaned account: {}", cleanup);
            }
            return Err(e.into());
        }
    };

    info!(profile_id = %profile.id, role = %role.name, "Staff account created");
    log.record(
        session,
        Activity::new(
            ActivityType::Create,
            "Staff created",
            format!("{} joined as {}", profile.display_name(), role.name),
        )
        .with_metadata(json!({ "profile_id": profile.id, "role_id": role.id })),
    );
    Ok(profile)
}

/// Applies `update` to the account and then to its profile.
pub async fn update_staff(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    identity: &dyn IdentityProvisioner,
    profile_id: &str,
    update: StaffUpdate,
) -> Result<profile::Model> {
    session.require(Capability::ManageStaff)?;
    let existing = require_profile(db, profile_id).await?;
    if let Some(email) = &update.email {
        validate_email(email)?;
    }
    if let Some(password) = &update.password {
        validate_password(password)?;
    }
    if let Some(role_id) = update.role_id {
        require_role(db, role_id).await?;
    }

    let account = AccountUpdate {
        id: existing.id.clone(),
        email: update.email.as_deref().map(|e| e.trim().to_lowercase()),
        password: update.password,
        first_name: update.first_name.as_deref().map(|n| n.trim().to_string()),
        last_name: update.last_name.as_deref().map(|n| n.trim().to_string()),
        role_id: update.role_id,
    };
    identity.update_account(&account).await?;

    let mut active: profile::ActiveModel = existing.into();
    if let Some(email) = account.email {
        active.email = Set(email);
    }
    if let Some(first_name) = account.first_name {
        active.first_name = Set(non_empty(&first_name));
    }
    if let Some(last_name) = account.last_name {
        active.last_name = Set(non_empty(&last_name));
    }
    if let Some(role_id) = account.role_id {
        active.role_id = Set(Some(role_id));
    }
    let profile = active.update(db).await?;

    log.record(
        session,
        Activity::new(
            ActivityType::Update,
            "Staff updated",
            format!("Account of {} updated", profile.display_name()),
        )
        .with_metadata(json!({
            "profile_id": profile.id,
            "password_changed": account.password.is_some(),
        })),
    );
    Ok(profile)
}

/// Deletes an account and its profile. Principals cannot delete themselves.
pub async fn delete_staff(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    identity: &dyn IdentityProvisioner,
    profile_id: &str,
) -> Result<()> {
    session.require(Capability::ManageStaff)?;
    if session.user_id() == Some(profile_id) {
        return Err(Error::validation("You cannot delete your own account"));
    }
    let existing = require_profile(db, profile_id).await?;

    identity.delete_account(&existing.id).await?;
    Profile::delete_by_id(existing.id.clone()).exec(db).await?;

    info!(profile_id, "Staff account deleted");
    log.record(
        session,
        Activity::new(
            ActivityType::Delete,
            "Staff deleted",
            format!("Account of {} deleted", existing.display_name()),
        )
        .with_metadata(json!({ "profile_id": existing.id })),
    );
    Ok(())
}

/// Links (or unlinks) a chat user id to a staff profile.
pub async fn link_discord_user(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    profile_id: &str,
    discord_user_id: Option<String>,
) -> Result<profile::Model> {
    session.require(Capability::ManageStaff)?;
    let existing = require_profile(db, profile_id).await?;

    let mut active: profile::ActiveModel = existing.into();
    active.discord_user_id = Set(discord_user_id);
    let profile = active.update(db).await?;

    log.record(
        session,
        Activity::new(
            ActivityType::Update,
            "Chat account linked",
            format!("Chat account of {} updated", profile.display_name()),
        )
        .with_metadata(json!({
            "profile_id": profile.id,
            "linked": profile.discord_user_id.is_some(),
        })),
    );
    Ok(profile)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::ConnectionTrait;

    fn input(email: &str, password: &str, role_id: i64) -> StaffInput {
        StaffInput {
            email: email.to_string(),
            password: password.to_string(),
            first_name: "Elif".to_string(),
            last_name: "Şahin".to_string(),
            role_id,
        }
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("elif@atolye.com").is_ok());
        assert!(validate_email(" elif@atolye.com.tr ").is_ok());
        for bad in ["", "elif", "@atolye.com", "elif@", "elif@atolye", "el if@a.com", "a@b@c.com", "a@.com"] {
            assert!(validate_email(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }

    #[tokio::test]
    async fn test_create_staff_mirrors_profile() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let identity = FakeProvisioner::default();
        let role = create_test_role(&db, "Usta", &[]).await?;

        let profile = create_staff(
            &db,
            &log,
            &admin,
            &identity,
            input("Elif@Atolye.com", "secret1", role.id),
        )
        .await?;
        assert_eq!(profile.email, "elif@atolye.com");
        assert_eq!(profile.role_id, Some(role.id));
        assert_eq!(profile.display_name(), "Elif Şahin");
        assert_eq!(identity.calls(), vec![format!("create:{}", profile.id)]);

        let staff = list_staff(&db).await?;
        assert!(staff.iter().any(|(p, r)| p.id == profile.id && r.as_ref().unwrap().id == role.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_staff_validation_never_reaches_service() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let identity = FakeProvisioner::default();
        let role = create_test_role(&db, "Usta", &[]).await?;

        for bad in [
            input("not-an-email", "secret1", role.id),
            input("elif@atolye.com", "123", role.id),
            input("elif@atolye.com", "secret1", 999),
        ] {
            let result = create_staff(&db, &log, &admin, &identity, bad).await;
            assert!(matches!(result, Err(Error::Validation { .. })));
        }
        let mut nameless = input("elif@atolye.com", "secret1", role.id);
        nameless.first_name = " ".to_string();
        assert!(create_staff(&db, &log, &admin, &identity, nameless).await.is_err());

        let outsider = session_with(&db, "outsider", &[Capability::ManageSettings]).await?;
        let result = create_staff(
            &db,
            &log,
            &outsider,
            &identity,
            input("elif@atolye.com", "secret1", role.id),
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::PermissionDenied {
                capability: Capability::ManageStaff
            })
        ));
        assert!(identity.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_provisioning_failure_leaves_profiles_untouched() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let identity = FakeProvisioner::failing();
        let role = create_test_role(&db, "Usta", &[]).await?;
        let before = list_staff(&db).await?.len();

        let result = create_staff(
            &db,
            &log,
            &admin,
            &identity,
            input("elif@atolye.com", "secret1", role.id),
        )
        .await;
        assert!(matches!(result, Err(Error::Identity { .. })));
        assert_eq!(list_staff(&db).await?.len(), before);
        Ok(())
    }

    #[tokio::test]
    async fn test_profile_failure_removes_provisioned_account() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let identity = FakeProvisioner::default();
        let role = create_test_role(&db, "Usta", &[]).await?;
        let before = list_staff(&db).await?.len();
        db.execute_unprepared(
            "CREATE TRIGGER block_profiles BEFORE INSERT ON profiles \
             BEGIN SELECT RAISE(ABORT, 'insert blocked'); END",
        )
        .await?;

        let result = create_staff(
            &db,
            &log,
            &admin,
            &identity,
            input("elif@atolye.com", "secret1", role.id),
        )
        .await;
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(identity.calls(), vec!["create:staff-1", "delete:staff-1"]);
        assert_eq!(list_staff(&db).await?.len(), before);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_and_delete_staff() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let identity = FakeProvisioner::default();
        let usta = create_test_role(&db, "Usta", &[]).await?;
        let muhasebe = create_test_role(&db, "Muhasebe", &[Capability::ViewFinancials]).await?;
        let profile = create_staff(
            &db,
            &log,
            &admin,
            &identity,
            input("elif@atolye.com", "secret1", usta.id),
        )
        .await?;

        let short = StaffUpdate {
            password: Some("123".to_string()),
            ..Default::default()
        };
        assert!(update_staff(&db, &log, &admin, &identity, &profile.id, short).await.is_err());

        let updated = update_staff(
            &db,
            &log,
            &admin,
            &identity,
            &profile.id,
            StaffUpdate {
                last_name: Some(String::new()),
                role_id: Some(muhasebe.id),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(updated.last_name, None);
        assert_eq!(updated.role_id, Some(muhasebe.id));
        assert_eq!(updated.email, "elif@atolye.com");

        let linked = link_discord_user(&db, &log, &admin, &profile.id, Some("4242".to_string())).await?;
        assert_eq!(linked.discord_user_id.as_deref(), Some("4242"));
        assert_eq!(find_by_discord_id(&db, "4242").await?.unwrap().id, profile.id);

        delete_staff(&db, &log, &admin, &identity, &profile.id).await?;
        assert!(Profile::find_by_id(profile.id.clone()).one(&db).await?.is_none());
        assert_eq!(
            identity.calls(),
            vec![
                format!("create:{}", profile.id),
                format!("update:{}", profile.id),
                format!("delete:{}", profile.id),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_cannot_delete_self() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let identity = FakeProvisioner::default();

        let result = delete_staff(&db, &log, &admin, &identity, ADMIN_ID).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        assert!(identity.calls().is_empty());
        Ok(())
    }
}

//! Bot layer - Discord-specific interface and command handlers
//!
//! This module provides the Discord interface for the workshop tracker, including
//! all slash commands, autocomplete handlers, and bot context management.
//!
//! Every Discord user acts through the staff profile linked to their Discord id.
//! Sessions are resolved on first use and cached until `/refresh` or a role edit.

/// Discord command implementations (projects, workflow, ledger, admin, general)
pub mod commands;
/// Discord interaction handlers (autocomplete, errors)
pub mod handlers;
/// Parsing of project, stage and task references typed into commands
pub mod lookup;

use crate::{
    core::{activity::ActivityLog, rbac::Session, staff},
    errors::{Error, Result},
    services::{IdentityProvisioner, ObjectStorage},
};
use sea_orm::DatabaseConnection;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::debug;

/// Shared data available to all bot commands.
/// This structure holds the database connection, the external services and the
/// per-user session cache.
pub struct BotData {
    /// Database connection for all database operations
    pub database: DatabaseConnection,
    /// Background activity writer
    pub activity: ActivityLog,
    /// Object storage for project files
    pub storage: Arc<dyn ObjectStorage>,
    /// Account provisioning, absent when not configured
    pub identity: Option<Arc<dyn IdentityProvisioner>>,
    sessions: Mutex<HashMap<u64, Session>>,
}

impl BotData {
    /// Creates a new `BotData` instance.
    #[must_use]
    pub fn new(
        database: DatabaseConnection,
        activity: ActivityLog,
        storage: Arc<dyn ObjectStorage>,
        identity: Option<Arc<dyn IdentityProvisioner>>,
    ) -> Self {
        Self {
            database,
            activity,
            storage,
            identity,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The cached session of a Discord user, resolving it on first use.
    pub async fn session_for(&self, discord_user_id: u64) -> Result<Session> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(&discord_user_id) {
            return Ok(session.clone());
        }
        let session = resolve_session(&self.database, discord_user_id).await?;
        sessions.insert(discord_user_id, session.clone());
        Ok(session)
    }

    /// Drops the cached session of one user and resolves it again.
    pub async fn refresh_session(&self, discord_user_id: u64) -> Result<Session> {
        self.sessions.lock().await.remove(&discord_user_id);
        self.session_for(discord_user_id).await
    }

    /// Drops every cached session so the next command re-reads roles.
    pub async fn invalidate_sessions(&self) {
        let mut sessions = self.sessions.lock().await;
        debug!(cached = sessions.len(), "Invalidating sessions");
        sessions.clear();
    }

    /// The identity provisioner. Staff commands are rejected when none is set up.
    pub fn identity(&self) -> Result<&dyn IdentityProvisioner> {
        self.identity
            .as_deref()
            .ok_or_else(|| Error::validation("Staff accounts cannot be managed: provisioning is not configured"))
    }
}

/// Builds the session of the profile linked to `discord_user_id`, or a
/// principal-less session when the Discord account is not linked.
pub async fn resolve_session(db: &DatabaseConnection, discord_user_id: u64) -> Result<Session> {
    match staff::find_by_discord_id(db, &discord_user_id.to_string()).await? {
        Some(profile) => Session::for_profile(db, &profile).await,
        None => {
            debug!(discord_user_id, "Discord user has no linked profile");
            Ok(Session::system())
        }
    }
}

/// Session of the user who invoked the command.
pub async fn session(ctx: poise::Context<'_, BotData, Error>) -> Result<Session> {
    ctx.data().session_for(ctx.author().id.get()).await
}

pub use commands::*;
pub use handlers::*;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::{rbac::Capability, staff::link_discord_user},
        test_utils::*,
    };

    fn bot_data(db: DatabaseConnection, log: ActivityLog) -> BotData {
        BotData::new(db, log, Arc::new(MemoryStorage::default()), None)
    }

    #[tokio::test]
    async fn test_unlinked_user_gets_empty_session() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let data = bot_data(db, log);
        let session = data.session_for(1234).await?;
        assert!(session.principal().is_none());
        assert!(matches!(session.require_principal(), Err(Error::Unauthenticated)));
        assert!(matches!(data.identity(), Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_session_is_cached_until_refresh() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let role = create_test_role(&db, "Usta", &[Capability::DeleteFile]).await?;
        create_test_profile(&db, "worker", Some(role.id)).await?;
        link_discord_user(&db, &log, &admin, "worker", Some("77".to_string())).await?;

        let data = bot_data(db.clone(), log);
        let first = data.session_for(77).await?;
        assert_eq!(first.user_id(), Some("worker"));
        assert!(first.has_permission(Capability::DeleteFile));

        set_role_permissions_raw(&db, role.id, &[]).await?;
        // The snapshot survives until it is refreshed.
        assert!(data.session_for(77).await?.has_permission(Capability::DeleteFile));
        assert!(!data.refresh_session(77).await?.has_permission(Capability::DeleteFile));

        set_role_permissions_raw(&db, role.id, &[Capability::DeleteComment]).await?;
        data.invalidate_sessions().await;
        assert!(data.session_for(77).await?.has_permission(Capability::DeleteComment));
        Ok(())
    }
}

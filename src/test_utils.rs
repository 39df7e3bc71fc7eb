//! Shared test utilities for `atelier-flow`.
//!
//! This module provides common helper functions for setting up test databases,
//! sessions and workflow fixtures, plus in-memory stand-ins for the external
//! services.

#![allow(clippy::unwrap_used)]

use crate::{
    core::{
        activity::ActivityLog,
        projects::{self, ProjectInput},
        rbac::{Capability, PermissionSet, Principal, Session},
        roles,
        workflow::{self, Workflow},
    },
    entities::{Role, profile, project, role},
    errors::{Error, Result},
    services::{AccountService, AccountUpdate, IdentityProvisioner, NewAccount, ObjectStorage},
};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Profile id of the administrator created by [`admin_session`].
pub const ADMIN_ID: &str = "admin";

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// A test database plus an activity writer attached to it.
pub async fn setup_test_env() -> Result<(DatabaseConnection, ActivityLog)> {
    let db = setup_test_db().await?;
    let log = ActivityLog::spawn(db.clone());
    Ok((db, log))
}

/// Creates a role granting exactly `capabilities`.
pub async fn create_test_role(
    db: &DatabaseConnection,
    name: &str,
    capabilities: &[Capability],
) -> Result<role::Model> {
    role::ActiveModel {
        name: Set(name.to_string()),
        permissions: Set(PermissionSet::from_granted(capabilities.iter().copied()).to_json()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates a profile with email `{id}@example.com`.
pub async fn create_test_profile(
    db: &DatabaseConnection,
    id: &str,
    role_id: Option<i64>,
) -> Result<profile::Model> {
    profile::ActiveModel {
        id: Set(id.to_string()),
        email: Set(format!("{id}@example.com")),
        first_name: Set(None),
        last_name: Set(None),
        role_id: Set(role_id),
        discord_user_id: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Overwrites a role's permissions directly, bypassing every gate.
pub async fn set_role_permissions_raw(
    db: &DatabaseConnection,
    role_id: i64,
    capabilities: &[Capability],
) -> Result<()> {
    let existing = Role::find_by_id(role_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Role", role_id))?;
    let mut active: role::ActiveModel = existing.into();
    active.permissions = Set(PermissionSet::from_granted(capabilities.iter().copied()).to_json());
    active.update(db).await?;
    Ok(())
}

/// Session of an administrator profile holding every capability.
pub async fn admin_session(db: &DatabaseConnection) -> Result<Session> {
    let role = roles::ensure_admin_role(db).await?;
    let profile = match profile::Entity::find_by_id(ADMIN_ID.to_string()).one(db).await? {
        Some(existing) => existing,
        None => create_test_profile(db, ADMIN_ID, Some(role.id)).await?,
    };
    Session::for_profile(db, &profile).await
}

/// Session of a new profile `id` whose own role grants `capabilities`.
pub async fn session_with(
    db: &DatabaseConnection,
    id: &str,
    capabilities: &[Capability],
) -> Result<Session> {
    let role = create_test_role(db, &format!("role:{id}"), capabilities).await?;
    let profile = create_test_profile(db, id, Some(role.id)).await?;
    Session::for_profile(db, &profile).await
}

/// Creates a project for `customer_name` with sensible defaults.
pub async fn create_test_project(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    customer_name: &str,
    total_amount: f64,
) -> Result<project::Model> {
    projects::create_project(
        db,
        log,
        session,
        ProjectInput {
            customer_name: customer_name.to_string(),
            phone: "0555 000 00 00".to_string(),
            email: None,
            address: "İstanbul".to_string(),
            total_amount,
        },
    )
    .await
}

/// Appends stages in order and returns their ids.
pub async fn seed_stages(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    names: &[&str],
) -> Result<Vec<i64>> {
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        ids.push(workflow::add_stage(db, log, session, name).await?.id);
    }
    Ok(ids)
}

/// Builds a workflow of stages with their tasks and returns the loaded read model.
pub async fn seed_workflow(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    shape: &[(&str, &[&str])],
) -> Result<Workflow> {
    for (stage_name, tasks) in shape {
        let stage = workflow::add_stage(db, log, session, stage_name).await?;
        for task in *tasks {
            workflow::add_sub_stage(db, log, session, stage.id, task).await?;
        }
    }
    workflow::load_workflow(db).await
}

/// Object storage kept in memory.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail: bool,
}

impl MemoryStorage {
    /// A store whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Whether an object is stored at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    fn check(&self) -> Result<()> {
        if self.fail {
            return Err(Error::Storage {
                message: "storage offline".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn store(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        self.check()?;
        self.objects.lock().unwrap().insert(path.to_string(), bytes);
        Ok(())
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        self.check()?;
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Storage {
                message: format!("{path} not found"),
            })
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.check()?;
        self.objects.lock().unwrap().remove(path);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://{path}")
    }
}

/// Account service with a fixed set of users and one valid verification code.
pub struct FakeAccounts {
    users: Vec<(Principal, String)>,
    current: Mutex<Option<Principal>>,
}

impl FakeAccounts {
    /// The only verification code accepted.
    pub const CODE: &'static str = "AB12CD34";

    /// Accounts holding a single user.
    pub fn with_user(id: &str, email: &str, password: &str) -> Self {
        Self {
            users: vec![(
                Principal {
                    id: id.to_string(),
                    email: email.to_string(),
                },
                password.to_string(),
            )],
            current: Mutex::new(None),
        }
    }

    fn find(&self, email: &str) -> Option<&(Principal, String)> {
        self.users.iter().find(|(p, _)| p.email == email)
    }

    fn start(&self, principal: &Principal) -> Principal {
        *self.current.lock().unwrap() = Some(principal.clone());
        principal.clone()
    }
}

#[async_trait]
impl AccountService for FakeAccounts {
    async fn current_principal(&self) -> Result<Option<Principal>> {
        Ok(self.current.lock().unwrap().clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal> {
        match self.find(email) {
            Some((principal, expected)) if expected == password => Ok(self.start(principal)),
            _ => Err(Error::Unauthenticated),
        }
    }

    async fn verify_code(&self, email: &str, code: &str) -> Result<Principal> {
        match self.find(email) {
            Some((principal, _)) if code == Self::CODE => Ok(self.start(principal)),
            _ => Err(Error::Unauthenticated),
        }
    }

    async fn sign_out(&self) -> Result<()> {
        *self.current.lock().unwrap() = None;
        Ok(())
    }

    async fn verify_password(&self, email: &str, password: &str) -> Result<bool> {
        Ok(self.find(email).is_some_and(|(_, expected)| expected == password))
    }
}

/// Identity provisioner that records calls and issues `staff-N` ids.
#[derive(Default)]
pub struct FakeProvisioner {
    calls: Mutex<Vec<String>>,
    next_id: AtomicUsize,
    fail: bool,
}

impl FakeProvisioner {
    /// A provisioner whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Calls made so far, as `create:<id>`, `update:<id>` or `delete:<id>`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        if self.fail {
            return Err(Error::Identity {
                message: "functions unavailable".to_string(),
            });
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl IdentityProvisioner for FakeProvisioner {
    async fn create_account(&self, _account: &NewAccount) -> Result<String> {
        let id = format!("staff-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.record(format!("create:{id}"))?;
        Ok(id)
    }

    async fn update_account(&self, update: &AccountUpdate) -> Result<()> {
        self.record(format!("update:{}", update.id))
    }

    async fn delete_account(&self, id: &str) -> Result<()> {
        self.record(format!("delete:{id}"))
    }
}

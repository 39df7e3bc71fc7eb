//! External collaborators - narrow interfaces to the services the core relies on
//! but does not own: the account service, object storage, and the privileged
//! identity-provisioning functions.

/// Reqwest client for the identity-provisioning functions
pub mod identity;
/// Filesystem-backed object storage
pub mod storage;

use crate::{core::rbac::Principal, errors::Result};
use async_trait::async_trait;
use serde::Serialize;

pub use identity::HttpIdentityProvisioner;
pub use storage::LocalObjectStorage;

/// Authentication and session service.
///
/// The Discord bot does not use it: chat users act through the profile linked to
/// their Discord id. It backs the sign-in flow in [`crate::core::session`] for
/// front ends that authenticate with email and password.
#[async_trait]
pub trait AccountService: Send + Sync {
    /// The principal of the current authenticated session, if any.
    async fn current_principal(&self) -> Result<Option<Principal>>;

    /// Signs in with email and password.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal>;

    /// Signs in with a one-time verification code sent to `email`.
    async fn verify_code(&self, email: &str, code: &str) -> Result<Principal>;

    /// Ends the current authenticated session.
    async fn sign_out(&self) -> Result<()>;

    /// Checks a password for `email` without changing the session.
    async fn verify_password(&self, email: &str, password: &str) -> Result<bool>;
}

/// Binary object store addressed by path.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores `bytes` at `path`, replacing any existing object.
    async fn store(&self, path: &str, bytes: Vec<u8>) -> Result<()>;

    /// Reads the object at `path`.
    async fn fetch(&self, path: &str) -> Result<Vec<u8>>;

    /// Removes the object at `path`. Removing a missing object succeeds.
    async fn remove(&self, path: &str) -> Result<()>;

    /// Stable public URL of the object at `path`.
    fn public_url(&self, path: &str) -> String;
}

/// Payload of the create-account function.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
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

/// Payload of the update-account function. `None` fields are left unchanged.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    /// Account to update
    pub id: String,
    /// New login email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// New password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// New given name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// New family name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// New role
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<i64>,
}

/// Privileged account provisioning. Implementations hold the service credentials;
/// the core only calls them and interprets success or failure.
#[async_trait]
pub trait IdentityProvisioner: Send + Sync {
    /// Creates an account and returns its id.
    async fn create_account(&self, account: &NewAccount) -> Result<String>;

    /// Updates an existing account.
    async fn update_account(&self, update: &AccountUpdate) -> Result<()>;

    /// Deletes an account.
    async fn delete_account(&self, id: &str) -> Result<()>;
}

//! External service settings from environment variables.
//!
//! Object storage always has a usable local default. The identity-provisioning
//! functions are optional: without `IDENTITY_FUNCTIONS_URL` and
//! `IDENTITY_SERVICE_KEY` staff management is unavailable and says so.

use crate::{
    errors::Result,
    services::{HttpIdentityProvisioner, LocalObjectStorage},
};
use std::path::PathBuf;
use tracing::warn;

/// Default directory for uploaded files.
pub const DEFAULT_STORAGE_ROOT: &str = "data/files";
/// Default public base URL for uploaded files.
pub const DEFAULT_STORAGE_PUBLIC_URL: &str = "http://localhost:8080/files";

/// Settings for the external collaborators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Directory holding uploaded files
    pub storage_root: PathBuf,
    /// Base URL the storage directory is served under
    pub storage_public_url: String,
    /// Base URL of the identity-provisioning functions
    pub identity_functions_url: Option<String>,
    /// Service key for the identity-provisioning functions
    pub identity_service_key: Option<String>,
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl ServiceSettings {
    /// Reads `STORAGE_ROOT`, `STORAGE_PUBLIC_URL`, `IDENTITY_FUNCTIONS_URL` and
    /// `IDENTITY_SERVICE_KEY`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            storage_root: non_empty_var("STORAGE_ROOT")
                .unwrap_or_else(|| DEFAULT_STORAGE_ROOT.to_string())
                .into(),
            storage_public_url: non_empty_var("STORAGE_PUBLIC_URL")
                .unwrap_or_else(|| DEFAULT_STORAGE_PUBLIC_URL.to_string()),
            identity_functions_url: non_empty_var("IDENTITY_FUNCTIONS_URL"),
            identity_service_key: non_empty_var("IDENTITY_SERVICE_KEY"),
        }
    }

    /// The configured object store.
    #[must_use]
    pub fn object_storage(&self) -> LocalObjectStorage {
        LocalObjectStorage::new(&self.storage_root, &self.storage_public_url)
    }

    /// The identity-provisioning client, when both its URL and key are set.
    pub fn identity_provisioner(&self) -> Result<Option<HttpIdentityProvisioner>> {
        match (&self.identity_functions_url, &self.identity_service_key) {
            (Some(url), Some(key)) => HttpIdentityProvisioner::new(url, key.clone()).map(Some),
            (Some(_), None) | (None, Some(_)) => {
                warn!("IDENTITY_FUNCTIONS_URL and IDENTITY_SERVICE_KEY must both be set; staff management disabled");
                Ok(None)
            }
            (None, None) => Ok(None),
        }
    }
}

//! Reqwest client for the serverless identity-provisioning functions.
//!
//! Each function is a JSON POST under one base URL, authenticated with the
//! service key. A 2xx response means the change was applied; anything else is
//! reported as [`Error::Identity`] carrying the function's own error text when it
//! sent one.

use super::{AccountUpdate, IdentityProvisioner, NewAccount};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`IdentityProvisioner`] calling the `create-user`, `update-user` and
/// `delete-user` functions.
pub struct HttpIdentityProvisioner {
    client: Client,
    base_url: Url,
    service_key: String,
}

impl HttpIdentityProvisioner {
    /// Builds a client for the functions hosted under `base_url`.
    pub fn new(base_url: &str, service_key: impl Into<String>) -> Result<Self> {
        // A trailing slash makes `Url::join` append rather than replace the last segment.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).map_err(|e| Error::Config {
            message: format!("Invalid identity functions URL '{base_url}': {e}"),
        })?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url,
            service_key: service_key.into(),
        })
    }

    fn endpoint(&self, function: &str) -> Result<Url> {
        self.base_url.join(function).map_err(|e| Error::Config {
            message: format!("Invalid identity function '{function}': {e}"),
        })
    }

    async fn invoke<T: Serialize + Sync>(&self, function: &str, payload: &T) -> Result<Vec<u8>> {
        let url = self.endpoint(function)?;
        debug!(%url, "Calling identity function");
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.service_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| identity_error(function, &e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| identity_error(function, &e.to_string()))?;
        if !status.is_success() {
            let message = error_message(&body).unwrap_or_else(|| status.to_string());
            warn!(function, %status, "Identity function failed: {}", message);
            return Err(identity_error(function, &message));
        }
        Ok(body.to_vec())
    }
}

fn identity_error(function: &str, message: &str) -> Error {
    Error::Identity {
        message: format!("{function}: {message}"),
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .map(|b| b.error)
}

#[derive(Deserialize)]
struct CreatedUser {
    id: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CreateResponse {
    Wrapped { user: CreatedUser },
    Flat(CreatedUser),
}

fn parse_created_id(body: &[u8]) -> Result<String> {
    let parsed: CreateResponse = serde_json::from_slice(body)
        .map_err(|e| identity_error("create-user", &format!("invalid response: {e}")))?;
    Ok(match parsed {
        CreateResponse::Wrapped { user } | CreateResponse::Flat(user) => user.id,
    })
}

#[async_trait]
impl IdentityProvisioner for HttpIdentityProvisioner {
    async fn create_account(&self, account: &NewAccount) -> Result<String> {
        let body = self.invoke("create-user", account).await?;
        parse_created_id(&body)
    }

    async fn update_account(&self, update: &AccountUpdate) -> Result<()> {
        self.invoke("update-user", update).await.map(drop)
    }

    async fn delete_account(&self, id: &str) -> Result<()> {
        self.invoke("delete-user", &json!({ "id": id })).await.map(drop)
    }
}

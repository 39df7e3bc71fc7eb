//! Role-based access control.
//!
//! Capabilities form a closed set so that every gate in the crate names one of them
//! by type. Which capabilities a role grants is data: it lives in the `roles` table as
//! a JSON map and is edited at runtime by administrators.
//!
//! A [`Session`] resolves the current principal's role once and answers
//! [`Session::has_permission`] from that snapshot. Edits to a role are picked up on
//! the next [`Session::refresh`], never pushed into sessions that are already open.

use crate::{
    entities::{Profile, Role, profile, role},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, EntityTrait};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::BTreeSet, fmt, str::FromStr};
use tracing::debug;

/// A named permission flag gating one class of action.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    /// Create, update and delete staff accounts
    #[serde(rename = "can_manage_staff")]
    ManageStaff,
    /// Edit the workflow definition, branding and roles
    #[serde(rename = "can_manage_settings")]
    ManageSettings,
    /// View payments, expenses and global accounting
    #[serde(rename = "can_view_financials")]
    ViewFinancials,
    /// Delete an income entry
    #[serde(rename = "can_delete_payment")]
    DeletePayment,
    /// Create and delete expense entries
    #[serde(rename = "can_manage_expenses")]
    ManageExpenses,
    /// Delete files uploaded by someone else
    #[serde(rename = "can_delete_file")]
    DeleteFile,
    /// Delete comments written by someone else
    #[serde(rename = "can_delete_comment")]
    DeleteComment,
}

impl Capability {
    /// Every capability, in display order.
    pub const ALL: [Self; 7] = [
        Self::ManageStaff,
        Self::ManageSettings,
        Self::ViewFinancials,
        Self::DeletePayment,
        Self::ManageExpenses,
        Self::DeleteFile,
        Self::DeleteComment,
    ];

    /// Storage key of the capability.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ManageStaff => "can_manage_staff",
            Self::ManageSettings => "can_manage_settings",
            Self::ViewFinancials => "can_view_financials",
            Self::DeletePayment => "can_delete_payment",
            Self::ManageExpenses => "can_manage_expenses",
            Self::DeleteFile => "can_delete_file",
            Self::DeleteComment => "can_delete_comment",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|capability| capability.as_str() == s.trim())
            .ok_or_else(|| Error::validation(format!("Unknown capability '{s}'")))
    }
}

/// The capabilities a role grants. Anything not listed is denied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionSet {
    granted: BTreeSet<Capability>,
}

impl PermissionSet {
    /// A set granting nothing.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            granted: BTreeSet::new(),
        }
    }

    /// A set granting every capability.
    #[must_use]
    pub fn all() -> Self {
        Self {
            granted: Capability::ALL.into_iter().collect(),
        }
    }

    /// Builds a set from the capabilities to grant.
    pub fn from_granted(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            granted: capabilities.into_iter().collect(),
        }
    }

    /// Reads the stored JSON map. Only an explicit `true` grants a capability;
    /// missing keys, other value types and non-object payloads all deny.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        let granted = Capability::ALL
            .into_iter()
            .filter(|capability| {
                value
                    .get(capability.as_str())
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
            })
            .collect();
        Self { granted }
    }

    /// Serializes to a JSON map holding every known capability.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = Capability::ALL
            .into_iter()
            .map(|capability| {
                (
                    capability.as_str().to_string(),
                    Value::Bool(self.contains(capability)),
                )
            })
            .collect();
        Value::Object(map)
    }

    /// Whether the capability is granted.
    #[must_use]
    pub fn contains(&self, capability: Capability) -> bool {
        self.granted.contains(&capability)
    }

    /// Grants or revokes one capability.
    pub fn set(&mut self, capability: Capability, enabled: bool) {
        if enabled {
            self.granted.insert(capability);
        } else {
            self.granted.remove(&capability);
        }
    }

    /// Granted capabilities in display order.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.granted.iter().copied()
    }
}

/// Identity of a signed-in staff member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    /// Profile id issued by the account service
    pub id: String,
    /// Login email
    pub email: String,
}

/// Role the session resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRole {
    /// Role id
    pub id: i64,
    /// Role name
    pub name: String,
}

/// Permission snapshot for one principal, valid until refreshed.
#[derive(Clone, Debug)]
pub struct Session {
    principal: Option<Principal>,
    role: Option<ResolvedRole>,
    permissions: PermissionSet,
    loaded_at: DateTime<Utc>,
}

impl Session {
    /// A session with no principal. Every gate denies; activity recorded under it is
    /// attributed to the system.
    #[must_use]
    pub fn system() -> Self {
        Self {
            principal: None,
            role: None,
            permissions: PermissionSet::none(),
            loaded_at: Utc::now(),
        }
    }

    /// Resolves the principal's profile and role and snapshots its permissions.
    ///
    /// A principal without a profile, or whose profile has no role (or a role that
    /// has since been deleted), gets an empty permission set.
    pub async fn load<C>(db: &C, principal: Principal) -> Result<Self>
    where
        C: ConnectionTrait,
    {
        let (role, permissions) = resolve_permissions(db, &principal.id).await?;
        debug!(
            principal = %principal.email,
            role = role.as_ref().map_or("<none>", |r| r.name.as_str()),
            granted = permissions.iter().count(),
            "Session permissions loaded"
        );
        Ok(Self {
            principal: Some(principal),
            role,
            permissions,
            loaded_at: Utc::now(),
        })
    }

    /// Builds a session directly from a profile row.
    pub async fn for_profile<C>(db: &C, profile: &profile::Model) -> Result<Self>
    where
        C: ConnectionTrait,
    {
        Self::load(
            db,
            Principal {
                id: profile.id.clone(),
                email: profile.email.clone(),
            },
        )
        .await
    }

    /// Re-reads the principal's role so that role edits take effect.
    pub async fn refresh<C>(&mut self, db: &C) -> Result<()>
    where
        C: ConnectionTrait,
    {
        if let Some(principal) = &self.principal {
            let (role, permissions) = resolve_permissions(db, &principal.id).await?;
            self.role = role;
            self.permissions = permissions;
        }
        self.loaded_at = Utc::now();
        Ok(())
    }

    /// Drops the principal and every cached permission.
    pub fn clear(&mut self) {
        *self = Self::system();
    }

    /// Current principal, if signed in.
    #[must_use]
    pub const fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Profile id of the current principal.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.principal.as_ref().map(|p| p.id.as_str())
    }

    /// Role the permissions were read from.
    #[must_use]
    pub const fn role(&self) -> Option<&ResolvedRole> {
        self.role.as_ref()
    }

    /// The cached permission set.
    #[must_use]
    pub const fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    /// When the snapshot was taken.
    #[must_use]
    pub const fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Whether the principal holds the capability. Fails closed.
    #[must_use]
    pub fn has_permission(&self, capability: Capability) -> bool {
        self.principal.is_some() && self.permissions.contains(capability)
    }

    /// Rejects with [`Error::PermissionDenied`] unless the capability is held.
    pub fn require(&self, capability: Capability) -> Result<()> {
        if self.has_permission(capability) {
            Ok(())
        } else {
            debug!(
                principal = self.user_id().unwrap_or("<system>"),
                %capability,
                "Permission denied"
            );
            Err(Error::PermissionDenied { capability })
        }
    }

    /// Returns the principal or [`Error::Unauthenticated`].
    pub fn require_principal(&self) -> Result<&Principal> {
        self.principal.as_ref().ok_or(Error::Unauthenticated)
    }

    /// Ownership override: the author of a record may always remove it; anyone else
    /// needs the capability.
    #[must_use]
    pub fn may_delete_authored(&self, author_id: Option<&str>, capability: Capability) -> bool {
        let is_author = matches!(
            (self.user_id(), author_id),
            (Some(me), Some(author)) if me == author
        );
        is_author || self.has_permission(capability)
    }

    /// [`Self::may_delete_authored`] as a gate.
    pub fn require_author_or(&self, author_id: Option<&str>, capability: Capability) -> Result<()> {
        if self.may_delete_authored(author_id, capability) {
            Ok(())
        } else {
            self.require_principal()?;
            Err(Error::PermissionDenied { capability })
        }
    }
}

async fn resolve_permissions<C>(
    db: &C,
    profile_id: &str,
) -> Result<(Option<ResolvedRole>, PermissionSet)>
where
    C: ConnectionTrait,
{
    let Some(profile) = Profile::find_by_id(profile_id.to_string()).one(db).await? else {
        return Ok((None, PermissionSet::none()));
    };
    let Some(role_id) = profile.role_id else {
        return Ok((None, PermissionSet::none()));
    };
    let role: Option<role::Model> = Role::find_by_id(role_id).one(db).await?;
    Ok(role.map_or_else(
        || (None, PermissionSet::none()),
        |r| {
            (
                Some(ResolvedRole {
                    id: r.id,
                    name: r.name.clone(),
                }),
                PermissionSet::from_json(&r.permissions),
            )
        },
    ))
}

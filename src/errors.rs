//! Unified error types and result handling.
//!
//! Every fallible operation in the crate returns [`Result`]. The variants follow the
//! four classes a user can observe: validation failures, permission denials,
//! missing references, and failures of one of the external services.

use thiserror::Error;

use crate::core::rbac::Capability;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input, rejected before any state change is attempted.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the offending input
        message: String,
    },

    /// The acting principal lacks the capability the action is gated on.
    #[error("Permission denied: {capability} is required")]
    PermissionDenied {
        /// Capability that was checked
        capability: Capability,
    },

    /// The action needs a signed-in principal and there is none.
    #[error("Not signed in")]
    Unauthenticated,

    /// A referenced record no longer exists.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record (e.g. "Stage", "Payment")
        entity: &'static str,
        /// Identifier that failed to resolve
        id: String,
    },

    /// The structured storage service failed.
    #[error("Database error: {0}")]
    Persistence(#[from] sea_orm::DbErr),

    /// The object storage service failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Failure reported by the storage backend
        message: String,
    },

    /// The account or identity-provisioning service failed or refused.
    #[error("Identity service error: {message}")]
    Identity {
        /// Failure reported by the identity service
        message: String,
    },

    /// Configuration could not be read or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong while loading configuration
        message: String,
    },

    /// Environment variable lookup failed.
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// Discord framework error.
    #[error("Serenity/Poise framework error: {0}")]
    Framework(Box<poise::serenity_prelude::Error>),

    /// Formatting a reply failed.
    #[error("Formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),
}

impl From<poise::serenity_prelude::Error> for Error {
    fn from(value: poise::serenity_prelude::Error) -> Self {
        Self::Framework(Box::new(value))
    }
}

impl Error {
    /// Shorthand for a [`Error::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::NotFound`] on a numeric id.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true for failures of an external service (database, storage, identity).
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_) | Self::Storage { .. } | Self::Identity { .. }
        )
    }

    /// Text shown to the user when an action is rejected.
    ///
    /// Validation and permission problems are explained precisely; service failures
    /// collapse into a generic message so backend details never leak into the chat.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { message } => format!("❌ {message}"),
            Self::PermissionDenied { capability } => {
                format!("⛔ You do not have permission for this action ({capability}).")
            }
            Self::Unauthenticated => {
                "⛔ Your Discord account is not linked to a staff profile.".to_string()
            }
            Self::NotFound { entity, id } => format!("❌ {entity} {id} was not found."),
            Self::Persistence(_) | Self::Storage { .. } | Self::Identity { .. } => {
                "⚠️ The operation failed. Please try again.".to_string()
            }
            Self::Config { .. } | Self::EnvVar(_) | Self::Framework(_) | Self::Fmt(_) => {
                "⚠️ An internal error occurred.".to_string()
            }
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

//! Discord command implementations organized by category.

#![allow(clippy::too_long_first_doc_paragraph)]

/// Role, staff, branding and dashboard commands
pub mod admin;

/// General utility commands
pub mod general;

/// Payment, expense and accounting commands
pub mod ledger;

/// Project commands
pub mod project;

/// Workflow definition commands
pub mod workflow;

// Export commands
pub use admin::*;
pub use general::*;
pub use ledger::*;
pub use project::*;
pub use workflow::*;

use crate::{bot::BotData, errors::Error};

/// Every command the bot registers.
#[must_use]
pub fn all_commands() -> Vec<poise::Command<BotData, Error>> {
    vec![
        ping(),
        help(),
        whoami(),
        refresh(),
        project(),
        workflow(),
        ledger(),
        accounting(),
        role(),
        staff(),
        branding(),
        dashboard(),
    ]
}

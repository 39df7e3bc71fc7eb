//! Core business logic - framework-agnostic workflow, access control, ledger and
//! reporting operations. Nothing in here knows about Discord.

/// Append-only activity log with a background writer
pub mod activity;
/// Project files and comments
pub mod attachments;
/// Payments, expenses and the accounting feed
pub mod ledger;
/// Per-project completion state and the derived cursor
pub mod progress;
/// Project records
pub mod projects;
/// Capabilities, permission sets and sessions
pub mod rbac;
/// Dense 1-based ordering shared by stages and sub-stages
pub mod reorder;
/// Dashboard aggregates and text formatting
pub mod report;
/// Role and permission store
pub mod roles;
/// Sign-in and re-authentication
pub mod session;
/// Key-value settings and branding
pub mod settings;
/// Staff accounts
pub mod staff;
/// Workflow definition manager and read model
pub mod workflow;

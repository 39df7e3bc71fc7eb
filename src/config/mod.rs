/// Database configuration and connection management
pub mod database;

/// Workflow and role seeding from config.toml
pub mod seed;

/// External service settings from environment variables
pub mod services;

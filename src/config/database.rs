//! Database configuration - connection and schema creation.
//!
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust
//! structs. Creation is idempotent and runs on every start.

use crate::entities::{
    ActivityEntry, Expense, Payment, Profile, Project, ProjectComment, ProjectFile, Role, Stage,
    SubStage, SubStageDetail, SystemState, sub_stage_detail,
};
use crate::errors::{Error, Result};
use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, EntityName, EntityTrait, Schema,
    sea_query::Index,
};
use tracing::debug;

/// Default `SQLite` location when `DATABASE_URL` is unset.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/atelier.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable or returns
/// the default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    if let Some(path) = database_url
        .strip_prefix("sqlite://")
        .and_then(|rest| rest.split('?').next())
        .and_then(|file| std::path::Path::new(file).parent())
        .filter(|dir| !dir.as_os_str().is_empty())
    {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| Error::Config {
                message: format!("Failed to create database directory {}: {e}", path.display()),
            })?;
    }
    Database::connect(&database_url).await.map_err(Into::into)
}

async fn create_table<C, E>(db: &C, schema: &Schema, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait + Copy,
{
    let builder = db.get_database_backend();
    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(builder.build(&table)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        db.execute(builder.build(&index)).await?;
    }
    debug!(table = entity.table_name(), "Table ready");
    Ok(())
}

/// Creates every table (parents before children) and the unique index backing the
/// per-task detail upsert.
pub async fn create_tables<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    create_table(db, &schema, Role).await?;
    create_table(db, &schema, Profile).await?;
    create_table(db, &schema, Stage).await?;
    create_table(db, &schema, SubStage).await?;
    create_table(db, &schema, Project).await?;
    create_table(db, &schema, SubStageDetail).await?;
    create_table(db, &schema, Payment).await?;
    create_table(db, &schema, Expense).await?;
    create_table(db, &schema, ProjectFile).await?;
    create_table(db, &schema, ProjectComment).await?;
    create_table(db, &schema, ActivityEntry).await?;
    create_table(db, &schema, SystemState).await?;

    let detail_unique = Index::create()
        .name("idx_sub_stage_details_task")
        .table(SubStageDetail)
        .col(sub_stage_detail::Column::ProjectId)
        .col(sub_stage_detail::Column::StageId)
        .col(sub_stage_detail::Column::SubStageId)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&detail_unique)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::{activity_entry, role, sub_stage_detail};
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, QuerySelect, Set};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        // Test that tables exist by querying them
        let _: Vec<role::Model> = Role::find().limit(1).all(&db).await?;
        let _: Vec<sub_stage_detail::Model> = SubStageDetail::find().limit(1).all(&db).await?;
        let _: Vec<activity_entry::Model> = ActivityEntry::find().limit(1).all(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_detail_triple_is_unique() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        let now = Utc::now();
        let project = crate::entities::project::ActiveModel {
            customer_name: Set("Ayla".to_string()),
            phone: Set(String::new()),
            email: Set(None),
            address: Set(String::new()),
            total_amount: Set(0.0),
            current_stage_id: Set(None),
            current_sub_stage_id: Set(None),
            notes: Set(String::new()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        let detail = || sub_stage_detail::ActiveModel {
            project_id: Set(project.id),
            stage_id: Set(1),
            sub_stage_id: Set(2),
            is_completed: Set(false),
            notes: Set(None),
            updated_at: Set(now),
            ..Default::default()
        };
        detail().insert(&db).await?;
        assert!(detail().insert(&db).await.is_err());
        Ok(())
    }
}

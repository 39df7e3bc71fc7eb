//! Project business logic - creating, editing and looking up customer projects.

use crate::{
    core::{
        activity::{Activity, ActivityLog},
        rbac::{Capability, Session},
    },
    entities::{ActivityType, Project, project},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use serde_json::json;
use tracing::info;

/// Customer and contract details of a project.
#[derive(Clone, Debug, Default)]
pub struct ProjectInput {
    /// Customer name, required
    pub customer_name: String,
    /// Customer phone
    pub phone: String,
    /// Customer email
    pub email: Option<String>,
    /// Delivery address
    pub address: String,
    /// Contract amount, zero or more
    pub total_amount: f64,
}

impl ProjectInput {
    fn validate(&self) -> Result<()> {
        if self.customer_name.trim().is_empty() {
            return Err(Error::validation("Customer name cannot be empty"));
        }
        if !self.total_amount.is_finite() || self.total_amount < 0.0 {
            return Err(Error::validation(format!(
                "Total amount must be zero or more (got {})",
                self.total_amount
            )));
        }
        if let Some(email) = self.email.as_deref().map(str::trim)
            && !email.is_empty()
            && !email.contains('@')
        {
            return Err(Error::validation(format!("'{email}' is not an email address")));
        }
        Ok(())
    }

    fn email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
    }
}

/// Creates a project. New projects have no cursor until their first task is toggled.
///
/// Setting a non-zero contract amount requires `can_view_financials`.
pub async fn create_project(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    input: ProjectInput,
) -> Result<project::Model> {
    session.require_principal()?;
    input.validate()?;
    if input.total_amount != 0.0 {
        session.require(Capability::ViewFinancials)?;
    }

    let now = Utc::now();
    let project = project::ActiveModel {
        customer_name: Set(input.customer_name.trim().to_string()),
        phone: Set(input.phone.trim().to_string()),
        email: Set(input.email()),
        address: Set(input.address.trim().to_string()),
        total_amount: Set(input.total_amount),
        current_stage_id: Set(None),
        current_sub_stage_id: Set(None),
        notes: Set(String::new()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(project_id = project.id, customer = %project.customer_name, "Project created");
    log.record(
        session,
        Activity::new(
            ActivityType::Create,
            "Project created",
            format!("Project for {} created", project.customer_name),
        )
        .for_project(project.id)
        .with_metadata(json!({ "total_amount": project.total_amount }))
        .financial(),
    );
    Ok(project)
}

/// Finds a project by id.
pub async fn get_project(db: &DatabaseConnection, project_id: i64) -> Result<Option<project::Model>> {
    Project::find_by_id(project_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// All projects, most recently created first.
pub async fn list_projects(db: &DatabaseConnection) -> Result<Vec<project::Model>> {
    Project::find()
        .order_by_desc(project::Column::CreatedAt)
        .order_by_desc(project::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

async fn require_project(db: &DatabaseConnection, project_id: i64) -> Result<project::Model> {
    get_project(db, project_id)
        .await?
        .ok_or_else(|| Error::not_found("Project", project_id))
}

/// Replaces the customer and contract details. Changing the contract amount
/// requires `can_view_financials`.
pub async fn update_project_details(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    project_id: i64,
    input: ProjectInput,
) -> Result<project::Model> {
    session.require_principal()?;
    input.validate()?;
    let existing = require_project(db, project_id).await?;
    let old_amount = existing.total_amount;
    if input.total_amount.to_bits() != old_amount.to_bits() {
        session.require(Capability::ViewFinancials)?;
    }

    let mut active: project::ActiveModel = existing.into();
    active.customer_name = Set(input.customer_name.trim().to_string());
    active.phone = Set(input.phone.trim().to_string());
    active.email = Set(input.email());
    active.address = Set(input.address.trim().to_string());
    active.total_amount = Set(input.total_amount);
    active.updated_at = Set(Utc::now());
    let project = active.update(db).await?;

    log.record(
        session,
        Activity::new(
            ActivityType::Update,
            "Project updated",
            format!("Details of {}'s project updated", project.customer_name),
        )
        .for_project(project_id)
        .with_metadata(json!({
            "old_total_amount": old_amount,
            "total_amount": project.total_amount,
        }))
        .financial(),
    );
    Ok(project)
}

/// Replaces the project's rich-text notes.
pub async fn update_project_notes(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    project_id: i64,
    notes: &str,
) -> Result<project::Model> {
    session.require_principal()?;
    let existing = require_project(db, project_id).await?;

    let mut active: project::ActiveModel = existing.into();
    active.notes = Set(notes.to_string());
    active.updated_at = Set(Utc::now());
    let project = active.update(db).await?;

    log.record(
        session,
        Activity::new(ActivityType::Update, "Notes updated", "Project notes were edited")
            .for_project(project_id),
    );
    Ok(project)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    fn input(name: &str, amount: f64) -> ProjectInput {
        ProjectInput {
            customer_name: name.to_string(),
            phone: "0555 000 00 00".to_string(),
            email: None,
            address: "Kadıköy, İstanbul".to_string(),
            total_amount: amount,
        }
    }

    #[tokio::test]
    async fn test_create_project_validation() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;

        let result = create_project(&db, &log, &admin, input("  ", 100.0)).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        let result = create_project(&db, &log, &admin, input("Ayla", -1.0)).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        let mut bad_email = input("Ayla", 1.0);
        bad_email.email = Some("not-an-email".to_string());
        let result = create_project(&db, &log, &admin, bad_email).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let result = create_project(&db, &log, &Session::system(), input("Ayla", 1.0)).await;
        assert!(matches!(result, Err(Error::Unauthenticated)));

        assert!(list_projects(&db).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_create_and_update_project() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;

        let mut new = input(" Ayla Kurt ", 0.0);
        new.email = Some(" ayla@example.com ".to_string());
        let project = create_project(&db, &log, &admin, new).await?;
        assert_eq!(project.customer_name, "Ayla Kurt");
        assert_eq!(project.email.as_deref(), Some("ayla@example.com"));
        assert_eq!(project.total_amount, 0.0);
        assert_eq!(project.current_stage_id, None);

        let updated =
            update_project_details(&db, &log, &admin, project.id, input("Ayla Kurt", 15_000.0))
                .await?;
        assert_eq!(updated.total_amount, 15_000.0);
        assert_eq!(updated.email, None);

        let noted =
            update_project_notes(&db, &log, &admin, project.id, "<p>Walnut, 2 doors</p>").await?;
        assert_eq!(noted.notes, "<p>Walnut, 2 doors</p>");

        log.flush().await;
        let entries = crate::core::activity::list_project_activity(&db, &admin, project.id, 10).await?;
        assert_eq!(entries.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_contract_amount_requires_financial_access() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let worker = session_with(&db, "worker", &[Capability::DeleteFile]).await?;

        let result = create_project(&db, &log, &worker, input("Deniz", 5_000.0)).await;
        assert!(matches!(
            result,
            Err(Error::PermissionDenied {
                capability: Capability::ViewFinancials
            })
        ));
        let project = create_project(&db, &log, &worker, input("Deniz", 0.0)).await?;

        let priced = update_project_details(&db, &log, &admin, project.id, input("Deniz", 9_000.0))
            .await?;
        assert_eq!(priced.total_amount, 9_000.0);

        let result = update_project_details(&db, &log, &worker, project.id, input("Deniz", 1.0)).await;
        assert!(matches!(result, Err(Error::PermissionDenied { .. })));
        assert_eq!(get_project(&db, project.id).await?.unwrap().total_amount, 9_000.0);

        // Other details stay editable while the amount is untouched.
        let renamed =
            update_project_details(&db, &log, &worker, project.id, input("Deniz Ak", 9_000.0))
                .await?;
        assert_eq!(renamed.customer_name, "Deniz Ak");
        assert_eq!(renamed.total_amount, 9_000.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_newest_first_and_missing_project() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        create_project(&db, &log, &admin, input("Ayla Kurt", 1.0)).await?;
        let newest = create_project(&db, &log, &admin, input("Nil", 1.0)).await?;

        let all = list_projects(&db).await?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, newest.id);

        let result = update_project_notes(&db, &log, &admin, 999, "x").await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        Ok(())
    }
}

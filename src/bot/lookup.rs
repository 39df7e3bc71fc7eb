//! Turns the free-text references users type (or pick from autocomplete) into ids.
//!
//! Projects are shown as `#12 Customer`, tasks as `Stage / Task`. Autocomplete
//! produces exactly these labels, but plain ids and bare task names are accepted too.

use crate::{
    core::{
        projects,
        rbac::{Capability, PermissionSet},
        roles::{self, RoleView},
        staff,
        workflow::{StageWithTasks, Workflow},
    },
    entities::{profile, project, sub_stage},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::DatabaseConnection;

/// Separator between stage and task in a task label.
pub const TASK_SEPARATOR: &str = " / ";

/// Label used for a project in autocomplete and replies.
#[must_use]
pub fn project_label(project: &project::Model) -> String {
    format!("#{} {}", project.id, project.customer_name)
}

/// Label used for a task in autocomplete.
#[must_use]
pub fn task_label(stage_name: &str, task_name: &str) -> String {
    format!("{stage_name}{TASK_SEPARATOR}{task_name}")
}

/// Extracts the project id from `#12 Customer`, `#12` or `12`.
pub fn parse_project_ref(reference: &str) -> Result<i64> {
    let trimmed = reference.trim();
    let digits: String = trimmed
        .strip_prefix('#')
        .unwrap_or(trimmed)
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits
        .parse()
        .map_err(|_| Error::validation(format!("'{trimmed}' does not name a project (use #id)")))
}

/// Loads the project a reference points at.
pub async fn require_project(db: &DatabaseConnection, reference: &str) -> Result<project::Model> {
    let project_id = parse_project_ref(reference)?;
    projects::get_project(db, project_id)
        .await?
        .ok_or_else(|| Error::not_found("Project", project_id))
}

/// Finds a stage by name.
pub fn find_stage<'a>(workflow: &'a Workflow, name: &str) -> Result<&'a StageWithTasks> {
    workflow
        .find_stage_by_name(name)
        .ok_or_else(|| Error::validation(format!("No stage named '{}'", name.trim())))
}

fn find_in_stage<'a>(stage: &'a StageWithTasks, name: &str) -> Option<&'a sub_stage::Model> {
    let wanted = name.trim().to_lowercase();
    stage
        .sub_stages
        .iter()
        .find(|sub| sub.name.to_lowercase() == wanted)
}

/// Resolves `Stage / Task`, or a bare task name when it is unique across the
/// workflow, to `(stage_id, sub_stage_id)`.
pub fn find_task(workflow: &Workflow, reference: &str) -> Result<(i64, i64)> {
    if let Some((stage_name, task_name)) = reference.split_once(TASK_SEPARATOR) {
        let stage = find_stage(workflow, stage_name)?;
        let task = find_in_stage(stage, task_name).ok_or_else(|| {
            Error::validation(format!(
                "Stage '{}' has no task named '{}'",
                stage.stage.name,
                task_name.trim()
            ))
        })?;
        return Ok((stage.stage.id, task.id));
    }

    let matches: Vec<(i64, i64)> = workflow
        .stages()
        .iter()
        .filter_map(|stage| find_in_stage(stage, reference).map(|t| (stage.stage.id, t.id)))
        .collect();
    match matches.as_slice() {
        [single] => Ok(*single),
        [] => Err(Error::validation(format!(
            "No task named '{}'",
            reference.trim()
        ))),
        _ => Err(Error::validation(format!(
            "'{}' exists in several stages; use 'Stage{TASK_SEPARATOR}Task'",
            reference.trim()
        ))),
    }
}

/// Finds a role by case-insensitive name.
pub async fn require_role(db: &DatabaseConnection, name: &str) -> Result<RoleView> {
    let wanted = name.trim().to_lowercase();
    roles::list_roles(db)
        .await?
        .into_iter()
        .find(|role| role.name.to_lowercase() == wanted)
        .ok_or_else(|| Error::validation(format!("No role named '{}'", name.trim())))
}

/// Finds a staff profile by email.
pub async fn require_staff(db: &DatabaseConnection, email: &str) -> Result<profile::Model> {
    let wanted = email.trim().to_lowercase();
    staff::list_staff(db)
        .await?
        .into_iter()
        .map(|(profile, _)| profile)
        .find(|profile| profile.email.to_lowercase() == wanted)
        .ok_or_else(|| Error::validation(format!("No staff member with email '{}'", email.trim())))
}

/// Parses a comma separated list of capability names.
pub fn parse_capabilities(text: &str) -> Result<PermissionSet> {
    text.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::parse::<Capability>)
        .collect::<Result<Vec<_>>>()
        .map(PermissionSet::from_granted)
}

/// Parses `YYYY-MM-DD` or `DD.MM.YYYY`.
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%d.%m.%Y"))
        .map_err(|_| Error::validation(format!("'{text}' is not a date (YYYY-MM-DD)")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_parse_project_ref() {
        assert_eq!(parse_project_ref("#12 Ayşe Yılmaz").unwrap(), 12);
        assert_eq!(parse_project_ref(" 7 ").unwrap(), 7);
        assert_eq!(parse_project_ref("#3").unwrap(), 3);
        assert!(parse_project_ref("Ayşe").is_err());
        assert!(parse_project_ref("#").is_err());
    }

    #[test]
    fn test_parse_capabilities() {
        let set = parse_capabilities("can_view_financials, can_delete_file,").unwrap();
        assert!(set.contains(Capability::ViewFinancials));
        assert!(set.contains(Capability::DeleteFile));
        assert!(!set.contains(Capability::ManageStaff));
        assert_eq!(parse_capabilities("").unwrap(), PermissionSet::none());
        assert!(matches!(
            parse_capabilities("can_view_financials, can_fly"),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        assert_eq!(parse_date("2024-05-17").unwrap(), expected);
        assert_eq!(parse_date("17.05.2024").unwrap(), expected);
        assert!(matches!(parse_date("yesterday"), Err(Error::Validation { .. })));
    }

    #[tokio::test]
    async fn test_find_task_by_label_and_bare_name() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let wf = seed_workflow(
            &db,
            &log,
            &admin,
            &[("Tasarım", &["Ölçü", "Kontrol"]), ("Üretim", &["Kesim", "Kontrol"])],
        )
        .await?;
        let production = wf.find_stage_by_name("Üretim").unwrap();

        let (stage_id, task_id) = find_task(&wf, "üretim / kesim")?;
        assert_eq!(stage_id, production.stage.id);
        assert_eq!(task_id, production.sub_stages[0].id);

        assert_eq!(find_task(&wf, "Kesim")?, (stage_id, task_id));
        assert_eq!(
            find_task(&wf, &task_label("Üretim", "Kontrol"))?,
            (stage_id, production.sub_stages[1].id)
        );
        assert!(find_task(&wf, "Kontrol").is_err());
        assert!(find_task(&wf, "Boya").is_err());
        assert!(find_task(&wf, "Montaj / Kesim").is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_require_project() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let project = create_test_project(&db, &log, &admin, "Ahmet", 1_000.0).await?;

        let found = require_project(&db, &project_label(&project)).await?;
        assert_eq!(found.id, project.id);
        assert!(matches!(
            require_project(&db, "#9999").await,
            Err(Error::NotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_require_role_and_staff() -> Result<()> {
        let db = setup_test_db().await?;
        let role = create_test_role(&db, "Muhasebe", &[Capability::ViewFinancials]).await?;
        create_test_profile(&db, "acc-1", Some(role.id)).await?;

        assert_eq!(require_role(&db, " muhasebe ").await?.id, role.id);
        assert!(require_role(&db, "Usta").await.is_err());
        assert_eq!(require_staff(&db, "ACC-1@example.com").await?.id, "acc-1");
        assert!(require_staff(&db, "nobody@example.com").await.is_err());
        Ok(())
    }
}

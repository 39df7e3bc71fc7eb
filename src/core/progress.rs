//! Project progress tracking against the shared workflow.
//!
//! Completion state lives in `sub_stage_details`, one row per (project, stage,
//! sub-stage), created lazily the first time a task is opened. Everything else is
//! derived on read:
//!
//! - the active stage is the first stage, in workflow order, with at least one
//!   incomplete sub-stage; stages without sub-stages are skipped by the search
//! - when every stage is complete the last stage is active
//! - progress is the share of stages up to and including the active one
//!
//! The derived cursor is the source of truth for "where is this project". The
//! `current_stage_id`/`current_sub_stage_id` columns on the project are rewritten
//! from it after every toggle and are never advanced independently.

use crate::{
    core::{
        activity::{Activity, ActivityLog},
        rbac::Session,
        workflow::Workflow,
    },
    entities::{ActivityType, Project, SubStageDetail, project, sub_stage_detail},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, TransactionTrait, prelude::*, sea_query::OnConflict};
use serde_json::json;
use std::collections::HashSet;
use tracing::info;

/// Where a stage sits relative to the active stage.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StageState {
    /// Before the active stage
    Completed,
    /// The stage currently being worked
    Active,
    /// After the active stage
    Future,
}

/// Current position of a project in the workflow.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Cursor {
    /// Active stage
    pub stage_id: i64,
    /// First incomplete task of the active stage; `None` once everything is done
    pub sub_stage_id: Option<i64>,
}

/// Derived summary of one stage for one project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageProgress {
    /// Stage id
    pub stage_id: i64,
    /// Stage name
    pub name: String,
    /// Position relative to the cursor
    pub state: StageState,
    /// Completed tasks in this stage
    pub completed: usize,
    /// Tasks in this stage
    pub total: usize,
}

/// Derived summary of a whole project.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectProgress {
    /// Per-stage breakdown in workflow order
    pub stages: Vec<StageProgress>,
    /// Active position, `None` when the workflow has no stages
    pub cursor: Option<Cursor>,
    /// Stage-based completion percentage
    pub percent: f64,
}

impl ProjectProgress {
    /// Whether every task of every stage is complete.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.cursor.is_some() && self.stages.iter().all(|s| s.completed == s.total)
    }
}

/// Completed (stage, sub-stage) pairs. Rows pointing at deleted definitions are
/// simply never looked up.
#[derive(Clone, Debug, Default)]
pub struct Completion {
    done: HashSet<(i64, i64)>,
}

impl Completion {
    /// Collects the completed pairs from detail rows.
    #[must_use]
    pub fn from_details(details: &[sub_stage_detail::Model]) -> Self {
        let done = details
            .iter()
            .filter(|d| d.is_completed)
            .map(|d| (d.stage_id, d.sub_stage_id))
            .collect();
        Self { done }
    }

    /// Whether the task is complete.
    #[must_use]
    pub fn is_done(&self, stage_id: i64, sub_stage_id: i64) -> bool {
        self.done.contains(&(stage_id, sub_stage_id))
    }
}

/// Finds the active stage and its first incomplete task.
#[must_use]
pub fn active_cursor(workflow: &Workflow, completion: &Completion) -> Option<Cursor> {
    for entry in workflow.stages() {
        let pending = entry
            .sub_stages
            .iter()
            .find(|sub| !completion.is_done(entry.stage.id, sub.id));
        if let Some(sub) = pending {
            return Some(Cursor {
                stage_id: entry.stage.id,
                sub_stage_id: Some(sub.id),
            });
        }
    }
    workflow.stages().last().map(|last| Cursor {
        stage_id: last.stage.id,
        sub_stage_id: None,
    })
}

/// Share of stages whose position is at or before `stage_id`, as 0-100.
/// An empty workflow or an unresolved stage yields 0.
#[must_use]
pub fn progress_percentage(workflow: &Workflow, stage_id: Option<i64>) -> f64 {
    let Some(position) = stage_id.and_then(|id| workflow.position_of(id)) else {
        return 0.0;
    };
    #[allow(clippy::cast_precision_loss)] // stage counts are tiny
    let percent = (position + 1) as f64 / workflow.len() as f64 * 100.0;
    percent
}

/// Builds the per-stage breakdown and cursor from completion records.
#[must_use]
pub fn compute_progress(workflow: &Workflow, details: &[sub_stage_detail::Model]) -> ProjectProgress {
    let completion = Completion::from_details(details);
    let cursor = active_cursor(workflow, &completion);
    let active_position = cursor.and_then(|c| workflow.position_of(c.stage_id));

    let stages = workflow
        .stages()
        .iter()
        .enumerate()
        .map(|(position, entry)| {
            let state = match active_position {
                Some(active) if position < active => StageState::Completed,
                Some(active) if position == active => StageState::Active,
                _ => StageState::Future,
            };
            StageProgress {
                stage_id: entry.stage.id,
                name: entry.stage.name.clone(),
                state,
                completed: entry
                    .sub_stages
                    .iter()
                    .filter(|sub| completion.is_done(entry.stage.id, sub.id))
                    .count(),
                total: entry.sub_stages.len(),
            }
        })
        .collect();

    ProjectProgress {
        stages,
        cursor,
        percent: progress_percentage(workflow, cursor.map(|c| c.stage_id)),
    }
}

/// All completion records of a project.
pub async fn list_details<C>(db: &C, project_id: i64) -> Result<Vec<sub_stage_detail::Model>>
where
    C: ConnectionTrait,
{
    SubStageDetail::find()
        .filter(sub_stage_detail::Column::ProjectId.eq(project_id))
        .all(db)
        .await
        .map_err(Into::into)
}

/// Progress of one project.
pub async fn project_progress(
    db: &DatabaseConnection,
    workflow: &Workflow,
    project_id: i64,
) -> Result<ProjectProgress> {
    let details = list_details(db, project_id).await?;
    Ok(compute_progress(workflow, &details))
}

/// The derived cursor of one project.
pub async fn get_active_cursor(
    db: &DatabaseConnection,
    workflow: &Workflow,
    project_id: i64,
) -> Result<Option<Cursor>> {
    let details = list_details(db, project_id).await?;
    Ok(active_cursor(workflow, &Completion::from_details(&details)))
}

fn check_task(workflow: &Workflow, stage_id: i64, sub_stage_id: i64) -> Result<()> {
    let entry = workflow
        .stage(stage_id)
        .ok_or_else(|| Error::not_found("Stage", stage_id))?;
    if entry.sub_stages.iter().any(|sub| sub.id == sub_stage_id) {
        Ok(())
    } else {
        Err(Error::not_found("Task", sub_stage_id))
    }
}

/// Returns the detail row for a task, inserting a pending one if none exists.
///
/// The insert is `ON CONFLICT DO NOTHING` against the (project, stage, sub-stage)
/// unique index, so repeated opens neither duplicate the row nor reset it.
pub async fn ensure_detail<C>(
    db: &C,
    project_id: i64,
    stage_id: i64,
    sub_stage_id: i64,
) -> Result<sub_stage_detail::Model>
where
    C: ConnectionTrait,
{
    let pending = sub_stage_detail::ActiveModel {
        project_id: Set(project_id),
        stage_id: Set(stage_id),
        sub_stage_id: Set(sub_stage_id),
        is_completed: Set(false),
        notes: Set(None),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    SubStageDetail::insert(pending)
        .on_conflict(
            OnConflict::columns([
                sub_stage_detail::Column::ProjectId,
                sub_stage_detail::Column::StageId,
                sub_stage_detail::Column::SubStageId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    SubStageDetail::find()
        .filter(sub_stage_detail::Column::ProjectId.eq(project_id))
        .filter(sub_stage_detail::Column::StageId.eq(stage_id))
        .filter(sub_stage_detail::Column::SubStageId.eq(sub_stage_id))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Task detail", sub_stage_id))
}

/// Opens a task for a project, creating its pending detail row on first access.
pub async fn open_sub_stage(
    db: &DatabaseConnection,
    workflow: &Workflow,
    project_id: i64,
    stage_id: i64,
    sub_stage_id: i64,
) -> Result<sub_stage_detail::Model> {
    check_task(workflow, stage_id, sub_stage_id)?;
    Project::find_by_id(project_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Project", project_id))?;
    ensure_detail(db, project_id, stage_id, sub_stage_id).await
}

async fn sync_cursor<C>(db: &C, workflow: &Workflow, project: project::Model) -> Result<Option<Cursor>>
where
    C: ConnectionTrait,
{
    let details = list_details(db, project.id).await?;
    let cursor = active_cursor(workflow, &Completion::from_details(&details));
    let mut active: project::ActiveModel = project.into();
    active.current_stage_id = Set(cursor.map(|c| c.stage_id));
    active.current_sub_stage_id = Set(cursor.and_then(|c| c.sub_stage_id));
    active.updated_at = Set(Utc::now());
    active.update(db).await?;
    Ok(cursor)
}

/// Flips a task between pending and completed for one project.
///
/// The flip and the refreshed cursor cache commit together; on failure nothing
/// changes and the error is returned to the caller.
pub async fn toggle_completion(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    workflow: &Workflow,
    project_id: i64,
    stage_id: i64,
    sub_stage_id: i64,
) -> Result<sub_stage_detail::Model> {
    session.require_principal()?;
    check_task(workflow, stage_id, sub_stage_id)?;

    let txn = db.begin().await?;
    let project = Project::find_by_id(project_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Project", project_id))?;
    let detail = ensure_detail(&txn, project_id, stage_id, sub_stage_id).await?;
    let completed = !detail.is_completed;

    let mut active: sub_stage_detail::ActiveModel = detail.into();
    active.is_completed = Set(completed);
    active.updated_at = Set(Utc::now());
    let detail = active.update(&txn).await?;
    let cursor = sync_cursor(&txn, workflow, project).await?;
    txn.commit().await?;

    let task = workflow.sub_stage_name(Some(sub_stage_id));
    let (title, verb) = if completed {
        ("Task completed", "completed")
    } else {
        ("Task reopened", "reopened")
    };
    info!(project_id, stage_id, sub_stage_id, completed, "Task toggled");
    log.record(
        session,
        Activity::new(
            ActivityType::Stage,
            title,
            format!(
                "'{task}' in stage '{}' was {verb}",
                workflow.stage_name(Some(stage_id))
            ),
        )
        .for_project(project_id)
        .with_metadata(json!({
            "stage_id": stage_id,
            "sub_stage_id": sub_stage_id,
            "is_completed": completed,
            "active_stage_id": cursor.map(|c| c.stage_id),
        })),
    );
    Ok(detail)
}

/// Stores working notes on a task, creating its detail row if needed.
pub async fn update_sub_stage_notes(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    workflow: &Workflow,
    project_id: i64,
    stage_id: i64,
    sub_stage_id: i64,
    notes: &str,
) -> Result<sub_stage_detail::Model> {
    session.require_principal()?;
    let detail = open_sub_stage(db, workflow, project_id, stage_id, sub_stage_id).await?;

    let notes = notes.trim();
    let mut active: sub_stage_detail::ActiveModel = detail.into();
    active.notes = Set((!notes.is_empty()).then(|| notes.to_string()));
    active.updated_at = Set(Utc::now());
    let detail = active.update(db).await?;

    log.record(
        session,
        Activity::new(
            ActivityType::Update,
            "Task notes updated",
            format!("Notes updated on '{}'", workflow.sub_stage_name(Some(sub_stage_id))),
        )
        .for_project(project_id)
        .with_metadata(json!({ "stage_id": stage_id, "sub_stage_id": sub_stage_id })),
    );
    Ok(detail)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::{
        entities::{stage, sub_stage},
        test_utils::*,
    };
    use sea_orm::{ConnectionTrait, PaginatorTrait};

    fn workflow(shape: &[usize]) -> Workflow {
        let mut stages = Vec::new();
        let mut subs = Vec::new();
        let mut next_sub = 100;
        for (stage_id, count) in (1..).zip(shape) {
            stages.push(stage::Model {
                id: stage_id,
                name: format!("Stage {stage_id}"),
                order_index: i32::try_from(stage_id).unwrap(),
            });
            for order in 1..=*count {
                subs.push(sub_stage::Model {
                    id: next_sub,
                    stage_id,
                    name: format!("Task {next_sub}"),
                    order_index: i32::try_from(order).unwrap(),
                });
                next_sub += 1;
            }
        }
        Workflow::from_parts(stages, subs)
    }

    fn done(pairs: &[(i64, i64)]) -> Vec<sub_stage_detail::Model> {
        pairs
            .iter()
            .zip(1..)
            .map(|(&(stage_id, sub_stage_id), id)| sub_stage_detail::Model {
                id,
                project_id: 1,
                stage_id,
                sub_stage_id,
                is_completed: true,
                notes: None,
                updated_at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn test_first_stage_with_incomplete_task_is_active() {
        // 3 stages x 2 tasks; tasks are 100..=105
        let wf = workflow(&[2, 2, 2]);
        let details = done(&[(1, 100), (1, 101), (2, 102)]);
        let progress = compute_progress(&wf, &details);

        assert_eq!(
            progress.cursor,
            Some(Cursor {
                stage_id: 2,
                sub_stage_id: Some(103)
            })
        );
        let states: Vec<_> = progress.stages.iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![StageState::Completed, StageState::Active, StageState::Future]
        );
        assert_eq!((progress.stages[1].completed, progress.stages[1].total), (1, 2));
        assert!((progress.percent - 200.0 / 3.0).abs() < 1e-9);
        assert!(!progress.is_finished());
    }

    #[test]
    fn test_fresh_project_starts_at_first_stage() {
        let wf = workflow(&[2, 1]);
        let progress = compute_progress(&wf, &[]);
        assert_eq!(progress.cursor.unwrap().stage_id, 1);
        assert_eq!(progress.percent, 50.0);
    }

    #[test]
    fn test_all_complete_makes_last_stage_active() {
        let wf = workflow(&[1, 1]);
        let progress = compute_progress(&wf, &done(&[(1, 100), (2, 101)]));
        assert_eq!(
            progress.cursor,
            Some(Cursor {
                stage_id: 2,
                sub_stage_id: None
            })
        );
        assert_eq!(progress.percent, 100.0);
        assert!(progress.is_finished());
    }

    #[test]
    fn test_empty_stage_is_skipped_but_counted() {
        // Stage 2 has no tasks.
        let wf = workflow(&[1, 0, 1, 1]);
        let progress = compute_progress(&wf, &done(&[(1, 100)]));
        assert_eq!(progress.cursor.unwrap().stage_id, 3);
        assert_eq!(progress.percent, 75.0);
        assert_eq!(progress.stages[1].state, StageState::Completed);
    }

    #[test]
    fn test_orphaned_and_reopened_details_are_ignored() {
        let wf = workflow(&[1, 1]);
        let mut details = done(&[(9, 900), (1, 100)]);
        details[1].is_completed = false;
        let progress = compute_progress(&wf, &details);
        assert_eq!(progress.cursor.unwrap().stage_id, 1);
    }

    #[test]
    fn test_empty_workflow_has_no_cursor() {
        let progress = compute_progress(&Workflow::default(), &[]);
        assert_eq!(progress.cursor, None);
        assert_eq!(progress.percent, 0.0);
        assert!(!progress.is_finished());
    }

    #[test]
    fn test_unresolved_stage_reports_zero_percent() {
        let wf = workflow(&[1, 1]);
        assert_eq!(progress_percentage(&wf, Some(77)), 0.0);
        assert_eq!(progress_percentage(&wf, None), 0.0);
        assert_eq!(progress_percentage(&wf, Some(1)), 50.0);
    }

    #[tokio::test]
    async fn test_open_is_idempotent() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let wf = seed_workflow(&db, &log, &admin, &[("Design", &["Measure", "Draw"])]).await?;
        let project = create_test_project(&db, &log, &admin, "Ali Demir", 1_000.0).await?;
        let stage = &wf.stages()[0];
        let task = &stage.sub_stages[0];

        let first = open_sub_stage(&db, &wf, project.id, stage.stage.id, task.id).await?;
        assert!(!first.is_completed);
        toggle_completion(&db, &log, &admin, &wf, project.id, stage.stage.id, task.id).await?;

        let again = open_sub_stage(&db, &wf, project.id, stage.stage.id, task.id).await?;
        assert_eq!(again.id, first.id);
        assert!(again.is_completed);
        assert_eq!(SubStageDetail::find().count(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_toggle_twice_round_trips_and_logs_each_flip() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let wf = seed_workflow(&db, &log, &admin, &[("Design", &["Measure"])]).await?;
        let project = create_test_project(&db, &log, &admin, "Zeynep Ak", 1_000.0).await?;
        let (stage_id, task_id) = (wf.stages()[0].stage.id, wf.stages()[0].sub_stages[0].id);

        let on = toggle_completion(&db, &log, &admin, &wf, project.id, stage_id, task_id).await?;
        let off = toggle_completion(&db, &log, &admin, &wf, project.id, stage_id, task_id).await?;
        assert!(on.is_completed);
        assert!(!off.is_completed);
        log.flush().await;

        let titles: Vec<String> =
            crate::core::activity::list_project_activity(&db, &admin, project.id, 10)
                .await?
                .into_iter()
                .map(|e| e.title)
                .collect();
        assert_eq!(titles[..2], ["Task reopened", "Task completed"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_toggle_keeps_cached_cursor_in_step() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let wf = seed_workflow(
            &db,
            &log,
            &admin,
            &[("Design", &["Measure"]), ("Production", &["Cut", "Assemble"])],
        )
        .await?;
        let project = create_test_project(&db, &log, &admin, "Can Öz", 1_000.0).await?;
        let design = &wf.stages()[0];
        let production = &wf.stages()[1];

        toggle_completion(
            &db,
            &log,
            &admin,
            &wf,
            project.id,
            design.stage.id,
            design.sub_stages[0].id,
        )
        .await?;

        let cursor = get_active_cursor(&db, &wf, project.id).await?.unwrap();
        assert_eq!(cursor.stage_id, production.stage.id);
        assert_eq!(cursor.sub_stage_id, Some(production.sub_stages[0].id));

        let stored = Project::find_by_id(project.id).one(&db).await?.unwrap();
        assert_eq!(stored.current_stage_id, Some(cursor.stage_id));
        assert_eq!(stored.current_sub_stage_id, cursor.sub_stage_id);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_toggle_changes_nothing() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let wf = seed_workflow(
            &db,
            &log,
            &admin,
            &[("Design", &["Measure"]), ("Production", &["Cut"])],
        )
        .await?;
        let project = create_test_project(&db, &log, &admin, "Sena Kaya", 1_000.0).await?;
        let (stage_id, task_id) = (wf.stages()[0].stage.id, wf.stages()[0].sub_stages[0].id);
        toggle_completion(&db, &log, &admin, &wf, project.id, stage_id, task_id).await?;
        let details_before = list_details(&db, project.id).await?;
        let cursor_before = get_active_cursor(&db, &wf, project.id).await?;
        let stored_before = Project::find_by_id(project.id).one(&db).await?.unwrap();

        // The detail flip succeeds inside the transaction; the cursor write does not.
        db.execute_unprepared(
            "CREATE TRIGGER block_cursor BEFORE UPDATE OF current_stage_id ON projects \
             BEGIN SELECT RAISE(ABORT, 'cursor blocked'); END",
        )
        .await?;
        let result = toggle_completion(&db, &log, &admin, &wf, project.id, stage_id, task_id).await;
        assert!(matches!(result, Err(Error::Persistence(_))));

        assert_eq!(list_details(&db, project.id).await?, details_before);
        assert!(details_before[0].is_completed);
        assert_eq!(get_active_cursor(&db, &wf, project.id).await?, cursor_before);
        let stored = Project::find_by_id(project.id).one(&db).await?.unwrap();
        assert_eq!(stored.current_stage_id, stored_before.current_stage_id);
        assert_eq!(stored.updated_at, stored_before.updated_at);
        Ok(())
    }

    #[tokio::test]
    async fn test_toggle_rejects_unknown_task_and_anonymous_callers() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let wf = seed_workflow(&db, &log, &admin, &[("Design", &["Measure"]), ("Build", &["Cut"])])
            .await?;
        let project = create_test_project(&db, &log, &admin, "Ece Su", 1_000.0).await?;
        let design = &wf.stages()[0];
        let build = &wf.stages()[1];

        // Task from another stage
        let result = toggle_completion(
            &db,
            &log,
            &admin,
            &wf,
            project.id,
            design.stage.id,
            build.sub_stages[0].id,
        )
        .await;
        assert!(matches!(result, Err(Error::NotFound { .. })));

        let result = toggle_completion(
            &db,
            &log,
            &Session::system(),
            &wf,
            project.id,
            design.stage.id,
            design.sub_stages[0].id,
        )
        .await;
        assert!(matches!(result, Err(Error::Unauthenticated)));

        let result = toggle_completion(
            &db,
            &log,
            &admin,
            &wf,
            999,
            design.stage.id,
            design.sub_stages[0].id,
        )
        .await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert_eq!(SubStageDetail::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_notes_do_not_reset_completion() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let wf = seed_workflow(&db, &log, &admin, &[("Design", &["Measure"])]).await?;
        let project = create_test_project(&db, &log, &admin, "Deniz", 1_000.0).await?;
        let (stage_id, task_id) = (wf.stages()[0].stage.id, wf.stages()[0].sub_stages[0].id);

        toggle_completion(&db, &log, &admin, &wf, project.id, stage_id, task_id).await?;
        let detail = update_sub_stage_notes(
            &db,
            &log,
            &admin,
            &wf,
            project.id,
            stage_id,
            task_id,
            "  oak veneer  ",
        )
        .await?;
        assert!(detail.is_completed);
        assert_eq!(detail.notes.as_deref(), Some("oak veneer"));
        Ok(())
    }
}

//! Dashboard aggregates.
//!
//! Everything here is recomputed on read from completion records and ledger entries;
//! nothing is cached between calls. Financial figures are only included for sessions
//! holding `can_view_financials`.

use crate::{
    core::{
        ledger::{self, LedgerSummary},
        progress::{self, ProjectProgress},
        rbac::{Capability, Session},
        workflow::Workflow,
    },
    entities::{Expense, Payment, SubStageDetail, expense, payment, project, sub_stage_detail},
    errors::Result,
};
use sea_orm::{DatabaseConnection, EntityTrait};
use std::collections::HashMap;

/// One project as shown on the dashboard.
#[derive(Debug, Clone)]
pub struct ProjectOverview {
    /// The project
    pub project: project::Model,
    /// Name of the active stage, or "Unknown"
    pub stage_label: String,
    /// Name of the first pending task of the active stage, if any
    pub task_label: Option<String>,
    /// Derived progress
    pub progress: ProjectProgress,
    /// Paid / remaining figures, when the session may see them
    pub ledger: Option<LedgerSummary>,
}

/// Number of unfinished projects sitting in one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCount {
    /// Stage id
    pub stage_id: i64,
    /// Stage name
    pub name: String,
    /// Unfinished projects whose active stage this is
    pub projects: usize,
}

/// Dashboard data.
#[derive(Debug, Clone)]
pub struct Dashboard {
    /// Per-project overviews, in the order given
    pub projects: Vec<ProjectOverview>,
    /// Unfinished projects per stage, in workflow order
    pub stage_counts: Vec<StageCount>,
    /// Projects with every task complete
    pub completed_projects: usize,
}

fn group_by_project<T>(rows: Vec<T>, project_id: impl Fn(&T) -> i64) -> HashMap<i64, Vec<T>> {
    let mut grouped: HashMap<i64, Vec<T>> = HashMap::new();
    for row in rows {
        grouped.entry(project_id(&row)).or_default().push(row);
    }
    grouped
}

/// Builds the overview of one project from already-fetched records.
#[must_use]
pub fn overview(
    workflow: &Workflow,
    project: project::Model,
    details: &[sub_stage_detail::Model],
    ledger: Option<LedgerSummary>,
) -> ProjectOverview {
    let progress = progress::compute_progress(workflow, details);
    let stage_label = workflow
        .stage_name(progress.cursor.map(|c| c.stage_id))
        .to_string();
    let task_label = progress
        .cursor
        .and_then(|c| c.sub_stage_id)
        .map(|id| workflow.sub_stage_name(Some(id)).to_string());
    ProjectOverview {
        project,
        stage_label,
        task_label,
        progress,
        ledger,
    }
}

/// Builds the dashboard for `projects`.
pub async fn build_dashboard(
    db: &DatabaseConnection,
    session: &Session,
    workflow: &Workflow,
    projects: Vec<project::Model>,
) -> Result<Dashboard> {
    let details = group_by_project(SubStageDetail::find().all(db).await?, |d| d.project_id);

    let financials = if session.has_permission(Capability::ViewFinancials) {
        let (payments, expenses) =
            tokio::try_join!(Payment::find().all(db), Expense::find().all(db))?;
        Some((
            group_by_project(payments, |p: &payment::Model| p.project_id),
            group_by_project(expenses, |e: &expense::Model| e.project_id),
        ))
    } else {
        None
    };

    let overviews: Vec<ProjectOverview> = projects
        .into_iter()
        .map(|project| {
            let summary = financials.as_ref().map(|(payments, expenses)| {
                ledger::summarize(
                    project.total_amount,
                    payments.get(&project.id).map_or(&[][..], Vec::as_slice),
                    expenses.get(&project.id).map_or(&[][..], Vec::as_slice),
                )
            });
            let project_details = details.get(&project.id).map_or(&[][..], Vec::as_slice);
            overview(workflow, project, project_details, summary)
        })
        .collect();

    let stage_counts = workflow
        .stages()
        .iter()
        .map(|entry| StageCount {
            stage_id: entry.stage.id,
            name: entry.stage.name.clone(),
            projects: overviews
                .iter()
                .filter(|o| !o.progress.is_finished())
                .filter(|o| o.progress.cursor.is_some_and(|c| c.stage_id == entry.stage.id))
                .count(),
        })
        .collect();
    let completed_projects = overviews
        .iter()
        .filter(|o| o.progress.is_finished())
        .count();

    Ok(Dashboard {
        projects: overviews,
        stage_counts,
        completed_projects,
    })
}

/// Generates a progress bar string for visual representation.
///
/// Creates a text-based progress bar like: `[████████░░] 80%`. Values outside
/// 0-100 are clamped for the bar but printed as given.
#[must_use]
pub fn format_progress_bar(progress_percent: f64, bar_length: Option<usize>) -> String {
    let length = bar_length.unwrap_or(10);
    let clamped_progress = ledger::display_percentage(progress_percent);

    // Cast safety: clamped_progress ∈ [0, 100], length is small (10-20).
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let filled = ((clamped_progress / 100.0) * length as f64).round() as usize;
    let empty = length.saturating_sub(filled);

    let filled_str = "█".repeat(filled);
    let empty_str = "░".repeat(empty);

    format!("[{filled_str}{empty_str}] {progress_percent:.1}%")
}

/// Formats an amount with two decimals and thousands separators, e.g. `12.500,00 ₺`.
#[must_use]
pub fn format_amount(amount: f64) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let fixed = format!("{:.2}", amount.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::new();
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }
    format!("{sign}{grouped},{fraction} ₺")
}

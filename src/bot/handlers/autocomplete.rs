//! Autocomplete handlers for Discord slash command parameters.
//!
//! This module provides autocomplete functionality for command parameters like
//! projects, stages and tasks. Suggestions use the same labels that
//! [`crate::bot::lookup`] parses back.

use crate::{
    bot::{BotData, lookup},
    core::{projects, rbac::Capability, roles, staff, workflow},
    errors::Error,
};

/// Discord shows at most this many suggestions.
const MAX_CHOICES: usize = 25;

fn matching(candidates: impl IntoIterator<Item = String>, partial: &str) -> Vec<String> {
    let partial_lower = partial.trim().to_lowercase();
    let mut matching: Vec<String> = candidates
        .into_iter()
        .filter(|candidate| candidate.to_lowercase().contains(&partial_lower))
        .take(MAX_CHOICES)
        .collect();
    matching.sort();
    matching
}

/// Provides autocomplete suggestions for projects as `#id Customer`.
///
/// Projects are matched on customer name or id, newest first.
pub async fn autocomplete_project(
    ctx: poise::Context<'_, BotData, Error>,
    partial: &str,
) -> Vec<String> {
    let db = &ctx.data().database;
    let Ok(all) = projects::list_projects(db).await else {
        return Vec::new();
    };
    let partial_lower = partial.trim().trim_start_matches('#').to_lowercase();

    // Keep newest-first order instead of sorting alphabetically.
    all.iter()
        .map(lookup::project_label)
        .filter(|label| label.to_lowercase().contains(&partial_lower))
        .take(MAX_CHOICES)
        .collect()
}

/// Provides autocomplete suggestions for stage names, in workflow order.
pub async fn autocomplete_stage(
    ctx: poise::Context<'_, BotData, Error>,
    partial: &str,
) -> Vec<String> {
    let db = &ctx.data().database;
    let Ok(wf) = workflow::load_workflow(db).await else {
        return Vec::new();
    };
    let partial_lower = partial.trim().to_lowercase();
    wf.stages()
        .iter()
        .map(|entry| entry.stage.name.clone())
        .filter(|name| name.to_lowercase().contains(&partial_lower))
        .take(MAX_CHOICES)
        .collect()
}

/// Provides autocomplete suggestions for tasks as `Stage / Task`, in workflow order.
pub async fn autocomplete_task(
    ctx: poise::Context<'_, BotData, Error>,
    partial: &str,
) -> Vec<String> {
    let db = &ctx.data().database;
    let Ok(wf) = workflow::load_workflow(db).await else {
        return Vec::new();
    };
    let partial_lower = partial.trim().to_lowercase();
    wf.stages()
        .iter()
        .flat_map(|entry| {
            entry
                .sub_stages
                .iter()
                .map(|sub| lookup::task_label(&entry.stage.name, &sub.name))
        })
        .filter(|label| label.to_lowercase().contains(&partial_lower))
        .take(MAX_CHOICES)
        .collect()
}

/// Provides autocomplete suggestions for role names.
pub async fn autocomplete_role(
    ctx: poise::Context<'_, BotData, Error>,
    partial: &str,
) -> Vec<String> {
    let db = &ctx.data().database;
    let Ok(all) = roles::list_roles(db).await else {
        return Vec::new();
    };
    matching(all.into_iter().map(|role| role.name), partial)
}

/// Provides autocomplete suggestions for staff, by email.
pub async fn autocomplete_staff(
    ctx: poise::Context<'_, BotData, Error>,
    partial: &str,
) -> Vec<String> {
    let db = &ctx.data().database;
    let Ok(all) = staff::list_staff(db).await else {
        return Vec::new();
    };
    matching(all.into_iter().map(|(profile, _)| profile.email), partial)
}

/// Provides autocomplete suggestions for capability names.
pub async fn autocomplete_capability(
    _ctx: poise::Context<'_, BotData, Error>,
    partial: &str,
) -> Vec<String> {
    let partial_lower = partial.trim().to_lowercase();
    Capability::ALL
        .iter()
        .map(|capability| capability.as_str())
        .filter(|name| name.contains(&partial_lower))
        .map(str::to_string)
        .collect()
}

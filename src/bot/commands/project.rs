//! Project Discord commands - customer projects, task progress, notes, comments,
//! files and the activity feed.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{self, BotData, handlers::autocomplete, lookup},
        core::{
            activity,
            attachments::{self, Anchor},
            ledger,
            progress::{self, StageState},
            projects::{self, ProjectInput},
            rbac::Capability,
            report, workflow,
        },
        entities::activity_entry,
        errors::{Error, Result},
    };
    use poise::serenity_prelude as serenity;
    use std::fmt::Write;

    /// Largest attachment accepted by `/project upload`.
    const MAX_UPLOAD_BYTES: u32 = 25 * 1024 * 1024;

    /// Entries shown by `/project activity`.
    const ACTIVITY_LIMIT: u64 = 15;

    /// Parent command for customer projects.
    #[poise::command(
        slash_command,
        subcommands(
            "project_create",
            "project_list",
            "project_info",
            "project_edit",
            "project_notes",
            "project_toggle",
            "project_task_notes",
            "project_comment",
            "project_comments",
            "project_delete_comment",
            "project_upload",
            "project_files",
            "project_download",
            "project_delete_file",
            "project_activity"
        )
    )]
    pub async fn project(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "Project command. Available subcommands:\n\
            `/project create` - Register a new customer project\n\
            `/project list` - List projects with their current stage\n\
            `/project info` - Show a project's progress and details\n\
            `/project edit` - Change customer or contract details\n\
            `/project notes` - Replace the project notes\n\
            `/project toggle` - Mark a task done or undone\n\
            `/project task_notes` - Write notes on a task\n\
            `/project comment` / `comments` / `delete_comment` - Discussion\n\
            `/project upload` / `files` / `download` / `delete_file` - Attachments\n\
            `/project activity` - Recent history";

        ctx.say(help_text).await?;
        Ok(())
    }

    /// Registers a new customer project.
    #[poise::command(slash_command, rename = "create")]
    pub async fn project_create(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Customer name"] customer_name: String,
        #[description = "Contract amount (needs financial access)"] total_amount: Option<f64>,
        #[description = "Customer phone"] phone: Option<String>,
        #[description = "Delivery address"] address: Option<String>,
        #[description = "Customer email"] email: Option<String>,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let created = projects::create_project(
            &data.database,
            &data.activity,
            &session,
            ProjectInput {
                customer_name,
                phone: phone.unwrap_or_default(),
                email,
                address: address.unwrap_or_default(),
                total_amount: total_amount.unwrap_or_default(),
            },
        )
        .await?;

        if created.total_amount == 0.0 {
            ctx.say(format!("✅ Project **{}** created.", lookup::project_label(&created)))
                .await?;
        } else {
            ctx.say(format!(
                "✅ Project **{}** created with a contract of **{}**.",
                lookup::project_label(&created),
                report::format_amount(created.total_amount)
            ))
            .await?;
        }
        Ok(())
    }

    /// Lists projects with their active stage and progress.
    #[poise::command(slash_command, rename = "list")]
    pub async fn project_list(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let db = &ctx.data().database;
        let session = bot::session(ctx).await?;

        let all = projects::list_projects(db).await?;
        if all.is_empty() {
            ctx.say("📋 No projects yet. Create one with `/project create`.")
                .await?;
            return Ok(());
        }
        let wf = workflow::load_workflow(db).await?;
        let dashboard = report::build_dashboard(db, &session, &wf, all).await?;

        let mut embed_fields = Vec::new();
        for overview in dashboard.projects.iter().take(25) {
            let mut field_value = String::new();
            let stage = overview.task_label.as_ref().map_or_else(
                || overview.stage_label.clone(),
                |task| format!("{} › {task}", overview.stage_label),
            );
            if overview.progress.is_finished() {
                writeln!(&mut field_value, "🏁 Completed")?;
            } else {
                writeln!(&mut field_value, "📍 {stage}")?;
            }
            writeln!(
                &mut field_value,
                "{}",
                report::format_progress_bar(overview.progress.percent, Some(10))
            )?;
            if let Some(summary) = &overview.ledger {
                writeln!(
                    &mut field_value,
                    "💰 {} paid, {} open",
                    report::format_amount(summary.total_paid),
                    report::format_amount(summary.remaining)
                )?;
            }
            embed_fields.push((lookup::project_label(&overview.project), field_value, false));
        }

        let list_embed = serenity::CreateEmbed::default()
            .title("📋 Projects")
            .color(0x0034_98DB)
            .fields(embed_fields)
            .footer(serenity::CreateEmbedFooter::new(format!(
                "{} project{}",
                dashboard.projects.len(),
                if dashboard.projects.len() == 1 { "" } else { "s" }
            )));

        ctx.send(poise::CreateReply::default().embed(list_embed))
            .await?;
        Ok(())
    }

    /// Shows a project's stages, progress, money and notes.
    #[poise::command(slash_command, rename = "info")]
    pub async fn project_info(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Project"]
        #[autocomplete = "autocomplete::autocomplete_project"]
        project: String,
    ) -> Result<()> {
        let db = &ctx.data().database;
        let session = bot::session(ctx).await?;
        let project = lookup::require_project(db, &project).await?;
        let wf = workflow::load_workflow(db).await?;
        let details = progress::list_details(db, project.id).await?;
        let project_progress = progress::compute_progress(&wf, &details);

        let mut stages = String::new();
        for stage in &project_progress.stages {
            let icon = match stage.state {
                StageState::Completed => "✅",
                StageState::Active => "▶️",
                StageState::Future => "⏳",
            };
            writeln!(
                &mut stages,
                "{icon} {} ({}/{})",
                stage.name, stage.completed, stage.total
            )?;
        }
        if stages.is_empty() {
            stages.push_str("No stages defined.");
        }

        let mut customer = String::new();
        writeln!(&mut customer, "📞 {}", project.phone)?;
        if let Some(email) = &project.email {
            writeln!(&mut customer, "✉️ {email}")?;
        }
        writeln!(&mut customer, "🏠 {}", project.address)?;

        let active = project_progress.cursor.map_or_else(
            || workflow::UNKNOWN_LABEL.to_string(),
            |cursor| match cursor.sub_stage_id {
                Some(task) => format!(
                    "{} › {}",
                    wf.stage_name(Some(cursor.stage_id)),
                    wf.sub_stage_name(Some(task))
                ),
                None => format!("{} (all tasks done)", wf.stage_name(Some(cursor.stage_id))),
            },
        );

        let mut embed = serenity::CreateEmbed::default()
            .title(format!("🪑 {}", lookup::project_label(&project)))
            .description(format!(
                "**Now:** {active}\n{}",
                report::format_progress_bar(project_progress.percent, Some(20))
            ))
            .color(0x0034_98DB)
            .field("Stages", stages, false)
            .field("Customer", customer, true);

        if session.has_permission(Capability::ViewFinancials) {
            let summary = ledger::project_summary(db, &session, project.id).await?;
            let mut money = String::new();
            writeln!(&mut money, "Contract: {}", report::format_amount(summary.total_amount))?;
            writeln!(&mut money, "Paid: {}", report::format_amount(summary.total_paid))?;
            writeln!(
                &mut money,
                "{}: {}",
                if summary.is_overpaid() { "Overpaid" } else { "Remaining" },
                report::format_amount(summary.remaining.abs())
            )?;
            writeln!(
                &mut money,
                "{}",
                report::format_progress_bar(summary.paid_percentage, Some(10))
            )?;
            writeln!(&mut money, "Expenses: {}", report::format_amount(summary.total_expenses))?;
            embed = embed.field("Money", money, true);
        }

        let task_notes: Vec<String> = details
            .iter()
            .filter_map(|detail| {
                detail.notes.as_ref().map(|notes| {
                    format!(
                        "**{}**: {notes}",
                        wf.sub_stage_name(Some(detail.sub_stage_id))
                    )
                })
            })
            .collect();
        if !task_notes.is_empty() {
            embed = embed.field("Task notes", task_notes.join("\n"), false);
        }
        if !project.notes.trim().is_empty() {
            embed = embed.field("Notes", project.notes.clone(), false);
        }

        let (files, comments) = tokio::try_join!(
            attachments::list_files(db, project.id),
            attachments::list_comments(db, project.id, None)
        )?;
        embed = embed.footer(serenity::CreateEmbedFooter::new(format!(
            "{} file(s) | {} comment(s) | created {}",
            files.len(),
            comments.len(),
            project.created_at.format("%Y-%m-%d")
        )));

        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        Ok(())
    }

    /// Changes customer or contract details. Omitted fields keep their value.
    #[poise::command(slash_command, rename = "edit")]
    pub async fn project_edit(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Project"]
        #[autocomplete = "autocomplete::autocomplete_project"]
        project: String,
        #[description = "Customer name"] customer_name: Option<String>,
        #[description = "Customer phone"] phone: Option<String>,
        #[description = "Customer email (\"-\" clears it)"] email: Option<String>,
        #[description = "Delivery address"] address: Option<String>,
        #[description = "Contract amount"] total_amount: Option<f64>,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let existing = lookup::require_project(&data.database, &project).await?;

        let email = match email {
            Some(cleared) if cleared.trim() == "-" => None,
            Some(email) => Some(email),
            None => existing.email.clone(),
        };
        let input = ProjectInput {
            customer_name: customer_name.unwrap_or_else(|| existing.customer_name.clone()),
            phone: phone.unwrap_or_else(|| existing.phone.clone()),
            email,
            address: address.unwrap_or_else(|| existing.address.clone()),
            total_amount: total_amount.unwrap_or(existing.total_amount),
        };
        let updated =
            projects::update_project_details(&data.database, &data.activity, &session, existing.id, input)
                .await?;

        ctx.say(format!("✅ Project **{}** updated.", lookup::project_label(&updated)))
            .await?;
        Ok(())
    }

    /// Replaces the free-text notes of a project.
    #[poise::command(slash_command, rename = "notes")]
    pub async fn project_notes(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Project"]
        #[autocomplete = "autocomplete::autocomplete_project"]
        project: String,
        #[description = "New notes (empty clears them)"] notes: Option<String>,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let project = lookup::require_project(&data.database, &project).await?;
        projects::update_project_notes(
            &data.database,
            &data.activity,
            &session,
            project.id,
            notes.as_deref().unwrap_or_default(),
        )
        .await?;

        ctx.say(format!("📝 Notes of **{}** saved.", lookup::project_label(&project)))
            .await?;
        Ok(())
    }

    /// Marks a task done, or undone when it already is.
    #[poise::command(slash_command, rename = "toggle")]
    pub async fn project_toggle(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Project"]
        #[autocomplete = "autocomplete::autocomplete_project"]
        project: String,
        #[description = "Task (Stage / Task)"]
        #[autocomplete = "autocomplete::autocomplete_task"]
        task: String,
    ) -> Result<()> {
        let data = ctx.data();
        let db = &data.database;
        let session = bot::session(ctx).await?;
        let project = lookup::require_project(db, &project).await?;
        let wf = workflow::load_workflow(db).await?;
        let (stage_id, sub_stage_id) = lookup::find_task(&wf, &task)?;

        let detail = progress::toggle_completion(
            db,
            &data.activity,
            &session,
            &wf,
            project.id,
            stage_id,
            sub_stage_id,
        )
        .await?;
        let after = progress::project_progress(db, &wf, project.id).await?;

        let mut response = String::new();
        writeln!(
            &mut response,
            "{} **{}** is now {} for {}.",
            if detail.is_completed { "✅" } else { "↩️" },
            wf.sub_stage_name(Some(sub_stage_id)),
            if detail.is_completed { "done" } else { "open again" },
            lookup::project_label(&project)
        )?;
        if after.is_finished() {
            writeln!(&mut response, "🏁 Every task is complete!")?;
        } else if let Some(cursor) = after.cursor {
            writeln!(
                &mut response,
                "📍 Active stage: **{}**",
                wf.stage_name(Some(cursor.stage_id))
            )?;
        }
        write!(
            &mut response,
            "{}",
            report::format_progress_bar(after.percent, Some(10))
        )?;

        ctx.say(response).await?;
        Ok(())
    }

    /// Writes working notes on one task of a project.
    #[poise::command(slash_command, rename = "task_notes")]
    pub async fn project_task_notes(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Project"]
        #[autocomplete = "autocomplete::autocomplete_project"]
        project: String,
        #[description = "Task (Stage / Task)"]
        #[autocomplete = "autocomplete::autocomplete_task"]
        task: String,
        #[description = "Notes (empty clears them)"] notes: Option<String>,
    ) -> Result<()> {
        let data = ctx.data();
        let db = &data.database;
        let session = bot::session(ctx).await?;
        let project = lookup::require_project(db, &project).await?;
        let wf = workflow::load_workflow(db).await?;
        let (stage_id, sub_stage_id) = lookup::find_task(&wf, &task)?;

        progress::update_sub_stage_notes(
            db,
            &data.activity,
            &session,
            &wf,
            project.id,
            stage_id,
            sub_stage_id,
            notes.as_deref().unwrap_or_default(),
        )
        .await?;

        ctx.say(format!(
            "📝 Notes on **{}** saved for {}.",
            wf.sub_stage_name(Some(sub_stage_id)),
            lookup::project_label(&project)
        ))
        .await?;
        Ok(())
    }

    async fn anchor_for(
        ctx: poise::Context<'_, BotData, Error>,
        project_id: i64,
        task: Option<&str>,
    ) -> Result<Anchor> {
        let Some(task) = task else {
            return Ok(Anchor::project(project_id));
        };
        let wf = workflow::load_workflow(&ctx.data().database).await?;
        let (stage_id, sub_stage_id) = lookup::find_task(&wf, task)?;
        Ok(Anchor::task(project_id, stage_id, sub_stage_id))
    }

    /// Posts a comment on a project or one of its tasks.
    #[poise::command(slash_command, rename = "comment")]
    pub async fn project_comment(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Project"]
        #[autocomplete = "autocomplete::autocomplete_project"]
        project: String,
        #[description = "Comment"] text: String,
        #[description = "Task the comment is about"]
        #[autocomplete = "autocomplete::autocomplete_task"]
        task: Option<String>,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let project = lookup::require_project(&data.database, &project).await?;
        let anchor = anchor_for(ctx, project.id, task.as_deref()).await?;

        let comment =
            attachments::add_comment(&data.database, &data.activity, &session, anchor, &text)
                .await?;
        ctx.say(format!(
            "💬 Comment #{} added to {}.",
            comment.id,
            lookup::project_label(&project)
        ))
        .await?;
        Ok(())
    }

    /// Shows the comments of a project, oldest first.
    #[poise::command(slash_command, rename = "comments")]
    pub async fn project_comments(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Project"]
        #[autocomplete = "autocomplete::autocomplete_project"]
        project: String,
        #[description = "Only comments on this task"]
        #[autocomplete = "autocomplete::autocomplete_task"]
        task: Option<String>,
    ) -> Result<()> {
        let db = &ctx.data().database;
        let project = lookup::require_project(db, &project).await?;
        let wf = workflow::load_workflow(db).await?;
        let sub_stage_id = match task.as_deref() {
            Some(task) => Some(lookup::find_task(&wf, task)?.1),
            None => None,
        };

        let comments = attachments::list_comments(db, project.id, sub_stage_id).await?;
        if comments.is_empty() {
            ctx.say(format!("💬 No comments on {}.", lookup::project_label(&project)))
                .await?;
            return Ok(());
        }

        let mut response = format!("💬 **Comments on {}**\n", lookup::project_label(&project));
        for comment in &comments {
            let place = comment
                .sub_stage_id
                .map(|id| format!(" [{}]", wf.sub_stage_name(Some(id))))
                .unwrap_or_default();
            writeln!(
                &mut response,
                "`#{}` {} <{}>{place}: {}",
                comment.id,
                comment.created_at.format("%Y-%m-%d %H:%M"),
                comment.author_id.as_deref().unwrap_or("system"),
                comment.body
            )?;
        }
        ctx.say(response).await?;
        Ok(())
    }

    /// Deletes a comment. Authors may delete their own.
    #[poise::command(slash_command, rename = "delete_comment")]
    pub async fn project_delete_comment(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Comment number"] comment_id: i64,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        attachments::delete_comment(&data.database, &data.activity, &session, comment_id).await?;
        ctx.say(format!("🗑️ Comment #{comment_id} deleted.")).await?;
        Ok(())
    }

    /// Uploads a file to a project or one of its tasks.
    #[poise::command(slash_command, rename = "upload")]
    pub async fn project_upload(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Project"]
        #[autocomplete = "autocomplete::autocomplete_project"]
        project: String,
        #[description = "File to attach"] file: serenity::Attachment,
        #[description = "Task the file belongs to"]
        #[autocomplete = "autocomplete::autocomplete_task"]
        task: Option<String>,
    ) -> Result<()> {
        if file.size > MAX_UPLOAD_BYTES {
            return Err(Error::validation(format!(
                "'{}' is larger than {} MiB",
                file.filename,
                MAX_UPLOAD_BYTES / 1024 / 1024
            )));
        }
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let project = lookup::require_project(&data.database, &project).await?;
        let anchor = anchor_for(ctx, project.id, task.as_deref()).await?;

        ctx.defer().await?;
        let bytes = file.download().await?;
        let stored = attachments::upload_file(
            &data.database,
            &data.activity,
            &session,
            data.storage.as_ref(),
            anchor,
            &file.filename,
            bytes,
        )
        .await?;

        ctx.say(format!(
            "📎 **{}** attached to {} as file #{}.\n{}",
            stored.file_name,
            lookup::project_label(&project),
            stored.id,
            stored.public_url
        ))
        .await?;
        Ok(())
    }

    /// Lists the files of a project, newest first.
    #[poise::command(slash_command, rename = "files")]
    pub async fn project_files(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Project"]
        #[autocomplete = "autocomplete::autocomplete_project"]
        project: String,
    ) -> Result<()> {
        let db = &ctx.data().database;
        let project = lookup::require_project(db, &project).await?;
        let files = attachments::list_files(db, project.id).await?;
        if files.is_empty() {
            ctx.say(format!("📎 No files on {}.", lookup::project_label(&project)))
                .await?;
            return Ok(());
        }

        let mut response = format!("📎 **Files of {}**\n", lookup::project_label(&project));
        for file in &files {
            writeln!(
                &mut response,
                "`#{}` [{}]({}) - {} KiB, {}",
                file.id,
                file.file_name,
                file.public_url,
                (file.size_bytes + 1023) / 1024,
                file.created_at.format("%Y-%m-%d")
            )?;
        }
        ctx.say(response).await?;
        Ok(())
    }

    /// Sends a stored file back as an attachment.
    #[poise::command(slash_command, rename = "download")]
    pub async fn project_download(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "File number"] file_id: i64,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        ctx.defer().await?;
        let (file, bytes) =
            attachments::download_file(&data.database, &session, data.storage.as_ref(), file_id)
                .await?;

        ctx.send(
            poise::CreateReply::default()
                .content(format!("📎 File #{} of project #{}", file.id, file.project_id))
                .attachment(serenity::CreateAttachment::bytes(bytes, file.file_name)),
        )
        .await?;
        Ok(())
    }

    /// Deletes a file. Uploaders may delete their own.
    #[poise::command(slash_command, rename = "delete_file")]
    pub async fn project_delete_file(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "File number"] file_id: i64,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        attachments::delete_file(
            &data.database,
            &data.activity,
            &session,
            data.storage.as_ref(),
            file_id,
        )
        .await?;
        ctx.say(format!("🗑️ File #{file_id} deleted.")).await?;
        Ok(())
    }

    fn activity_line(entry: &activity_entry::Model) -> String {
        format!(
            "`{}` **{}** {} ({})",
            entry.created_at.format("%m-%d %H:%M"),
            entry.title,
            entry.description,
            entry.user_id.as_deref().unwrap_or("system")
        )
    }

    /// Shows recent activity of a project, or of the workshop when no project is given.
    #[poise::command(slash_command, rename = "activity")]
    pub async fn project_activity(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Project (omit for workflow, role and staff changes)"]
        #[autocomplete = "autocomplete::autocomplete_project"]
        project: Option<String>,
    ) -> Result<()> {
        let db = &ctx.data().database;
        let session = bot::session(ctx).await?;
        let (heading, entries) = match project {
            Some(reference) => {
                let project = lookup::require_project(db, &reference).await?;
                (
                    lookup::project_label(&project),
                    activity::list_project_activity(db, &session, project.id, ACTIVITY_LIMIT).await?,
                )
            }
            None => (
                "the workshop".to_string(),
                activity::list_global_activity(db, &session, ACTIVITY_LIMIT).await?,
            ),
        };

        if entries.is_empty() {
            ctx.say(format!("🕒 No activity for {heading} yet.")).await?;
            return Ok(());
        }
        let mut response = format!("🕒 **Recent activity for {heading}**\n");
        for entry in &entries {
            writeln!(&mut response, "{}", activity_line(entry))?;
        }
        ctx.say(response).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;

//! Workflow Discord commands - viewing and editing the shared stage and task list.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{self, BotData, handlers::autocomplete, lookup},
        core::workflow::{self, Workflow},
        errors::{Error, Result},
    };
    use std::fmt::Write;

    /// Parent command for the workflow definition.
    #[poise::command(
        slash_command,
        subcommands(
            "workflow_show",
            "workflow_add_stage",
            "workflow_add_task",
            "workflow_rename_stage",
            "workflow_rename_task",
            "workflow_move_stage",
            "workflow_move_task",
            "workflow_delete_stage",
            "workflow_delete_task"
        )
    )]
    pub async fn workflow(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "Workflow command. Available subcommands:\n\
            `/workflow show` - Show every stage and its tasks\n\
            `/workflow add_stage` / `add_task` - Append a stage or a task\n\
            `/workflow rename_stage` / `rename_task` - Rename\n\
            `/workflow move_stage` / `move_task` - Move before another item\n\
            `/workflow delete_stage` / `delete_task` - Delete (tasks of a stage go with it)";

        ctx.say(help_text).await?;
        Ok(())
    }

    fn render(wf: &Workflow) -> Result<String> {
        if wf.is_empty() {
            return Ok("🧭 The workflow has no stages yet. Add one with `/workflow add_stage`.".to_string());
        }
        let mut response = String::from("🧭 **Workflow**\n");
        for entry in wf.stages() {
            writeln!(
                &mut response,
                "**{}. {}**",
                entry.stage.order_index, entry.stage.name
            )?;
            for sub in &entry.sub_stages {
                writeln!(&mut response, "  {}. {}", sub.order_index, sub.name)?;
            }
        }
        Ok(response)
    }

    /// Shows every stage and its tasks in order.
    #[poise::command(slash_command, rename = "show")]
    pub async fn workflow_show(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let wf = workflow::load_workflow(&ctx.data().database).await?;
        ctx.say(render(&wf)?).await?;
        Ok(())
    }

    /// Appends a stage to the end of the workflow.
    #[poise::command(slash_command, rename = "add_stage")]
    pub async fn workflow_add_stage(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Stage name"] name: String,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let stage = workflow::add_stage(&data.database, &data.activity, &session, &name).await?;
        ctx.say(format!(
            "✅ Stage **{}** added at position {}.",
            stage.name, stage.order_index
        ))
        .await?;
        Ok(())
    }

    /// Appends a task to the end of a stage.
    #[poise::command(slash_command, rename = "add_task")]
    pub async fn workflow_add_task(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Stage"]
        #[autocomplete = "autocomplete::autocomplete_stage"]
        stage: String,
        #[description = "Task name"] name: String,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let wf = workflow::load_workflow(&data.database).await?;
        let stage = lookup::find_stage(&wf, &stage)?;

        let task =
            workflow::add_sub_stage(&data.database, &data.activity, &session, stage.stage.id, &name)
                .await?;
        ctx.say(format!(
            "✅ Task **{}** added to **{}** at position {}.",
            task.name, stage.stage.name, task.order_index
        ))
        .await?;
        Ok(())
    }

    /// Renames a stage.
    #[poise::command(slash_command, rename = "rename_stage")]
    pub async fn workflow_rename_stage(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Stage"]
        #[autocomplete = "autocomplete::autocomplete_stage"]
        stage: String,
        #[description = "New name"] name: String,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let wf = workflow::load_workflow(&data.database).await?;
        let stage_id = lookup::find_stage(&wf, &stage)?.stage.id;

        let renamed =
            workflow::rename_stage(&data.database, &data.activity, &session, stage_id, &name)
                .await?;
        ctx.say(format!("✏️ Stage renamed to **{}**.", renamed.name))
            .await?;
        Ok(())
    }

    /// Renames a task.
    #[poise::command(slash_command, rename = "rename_task")]
    pub async fn workflow_rename_task(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Task (Stage / Task)"]
        #[autocomplete = "autocomplete::autocomplete_task"]
        task: String,
        #[description = "New name"] name: String,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let wf = workflow::load_workflow(&data.database).await?;
        let (_, sub_stage_id) = lookup::find_task(&wf, &task)?;

        let renamed =
            workflow::rename_sub_stage(&data.database, &data.activity, &session, sub_stage_id, &name)
                .await?;
        ctx.say(format!("✏️ Task renamed to **{}**.", renamed.name))
            .await?;
        Ok(())
    }

    /// Moves a stage to the position of another stage.
    #[poise::command(slash_command, rename = "move_stage")]
    pub async fn workflow_move_stage(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Stage to move"]
        #[autocomplete = "autocomplete::autocomplete_stage"]
        stage: String,
        #[description = "Stage whose position it takes"]
        #[autocomplete = "autocomplete::autocomplete_stage"]
        target: String,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let mut wf = workflow::load_workflow(&data.database).await?;
        let dragged_id = lookup::find_stage(&wf, &stage)?.stage.id;
        let target_id = lookup::find_stage(&wf, &target)?.stage.id;

        workflow::reorder_stage(
            &data.database,
            &data.activity,
            &session,
            &mut wf,
            dragged_id,
            target_id,
        )
        .await?;
        ctx.say(render(&wf)?).await?;
        Ok(())
    }

    /// Moves a task to the position of another task of the same stage.
    #[poise::command(slash_command, rename = "move_task")]
    pub async fn workflow_move_task(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Task to move (Stage / Task)"]
        #[autocomplete = "autocomplete::autocomplete_task"]
        task: String,
        #[description = "Task whose position it takes"]
        #[autocomplete = "autocomplete::autocomplete_task"]
        target: String,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let mut wf = workflow::load_workflow(&data.database).await?;
        let (stage_id, dragged_id) = lookup::find_task(&wf, &task)?;
        let (target_stage_id, target_id) = lookup::find_task(&wf, &target)?;
        if stage_id != target_stage_id {
            return Err(Error::validation("Tasks can only be moved within their own stage"));
        }

        workflow::reorder_sub_stage(
            &data.database,
            &data.activity,
            &session,
            &mut wf,
            stage_id,
            dragged_id,
            target_id,
        )
        .await?;
        ctx.say(render(&wf)?).await?;
        Ok(())
    }

    /// Deletes a stage together with its tasks.
    #[poise::command(slash_command, rename = "delete_stage")]
    pub async fn workflow_delete_stage(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Stage"]
        #[autocomplete = "autocomplete::autocomplete_stage"]
        stage: String,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let wf = workflow::load_workflow(&data.database).await?;
        let stage = lookup::find_stage(&wf, &stage)?;

        workflow::delete_stage(&data.database, &data.activity, &session, stage.stage.id).await?;
        ctx.say(format!(
            "🗑️ Stage **{}** and its {} task(s) deleted.",
            stage.stage.name,
            stage.sub_stages.len()
        ))
        .await?;
        Ok(())
    }

    /// Deletes a task.
    #[poise::command(slash_command, rename = "delete_task")]
    pub async fn workflow_delete_task(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Task (Stage / Task)"]
        #[autocomplete = "autocomplete::autocomplete_task"]
        task: String,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let wf = workflow::load_workflow(&data.database).await?;
        let (_, sub_stage_id) = lookup::find_task(&wf, &task)?;

        workflow::delete_sub_stage(&data.database, &data.activity, &session, sub_stage_id).await?;
        ctx.say(format!(
            "🗑️ Task **{}** deleted.",
            wf.sub_stage_name(Some(sub_stage_id))
        ))
        .await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;

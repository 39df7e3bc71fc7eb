//! General Discord commands - ping, help, whoami and refresh.
//! These commands provide basic bot functionality and let users inspect the
//! session their Discord account resolves to.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{self, BotData},
        core::rbac::Session,
        errors::{Error, Result},
    };
    use std::fmt::Write;

    /// Responds with "Pong!" to test bot connectivity.
    ///
    /// This is a simple health check command that doesn't require any database operations.
    #[poise::command(slash_command, prefix_command)]
    pub async fn ping(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        ctx.say("Pong!").await?;
        Ok(())
    }

    /// Displays help information about available commands.
    #[poise::command(slash_command, prefix_command)]
    pub async fn help(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "**Workshop Tracker Help**\n\
        Here is a summary of all available commands.\n\n\
        **Projects**\n\
        • `/project create|list|info|edit|notes` - Manage customer projects.\n\
        • `/project toggle <project> <task>` - Marks a task done (or undone) and moves the project along.\n\
        • `/project task_notes|comment|upload|files|activity` - Notes, comments, files and history.\n\n\
        **Money** (needs financial access)\n\
        • `/ledger income|expense|summary|entries|delete_payment|delete_expense`\n\
        • `/accounting [from] [to]` - Income and expenses of every project in a date range.\n\n\
        **Administration**\n\
        • `/workflow <subcommand>` - Edit stages and tasks.\n\
        • `/role <subcommand>` / `/staff <subcommand>` - Permissions and accounts.\n\
        • `/branding` / `/dashboard` - Company details and the overview.\n\n\
        **Utility Commands**\n\
        • `/whoami` - Shows your profile and permissions.\n\
        • `/refresh` - Reloads your permissions after a role change.\n\
        • `/ping` - Checks if the bot is responsive.\n\
        • `/help` - Shows this help message.";

        ctx.say(help_text).await?;
        Ok(())
    }

    fn describe(session: &Session) -> Result<String> {
        let Some(principal) = session.principal() else {
            return Ok(
                "Your Discord account is not linked to a staff profile. Ask an administrator to run `/staff link`."
                    .to_string(),
            );
        };
        let mut response = String::new();
        writeln!(&mut response, "👤 **{}**", principal.email)?;
        writeln!(
            &mut response,
            "🎭 Role: {}",
            session.role().map_or("none", |role| role.name.as_str())
        )?;
        let granted: Vec<&str> = session
            .permissions()
            .iter()
            .map(|capability| capability.as_str())
            .collect();
        if granted.is_empty() {
            writeln!(&mut response, "🔒 No permissions")?;
        } else {
            writeln!(&mut response, "🔑 {}", granted.join(", "))?;
        }
        write!(
            &mut response,
            "🕒 Loaded {}",
            session.loaded_at().format("%Y-%m-%d %H:%M UTC")
        )?;
        Ok(response)
    }

    /// Shows the staff profile and permissions your Discord account acts as.
    #[poise::command(slash_command)]
    pub async fn whoami(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let session = bot::session(ctx).await?;
        ctx.send(
            poise::CreateReply::default()
                .content(describe(&session)?)
                .ephemeral(true),
        )
        .await?;
        Ok(())
    }

    /// Reloads your permissions, e.g. after your role was changed.
    #[poise::command(slash_command)]
    pub async fn refresh(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let session = ctx
            .data()
            .refresh_session(ctx.author().id.get())
            .await?;
        ctx.send(
            poise::CreateReply::default()
                .content(format!("🔄 Permissions reloaded.\n{}", describe(&session)?))
                .ephemeral(true),
        )
        .await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;

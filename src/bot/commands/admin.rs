//! Administration Discord commands - roles, staff accounts, branding and the dashboard.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{self, BotData, handlers::autocomplete, lookup},
        core::{
            projects,
            rbac::{Capability, PermissionSet},
            report, roles,
            settings::{self, Branding},
            staff::{self, StaffInput, StaffUpdate},
            workflow,
        },
        errors::{Error, Result},
    };
    use poise::serenity_prelude as serenity;
    use std::fmt::Write;

    fn permission_list(permissions: &PermissionSet) -> String {
        let granted: Vec<&str> = permissions.iter().map(Capability::as_str).collect();
        if granted.is_empty() {
            "no permissions".to_string()
        } else {
            granted.join(", ")
        }
    }

    /// Parent command for roles and their permissions.
    #[poise::command(
        slash_command,
        subcommands(
            "role_list",
            "role_create",
            "role_rename",
            "role_grant",
            "role_revoke",
            "role_delete",
            "role_assign"
        )
    )]
    pub async fn role(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "Role command. Available subcommands:\n\
            `/role list` - Show every role and its permissions\n\
            `/role create` - Create a role\n\
            `/role rename` - Rename a role\n\
            `/role grant` / `revoke` - Turn one permission on or off\n\
            `/role delete` - Delete a role (its members keep no permissions)\n\
            `/role assign` - Give a staff member a role";

        ctx.say(help_text).await?;
        Ok(())
    }

    /// Shows every role and its permissions.
    #[poise::command(slash_command, rename = "list")]
    pub async fn role_list(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let all = roles::list_roles(&ctx.data().database).await?;
        let mut response = String::from("🎭 **Roles**\n");
        for role in &all {
            writeln!(
                &mut response,
                "**{}**{}: {}",
                role.name,
                if role.is_admin() { " 👑" } else { "" },
                permission_list(&role.permissions)
            )?;
        }
        ctx.say(response).await?;
        Ok(())
    }

    /// Creates a role.
    #[poise::command(slash_command, rename = "create")]
    pub async fn role_create(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Role name"] name: String,
        #[description = "Comma separated permissions, e.g. can_view_financials,can_delete_file"]
        permissions: Option<String>,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let permissions = lookup::parse_capabilities(permissions.as_deref().unwrap_or_default())?;

        let created =
            roles::create_role(&data.database, &data.activity, &session, &name, &permissions)
                .await?;
        ctx.say(format!(
            "✅ Role **{}** created with {}.",
            created.name,
            permission_list(&created.permissions)
        ))
        .await?;
        Ok(())
    }

    /// Renames a role.
    #[poise::command(slash_command, rename = "rename")]
    pub async fn role_rename(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Role"]
        #[autocomplete = "autocomplete::autocomplete_role"]
        role: String,
        #[description = "New name"] name: String,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let existing = lookup::require_role(&data.database, &role).await?;

        let renamed =
            roles::rename_role(&data.database, &data.activity, &session, existing.id, &name)
                .await?;
        data.invalidate_sessions().await;
        ctx.say(format!("✏️ Role renamed to **{}**.", renamed.name))
            .await?;
        Ok(())
    }

    async fn toggle_permission(
        ctx: poise::Context<'_, BotData, Error>,
        role: &str,
        capability: &str,
        enabled: bool,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let capability: Capability = capability.parse()?;
        let existing = lookup::require_role(&data.database, role).await?;

        let mut permissions = existing.permissions.clone();
        permissions.set(capability, enabled);
        let updated = roles::set_role_permissions(
            &data.database,
            &data.activity,
            &session,
            existing.id,
            &permissions,
        )
        .await?;
        data.invalidate_sessions().await;

        ctx.say(format!(
            "🔑 **{}** now has {}.",
            updated.name,
            permission_list(&updated.permissions)
        ))
        .await?;
        Ok(())
    }

    /// Turns one permission on for a role.
    #[poise::command(slash_command, rename = "grant")]
    pub async fn role_grant(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Role"]
        #[autocomplete = "autocomplete::autocomplete_role"]
        role: String,
        #[description = "Permission"]
        #[autocomplete = "autocomplete::autocomplete_capability"]
        permission: String,
    ) -> Result<()> {
        toggle_permission(ctx, &role, &permission, true).await
    }

    /// Turns one permission off for a role.
    #[poise::command(slash_command, rename = "revoke")]
    pub async fn role_revoke(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Role"]
        #[autocomplete = "autocomplete::autocomplete_role"]
        role: String,
        #[description = "Permission"]
        #[autocomplete = "autocomplete::autocomplete_capability"]
        permission: String,
    ) -> Result<()> {
        toggle_permission(ctx, &role, &permission, false).await
    }

    /// Deletes a role. Staff holding it are left without a role.
    #[poise::command(slash_command, rename = "delete")]
    pub async fn role_delete(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Role"]
        #[autocomplete = "autocomplete::autocomplete_role"]
        role: String,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let existing = lookup::require_role(&data.database, &role).await?;

        roles::delete_role(&data.database, &data.activity, &session, existing.id).await?;
        data.invalidate_sessions().await;
        ctx.say(format!("🗑️ Role **{}** deleted.", existing.name))
            .await?;
        Ok(())
    }

    /// Gives a staff member a role, or removes their role.
    #[poise::command(slash_command, rename = "assign")]
    pub async fn role_assign(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Staff email"]
        #[autocomplete = "autocomplete::autocomplete_staff"]
        email: String,
        #[description = "Role (omit to remove the role)"]
        #[autocomplete = "autocomplete::autocomplete_role"]
        role: Option<String>,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let member = lookup::require_staff(&data.database, &email).await?;
        let role = match role {
            Some(name) => Some(lookup::require_role(&data.database, &name).await?),
            None => None,
        };

        roles::assign_role(
            &data.database,
            &data.activity,
            &session,
            &member.id,
            role.as_ref().map(|r| r.id),
        )
        .await?;
        data.invalidate_sessions().await;
        ctx.say(match role {
            Some(role) => format!("🎭 **{}** is now **{}**.", member.display_name(), role.name),
            None => format!("🎭 **{}** no longer has a role.", member.display_name()),
        })
        .await?;
        Ok(())
    }

    /// Parent command for staff accounts.
    #[poise::command(
        slash_command,
        subcommands(
            "staff_list",
            "staff_create",
            "staff_update",
            "staff_delete",
            "staff_link"
        )
    )]
    pub async fn staff(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "Staff command. Available subcommands:\n\
            `/staff list` - Show every staff member\n\
            `/staff create` - Create a login account\n\
            `/staff update` - Change email, password, name or role\n\
            `/staff delete` - Delete an account\n\
            `/staff link` - Link a Discord user to a staff member";

        ctx.say(help_text).await?;
        Ok(())
    }

    /// Shows every staff member with their role.
    #[poise::command(slash_command, rename = "list")]
    pub async fn staff_list(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let members = staff::list_staff(&ctx.data().database).await?;
        if members.is_empty() {
            ctx.say("👥 No staff yet.").await?;
            return Ok(());
        }
        let mut response = String::from("👥 **Staff**\n");
        for (member, role) in &members {
            writeln!(
                &mut response,
                "**{}** <{}> - {}{}",
                member.display_name(),
                member.email,
                role.as_ref().map_or("no role", |r| r.name.as_str()),
                member
                    .discord_user_id
                    .as_deref()
                    .map(|id| format!(" (<@{id}>)"))
                    .unwrap_or_default()
            )?;
        }
        ctx.say(response).await?;
        Ok(())
    }

    /// Creates a login account for a new staff member.
    #[poise::command(slash_command, rename = "create")]
    pub async fn staff_create(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Login email"] email: String,
        #[description = "Initial password (at least 6 characters)"] password: String,
        #[description = "Given name"] first_name: String,
        #[description = "Family name"] last_name: String,
        #[description = "Role"]
        #[autocomplete = "autocomplete::autocomplete_role"]
        role: String,
        #[description = "Discord user to link"] user: Option<serenity::User>,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let role = lookup::require_role(&data.database, &role).await?;

        let created = staff::create_staff(
            &data.database,
            &data.activity,
            &session,
            data.identity()?,
            StaffInput {
                email,
                password,
                first_name,
                last_name,
                role_id: role.id,
            },
        )
        .await?;
        if let Some(user) = user {
            staff::link_discord_user(
                &data.database,
                &data.activity,
                &session,
                &created.id,
                Some(user.id.get().to_string()),
            )
            .await?;
        }

        ctx.send(
            poise::CreateReply::default()
                .content(format!(
                    "✅ **{}** <{}> created as **{}**.",
                    created.display_name(),
                    created.email,
                    role.name
                ))
                .ephemeral(true),
        )
        .await?;
        Ok(())
    }

    /// Changes a staff member's email, password, name or role.
    #[poise::command(slash_command, rename = "update")]
    pub async fn staff_update(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Current email"]
        #[autocomplete = "autocomplete::autocomplete_staff"]
        email: String,
        #[description = "New email"] new_email: Option<String>,
        #[description = "New password"] password: Option<String>,
        #[description = "Given name"] first_name: Option<String>,
        #[description = "Family name"] last_name: Option<String>,
        #[description = "Role"]
        #[autocomplete = "autocomplete::autocomplete_role"]
        role: Option<String>,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let member = lookup::require_staff(&data.database, &email).await?;
        let role_id = match role {
            Some(name) => Some(lookup::require_role(&data.database, &name).await?.id),
            None => None,
        };

        let updated = staff::update_staff(
            &data.database,
            &data.activity,
            &session,
            data.identity()?,
            &member.id,
            StaffUpdate {
                email: new_email,
                password,
                first_name,
                last_name,
                role_id,
            },
        )
        .await?;
        data.invalidate_sessions().await;

        ctx.send(
            poise::CreateReply::default()
                .content(format!(
                    "✅ **{}** <{}> updated.",
                    updated.display_name(),
                    updated.email
                ))
                .ephemeral(true),
        )
        .await?;
        Ok(())
    }

    /// Deletes a staff account.
    #[poise::command(slash_command, rename = "delete")]
    pub async fn staff_delete(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Staff email"]
        #[autocomplete = "autocomplete::autocomplete_staff"]
        email: String,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let member = lookup::require_staff(&data.database, &email).await?;

        staff::delete_staff(
            &data.database,
            &data.activity,
            &session,
            data.identity()?,
            &member.id,
        )
        .await?;
        data.invalidate_sessions().await;
        ctx.say(format!("🗑️ **{}** deleted.", member.display_name()))
            .await?;
        Ok(())
    }

    /// Links a Discord user to a staff member, or unlinks them.
    #[poise::command(slash_command, rename = "link")]
    pub async fn staff_link(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Staff email"]
        #[autocomplete = "autocomplete::autocomplete_staff"]
        email: String,
        #[description = "Discord user (omit to unlink)"] user: Option<serenity::User>,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let member = lookup::require_staff(&data.database, &email).await?;

        let linked = staff::link_discord_user(
            &data.database,
            &data.activity,
            &session,
            &member.id,
            user.as_ref().map(|u| u.id.get().to_string()),
        )
        .await?;
        data.invalidate_sessions().await;
        ctx.say(match &linked.discord_user_id {
            Some(id) => format!("🔗 <@{id}> now acts as **{}**.", linked.display_name()),
            None => format!("🔗 **{}** is no longer linked.", linked.display_name()),
        })
        .await?;
        Ok(())
    }

    /// Shows the company branding, or changes it when values are given.
    #[poise::command(slash_command)]
    pub async fn branding(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Company name"] company_name: Option<String>,
        #[description = "Logo URL (\"-\" removes it)"] logo_url: Option<String>,
    ) -> Result<()> {
        let data = ctx.data();
        let current = settings::load_branding(&data.database).await?;

        let branding = if company_name.is_none() && logo_url.is_none() {
            current
        } else {
            let session = bot::session(ctx).await?;
            let logo_url = match logo_url {
                Some(cleared) if cleared.trim() == "-" => None,
                Some(url) => Some(url),
                None => current.logo_url,
            };
            settings::update_branding(
                &data.database,
                &data.activity,
                &session,
                Branding {
                    company_name: company_name.unwrap_or(current.company_name),
                    logo_url,
                },
            )
            .await?
        };

        let mut embed = serenity::CreateEmbed::default()
            .title(format!("🏷️ {}", branding.company_name))
            .color(0x008E_44AD);
        if let Some(url) = &branding.logo_url {
            embed = embed.thumbnail(url);
        }
        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        Ok(())
    }

    /// Shows projects per stage, completed projects and, with financial access, money totals.
    #[poise::command(slash_command)]
    pub async fn dashboard(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let db = &ctx.data().database;
        let session = bot::session(ctx).await?;
        ctx.defer().await?;

        let (wf, all, branding) = tokio::try_join!(
            workflow::load_workflow(db),
            projects::list_projects(db),
            settings::load_branding(db)
        )?;
        let dashboard = report::build_dashboard(db, &session, &wf, all).await?;

        let mut stages = String::new();
        for count in &dashboard.stage_counts {
            writeln!(&mut stages, "{}: **{}**", count.name, count.projects)?;
        }
        writeln!(&mut stages, "🏁 Completed: **{}**", dashboard.completed_projects)?;

        let mut embed = serenity::CreateEmbed::default()
            .title(format!("📊 {}", branding.company_name))
            .description(format!("{} project(s)", dashboard.projects.len()))
            .color(0x0034_98DB)
            .field("Projects per stage", stages, false);

        let summaries: Vec<_> = dashboard
            .projects
            .iter()
            .filter_map(|overview| overview.ledger.as_ref())
            .collect();
        if session.has_permission(Capability::ViewFinancials) {
            let contract: f64 = summaries.iter().map(|s| s.total_amount).sum();
            let paid: f64 = summaries.iter().map(|s| s.total_paid).sum();
            let open: f64 = summaries.iter().map(|s| s.remaining.max(0.0)).sum();
            let spent: f64 = summaries.iter().map(|s| s.total_expenses).sum();
            let mut money = String::new();
            writeln!(&mut money, "Contracts: {}", report::format_amount(contract))?;
            writeln!(&mut money, "Paid: {}", report::format_amount(paid))?;
            writeln!(&mut money, "Outstanding: {}", report::format_amount(open))?;
            writeln!(&mut money, "Expenses: {}", report::format_amount(spent))?;
            embed = embed.field("Money", money, false);
        }
        if let Some(url) = &branding.logo_url {
            embed = embed.thumbnail(url);
        }

        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;

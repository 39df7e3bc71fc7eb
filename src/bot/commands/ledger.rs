//! Ledger Discord commands - payments, expenses and the accounting overview.
//!
//! Everything here needs `can_view_financials`; recording and deleting expenses
//! and deleting payments need their own capabilities on top.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{self, BotData, handlers::autocomplete, lookup},
        core::{
            ledger::{self, EntryInput, EntryKind},
            report,
        },
        errors::{Error, Result},
    };
    use chrono::{Datelike, NaiveDate};
    use poise::serenity_prelude as serenity;
    use std::fmt::Write;

    /// Lines shown by `/accounting` before it summarises the rest.
    const FEED_LIMIT: usize = 20;

    /// Parent command for project payments and expenses.
    #[poise::command(
        slash_command,
        subcommands(
            "ledger_income",
            "ledger_expense",
            "ledger_summary",
            "ledger_entries",
            "ledger_delete_payment",
            "ledger_delete_expense"
        )
    )]
    pub async fn ledger(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "Ledger command. Available subcommands:\n\
            `/ledger income` - Record a customer payment\n\
            `/ledger expense` - Record an expense\n\
            `/ledger summary` - Paid and remaining amounts of a project\n\
            `/ledger entries` - Every payment and expense of a project\n\
            `/ledger delete_payment` / `delete_expense` - Remove an entry";

        ctx.say(help_text).await?;
        Ok(())
    }

    fn entry_date(date: Option<String>) -> Result<NaiveDate> {
        date.map_or_else(
            || Ok(chrono::Local::now().date_naive()),
            |text| lookup::parse_date(&text),
        )
    }

    /// Records a payment received from the customer.
    #[poise::command(slash_command, rename = "income")]
    pub async fn ledger_income(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Project"]
        #[autocomplete = "autocomplete::autocomplete_project"]
        project: String,
        #[description = "Amount received"] amount: f64,
        #[description = "Payment type (e.g. Nakit, Havale)"] payment_type: String,
        #[description = "Date (YYYY-MM-DD), defaults to today"] date: Option<String>,
        #[description = "Notes"] notes: Option<String>,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let project = lookup::require_project(&data.database, &project).await?;
        let input = EntryInput {
            amount,
            date: entry_date(date)?,
            kind: payment_type,
            notes,
        };

        let payment =
            ledger::add_income(&data.database, &data.activity, &session, project.id, input)
                .await?;
        let summary = ledger::project_summary(&data.database, &session, project.id).await?;

        let mut response = String::new();
        writeln!(
            &mut response,
            "💰 Payment #{} of **{}** recorded for {}.",
            payment.id,
            report::format_amount(payment.amount),
            lookup::project_label(&project)
        )?;
        if summary.is_overpaid() {
            write!(
                &mut response,
                "⚠️ Overpaid by **{}**.",
                report::format_amount(-summary.remaining)
            )?;
        } else {
            write!(
                &mut response,
                "Remaining: **{}** {}",
                report::format_amount(summary.remaining),
                report::format_progress_bar(summary.paid_percentage, Some(10))
            )?;
        }
        ctx.say(response).await?;
        Ok(())
    }

    /// Records an expense against a project.
    #[poise::command(slash_command, rename = "expense")]
    pub async fn ledger_expense(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Project"]
        #[autocomplete = "autocomplete::autocomplete_project"]
        project: String,
        #[description = "Amount spent"] amount: f64,
        #[description = "Category (e.g. Malzeme, İşçilik)"] category: String,
        #[description = "Date (YYYY-MM-DD), defaults to today"] date: Option<String>,
        #[description = "Notes"] notes: Option<String>,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        let project = lookup::require_project(&data.database, &project).await?;
        let input = EntryInput {
            amount,
            date: entry_date(date)?,
            kind: category,
            notes,
        };

        let expense =
            ledger::add_expense(&data.database, &data.activity, &session, project.id, input)
                .await?;
        ctx.say(format!(
            "🧾 Expense #{} of **{}** ({}) recorded for {}.",
            expense.id,
            report::format_amount(expense.amount),
            expense.category,
            lookup::project_label(&project)
        ))
        .await?;
        Ok(())
    }

    /// Shows paid, remaining and spent amounts of a project.
    #[poise::command(slash_command, rename = "summary")]
    pub async fn ledger_summary(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Project"]
        #[autocomplete = "autocomplete::autocomplete_project"]
        project: String,
    ) -> Result<()> {
        let db = &ctx.data().database;
        let session = bot::session(ctx).await?;
        let project = lookup::require_project(db, &project).await?;
        let summary = ledger::project_summary(db, &session, project.id).await?;

        let mut response = format!("💰 **{}**\n", lookup::project_label(&project));
        writeln!(&mut response, "Contract: {}", report::format_amount(summary.total_amount))?;
        writeln!(&mut response, "Paid: {}", report::format_amount(summary.total_paid))?;
        if summary.is_overpaid() {
            writeln!(
                &mut response,
                "⚠️ Overpaid: {}",
                report::format_amount(-summary.remaining)
            )?;
        } else {
            writeln!(&mut response, "Remaining: {}", report::format_amount(summary.remaining))?;
        }
        writeln!(
            &mut response,
            "{}",
            report::format_progress_bar(summary.paid_percentage, Some(10))
        )?;
        write!(&mut response, "Expenses: {}", report::format_amount(summary.total_expenses))?;

        ctx.say(response).await?;
        Ok(())
    }

    /// Lists every payment and expense of a project.
    #[poise::command(slash_command, rename = "entries")]
    pub async fn ledger_entries(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Project"]
        #[autocomplete = "autocomplete::autocomplete_project"]
        project: String,
    ) -> Result<()> {
        let db = &ctx.data().database;
        let session = bot::session(ctx).await?;
        let project = lookup::require_project(db, &project).await?;
        let (payments, expenses) = tokio::try_join!(
            ledger::list_payments(db, &session, project.id),
            ledger::list_expenses(db, &session, project.id)
        )?;

        let mut income = String::new();
        for payment in &payments {
            writeln!(
                &mut income,
                "`#{}` {} {} ({})",
                payment.id,
                payment.date,
                report::format_amount(payment.amount),
                payment.payment_type
            )?;
        }
        let mut spent = String::new();
        for expense in &expenses {
            writeln!(
                &mut spent,
                "`#{}` {} {} ({})",
                expense.id,
                expense.date,
                report::format_amount(expense.amount),
                expense.category
            )?;
        }
        if income.is_empty() {
            income.push_str("None");
        }
        if spent.is_empty() {
            spent.push_str("None");
        }

        let embed = serenity::CreateEmbed::default()
            .title(format!("💰 Ledger of {}", lookup::project_label(&project)))
            .color(0x0027_AE60)
            .field("Payments", income, false)
            .field("Expenses", spent, false);
        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        Ok(())
    }

    /// Deletes a payment.
    #[poise::command(slash_command, rename = "delete_payment")]
    pub async fn ledger_delete_payment(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Payment number"] payment_id: i64,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        ledger::delete_payment(&data.database, &data.activity, &session, payment_id).await?;
        ctx.say(format!("🗑️ Payment #{payment_id} deleted.")).await?;
        Ok(())
    }

    /// Deletes an expense.
    #[poise::command(slash_command, rename = "delete_expense")]
    pub async fn ledger_delete_expense(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Expense number"] expense_id: i64,
    ) -> Result<()> {
        let data = ctx.data();
        let session = bot::session(ctx).await?;
        ledger::delete_expense(&data.database, &data.activity, &session, expense_id).await?;
        ctx.say(format!("🗑️ Expense #{expense_id} deleted.")).await?;
        Ok(())
    }

    /// Shows income and expenses of every project within a date range.
    ///
    /// The range defaults to the current month.
    #[poise::command(slash_command)]
    pub async fn accounting(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "First day (YYYY-MM-DD)"] from: Option<String>,
        #[description = "Last day (YYYY-MM-DD)"] to: Option<String>,
    ) -> Result<()> {
        let db = &ctx.data().database;
        let session = bot::session(ctx).await?;
        let today = chrono::Local::now().date_naive();
        let from = match from {
            Some(text) => lookup::parse_date(&text)?,
            None => today.with_day(1).unwrap_or(today),
        };
        let to = match to {
            Some(text) => lookup::parse_date(&text)?,
            None => today,
        };

        ctx.defer().await?;
        let feed = ledger::accounting_feed(db, &session, from, to).await?;

        let mut lines = String::new();
        for entry in feed.entries.iter().take(FEED_LIMIT) {
            let (icon, sign) = match entry.kind {
                EntryKind::Income => ("🟢", ""),
                EntryKind::Expense => ("🔴", "-"),
            };
            writeln!(
                &mut lines,
                "{icon} {} {sign}{} #{} {} ({})",
                entry.date,
                report::format_amount(entry.amount),
                entry.project_id,
                entry.customer_name,
                entry.label
            )?;
        }
        if feed.entries.len() > FEED_LIMIT {
            writeln!(&mut lines, "… and {} more", feed.entries.len() - FEED_LIMIT)?;
        }
        if lines.is_empty() {
            lines.push_str("No entries in this range.");
        }

        let embed = serenity::CreateEmbed::default()
            .title("📒 Accounting")
            .description(format!("{} – {}", feed.from, feed.to))
            .color(0x0027_AE60)
            .field("Income", report::format_amount(feed.total_income), true)
            .field("Expenses", report::format_amount(feed.total_expense), true)
            .field("Net", report::format_amount(feed.net()), true)
            .field("Entries", lines, false);
        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;

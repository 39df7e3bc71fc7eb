//! Financial ledger - income (payments) and expenses per project, plus the global
//! accounting feed.
//!
//! Entries are immutable: they are created and deleted, never edited. Aggregates are
//! computed on read. Over-payment is allowed, so `remaining` can go negative and the
//! paid percentage can exceed 100; only display code clamps.

use crate::{
    core::{
        activity::{Activity, ActivityLog},
        rbac::{Capability, Session},
    },
    entities::{ActivityType, Expense, Payment, Project, expense, payment, project},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde_json::json;
use std::{cmp::Ordering, collections::HashMap};
use tracing::info;

/// Input for a new ledger entry.
#[derive(Clone, Debug)]
pub struct EntryInput {
    /// Amount, must be positive
    pub amount: f64,
    /// Booking date
    pub date: NaiveDate,
    /// Payment type for income, category for expenses
    pub kind: String,
    /// Optional notes
    pub notes: Option<String>,
}

impl EntryInput {
    fn validate(&self) -> Result<()> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(Error::validation(format!(
                "Amount must be greater than zero (got {})",
                self.amount
            )));
        }
        if self.kind.trim().is_empty() {
            return Err(Error::validation("Entry type cannot be empty"));
        }
        Ok(())
    }

    fn notes(&self) -> Option<String> {
        self.notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    }
}

/// Paid / outstanding figures for one project.
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerSummary {
    /// Contract amount
    pub total_amount: f64,
    /// Sum of payments
    pub total_paid: f64,
    /// `total_amount - total_paid`, negative when over-paid
    pub remaining: f64,
    /// `total_paid * 100 / total_amount`, 0 when the contract amount is 0
    pub paid_percentage: f64,
    /// Sum of expenses
    pub total_expenses: f64,
}

impl LedgerSummary {
    /// Whether the customer paid more than the contract amount.
    #[must_use]
    pub fn is_overpaid(&self) -> bool {
        self.remaining < 0.0
    }
}

/// Paid share of the contract amount in percent. A zero contract amount yields 0
/// instead of dividing by zero.
#[must_use]
pub fn paid_percentage(total_paid: f64, total_amount: f64) -> f64 {
    if total_amount == 0.0 {
        return 0.0;
    }
    total_paid * 100.0 / total_amount
}

/// Percentage clamped to what a progress bar can show.
#[must_use]
pub fn display_percentage(percent: f64) -> f64 {
    if percent.is_nan() {
        return 0.0;
    }
    percent.clamp(0.0, 100.0)
}

/// Aggregates a project's entries.
#[must_use]
pub fn summarize(
    total_amount: f64,
    payments: &[payment::Model],
    expenses: &[expense::Model],
) -> LedgerSummary {
    let total_paid: f64 = payments.iter().map(|p| p.amount).sum();
    let total_expenses: f64 = expenses.iter().map(|e| e.amount).sum();
    LedgerSummary {
        total_amount,
        total_paid,
        remaining: total_amount - total_paid,
        paid_percentage: paid_percentage(total_paid, total_amount),
        total_expenses,
    }
}

async fn find_project(db: &DatabaseConnection, project_id: i64) -> Result<project::Model> {
    Project::find_by_id(project_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Project", project_id))
}

/// Records a payment from the customer.
pub async fn add_income(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    project_id: i64,
    input: EntryInput,
) -> Result<payment::Model> {
    session.require(Capability::ViewFinancials)?;
    input.validate()?;
    let project = find_project(db, project_id).await?;

    let payment = payment::ActiveModel {
        project_id: Set(project_id),
        amount: Set(input.amount),
        date: Set(input.date),
        payment_type: Set(input.kind.trim().to_string()),
        notes: Set(input.notes()),
        created_by: Set(session.user_id().map(str::to_string)),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(project_id, payment_id = payment.id, amount = payment.amount, "Payment recorded");
    log.record(
        session,
        Activity::new(
            ActivityType::Payment,
            "Payment received",
            format!(
                "{:.2} received from {} ({})",
                payment.amount, project.customer_name, payment.payment_type
            ),
        )
        .for_project(project_id)
        .with_metadata(json!({ "payment_id": payment.id, "amount": payment.amount }))
        .financial(),
    );
    Ok(payment)
}

/// Records an expense against a project.
pub async fn add_expense(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    project_id: i64,
    input: EntryInput,
) -> Result<expense::Model> {
    session.require(Capability::ManageExpenses)?;
    input.validate()?;
    find_project(db, project_id).await?;

    let expense = expense::ActiveModel {
        project_id: Set(project_id),
        amount: Set(input.amount),
        date: Set(input.date),
        category: Set(input.kind.trim().to_string()),
        notes: Set(input.notes()),
        created_by: Set(session.user_id().map(str::to_string)),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    log.record(
        session,
        Activity::new(
            ActivityType::Create,
            "Expense added",
            format!("{:.2} spent on {}", expense.amount, expense.category),
        )
        .for_project(project_id)
        .with_metadata(json!({ "expense_id": expense.id, "amount": expense.amount }))
        .financial(),
    );
    Ok(expense)
}

/// Deletes an income entry.
pub async fn delete_payment(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    payment_id: i64,
) -> Result<()> {
    session.require(Capability::DeletePayment)?;
    let payment = Payment::find_by_id(payment_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Payment", payment_id))?;
    Payment::delete_by_id(payment_id).exec(db).await?;

    info!(payment_id, project_id = payment.project_id, "Payment deleted");
    log.record(
        session,
        Activity::new(
            ActivityType::Delete,
            "Payment deleted",
            format!("Payment of {:.2} dated {} deleted", payment.amount, payment.date),
        )
        .for_project(payment.project_id)
        .with_metadata(json!({ "payment_id": payment_id, "amount": payment.amount }))
        .financial(),
    );
    Ok(())
}

/// Deletes an expense entry.
pub async fn delete_expense(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    expense_id: i64,
) -> Result<()> {
    session.require(Capability::ManageExpenses)?;
    let expense = Expense::find_by_id(expense_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Expense", expense_id))?;
    Expense::delete_by_id(expense_id).exec(db).await?;

    log.record(
        session,
        Activity::new(
            ActivityType::Delete,
            "Expense deleted",
            format!("Expense of {:.2} ({}) deleted", expense.amount, expense.category),
        )
        .for_project(expense.project_id)
        .with_metadata(json!({ "expense_id": expense_id, "amount": expense.amount }))
        .financial(),
    );
    Ok(())
}

/// Payments of a project, newest first.
pub async fn list_payments(
    db: &DatabaseConnection,
    session: &Session,
    project_id: i64,
) -> Result<Vec<payment::Model>> {
    session.require(Capability::ViewFinancials)?;
    Payment::find()
        .filter(payment::Column::ProjectId.eq(project_id))
        .order_by_desc(payment::Column::Date)
        .order_by_desc(payment::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Expenses of a project, newest first.
pub async fn list_expenses(
    db: &DatabaseConnection,
    session: &Session,
    project_id: i64,
) -> Result<Vec<expense::Model>> {
    session.require(Capability::ViewFinancials)?;
    Expense::find()
        .filter(expense::Column::ProjectId.eq(project_id))
        .order_by_desc(expense::Column::Date)
        .order_by_desc(expense::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Paid / remaining figures for one project.
pub async fn project_summary(
    db: &DatabaseConnection,
    session: &Session,
    project_id: i64,
) -> Result<LedgerSummary> {
    let project = find_project(db, project_id).await?;
    let payments = list_payments(db, session, project_id).await?;
    let expenses = list_expenses(db, session, project_id).await?;
    Ok(summarize(project.total_amount, &payments, &expenses))
}

/// Whether a feed line is income or an expense.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryKind {
    /// A payment
    Income,
    /// An expense
    Expense,
}

/// One line of the accounting feed.
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerEntry {
    /// Income or expense
    pub kind: EntryKind,
    /// Id within its own table
    pub id: i64,
    /// Project the entry is booked against
    pub project_id: i64,
    /// Customer of that project
    pub customer_name: String,
    /// Positive amount
    pub amount: f64,
    /// Booking date
    pub date: NaiveDate,
    /// Payment type or expense category
    pub label: String,
    /// Notes, if any
    pub notes: Option<String>,
}

/// Global rollup over a date range.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountingReport {
    /// First day included
    pub from: NaiveDate,
    /// Last day included
    pub to: NaiveDate,
    /// Merged feed, newest first
    pub entries: Vec<LedgerEntry>,
    /// Sum of income in range
    pub total_income: f64,
    /// Sum of expenses in range
    pub total_expense: f64,
}

impl AccountingReport {
    /// Income minus expenses.
    #[must_use]
    pub fn net(&self) -> f64 {
        self.total_income - self.total_expense
    }
}

fn feed_order(a: &LedgerEntry, b: &LedgerEntry) -> Ordering {
    b.date
        .cmp(&a.date)
        .then_with(|| a.kind.cmp(&b.kind))
        .then_with(|| b.id.cmp(&a.id))
}

/// Merges payments and expenses of every project dated within `from..=to` into one
/// feed, newest first.
pub async fn accounting_feed(
    db: &DatabaseConnection,
    session: &Session,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<AccountingReport> {
    session.require(Capability::ViewFinancials)?;
    if from > to {
        return Err(Error::validation(format!(
            "Start date {from} is after end date {to}"
        )));
    }

    let (payments, expenses, projects) = tokio::try_join!(
        Payment::find()
            .filter(payment::Column::Date.between(from, to))
            .all(db),
        Expense::find()
            .filter(expense::Column::Date.between(from, to))
            .all(db),
        Project::find().all(db),
    )?;
    let customers: HashMap<i64, String> = projects
        .into_iter()
        .map(|p| (p.id, p.customer_name))
        .collect();
    let customer = |project_id: i64| {
        customers
            .get(&project_id)
            .cloned()
            .unwrap_or_else(|| crate::core::workflow::UNKNOWN_LABEL.to_string())
    };

    let total_income = payments.iter().map(|p| p.amount).sum();
    let total_expense = expenses.iter().map(|e| e.amount).sum();

    let mut entries: Vec<LedgerEntry> = payments
        .into_iter()
        .map(|p| LedgerEntry {
            kind: EntryKind::Income,
            id: p.id,
            project_id: p.project_id,
            customer_name: customer(p.project_id),
            amount: p.amount,
            date: p.date,
            label: p.payment_type,
            notes: p.notes,
        })
        .chain(expenses.into_iter().map(|e| LedgerEntry {
            kind: EntryKind::Expense,
            id: e.id,
            project_id: e.project_id,
            customer_name: customer(e.project_id),
            amount: e.amount,
            date: e.date,
            label: e.category,
            notes: e.notes,
        }))
        .collect();
    entries.sort_by(feed_order);

    Ok(AccountingReport {
        from,
        to,
        entries,
        total_income,
        total_expense,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::ConnectionTrait;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn entry(amount: f64, date: NaiveDate, kind: &str) -> EntryInput {
        EntryInput {
            amount,
            date,
            kind: kind.to_string(),
            notes: None,
        }
    }

    #[test]
    fn test_zero_contract_amount_is_zero_percent() {
        assert_eq!(paid_percentage(0.0, 0.0), 0.0);
        assert_eq!(paid_percentage(500.0, 0.0), 0.0);
        assert!(!paid_percentage(0.0, 0.0).is_nan());
    }

    #[test]
    fn test_display_percentage_clamps() {
        assert_eq!(display_percentage(110.0), 100.0);
        assert_eq!(display_percentage(-5.0), 0.0);
        assert_eq!(display_percentage(f64::NAN), 0.0);
        assert_eq!(display_percentage(42.5), 42.5);
    }

    #[tokio::test]
    async fn test_invalid_amounts_are_rejected() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let project = create_test_project(&db, &log, &admin, "Kaan", 1_000.0).await?;

        for amount in [0.0, -10.0, f64::NAN, f64::INFINITY] {
            let result =
                add_income(&db, &log, &admin, project.id, entry(amount, day(1), "cash")).await;
            assert!(matches!(result, Err(Error::Validation { .. })));
            let result =
                add_expense(&db, &log, &admin, project.id, entry(amount, day(1), "wood")).await;
            assert!(matches!(result, Err(Error::Validation { .. })));
        }
        let result = add_income(&db, &log, &admin, project.id, entry(5.0, day(1), "  ")).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        assert!(list_payments(&db, &admin, project.id).await?.is_empty());
        assert!(list_expenses(&db, &admin, project.id).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_overpayment_scenario() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let project = create_test_project(&db, &log, &admin, "Hakan Çelik", 10_000.0).await?;

        add_income(&db, &log, &admin, project.id, entry(6_000.0, day(1), "transfer")).await?;
        let summary = project_summary(&db, &admin, project.id).await?;
        assert_eq!(summary.paid_percentage, 60.0);
        assert_eq!(summary.remaining, 4_000.0);
        assert!(!summary.is_overpaid());

        add_income(&db, &log, &admin, project.id, entry(5_000.0, day(2), "cash")).await?;
        let summary = project_summary(&db, &admin, project.id).await?;
        assert_eq!(summary.paid_percentage, 110.0);
        assert_eq!(summary.remaining, -1_000.0);
        assert!(summary.is_overpaid());
        assert_eq!(display_percentage(summary.paid_percentage), 100.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_accountant_cannot_delete_expense() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let project = create_test_project(&db, &log, &admin, "Selin Aydın", 8_000.0).await?;
        let expense =
            add_expense(&db, &log, &admin, project.id, entry(750.0, day(3), "material")).await?;
        let accountant = session_with(
            &db,
            "muhasebe-1",
            &[Capability::ViewFinancials],
        )
        .await?;

        let result = delete_expense(&db, &log, &accountant, expense.id).await;
        assert!(matches!(
            result,
            Err(Error::PermissionDenied {
                capability: Capability::ManageExpenses
            })
        ));
        let expenses = list_expenses(&db, &accountant, project.id).await?;
        assert_eq!(expenses, vec![expense]);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_payment_requires_capability() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let project = create_test_project(&db, &log, &admin, "Oya", 1_000.0).await?;
        let payment =
            add_income(&db, &log, &admin, project.id, entry(100.0, day(1), "cash")).await?;
        let viewer = session_with(&db, "viewer", &[Capability::ViewFinancials]).await?;

        let result = delete_payment(&db, &log, &viewer, payment.id).await;
        assert!(matches!(result, Err(Error::PermissionDenied { .. })));

        delete_payment(&db, &log, &admin, payment.id).await?;
        assert!(list_payments(&db, &admin, project.id).await?.is_empty());

        let result = delete_payment(&db, &log, &admin, payment.id).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_entries_for_missing_project_are_rejected() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let result = add_income(&db, &log, &admin, 404, entry(10.0, day(1), "cash")).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_payment_survives_broken_activity_log() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let project = create_test_project(&db, &log, &admin, "Murat", 2_000.0).await?;
        db.execute_unprepared("DROP TABLE activity_entries").await?;

        let payment =
            add_income(&db, &log, &admin, project.id, entry(500.0, day(4), "card")).await?;
        log.flush().await;
        assert_eq!(list_payments(&db, &admin, project.id).await?, vec![payment]);
        Ok(())
    }

    #[tokio::test]
    async fn test_accounting_feed_merges_and_sorts() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let a = create_test_project(&db, &log, &admin, "Ahmet", 10_000.0).await?;
        let b = create_test_project(&db, &log, &admin, "Burcu", 20_000.0).await?;

        add_income(&db, &log, &admin, a.id, entry(1_000.0, day(2), "cash")).await?;
        add_expense(&db, &log, &admin, b.id, entry(300.0, day(2), "wood")).await?;
        add_income(&db, &log, &admin, b.id, entry(2_000.0, day(5), "transfer")).await?;
        add_expense(&db, &log, &admin, a.id, entry(50.0, day(1), "glue")).await?;
        // Outside the range
        add_income(&db, &log, &admin, a.id, entry(9_999.0, day(20), "cash")).await?;

        let report = accounting_feed(&db, &admin, day(1), day(10)).await?;
        let lines: Vec<_> = report
            .entries
            .iter()
            .map(|e| (e.kind, e.date, e.customer_name.as_str()))
            .collect();
        assert_eq!(
            lines,
            vec![
                (EntryKind::Income, day(5), "Burcu"),
                (EntryKind::Income, day(2), "Ahmet"),
                (EntryKind::Expense, day(2), "Burcu"),
                (EntryKind::Expense, day(1), "Ahmet"),
            ]
        );
        assert_eq!(report.total_income, 3_000.0);
        assert_eq!(report.total_expense, 350.0);
        assert_eq!(report.net(), 2_650.0);

        let result = accounting_feed(&db, &admin, day(10), day(1)).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        let outsider = session_with(&db, "outsider", &[]).await?;
        let result = accounting_feed(&db, &outsider, day(1), day(10)).await;
        assert!(matches!(result, Err(Error::PermissionDenied { .. })));
        Ok(())
    }
}

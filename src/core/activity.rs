//! Activity log - append-only audit trail written by every mutating operation.
//!
//! Recording is fire-and-forget. [`ActivityLog::record`] hands the entry to a
//! background task over a channel and returns immediately; the task writes entries
//! in order and logs (then drops) any write failure. The caller's own mutation has
//! already committed by the time it records, and nothing here can undo or fail it.
//!
//! Entries that mention money are flagged as financial when recorded. The feeds
//! strip their description and metadata for sessions without `can_view_financials`.

use crate::{
    core::rbac::{Capability, Session},
    entities::{ActivityEntry, ActivityType, activity_entry},
    errors::Result,
};
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// An entry to be appended.
#[derive(Clone, Debug)]
pub struct Activity {
    project_id: Option<i64>,
    activity_type: ActivityType,
    title: String,
    description: String,
    metadata: Value,
    financial: bool,
}

/// Description shown in place of a financial entry's detail.
pub const HIDDEN_DETAILS: &str = "Financial details hidden";

impl Activity {
    /// A new entry with empty metadata, not tied to any project.
    pub fn new(
        activity_type: ActivityType,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            project_id: None,
            activity_type,
            title: title.into(),
            description: description.into(),
            metadata: json!({}),
            financial: false,
        }
    }

    /// Scopes the entry to a project.
    #[must_use]
    pub const fn for_project(mut self, project_id: i64) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Marks the entry as carrying amounts.
    #[must_use]
    pub const fn financial(mut self) -> Self {
        self.financial = true;
        self
    }

    /// Attaches an open key/value payload.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug)]
enum Command {
    Record {
        user_id: Option<String>,
        activity: Activity,
    },
    Flush(oneshot::Sender<()>),
}

/// Handle to the activity writer. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ActivityLog {
    sender: mpsc::UnboundedSender<Command>,
}

impl ActivityLog {
    /// Starts the writer task on the current Tokio runtime.
    #[must_use]
    pub fn spawn(db: DatabaseConnection) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(db, receiver));
        Self { sender }
    }

    /// Queues an entry attributed to the session's principal, or to the system when
    /// nobody is signed in. Never fails.
    pub fn record(&self, session: &Session, activity: Activity) {
        let user_id = session.user_id().map(str::to_string);
        debug!(title = %activity.title, project_id = ?activity.project_id, "Recording activity");
        if self
            .sender
            .send(Command::Record { user_id, activity })
            .is_err()
        {
            warn!("Activity writer is not running; entry dropped");
        }
    }

    /// Waits until every entry queued before this call has been written or dropped.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(Command::Flush(done)).is_ok() {
            // A closed writer simply means there is nothing left to wait for.
            let _ = wait.await;
        }
    }
}

async fn run_writer(db: DatabaseConnection, mut receiver: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Record { user_id, activity } => {
                let title = activity.title.clone();
                if let Err(e) = insert_entry(&db, user_id, activity).await {
                    warn!(%title, "Failed to write activity entry: {}", e);
                }
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Activity writer stopped");
}

async fn insert_entry(
    db: &DatabaseConnection,
    user_id: Option<String>,
    activity: Activity,
) -> Result<()> {
    let entry = activity_entry::ActiveModel {
        project_id: Set(activity.project_id),
        user_id: Set(user_id),
        activity_type: Set(activity.activity_type),
        title: Set(activity.title),
        description: Set(activity.description),
        metadata: Set(activity.metadata),
        financial: Set(activity.financial),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };
    ActivityEntry::insert(entry).exec_without_returning(db).await?;
    Ok(())
}

fn redact_for(session: &Session, entries: Vec<activity_entry::Model>) -> Vec<activity_entry::Model> {
    if session.has_permission(Capability::ViewFinancials) {
        return entries;
    }
    entries
        .into_iter()
        .map(|mut entry| {
            if entry.financial {
                entry.description = HIDDEN_DETAILS.to_string();
                entry.metadata = json!({});
            }
            entry
        })
        .collect()
}

/// Entries for one project, newest first.
pub async fn list_project_activity(
    db: &DatabaseConnection,
    session: &Session,
    project_id: i64,
    limit: u64,
) -> Result<Vec<activity_entry::Model>> {
    let entries = ActivityEntry::find()
        .filter(activity_entry::Column::ProjectId.eq(project_id))
        .order_by_desc(activity_entry::Column::CreatedAt)
        .order_by_desc(activity_entry::Column::Id)
        .limit(limit)
        .all(db)
        .await?;
    Ok(redact_for(session, entries))
}

/// Entries not tied to a project (workflow, roles, staff, settings), newest first.
pub async fn list_global_activity(
    db: &DatabaseConnection,
    session: &Session,
    limit: u64,
) -> Result<Vec<activity_entry::Model>> {
    let entries = ActivityEntry::find()
        .filter(activity_entry::Column::ProjectId.is_null())
        .order_by_desc(activity_entry::Column::CreatedAt)
        .order_by_desc(activity_entry::Column::Id)
        .limit(limit)
        .all(db)
        .await?;
    Ok(redact_for(session, entries))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::ConnectionTrait;

    #[tokio::test]
    async fn test_entries_are_attributed_and_ordered() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let project = create_test_project(&db, &log, &admin, "Ayşe Yılmaz", 10_000.0).await?;

        log.record(
            &admin,
            Activity::new(ActivityType::Info, "First", "one").for_project(project.id),
        );
        log.record(
            &Session::system(),
            Activity::new(ActivityType::Info, "Second", "two")
                .for_project(project.id)
                .with_metadata(json!({ "source": "test" })),
        );
        log.flush().await;

        let entries = list_project_activity(&db, &admin, project.id, 10).await?;
        // Project creation plus the two entries above
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].title, "Second");
        assert_eq!(entries[0].user_id, None);
        assert_eq!(entries[0].metadata["source"], "test");
        assert_eq!(entries[1].title, "First");
        assert_eq!(entries[1].user_id.as_deref(), Some(ADMIN_ID));
        Ok(())
    }

    #[tokio::test]
    async fn test_global_feed_excludes_project_entries() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let system = Session::system();
        log.record(&system, Activity::new(ActivityType::Update, "Global", ""));
        log.record(&system, Activity::new(ActivityType::Update, "Scoped", "").for_project(42));
        log.flush().await;

        let global = list_global_activity(&db, &system, 10).await?;
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].title, "Global");
        Ok(())
    }

    #[tokio::test]
    async fn test_financial_entries_hidden_without_capability() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        let admin = admin_session(&db).await?;
        let project = create_test_project(&db, &log, &admin, "Hakan", 10_000.0).await?;
        log.record(
            &admin,
            Activity::new(ActivityType::Payment, "Payment received", "6000.00 received")
                .for_project(project.id)
                .with_metadata(json!({ "amount": 6000.0 }))
                .financial(),
        );
        log.record(
            &admin,
            Activity::new(ActivityType::Comment, "Comment added", "Doors look great")
                .for_project(project.id),
        );
        log.flush().await;

        let worker = session_with(&db, "worker", &[Capability::DeleteFile]).await?;
        for session in [worker, Session::system()] {
            let entries = list_project_activity(&db, &session, project.id, 10).await?;
            assert_eq!(entries.len(), 3);
            assert_eq!(entries[0].description, "Doors look great");
            assert_eq!(entries[1].title, "Payment received");
            assert_eq!(entries[1].description, HIDDEN_DETAILS);
            assert_eq!(entries[1].metadata, json!({}));
            // Project creation carries the contract amount.
            assert_eq!(entries[2].metadata, json!({}));
        }

        let accountant = session_with(&db, "acc", &[Capability::ViewFinancials]).await?;
        let entries = list_project_activity(&db, &accountant, project.id, 10).await?;
        assert_eq!(entries[1].description, "6000.00 received");
        assert_eq!(entries[1].metadata["amount"], 6000.0);
        assert_eq!(entries[2].metadata["total_amount"], 10_000.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_write_failures_are_swallowed() -> Result<()> {
        let (db, log) = setup_test_env().await?;
        db.execute_unprepared("DROP TABLE activity_entries").await?;

        log.record(&Session::system(), Activity::new(ActivityType::Info, "Lost", ""));
        log.flush().await;

        // The writer survives the failure and keeps serving flushes.
        log.record(&Session::system(), Activity::new(ActivityType::Info, "Lost too", ""));
        log.flush().await;
        Ok(())
    }
}

//! Project files and comments.
//!
//! Both are attached to a project and optionally to one of its tasks. Anyone signed
//! in may add them; removing one is allowed to its author, or to a principal holding
//! the matching delete capability.

use crate::{
    core::{
        activity::{Activity, ActivityLog},
        rbac::{Capability, Session},
    },
    entities::{ActivityType, Project, ProjectComment, ProjectFile, project_comment, project_file},
    errors::{Error, Result},
    services::ObjectStorage,
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use serde_json::json;
use tracing::{info, warn};

/// Where in a project an attachment belongs.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Anchor {
    /// Project the attachment belongs to
    pub project_id: i64,
    /// Stage, when attached to a task
    pub stage_id: Option<i64>,
    /// Task, when attached to a task
    pub sub_stage_id: Option<i64>,
}

impl Anchor {
    /// Attached to the project as a whole.
    #[must_use]
    pub const fn project(project_id: i64) -> Self {
        Self {
            project_id,
            stage_id: None,
            sub_stage_id: None,
        }
    }

    /// Attached to one task of the project.
    #[must_use]
    pub const fn task(project_id: i64, stage_id: i64, sub_stage_id: i64) -> Self {
        Self {
            project_id,
            stage_id: Some(stage_id),
            sub_stage_id: Some(sub_stage_id),
        }
    }
}

async fn require_project_exists(db: &DatabaseConnection, project_id: i64) -> Result<()> {
    if Project::find_by_id(project_id).one(db).await?.is_none() {
        return Err(Error::not_found("Project", project_id));
    }
    Ok(())
}

/// File names are flattened into a single path segment.
fn sanitize_file_name(name: &str) -> Result<String> {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return Err(Error::validation("File name cannot be empty"));
    }
    Ok(cleaned)
}

fn storage_path(project_id: i64, file_name: &str) -> String {
    format!(
        "projects/{project_id}/{}-{file_name}",
        Utc::now().timestamp_micros()
    )
}

/// Stores `bytes` in object storage and records the file against the project.
pub async fn upload_file(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    storage: &dyn ObjectStorage,
    anchor: Anchor,
    file_name: &str,
    bytes: Vec<u8>,
) -> Result<project_file::Model> {
    let principal = session.require_principal()?;
    let file_name = sanitize_file_name(file_name)?;
    require_project_exists(db, anchor.project_id).await?;

    let path = storage_path(anchor.project_id, &file_name);
    let size = i64::try_from(bytes.len()).unwrap_or(i64::MAX);
    storage.store(&path, bytes).await?;

    let inserted = project_file::ActiveModel {
        project_id: Set(anchor.project_id),
        stage_id: Set(anchor.stage_id),
        sub_stage_id: Set(anchor.sub_stage_id),
        file_name: Set(file_name),
        storage_path: Set(path.clone()),
        public_url: Set(storage.public_url(&path)),
        size_bytes: Set(size),
        uploaded_by: Set(Some(principal.id.clone())),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await;
    let file = match inserted {
        Ok(file) => file,
        Err(e) => {
            if let Err(cleanup) = storage.remove(&path).await {
                warn!(%path, "Failed to remove orphaned upload: {}", cleanup);
            }
            return Err(e.into());
        }
    };

    info!(file_id = file.id, project_id = file.project_id, size, "File uploaded");
    log.record(
        session,
        Activity::new(
            ActivityType::File,
            "File uploaded",
            format!("{} uploaded", file.file_name),
        )
        .for_project(file.project_id)
        .with_metadata(json!({
            "file_id": file.id,
            "stage_id": file.stage_id,
            "sub_stage_id": file.sub_stage_id,
            "size_bytes": file.size_bytes,
        })),
    );
    Ok(file)
}

/// Deletes a file and its stored bytes. Allowed to the uploader or to holders of
/// `can_delete_file`. The row goes first; bytes that fail to be removed are only
/// logged.
pub async fn delete_file(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    storage: &dyn ObjectStorage,
    file_id: i64,
) -> Result<()> {
    let file = ProjectFile::find_by_id(file_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("File", file_id))?;
    session.require_author_or(file.uploaded_by.as_deref(), Capability::DeleteFile)?;

    ProjectFile::delete_by_id(file_id).exec(db).await?;
    if let Err(e) = storage.remove(&file.storage_path).await {
        warn!(path = %file.storage_path, "Failed to remove stored file: {}", e);
    }

    log.record(
        session,
        Activity::new(
            ActivityType::Delete,
            "File deleted",
            format!("{} deleted", file.file_name),
        )
        .for_project(file.project_id)
        .with_metadata(json!({ "file_id": file_id })),
    );
    Ok(())
}

/// Reads a file's stored bytes.
pub async fn download_file(
    db: &DatabaseConnection,
    session: &Session,
    storage: &dyn ObjectStorage,
    file_id: i64,
) -> Result<(project_file::Model, Vec<u8>)> {
    session.require_principal()?;
    let file = ProjectFile::find_by_id(file_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("File", file_id))?;
    let bytes = storage.fetch(&file.storage_path).await?;
    Ok((file, bytes))
}

/// Files of a project, newest first.
pub async fn list_files(db: &DatabaseConnection, project_id: i64) -> Result<Vec<project_file::Model>> {
    ProjectFile::find()
        .filter(project_file::Column::ProjectId.eq(project_id))
        .order_by_desc(project_file::Column::CreatedAt)
        .order_by_desc(project_file::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Adds a comment authored by the session's principal.
pub async fn add_comment(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    anchor: Anchor,
    body: &str,
) -> Result<project_comment::Model> {
    let principal = session.require_principal()?;
    let body = body.trim();
    if body.is_empty() {
        return Err(Error::validation("Comment cannot be empty"));
    }
    require_project_exists(db, anchor.project_id).await?;

    let comment = project_comment::ActiveModel {
        project_id: Set(anchor.project_id),
        stage_id: Set(anchor.stage_id),
        sub_stage_id: Set(anchor.sub_stage_id),
        author_id: Set(Some(principal.id.clone())),
        body: Set(body.to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    log.record(
        session,
        Activity::new(ActivityType::Comment, "Comment added", comment.body.clone())
            .for_project(comment.project_id)
            .with_metadata(json!({
                "comment_id": comment.id,
                "stage_id": comment.stage_id,
                "sub_stage_id": comment.sub_stage_id,
            })),
    );
    Ok(comment)
}

/// Deletes a comment. Allowed to the author or to holders of `can_delete_comment`.
pub async fn delete_comment(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    comment_id: i64,
) -> Result<()> {
    let comment = ProjectComment::find_by_id(comment_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Comment", comment_id))?;
    session.require_author_or(comment.author_id.as_deref(), Capability::DeleteComment)?;

    ProjectComment::delete_by_id(comment_id).exec(db).await?;

    log.record(
        session,
        Activity::new(ActivityType::Delete, "Comment deleted", "A comment was removed")
            .for_project(comment.project_id)
            .with_metadata(json!({ "comment_id": comment_id })),
    );
    Ok(())
}

/// Comments of a project, oldest first, optionally narrowed to one task.
pub async fn list_comments(
    db: &DatabaseConnection,
    project_id: i64,
    sub_stage_id: Option<i64>,
) -> Result<Vec<project_comment::Model>> {
    let mut query =
        ProjectComment::find().filter(project_comment::Column::ProjectId.eq(project_id));
    if let Some(sub_stage_id) = sub_stage_id {
        query = query.filter(project_comment::Column::SubStageId.eq(sub_stage_id));
    }
    query
        .order_by_asc(project_comment::Column::CreatedAt)
        .order_by_asc(project_comment::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

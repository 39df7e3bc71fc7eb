//! Workflow definition - the ordered stages and sub-stages every project moves through.
//!
//! The definition is global and only principals holding `can_manage_settings` may
//! change it. [`Workflow`] is the in-memory read model: stages sorted by
//! `order_index`, each with its sorted sub-stages. Reorders are applied to the read
//! model first and then persisted as one batch; if the batch fails, the read model is
//! reloaded from the database so it never shows an order the server did not accept.

use crate::{
    core::{
        activity::{Activity, ActivityLog},
        rbac::{Capability, Session},
        reorder::{self, Ordered},
    },
    entities::{ActivityType, Stage, SubStage, stage, sub_stage},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::OnConflict};
use serde_json::json;
use tracing::{info, warn};

/// Label shown wherever a stage or sub-stage reference no longer resolves.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// A stage together with its ordered sub-stages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageWithTasks {
    /// The stage row
    pub stage: stage::Model,
    /// Its sub-stages, sorted by `order_index`
    pub sub_stages: Vec<sub_stage::Model>,
}

/// Read model of the whole workflow definition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Workflow {
    stages: Vec<StageWithTasks>,
}

impl Workflow {
    /// Assembles the read model. Sub-stages whose stage is missing are dropped.
    #[must_use]
    pub fn from_parts(mut stages: Vec<stage::Model>, mut sub_stages: Vec<sub_stage::Model>) -> Self {
        reorder::sort_by_order(&mut stages);
        reorder::sort_by_order(&mut sub_stages);
        let stages = stages
            .into_iter()
            .map(|stage| {
                let tasks = sub_stages
                    .iter()
                    .filter(|sub| sub.stage_id == stage.id)
                    .cloned()
                    .collect();
                StageWithTasks {
                    stage,
                    sub_stages: tasks,
                }
            })
            .collect();
        Self { stages }
    }

    /// Stages in workflow order.
    #[must_use]
    pub fn stages(&self) -> &[StageWithTasks] {
        &self.stages
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the workflow has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Looks up a stage by id.
    #[must_use]
    pub fn stage(&self, stage_id: i64) -> Option<&StageWithTasks> {
        self.stages.iter().find(|s| s.stage.id == stage_id)
    }

    /// Zero-based position of a stage in workflow order.
    #[must_use]
    pub fn position_of(&self, stage_id: i64) -> Option<usize> {
        self.stages.iter().position(|s| s.stage.id == stage_id)
    }

    /// Looks up a sub-stage by id.
    #[must_use]
    pub fn sub_stage(&self, sub_stage_id: i64) -> Option<&sub_stage::Model> {
        self.stages
            .iter()
            .flat_map(|s| s.sub_stages.iter())
            .find(|sub| sub.id == sub_stage_id)
    }

    /// Stage name, or [`UNKNOWN_LABEL`] when the id is absent or dangling.
    #[must_use]
    pub fn stage_name(&self, stage_id: Option<i64>) -> &str {
        stage_id
            .and_then(|id| self.stage(id))
            .map_or(UNKNOWN_LABEL, |s| s.stage.name.as_str())
    }

    /// Sub-stage name, or [`UNKNOWN_LABEL`] when the id is absent or dangling.
    #[must_use]
    pub fn sub_stage_name(&self, sub_stage_id: Option<i64>) -> &str {
        sub_stage_id
            .and_then(|id| self.sub_stage(id))
            .map_or(UNKNOWN_LABEL, |sub| sub.name.as_str())
    }

    /// Finds a stage by case-insensitive name.
    #[must_use]
    pub fn find_stage_by_name(&self, name: &str) -> Option<&StageWithTasks> {
        let wanted = name.trim().to_lowercase();
        self.stages
            .iter()
            .find(|s| s.stage.name.to_lowercase() == wanted)
    }

    fn stage_models(&self) -> Vec<stage::Model> {
        self.stages.iter().map(|s| s.stage.clone()).collect()
    }

    fn apply_stage_order(&mut self, ordered: &[stage::Model]) {
        let mut previous = std::mem::take(&mut self.stages);
        for stage in ordered {
            if let Some(position) = previous.iter().position(|s| s.stage.id == stage.id) {
                let mut entry = previous.swap_remove(position);
                entry.stage.order_index = stage.order_index;
                self.stages.push(entry);
            }
        }
    }

    fn apply_sub_stage_order(&mut self, stage_id: i64, ordered: Vec<sub_stage::Model>) {
        if let Some(entry) = self.stages.iter_mut().find(|s| s.stage.id == stage_id) {
            entry.sub_stages = ordered;
        }
    }
}

/// Loads stages and sub-stages concurrently and assembles the read model.
pub async fn load_workflow(db: &DatabaseConnection) -> Result<Workflow> {
    let (stages, sub_stages) = tokio::try_join!(
        Stage::find()
            .order_by_asc(stage::Column::OrderIndex)
            .order_by_asc(stage::Column::Id)
            .all(db),
        SubStage::find()
            .order_by_asc(sub_stage::Column::OrderIndex)
            .order_by_asc(sub_stage::Column::Id)
            .all(db),
    )?;
    Ok(Workflow::from_parts(stages, sub_stages))
}

fn validated_name(name: &str, what: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(format!("{what} name cannot be empty")));
    }
    Ok(trimmed.to_string())
}

/// Appends a stage at `max(order_index) + 1`.
pub async fn add_stage(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    name: &str,
) -> Result<stage::Model> {
    session.require(Capability::ManageSettings)?;
    let name = validated_name(name, "Stage")?;

    let existing = Stage::find().all(db).await?;
    let stage = stage::ActiveModel {
        name: Set(name),
        order_index: Set(reorder::next_order_index(&existing)),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(stage_id = stage.id, name = %stage.name, "Stage added");
    log.record(
        session,
        Activity::new(
            ActivityType::Create,
            "Stage added",
            format!("Stage '{}' added at position {}", stage.name, stage.order_index),
        )
        .with_metadata(json!({ "stage_id": stage.id })),
    );
    Ok(stage)
}

/// Appends a sub-stage to the end of its stage.
pub async fn add_sub_stage(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    stage_id: i64,
    name: &str,
) -> Result<sub_stage::Model> {
    session.require(Capability::ManageSettings)?;
    let name = validated_name(name, "Task")?;
    let Some(stage) = Stage::find_by_id(stage_id).one(db).await? else {
        return Err(Error::validation(format!("Stage {stage_id} does not exist")));
    };

    let siblings = SubStage::find()
        .filter(sub_stage::Column::StageId.eq(stage_id))
        .all(db)
        .await?;
    let sub_stage = sub_stage::ActiveModel {
        stage_id: Set(stage_id),
        name: Set(name),
        order_index: Set(reorder::next_order_index(&siblings)),
        ..Default::default()
    }
    .insert(db)
    .await?;

    log.record(
        session,
        Activity::new(
            ActivityType::Create,
            "Task added",
            format!("Task '{}' added to stage '{}'", sub_stage.name, stage.name),
        )
        .with_metadata(json!({ "stage_id": stage_id, "sub_stage_id": sub_stage.id })),
    );
    Ok(sub_stage)
}

/// Renames a stage.
pub async fn rename_stage(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    stage_id: i64,
    name: &str,
) -> Result<stage::Model> {
    session.require(Capability::ManageSettings)?;
    let name = validated_name(name, "Stage")?;
    let stage = Stage::find_by_id(stage_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Stage", stage_id))?;
    let old_name = stage.name.clone();

    let mut active: stage::ActiveModel = stage.into();
    active.name = Set(name);
    let stage = active.update(db).await?;

    log.record(
        session,
        Activity::new(
            ActivityType::Update,
            "Stage renamed",
            format!("Stage '{old_name}' renamed to '{}'", stage.name),
        )
        .with_metadata(json!({ "stage_id": stage.id })),
    );
    Ok(stage)
}

/// Renames a sub-stage.
pub async fn rename_sub_stage(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    sub_stage_id: i64,
    name: &str,
) -> Result<sub_stage::Model> {
    session.require(Capability::ManageSettings)?;
    let name = validated_name(name, "Task")?;
    let sub_stage = SubStage::find_by_id(sub_stage_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Task", sub_stage_id))?;
    let old_name = sub_stage.name.clone();

    let mut active: sub_stage::ActiveModel = sub_stage.into();
    active.name = Set(name);
    let sub_stage = active.update(db).await?;

    log.record(
        session,
        Activity::new(
            ActivityType::Update,
            "Task renamed",
            format!("Task '{old_name}' renamed to '{}'", sub_stage.name),
        )
        .with_metadata(json!({ "stage_id": sub_stage.stage_id, "sub_stage_id": sub_stage.id })),
    );
    Ok(sub_stage)
}

async fn persist_stage_order<C>(db: &C, stages: &[stage::Model]) -> Result<()>
where
    C: ConnectionTrait,
{
    if stages.is_empty() {
        return Ok(());
    }
    let models = stages.iter().map(|s| stage::ActiveModel {
        id: Set(s.id),
        name: Set(s.name.clone()),
        order_index: Set(s.order_index),
    });
    Stage::insert_many(models)
        .on_conflict(
            OnConflict::column(stage::Column::Id)
                .update_column(stage::Column::OrderIndex)
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

async fn persist_sub_stage_order<C>(db: &C, sub_stages: &[sub_stage::Model]) -> Result<()>
where
    C: ConnectionTrait,
{
    if sub_stages.is_empty() {
        return Ok(());
    }
    let models = sub_stages.iter().map(|s| sub_stage::ActiveModel {
        id: Set(s.id),
        stage_id: Set(s.stage_id),
        name: Set(s.name.clone()),
        order_index: Set(s.order_index),
    });
    SubStage::insert_many(models)
        .on_conflict(
            OnConflict::column(sub_stage::Column::Id)
                .update_column(sub_stage::Column::OrderIndex)
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Replaces the read model with server truth after a failed batch. If even the
/// reload fails, the snapshot taken before the optimistic change is restored.
async fn resync(db: &DatabaseConnection, workflow: &mut Workflow, before: Workflow) {
    match load_workflow(db).await {
        Ok(fresh) => *workflow = fresh,
        Err(e) => {
            warn!("Failed to reload workflow after a failed reorder: {}", e);
            *workflow = before;
        }
    }
}

/// Moves stage `dragged_id` into the position of `target_id` and renumbers every
/// stage to `1..=N`. The renumbered list is written as one batch.
pub async fn reorder_stage(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    workflow: &mut Workflow,
    dragged_id: i64,
    target_id: i64,
) -> Result<()> {
    session.require(Capability::ManageSettings)?;
    for id in [dragged_id, target_id] {
        if workflow.stage(id).is_none() {
            return Err(Error::not_found("Stage", id));
        }
    }
    let ordered = reorder::move_to_target(workflow.stage_models(), dragged_id, target_id)
        .ok_or_else(|| Error::not_found("Stage", dragged_id))?;

    let before = workflow.clone();
    workflow.apply_stage_order(&ordered);

    let committed = async {
        let txn = db.begin().await?;
        persist_stage_order(&txn, &ordered).await?;
        txn.commit().await?;
        Ok::<_, Error>(())
    }
    .await;
    if let Err(e) = committed {
        warn!(dragged_id, target_id, "Stage reorder failed, reloading: {}", e);
        resync(db, workflow, before).await;
        return Err(e);
    }

    match load_workflow(db).await {
        Ok(fresh) => *workflow = fresh,
        Err(e) => warn!("Stage order saved but the workflow could not be reloaded: {}", e),
    }

    let position = ordered
        .iter()
        .find(|s| s.id == dragged_id)
        .map_or(0, Ordered::order_index);
    log.record(
        session,
        Activity::new(
            ActivityType::Update,
            "Stages reordered",
            format!(
                "Stage '{}' moved to position {position}",
                workflow.stage_name(Some(dragged_id))
            ),
        )
        .with_metadata(json!({ "stage_id": dragged_id, "target_id": target_id })),
    );
    Ok(())
}

/// Moves sub-stage `dragged_id` into the position of `target_id` within one stage.
/// Only that stage's sub-stages are renumbered and written.
pub async fn reorder_sub_stage(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    workflow: &mut Workflow,
    stage_id: i64,
    dragged_id: i64,
    target_id: i64,
) -> Result<()> {
    session.require(Capability::ManageSettings)?;
    let entry = workflow
        .stage(stage_id)
        .ok_or_else(|| Error::not_found("Stage", stage_id))?;
    for id in [dragged_id, target_id] {
        if !entry.sub_stages.iter().any(|sub| sub.id == id) {
            return Err(Error::not_found("Task", id));
        }
    }
    let ordered = reorder::move_to_target(entry.sub_stages.clone(), dragged_id, target_id)
        .ok_or_else(|| Error::not_found("Task", dragged_id))?;

    let before = workflow.clone();
    workflow.apply_sub_stage_order(stage_id, ordered.clone());

    let committed = async {
        let txn = db.begin().await?;
        persist_sub_stage_order(&txn, &ordered).await?;
        txn.commit().await?;
        Ok::<_, Error>(())
    }
    .await;
    if let Err(e) = committed {
        warn!(stage_id, dragged_id, target_id, "Task reorder failed, reloading: {}", e);
        resync(db, workflow, before).await;
        return Err(e);
    }

    match load_workflow(db).await {
        Ok(fresh) => *workflow = fresh,
        Err(e) => warn!("Task order saved but the workflow could not be reloaded: {}", e),
    }

    log.record(
        session,
        Activity::new(
            ActivityType::Update,
            "Tasks reordered",
            format!(
                "Task '{}' moved within stage '{}'",
                workflow.sub_stage_name(Some(dragged_id)),
                workflow.stage_name(Some(stage_id))
            ),
        )
        .with_metadata(json!({
            "stage_id": stage_id,
            "sub_stage_id": dragged_id,
            "target_id": target_id,
        })),
    );
    Ok(())
}

/// Hard-deletes a stage and all of its sub-stages, then closes the gap in the
/// remaining stage order. Projects and details that pointed at the stage are left
/// as they are.
pub async fn delete_stage(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    stage_id: i64,
) -> Result<()> {
    session.require(Capability::ManageSettings)?;

    let txn = db.begin().await?;
    let stage = Stage::find_by_id(stage_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Stage", stage_id))?;
    let removed = SubStage::delete_many()
        .filter(sub_stage::Column::StageId.eq(stage_id))
        .exec(&txn)
        .await?
        .rows_affected;
    Stage::delete_by_id(stage_id).exec(&txn).await?;

    let mut remaining = Stage::find().all(&txn).await?;
    reorder::sort_by_order(&mut remaining);
    reorder::renumber(&mut remaining);
    persist_stage_order(&txn, &remaining).await?;
    txn.commit().await?;

    info!(stage_id, sub_stages = removed, "Stage deleted");
    log.record(
        session,
        Activity::new(
            ActivityType::Delete,
            "Stage deleted",
            format!("Stage '{}' and {removed} task(s) deleted", stage.name),
        )
        .with_metadata(json!({ "stage_id": stage_id, "sub_stages_removed": removed })),
    );
    Ok(())
}

/// Hard-deletes one sub-stage and closes the gap in its stage's order.
pub async fn delete_sub_stage(
    db: &DatabaseConnection,
    log: &ActivityLog,
    session: &Session,
    sub_stage_id: i64,
) -> Result<()> {
    session.require(Capability::ManageSettings)?;

    let txn = db.begin().await?;
    let sub_stage = SubStage::find_by_id(sub_stage_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Task", sub_stage_id))?;
    SubStage::delete_by_id(sub_stage_id).exec(&txn).await?;

    let mut siblings = SubStage::find()
        .filter(sub_stage::Column::StageId.eq(sub_stage.stage_id))
        .all(&txn)
        .await?;
    reorder::sort_by_order(&mut siblings);
    reorder::renumber(&mut siblings);
    persist_sub_stage_order(&txn, &siblings).await?;
    txn.commit().await?;

    log.record(
        session,
        Activity::new(
            ActivityType::Delete,
            "Task deleted",
            format!("Task '{}' deleted", sub_stage.name),
        )
        .with_metadata(json!({ "stage_id": sub_stage.stage_id, "sub_stage_id": sub_stage_id })),
    );
    Ok(())
}

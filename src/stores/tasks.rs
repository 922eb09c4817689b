//! Task collection store: load scopes, create/update/toggle/delete, and the
//! per-day derived view. Failed loads clear the collection (no stale data
//! after a failed refresh); failed single-item mutations leave it untouched.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, warn};

use crate::agenda;
use crate::error::StoreError;
use crate::mapping::{self, TASK_SELECT, TaskRow};
use crate::models::{Task, TaskDraft, TaskStatus};
use crate::remote::{Filter, Order, Query, RemoteError, RemoteStore};
use crate::stores::InflightGuard;

const TASKS_TABLE: &str = "tasks";

/// Filter context under which the collection is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskScope {
    All,
    /// Tasks with no group reference.
    Personal,
    Group(String),
}

pub struct TaskStore {
    remote: Arc<dyn RemoteStore>,
    tasks: Vec<Task>,
    is_loading: bool,
    error: Option<String>,
    inflight: InflightGuard,
}

impl TaskStore {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            tasks: Vec::new(),
            is_loading: false,
            error: None,
            inflight: InflightGuard::default(),
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Human-readable message from the last failed operation, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Replaces the whole collection with the scope's tasks, most recent
    /// first. On failure the collection is cleared rather than left stale.
    pub async fn load(&mut self, scope: TaskScope) -> bool {
        self.error = None;
        self.is_loading = true;

        let mut query = Query::select(TASK_SELECT).order_by(Order::desc("created_at"));
        match &scope {
            TaskScope::All => {}
            TaskScope::Personal => query = query.filter(Filter::is_null("group_id")),
            TaskScope::Group(id) => query = query.filter(Filter::eq("group_id", id.clone())),
        }

        let outcome = self.remote.query(TASKS_TABLE, query).await;
        self.is_loading = false;

        match outcome {
            Ok(rows) => {
                let mut tasks = Vec::with_capacity(rows.len());
                for row in rows {
                    match serde_json::from_value::<TaskRow>(row) {
                        Ok(row) => tasks.push(mapping::to_canonical(row)),
                        Err(e) => warn!("skipping malformed task row: {e}"),
                    }
                }
                self.tasks = tasks;
                true
            }
            Err(e) => {
                error!("load tasks failed: {e}");
                self.error = Some(e.to_string());
                self.tasks.clear();
                false
            }
        }
    }

    /// Creates a task for the current user. There is no optimistic insert:
    /// the collection is prepended only with the row the service returned, so
    /// the server-assigned identifier and defaulting are authoritative.
    pub async fn add(&mut self, draft: TaskDraft) -> bool {
        self.error = None;
        if !self.inflight.begin("task.add") {
            return false;
        }
        let outcome = self.add_inner(&draft).await;
        self.inflight.end("task.add");
        self.settle(outcome)
    }

    async fn add_inner(&mut self, draft: &TaskDraft) -> Result<(), StoreError> {
        let user = self
            .remote
            .current_user()
            .await?
            .ok_or(StoreError::AuthenticationRequired)?;

        let record = mapping::record_from_draft(draft);
        let row = self
            .remote
            .insert(TASKS_TABLE, record.insert_row(&user.id), TASK_SELECT)
            .await?;
        let row: TaskRow = serde_json::from_value(row).map_err(RemoteError::from)?;
        self.tasks.insert(0, mapping::to_canonical(row));
        Ok(())
    }

    /// Patches task-editable fields of an existing task and replaces the one
    /// entry from the service's post-update row. Group/assignee reassignment
    /// is not part of this surface.
    pub async fn update(&mut self, draft: TaskDraft) -> bool {
        self.error = None;
        let Some(id) = draft.id.clone() else {
            self.error = Some(StoreError::Validation("Task id is required".to_string()).to_string());
            return false;
        };
        let key = format!("task.update:{id}");
        if !self.inflight.begin(&key) {
            return false;
        }
        let outcome = self.update_inner(&id, &draft).await;
        self.inflight.end(&key);
        self.settle(outcome)
    }

    async fn update_inner(&mut self, id: &str, draft: &TaskDraft) -> Result<(), StoreError> {
        let record = mapping::record_from_draft(draft);
        let row = self
            .remote
            .update(
                TASKS_TABLE,
                record.update_patch(),
                vec![Filter::eq("id", id)],
                TASK_SELECT,
            )
            .await?;
        let row: TaskRow = serde_json::from_value(row).map_err(RemoteError::from)?;
        self.replace_local(id, mapping::to_canonical(row));
        Ok(())
    }

    /// Flips `done` ⇄ `todo` and persists. An identifier unknown to the local
    /// collection is a silent no-op: reports no change, records no error.
    pub async fn toggle_status(&mut self, id: &str) -> bool {
        self.error = None;
        let Some(current) = self.tasks.iter().find(|t| t.id == id) else {
            return false;
        };
        let next = current.status.toggled();

        let key = format!("task.toggle:{id}");
        if !self.inflight.begin(&key) {
            return false;
        }
        let outcome = self.toggle_inner(id, next).await;
        self.inflight.end(&key);
        self.settle(outcome)
    }

    async fn toggle_inner(&mut self, id: &str, next: TaskStatus) -> Result<(), StoreError> {
        let row = self
            .remote
            .update(
                TASKS_TABLE,
                json!({ "status": next }),
                vec![Filter::eq("id", id)],
                TASK_SELECT,
            )
            .await?;
        let row: TaskRow = serde_json::from_value(row).map_err(RemoteError::from)?;
        self.replace_local(id, mapping::to_canonical(row));
        Ok(())
    }

    /// Deletes remotely first; local removal happens only on success.
    pub async fn remove(&mut self, id: &str) -> bool {
        self.error = None;
        let key = format!("task.remove:{id}");
        if !self.inflight.begin(&key) {
            return false;
        }
        let outcome = self
            .remote
            .delete(TASKS_TABLE, vec![Filter::eq("id", id)])
            .await
            .map_err(StoreError::from);
        self.inflight.end(&key);

        if self.settle(outcome) {
            self.tasks.retain(|t| t.id != id);
            true
        } else {
            false
        }
    }

    /// All tasks whose normalized interval contains the given day.
    pub fn tasks_for_date(&self, date: &str) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| agenda::span_contains(t, date))
            .collect()
    }

    fn replace_local(&mut self, id: &str, next: Task) {
        if let Some(slot) = self.tasks.iter_mut().find(|t| t.id == id) {
            *slot = next;
        }
    }

    fn settle(&mut self, outcome: Result<(), StoreError>) -> bool {
        match outcome {
            Ok(()) => true,
            Err(e) => {
                error!("task mutation failed: {e}");
                self.error = Some(e.to_string());
                false
            }
        }
    }
}

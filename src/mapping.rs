//! The single typed boundary between persisted task rows and the canonical
//! in-memory model. Every row coming back from the persistence service passes
//! through [`to_canonical`] exactly once; every outgoing mutation is shaped by
//! [`record_from_draft`]. No store reshapes rows itself.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::task::PLACEHOLDER_TITLE;
use crate::models::{Task, TaskDraft, TaskPriority, TaskStatus};

/// Legacy encoding: before a dedicated end-date column existed, the end date
/// was embedded in the free-text description as `endDate:YYYY-MM-DD`.
static LEGACY_END_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*endDate:(\d{4}-\d{2}-\d{2})").expect("valid pattern"));

/// Field list requested for every task query; the joined group name rides
/// along for display.
pub const TASK_SELECT: &[&str] = &[
    "id",
    "title",
    "status",
    "due_date",
    "end_date",
    "description",
    "category_id",
    "start_time",
    "end_time",
    "priority",
    "group_id",
    "assigned_user_id",
    "groups(name)",
];

/// Persisted task row as returned by the service. Field names are the
/// contract; everything but the identifier may be absent.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskRow {
    pub id: String,
    pub title: Option<String>,
    pub status: Option<String>,
    pub due_date: Option<String>,
    pub end_date: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub priority: Option<String>,
    pub group_id: Option<String>,
    pub assigned_user_id: Option<String>,
    pub groups: Option<JoinedGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinedGroup {
    pub name: Option<String>,
}

/// Persistable field set derived from a [`TaskDraft`], ready to insert or
/// patch. The legacy embedded end date is never written back.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub title: String,
    pub status: TaskStatus,
    pub due_date: Option<String>,
    pub end_date: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub priority: TaskPriority,
    pub group_id: Option<String>,
    pub assigned_user_id: Option<String>,
}

impl TaskRecord {
    /// Full row for insertion, stamped with the owning user.
    pub fn insert_row(&self, owner_id: &str) -> Value {
        let mut row = as_object(self);
        row.insert("owner_id".to_string(), Value::String(owner_id.to_string()));
        Value::Object(row)
    }

    /// Patch for `update`: only task-editable fields. Group and assignee
    /// reassignment go through the membership surface, not here.
    pub fn update_patch(&self) -> Value {
        let mut row = as_object(self);
        row.remove("group_id");
        row.remove("assigned_user_id");
        Value::Object(row)
    }
}

fn as_object(record: &TaskRecord) -> Map<String, Value> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Pulls the first legacy embedded end date out of a description, if any.
pub fn extract_legacy_end_date(description: Option<&str>) -> Option<String> {
    let description = description?;
    LEGACY_END_DATE
        .captures(description)
        .map(|c| c[1].to_string())
}

/// Strips every legacy occurrence (with surrounding whitespace) from the
/// description surfaced to callers; `None` when nothing remains.
pub fn strip_legacy_end_date(description: Option<&str>) -> Option<String> {
    let description = description?;
    let stripped = LEGACY_END_DATE.replace_all(description, "");
    let stripped = stripped.trim();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

/// An empty or blank string is not a valid foreign reference.
fn normalize_reference(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Normalizes a persisted row into the canonical model, filling defaults and
/// migrating the legacy embedded end date transparently. The explicit
/// end-date field wins when both are present.
pub fn to_canonical(row: TaskRow) -> Task {
    let status = row
        .status
        .as_deref()
        .and_then(TaskStatus::parse)
        .unwrap_or_default();
    let priority = row
        .priority
        .as_deref()
        .and_then(TaskPriority::parse)
        .unwrap_or_default();
    let end_date = row
        .end_date
        .or_else(|| extract_legacy_end_date(row.description.as_deref()));

    Task {
        id: row.id,
        title: row
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| PLACEHOLDER_TITLE.to_string()),
        status,
        priority,
        date: row.due_date.unwrap_or_default(),
        end_date,
        start_time: row.start_time,
        end_time: row.end_time,
        description: strip_legacy_end_date(row.description.as_deref()),
        category_id: row.category_id,
        group_id: row.group_id,
        assigned_user_id: row.assigned_user_id,
        group_name: row.groups.and_then(|g| g.name),
    }
}

/// Shapes a mutation intent into persistable fields.
///
/// Title is trimmed (placeholder when blank), blank references become absent,
/// and a group reference forces the category reference to absent while
/// preserving the assignee; without a group the assignee is discarded.
pub fn record_from_draft(draft: &TaskDraft) -> TaskRecord {
    let trimmed = draft.title.trim();
    let title = if trimmed.is_empty() {
        PLACEHOLDER_TITLE.to_string()
    } else {
        trimmed.to_string()
    };

    let end_date = draft
        .end_date
        .clone()
        .or_else(|| extract_legacy_end_date(draft.description.as_deref()));
    let description = strip_legacy_end_date(draft.description.as_deref());

    let group_id = normalize_reference(draft.group_id.as_deref());
    let category_id = if group_id.is_some() {
        None
    } else {
        normalize_reference(draft.category_id.as_deref())
    };
    let assigned_user_id = if group_id.is_some() {
        normalize_reference(draft.assigned_user_id.as_deref())
    } else {
        None
    };

    TaskRecord {
        title,
        status: draft.status,
        due_date: if draft.date.is_empty() {
            None
        } else {
            Some(draft.date.clone())
        },
        end_date,
        description,
        category_id,
        start_time: draft.start_time.clone(),
        end_time: draft.end_time.clone(),
        priority: draft.priority,
        group_id,
        assigned_user_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(description: Option<&str>, end_date: Option<&str>) -> TaskRow {
        TaskRow {
            id: "t1".to_string(),
            title: Some("Trip".to_string()),
            status: None,
            due_date: Some("2024-05-01".to_string()),
            end_date: end_date.map(str::to_string),
            description: description.map(str::to_string),
            category_id: None,
            start_time: None,
            end_time: None,
            priority: None,
            group_id: None,
            assigned_user_id: None,
            groups: None,
        }
    }

    #[test]
    fn legacy_end_date_is_lifted_and_stripped() {
        let task = to_canonical(row(Some("Bring snacks endDate:2024-05-03 for the trip"), None));
        assert_eq!(task.end_date.as_deref(), Some("2024-05-03"));
        assert_eq!(task.description.as_deref(), Some("Bring snacks for the trip"));
    }

    #[test]
    fn explicit_end_date_wins_over_legacy() {
        let task = to_canonical(row(Some("notes endDate:2024-05-03"), Some("2024-05-09")));
        assert_eq!(task.end_date.as_deref(), Some("2024-05-09"));
        assert_eq!(task.description.as_deref(), Some("notes"));
    }

    #[test]
    fn all_legacy_occurrences_are_stripped() {
        let stripped = strip_legacy_end_date(Some("a endDate:2024-01-01 b endDate:2024-02-02 c"));
        assert_eq!(stripped.as_deref(), Some("a b c"));
    }

    #[test]
    fn description_of_only_legacy_pattern_becomes_none() {
        let task = to_canonical(row(Some("endDate:2024-05-03"), None));
        assert_eq!(task.end_date.as_deref(), Some("2024-05-03"));
        assert_eq!(task.description, None);
    }

    #[test]
    fn defaults_fill_missing_status_priority_and_title() {
        let mut r = row(None, None);
        r.title = Some("   ".to_string());
        let task = to_canonical(r);
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, TaskPriority::Low);
        assert_eq!(task.title, PLACEHOLDER_TITLE);
    }

    #[test]
    fn unknown_status_falls_back_to_todo() {
        let mut r = row(None, None);
        r.status = Some("archived".to_string());
        assert_eq!(to_canonical(r).status, TaskStatus::Todo);
    }

    #[test]
    fn stripped_description_is_never_rewritten() {
        let task = to_canonical(row(Some("Bring snacks endDate:2024-05-03 for the trip"), None));
        let draft = TaskDraft {
            id: Some(task.id.clone()),
            title: task.title.clone(),
            description: task.description.clone(),
            date: task.date.clone(),
            end_date: task.end_date.clone(),
            ..TaskDraft::default()
        };
        let record = record_from_draft(&draft);
        assert_eq!(record.description.as_deref(), Some("Bring snacks for the trip"));
        assert_eq!(record.end_date.as_deref(), Some("2024-05-03"));
        assert!(!record.description.as_deref().unwrap().contains("endDate:"));
    }

    #[test]
    fn group_reference_clears_category_and_keeps_assignee() {
        let draft = TaskDraft {
            title: "chores".to_string(),
            date: "2024-05-01".to_string(),
            category_id: Some("cat-1".to_string()),
            group_id: Some("grp-1".to_string()),
            assigned_user_id: Some("user-2".to_string()),
            ..TaskDraft::default()
        };
        let record = record_from_draft(&draft);
        assert_eq!(record.group_id.as_deref(), Some("grp-1"));
        assert_eq!(record.category_id, None);
        assert_eq!(record.assigned_user_id.as_deref(), Some("user-2"));
    }

    #[test]
    fn assignee_is_discarded_without_group() {
        let draft = TaskDraft {
            title: "solo".to_string(),
            date: "2024-05-01".to_string(),
            category_id: Some("cat-1".to_string()),
            assigned_user_id: Some("user-2".to_string()),
            ..TaskDraft::default()
        };
        let record = record_from_draft(&draft);
        assert_eq!(record.category_id.as_deref(), Some("cat-1"));
        assert_eq!(record.assigned_user_id, None);
    }

    #[test]
    fn blank_group_reference_normalizes_to_absent() {
        let draft = TaskDraft {
            title: "x".to_string(),
            date: "2024-05-01".to_string(),
            group_id: Some("  ".to_string()),
            category_id: Some("cat-1".to_string()),
            ..TaskDraft::default()
        };
        let record = record_from_draft(&draft);
        assert_eq!(record.group_id, None);
        assert_eq!(record.category_id.as_deref(), Some("cat-1"));
    }

    #[test]
    fn blank_title_becomes_placeholder() {
        let draft = TaskDraft {
            title: "   ".to_string(),
            date: "2024-05-01".to_string(),
            ..TaskDraft::default()
        };
        assert_eq!(record_from_draft(&draft).title, PLACEHOLDER_TITLE);
    }

    #[test]
    fn update_patch_excludes_group_and_assignee() {
        let draft = TaskDraft {
            title: "t".to_string(),
            date: "2024-05-01".to_string(),
            group_id: Some("grp-1".to_string()),
            assigned_user_id: Some("user-2".to_string()),
            ..TaskDraft::default()
        };
        let patch = record_from_draft(&draft).update_patch();
        let obj = patch.as_object().unwrap();
        assert!(!obj.contains_key("group_id"));
        assert!(!obj.contains_key("assigned_user_id"));
        assert!(obj.contains_key("title"));
        assert!(obj.contains_key("priority"));
    }
}

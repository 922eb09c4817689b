use serde::{Deserialize, Serialize};

/// Title substituted when a task is created or persisted without one.
pub const PLACEHOLDER_TITLE: &str = "Task";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    /// The UI toggle only flips between `done` and `todo`; `in_progress`
    /// collapses to `done` and is never produced by a toggle.
    pub fn toggled(self) -> Self {
        match self {
            Self::Done => Self::Todo,
            Self::Todo | Self::InProgress => Self::Done,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    #[default]
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Sort rank for aggregation: high-priority tasks sort first.
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical in-memory task, produced by the mapping layer.
///
/// Dates are calendar days (`YYYY-MM-DD`, no time zone); clock times are
/// `HH:MM` strings used only for same-day ordering. `date`/`end_date` are not
/// guaranteed to be in order — range logic normalizes the pair via min/max.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub date: String,
    pub end_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub group_id: Option<String>,
    pub assigned_user_id: Option<String>,
    pub group_name: Option<String>,
}

impl Task {
    /// A task spans multiple days when the end date is present and differs
    /// from the start date.
    pub fn is_multi_day(&self) -> bool {
        matches!(&self.end_date, Some(end) if *end != self.date)
    }
}

/// Mutation intent as supplied by the editing surface, before validation and
/// normalization by the mapping layer.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub date: String,
    pub end_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub category_id: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub group_id: Option<String>,
    pub assigned_user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_never_produces_in_progress() {
        assert_eq!(TaskStatus::Todo.toggled(), TaskStatus::Done);
        assert_eq!(TaskStatus::Done.toggled(), TaskStatus::Todo);
        assert_eq!(TaskStatus::InProgress.toggled(), TaskStatus::Done);
    }

    #[test]
    fn priority_rank_orders_high_first() {
        assert!(TaskPriority::High.rank() < TaskPriority::Medium.rank());
        assert!(TaskPriority::Medium.rank() < TaskPriority::Low.rank());
    }

    #[test]
    fn multi_day_requires_distinct_end_date() {
        let mut task = Task {
            id: "t1".to_string(),
            title: "Task".to_string(),
            status: TaskStatus::Todo,
            priority: TaskPriority::Low,
            date: "2024-05-01".to_string(),
            end_date: None,
            start_time: None,
            end_time: None,
            description: None,
            category_id: None,
            group_id: None,
            assigned_user_id: None,
            group_name: None,
        };
        assert!(!task.is_multi_day());

        task.end_date = Some("2024-05-01".to_string());
        assert!(!task.is_multi_day());

        task.end_date = Some("2024-05-03".to_string());
        assert!(task.is_multi_day());
    }
}

//! Pure per-day aggregation over the canonical task collection.
//!
//! Given a fixed window of calendar days, tasks are split into a single-day
//! bucket (degenerate interval on the target day) and a multi-day bucket
//! (normalized interval contains the target day, inclusive on both ends).
//! Functions here never mutate their input and are safe to recompute on every
//! dependency change.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::Task;

fn parse_day(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Inclusive containment test on date-only granularity. The interval
/// direction is normalized via min/max first: a task persisted with an end
/// date earlier than its start date still covers the days between them.
/// Unparseable dates fall back to lexicographic comparison, which matches
/// calendar order for well-formed ISO days.
pub fn span_contains(task: &Task, day: &str) -> bool {
    let start = task.date.as_str();
    let end = task.end_date.as_deref().unwrap_or(start);

    match (parse_day(start), parse_day(end), parse_day(day)) {
        (Some(a), Some(b), Some(d)) => {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            lo <= d && d <= hi
        }
        _ => {
            let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
            lo <= day && day <= hi
        }
    }
}

fn sort_key(task: &Task) -> (u8, &str) {
    // Untimed tasks sort at the start of their priority group.
    (
        task.priority.rank(),
        task.start_time.as_deref().unwrap_or("00:00"),
    )
}

fn collect_sorted<'a>(tasks: impl Iterator<Item = &'a Task>) -> Vec<Task> {
    let mut out: Vec<Task> = tasks.cloned().collect();
    // Stable: equal (priority, start_time) keep their collection order.
    out.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    out
}

/// Day -> ordered tasks whose interval degenerates to exactly that day.
pub fn single_day_buckets(days: &[String], tasks: &[Task]) -> HashMap<String, Vec<Task>> {
    days.iter()
        .map(|day| {
            let bucket = collect_sorted(
                tasks
                    .iter()
                    .filter(|t| !t.is_multi_day() && t.date == *day),
            );
            (day.clone(), bucket)
        })
        .collect()
}

/// Day -> ordered tasks spanning more than one day whose normalized interval
/// contains that day.
pub fn multi_day_buckets(days: &[String], tasks: &[Task]) -> HashMap<String, Vec<Task>> {
    days.iter()
        .map(|day| {
            let bucket = collect_sorted(
                tasks
                    .iter()
                    .filter(|t| t.is_multi_day() && span_contains(t, day)),
            );
            (day.clone(), bucket)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaskPriority, TaskStatus};

    fn task(id: &str, date: &str, end: Option<&str>, priority: TaskPriority) -> Task {
        Task {
            id: id.to_string(),
            title: id.to_string(),
            status: TaskStatus::Todo,
            priority,
            date: date.to_string(),
            end_date: end.map(str::to_string),
            start_time: None,
            end_time: None,
            description: None,
            category_id: None,
            group_id: None,
            assigned_user_id: None,
            group_name: None,
        }
    }

    fn days(list: &[&str]) -> Vec<String> {
        list.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn week_window_buckets_split_correctly() {
        let window = days(&["2024-05-01", "2024-05-02", "2024-05-03"]);
        let a = task("a", "2024-05-01", Some("2024-05-03"), TaskPriority::High);
        let b = task("b", "2024-05-02", None, TaskPriority::Low);
        let tasks = vec![a, b];

        let multi = multi_day_buckets(&window, &tasks);
        let single = single_day_buckets(&window, &tasks);

        let ids = |m: &HashMap<String, Vec<Task>>, d: &str| {
            m[d].iter().map(|t| t.id.clone()).collect::<Vec<_>>()
        };

        assert_eq!(ids(&multi, "2024-05-01"), ["a"]);
        assert_eq!(ids(&multi, "2024-05-02"), ["a"]);
        assert_eq!(ids(&multi, "2024-05-03"), ["a"]);
        assert_eq!(ids(&single, "2024-05-02"), ["b"]);
        assert!(single["2024-05-01"].is_empty());
        assert!(single["2024-05-03"].is_empty());
    }

    #[test]
    fn multi_day_task_never_lands_in_single_bucket() {
        let window = days(&["2024-05-01"]);
        let tasks = vec![task("a", "2024-05-01", Some("2024-05-02"), TaskPriority::Low)];
        assert!(single_day_buckets(&window, &tasks)["2024-05-01"].is_empty());
        assert_eq!(multi_day_buckets(&window, &tasks)["2024-05-01"].len(), 1);
    }

    #[test]
    fn same_day_end_date_counts_as_single_day() {
        let window = days(&["2024-05-01"]);
        let tasks = vec![task("a", "2024-05-01", Some("2024-05-01"), TaskPriority::Low)];
        assert_eq!(single_day_buckets(&window, &tasks)["2024-05-01"].len(), 1);
        assert!(multi_day_buckets(&window, &tasks)["2024-05-01"].is_empty());
    }

    #[test]
    fn reversed_interval_still_covers_the_range() {
        let window = days(&["2024-05-01", "2024-05-02", "2024-05-03"]);
        let tasks = vec![task("a", "2024-05-03", Some("2024-05-01"), TaskPriority::Low)];
        let multi = multi_day_buckets(&window, &tasks);
        for day in &window {
            assert_eq!(multi[day].len(), 1, "missing on {day}");
        }
    }

    #[test]
    fn containment_crosses_month_boundaries_by_calendar_order() {
        let t = task("a", "2024-01-30", Some("2024-02-02"), TaskPriority::Low);
        assert!(span_contains(&t, "2024-02-01"));
        assert!(!span_contains(&t, "2024-02-03"));
        assert!(!span_contains(&t, "2024-01-29"));
    }

    #[test]
    fn buckets_order_by_priority_then_start_time() {
        let window = days(&["2024-05-01"]);
        let mut low = task("low", "2024-05-01", None, TaskPriority::Low);
        low.start_time = Some("08:00".to_string());
        let mut high_late = task("high-late", "2024-05-01", None, TaskPriority::High);
        high_late.start_time = Some("14:00".to_string());
        let high_untimed = task("high-untimed", "2024-05-01", None, TaskPriority::High);
        let medium = task("medium", "2024-05-01", None, TaskPriority::Medium);

        let tasks = vec![low, high_late, high_untimed, medium];
        let single = single_day_buckets(&window, &tasks);
        let ids: Vec<_> = single["2024-05-01"].iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["high-untimed", "high-late", "medium", "low"]);
    }

    #[test]
    fn ordering_is_stable_for_equal_keys() {
        let window = days(&["2024-05-01"]);
        let first = task("first", "2024-05-01", None, TaskPriority::Medium);
        let second = task("second", "2024-05-01", None, TaskPriority::Medium);
        let tasks = vec![first, second];

        let single = single_day_buckets(&window, &tasks);
        let ids: Vec<_> = single["2024-05-01"].iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["first", "second"]);
    }

    #[test]
    fn input_collection_is_not_mutated() {
        let window = days(&["2024-05-01"]);
        let a = task("a", "2024-05-01", None, TaskPriority::Low);
        let b = task("b", "2024-05-01", None, TaskPriority::High);
        let tasks = vec![a.clone(), b.clone()];
        let _ = single_day_buckets(&window, &tasks);
        assert_eq!(tasks, vec![a, b]);
    }
}

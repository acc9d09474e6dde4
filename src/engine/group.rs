use std::collections::BTreeMap;
use std::sync::Arc;

use crate::request::status::Status;
use crate::task::priority::Priority;
use crate::task::task::Task;

/// The tasks sharing one priority, with their aggregate status.
#[derive(Debug)]
pub struct PriorityGroup {
    priority: Priority,
    label: String,
    tasks: Vec<Arc<Task>>,
    status: Status,
    failed: Vec<String>,
}

impl PriorityGroup {
    pub fn new<S: Into<String>>(priority: Priority, label: S, tasks: Vec<Arc<Task>>) -> Self {
        Self {
            priority,
            label: label.into(),
            tasks,
            status: Status::Waiting,
            failed: Vec::new(),
        }
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.id().to_string()).collect()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_waiting(&self) -> bool {
        self.status == Status::Waiting
    }

    /// Task ids that ended FAILED in the latest run of this group
    pub fn failed_tasks(&self) -> &[String] {
        &self.failed
    }

    /// Returns the previous status if it changed.
    pub fn set_status(&mut self, status: Status) -> Option<Status> {
        if self.status == status {
            return None;
        }
        let previous = self.status;
        self.status = status;
        Some(previous)
    }

    pub fn record_failure(&mut self, task_id: &str) {
        if !self.failed.iter().any(|id| id == task_id) {
            self.failed.push(task_id.to_string());
        }
    }

    /// Clear the aggregate state. Member requests are reset by the engine.
    pub fn reset(&mut self) -> Option<Status> {
        self.failed.clear();
        self.set_status(Status::Waiting)
    }
}

/// Stable sort by priority; ties keep their input order.
pub fn sort_tasks(tasks: &mut [Arc<Task>]) {
    tasks.sort_by_key(|task| task.priority());
}

/// Bucket tasks by priority, ascending, keeping input order within a bucket.
///
/// Only the first task with a given id is kept.
pub fn group_tasks(tasks: &[Arc<Task>]) -> BTreeMap<Priority, Vec<Arc<Task>>> {
    let mut groups: BTreeMap<Priority, Vec<Arc<Task>>> = BTreeMap::new();
    let mut seen = std::collections::HashSet::new();
    for task in tasks {
        if !seen.insert(task.id().to_string()) {
            continue;
        }
        groups.entry(task.priority()).or_default().push(task.clone());
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn task(id: &str, priority: i64) -> Arc<Task> {
        Task::from_sync(id, |_| Ok(Value::Null)).priority(priority).build()
    }

    #[test]
    fn test_group_tasks() {
        let tasks = vec![task("c", 2), task("a", 0), task("b", 0), task("a", 5)];
        let groups = group_tasks(&tasks);
        let keys: Vec<_> = groups.keys().map(|p| p.value()).collect();
        assert_eq!(keys, vec![0, 2]);
        let ids: Vec<_> = groups[&Priority(0)].iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut tasks = vec![task("x", 1), task("y", 0), task("z", 1)];
        sort_tasks(&mut tasks);
        let ids: Vec<_> = tasks.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["y", "x", "z"]);
    }

    #[test]
    fn test_group_status_and_reset() {
        let mut group = PriorityGroup::new(Priority(0), "Stage", vec![task("a", 0)]);
        assert!(group.is_waiting());
        assert_eq!(group.set_status(Status::Running), Some(Status::Waiting));
        group.record_failure("a");
        group.record_failure("a");
        assert_eq!(group.failed_tasks(), ["a".to_string()]);
        assert_eq!(group.reset(), Some(Status::Running));
        assert!(group.failed_tasks().is_empty());
    }
}

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::request::request::Request;
use crate::request::status::Status;
use crate::task::priority::Priority;

/// Per-invocation state shared by every task in one run.
///
/// Only the engine mutates a context while a run is in progress; async
/// workers never see it.
pub struct RunContext {
    pub run_id: String,
    pub action: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    /// Arbitrary named fields supplied by the caller
    pub data: Map<String, Value>,
    /// Intermediate values shared between tasks
    pub store: Map<String, Value>,
    /// Final outputs
    pub artifacts: Map<String, Value>,
    /// Task id to value, in completion order
    pub results: IndexMap<String, Value>,
    pub requests: IndexMap<String, Request>,
    /// Priorities to execute, ascending
    pub priorities: Vec<Priority>,
    pub created_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new<S: Into<String>>(action: S) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            action: action.into(),
            args: Vec::new(),
            kwargs: Map::new(),
            data: Map::new(),
            store: Map::new(),
            artifacts: Map::new(),
            results: IndexMap::new(),
            requests: IndexMap::new(),
            priorities: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    pub fn with_kwarg<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.kwargs.insert(key.into(), value);
        self
    }

    pub fn with_data<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn request(&self, task_id: &str) -> Option<&Request> {
        self.requests.get(task_id)
    }

    pub fn status(&self, task_id: &str) -> Option<Status> {
        self.requests.get(task_id).map(Request::status)
    }

    pub fn result(&self, task_id: &str) -> Option<&Value> {
        self.results.get(task_id)
    }

    /// A serializable view of the run, without live requests
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            run_id: self.run_id.clone(),
            action: self.action.clone(),
            args: self.args.clone(),
            kwargs: self.kwargs.clone(),
            data: self.data.clone(),
            store: self.store.clone(),
            artifacts: self.artifacts.clone(),
            results: self.results.clone(),
            statuses: self
                .requests
                .iter()
                .map(|(id, request)| (id.clone(), request.status()))
                .collect(),
            created_at: self.created_at,
        }
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("action", &self.action)
            .field("kwargs", &self.kwargs)
            .field("results", &self.results)
            .field("requests", &self.requests.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub run_id: String,
    pub action: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub data: Map<String, Value>,
    pub store: Map<String, Value>,
    pub artifacts: Map<String, Value>,
    pub results: IndexMap<String, Value>,
    pub statuses: IndexMap<String, Status>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_context() {
        let a = RunContext::new("new.project");
        let b = RunContext::new("new.project");
        assert_ne!(a.run_id, b.run_id);
        assert!(a.requests.is_empty());
        assert_eq!(a.status("missing"), None);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut ctx = RunContext::new("publish.file")
            .with_kwarg("path", json!("/show/shot.exr"))
            .with_data("user", json!("artist"));
        ctx.results.insert("stage".into(), json!(true));

        let snapshot = serde_json::to_value(ctx.snapshot()).unwrap();
        assert_eq!(snapshot["action"], "publish.file");
        assert_eq!(snapshot["kwargs"]["path"], "/show/shot.exr");
        assert_eq!(snapshot["results"]["stage"], true);
    }
}

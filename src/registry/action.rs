//! Action descriptions held by the registry

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::core::errors::Result;
use crate::engine::context::RunContext;
use crate::registry::params::{self, ParamSpec};
use crate::task::error::TaskError;
use crate::task::params::{Params, Slot};
use crate::task::priority::Priority;
use crate::task::task::Task;

pub type Availability = Arc<dyn Fn(&RunContext) -> bool + Send + Sync>;

/// How to start an external application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchDescriptor {
    pub executable: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl LaunchDescriptor {
    pub fn new<P: Into<PathBuf>>(executable: P) -> Self {
        Self {
            executable: executable.into(),
            ..Self::default()
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cwd<P: Into<PathBuf>>(mut self, cwd: P) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// The task that starts the application, connected at COMMIT.
    ///
    /// Extra positional arguments from the run are appended to `args`.
    /// The child is left running; the task returns its pid.
    pub fn task(&self, identifier: &str) -> Arc<Task> {
        let launch = self.clone();
        Task::from_fn(format!("{}.launch", identifier), move |params: Params| {
            let launch = launch.clone();
            async move { launch.spawn(&params) }
        })
        .description(format!("Launch {}", self.executable.display()))
        .priority(Priority::COMMIT)
        .pass_args()
        .build()
    }

    fn spawn(&self, params: &Params) -> std::result::Result<Value, TaskError> {
        let mut command = tokio::process::Command::new(&self.executable);
        command.args(&self.args).envs(&self.env);
        for arg in &params.args {
            match arg {
                Value::String(s) => command.arg(s),
                other => command.arg(other.to_string()),
            };
        }
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        debug!("Launching {}", self.executable.display());
        let child = command.spawn().map_err(|e| {
            TaskError::fail(format!("could not launch {}: {}", self.executable.display(), e))
        })?;
        Ok(json!({ "pid": child.id() }))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ActionKind {
    #[default]
    Standard,
    Launch(LaunchDescriptor),
}

/// A registered, invokable action
#[derive(Clone)]
pub struct ActionSpec {
    pub identifier: String,
    pub label: String,
    pub description: Option<String>,
    pub parameters: Vec<ParamSpec>,
    pub available: Option<Availability>,
    pub returns: Option<Slot>,
    pub kind: ActionKind,
}

impl ActionSpec {
    pub fn new<S: Into<String>>(identifier: S) -> Self {
        let identifier = identifier.into();
        Self {
            label: identifier.clone(),
            identifier,
            description: None,
            parameters: Vec::new(),
            available: None,
            returns: None,
            kind: ActionKind::Standard,
        }
    }

    /// An action that launches `descriptor`
    pub fn launch<S: Into<String>>(identifier: S, descriptor: LaunchDescriptor) -> Self {
        Self::new(identifier).kind(ActionKind::Launch(descriptor))
    }

    pub fn label<S: Into<String>>(mut self, label: S) -> Self {
        self.label = label.into();
        self
    }

    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn available<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RunContext) -> bool + Send + Sync + 'static,
    {
        self.available = Some(Arc::new(predicate));
        self
    }

    pub fn returns(mut self, slot: Slot) -> Self {
        self.returns = Some(slot);
        self
    }

    pub fn kind(mut self, kind: ActionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_available(&self, ctx: &RunContext) -> bool {
        self.available.as_ref().map_or(true, |pred| pred(ctx))
    }

    /// JSON Schema describing the accepted kwargs, for flag generation
    pub fn parameters_schema(&self) -> Value {
        params::to_json_schema(&self.parameters)
    }

    pub fn validate(&self) -> Result<()> {
        params::validate_definitions(&self.parameters)
    }
}

impl fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSpec")
            .field("identifier", &self.identifier)
            .field("label", &self.label)
            .field("parameters", &self.parameters)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Actions nested by the dotted segments of their identifiers
#[derive(Debug, Clone, Default)]
pub struct ActionGroup {
    /// Actions whose identifier ends at this level
    pub actions: Vec<Arc<ActionSpec>>,
    pub children: IndexMap<String, ActionGroup>,
}

impl ActionGroup {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.children.is_empty()
    }
}

/// Build a menu tree: `a.b.c` is listed under `a` then `b`.
pub fn group_actions(actions: &[Arc<ActionSpec>]) -> ActionGroup {
    let mut sorted = actions.to_vec();
    sorted.sort_by(|a, b| a.identifier.cmp(&b.identifier));

    let mut root = ActionGroup::default();
    for action in sorted {
        let mut parts: Vec<&str> = action.identifier.split('.').collect();
        parts.pop();
        let mut node = &mut root;
        for part in parts {
            node = node.children.entry(part.to_string()).or_default();
        }
        node.actions.push(action.clone());
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::params::ParamKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_group_actions() {
        let actions: Vec<_> = ["publish.file", "new.project", "new.asset", "save"]
            .into_iter()
            .map(|id| Arc::new(ActionSpec::new(id)))
            .collect();
        let tree = group_actions(&actions);

        assert_eq!(tree.actions.len(), 1);
        assert_eq!(tree.actions[0].identifier, "save");
        let keys: Vec<_> = tree.children.keys().cloned().collect();
        assert_eq!(keys, vec!["new", "publish"]);
        let new: Vec<_> = tree.children["new"]
            .actions
            .iter()
            .map(|a| a.identifier.as_str())
            .collect();
        assert_eq!(new, vec!["new.asset", "new.project"]);
    }

    #[test]
    fn test_parameters_schema() {
        let spec = ActionSpec::new("new.project")
            .param(ParamSpec::new("name", "Name", ParamKind::String).required());
        let schema = spec.parameters_schema();
        assert_eq!(schema["required"], json!(["name"]));
        assert_eq!(schema["properties"]["name"]["type"], json!("string"));
    }

    #[test]
    fn test_launch_task() {
        let spec = ActionSpec::launch("launch.editor", LaunchDescriptor::new("/usr/bin/true").arg("-n"));
        let ActionKind::Launch(descriptor) = &spec.kind else {
            panic!("expected a launch action");
        };
        let task = descriptor.task(&spec.identifier);
        assert_eq!(task.id(), "launch.editor.launch");
        assert_eq!(task.priority(), Priority::COMMIT);
    }
}

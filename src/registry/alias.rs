use serde_json::{Map, Value};
use std::sync::Arc;

use crate::core::errors::Result;
use crate::registry::action::ActionSpec;
use crate::registry::registry::{ActionRegistry, Invocation};
use crate::task::task::Task;

/// A handle bound to one identifier of a registry.
///
/// Valid before the action is registered; lookups happen on use.
#[derive(Clone, Debug)]
pub struct ActionAlias {
    registry: ActionRegistry,
    identifier: String,
}

impl ActionAlias {
    pub fn new<S: Into<String>>(registry: ActionRegistry, identifier: S) -> Self {
        Self {
            registry,
            identifier: identifier.into(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn is_registered(&self) -> bool {
        self.registry.is_registered(&self.identifier)
    }

    pub fn spec(&self) -> Result<Arc<ActionSpec>> {
        self.registry.get_action(&self.identifier, None)
    }

    pub fn connect(&self, task: Arc<Task>) -> Result<bool> {
        self.registry.connect(&self.identifier, task)
    }

    pub fn disconnect(&self, task_id: &str) -> Result<bool> {
        self.registry.disconnect(&self.identifier, task_id)
    }

    /// Every task that would run, wildcard matches included
    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.registry.get_tasks(&self.identifier, None)
    }

    pub async fn invoke(&self, args: Vec<Value>, kwargs: Map<String, Value>) -> Result<Invocation> {
        self.registry.invoke(&self.identifier, args, kwargs).await
    }
}

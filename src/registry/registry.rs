//! ActionRegistry - identifiers to actions and their connected tasks
//!
//! Tasks can be connected to an exact identifier or to a glob pattern.
//! Pattern tasks are merged into every matching identifier's task list by
//! priority, after exact tasks of equal priority.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::config::EngineConfig;
use crate::core::errors::{ActionError, Result};
use crate::core::pattern;
use crate::engine::context::RunContext;
use crate::engine::engine::{ActionEngine, ConfirmHandler, RunOutcome};
use crate::registry::action::{self, ActionGroup, ActionKind, ActionSpec};
use crate::registry::alias::ActionAlias;
use crate::registry::params;
use crate::signals::event::Event;
use crate::signals::hub::SignalHub;
use crate::signals::names;
use crate::task::task::Task;

#[derive(Default)]
struct RegistryState {
    actions: IndexMap<String, Arc<ActionSpec>>,
    tasks: IndexMap<String, Vec<Arc<Task>>>,
}

/// Insert after every task of equal or lower priority.
fn insert_sorted(tasks: &mut Vec<Arc<Task>>, task: Arc<Task>) {
    let index = tasks.partition_point(|t| t.priority() <= task.priority());
    tasks.insert(index, task);
}

/// The finished run of an invoked action
#[derive(Debug)]
pub struct Invocation {
    pub outcome: RunOutcome,
    /// Selected by the action's `returns` slot
    pub value: Value,
    /// Kept so a paused run can be resumed
    pub engine: ActionEngine,
}

#[derive(Clone)]
pub struct ActionRegistry {
    state: Arc<RwLock<RegistryState>>,
    hub: SignalHub,
    config: EngineConfig,
    confirm: Option<ConfirmHandler>,
}

impl ActionRegistry {
    pub fn new(hub: SignalHub) -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState::default())),
            hub,
            config: EngineConfig::default(),
            confirm: None,
        }
    }

    /// Configuration handed to every engine this registry builds
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_confirm<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        self.confirm = Some(Arc::new(handler));
        self
    }

    pub fn hub(&self) -> &SignalHub {
        &self.hub
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register an action. Launch actions also get their launch task connected.
    pub fn register(&self, spec: ActionSpec) -> Result<ActionAlias> {
        spec.validate()?;
        let identifier = spec.identifier.clone();
        let launch = match &spec.kind {
            ActionKind::Launch(descriptor) => Some(descriptor.task(&identifier)),
            ActionKind::Standard => None,
        };

        {
            let mut state = self.state.write();
            if state.actions.contains_key(&identifier) {
                return Err(ActionError::registration(&identifier, "already registered"));
            }
            state.actions.insert(identifier.clone(), Arc::new(spec));
        }
        info!("Registered action {}", identifier);
        self.emit(Event::ActionRegistered {
            identifier: identifier.clone(),
        })?;

        if let Some(task) = launch {
            self.connect(&identifier, task)?;
        }
        Ok(self.alias(&identifier))
    }

    /// Remove an action. Tasks connected to its identifier stay connected.
    pub fn unregister(&self, identifier: &str) -> Result<Option<Arc<ActionSpec>>> {
        let removed = self.state.write().actions.shift_remove(identifier);
        let Some(spec) = removed else {
            return Ok(None);
        };
        if let ActionKind::Launch(descriptor) = &spec.kind {
            let launch = descriptor.task(identifier);
            self.disconnect(identifier, launch.id())?;
        }
        info!("Unregistered action {}", identifier);
        self.emit(Event::ActionUnregistered {
            identifier: identifier.to_string(),
        })?;
        Ok(Some(spec))
    }

    pub fn is_registered(&self, identifier: &str) -> bool {
        self.state.read().actions.contains_key(identifier)
    }

    /// Look up an action, checking availability when a context is given.
    pub fn get_action(&self, identifier: &str, ctx: Option<&RunContext>) -> Result<Arc<ActionSpec>> {
        let spec = self
            .state
            .read()
            .actions
            .get(identifier)
            .cloned()
            .ok_or_else(|| ActionError::unknown_action(identifier))?;
        match ctx {
            Some(ctx) if !spec.is_available(ctx) => Err(ActionError::unavailable(identifier)),
            _ => Ok(spec),
        }
    }

    /// Registered actions sorted by identifier, filtered by availability
    /// when a context is given.
    pub fn actions(&self, ctx: Option<&RunContext>) -> Vec<Arc<ActionSpec>> {
        let mut actions: Vec<_> = self
            .state
            .read()
            .actions
            .values()
            .filter(|spec| ctx.map_or(true, |ctx| spec.is_available(ctx)))
            .cloned()
            .collect();
        actions.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        actions
    }

    /// Available actions as a menu tree
    pub fn group_actions(&self, ctx: Option<&RunContext>) -> ActionGroup {
        action::group_actions(&self.actions(ctx))
    }

    /// Connect a task to an identifier or pattern.
    ///
    /// Returns `false` if a task with the same id is already connected there.
    pub fn connect(&self, pattern: &str, task: Arc<Task>) -> Result<bool> {
        if pattern::is_pattern(pattern) && !pattern::is_valid(pattern) {
            warn!("{} is not a valid pattern; it will only match exactly", pattern);
        }
        let (task_id, priority) = (task.id().to_string(), task.priority());
        {
            let mut state = self.state.write();
            let tasks = state.tasks.entry(pattern.to_string()).or_default();
            if tasks.iter().any(|t| t.id() == task_id) {
                return Ok(false);
            }
            insert_sorted(tasks, task);
        }
        debug!("Connected {} to {} at {}", task_id, pattern, priority);
        self.emit(Event::TaskConnected {
            pattern: pattern.to_string(),
            task_id,
            priority: priority.value(),
        })?;
        Ok(true)
    }

    pub fn disconnect(&self, pattern: &str, task_id: &str) -> Result<bool> {
        let removed = {
            let mut state = self.state.write();
            match state.tasks.get_mut(pattern) {
                Some(tasks) => {
                    let before = tasks.len();
                    tasks.retain(|t| t.id() != task_id);
                    let removed = tasks.len() != before;
                    if tasks.is_empty() {
                        state.tasks.shift_remove(pattern);
                    }
                    removed
                }
                None => false,
            }
        };
        if removed {
            debug!("Disconnected {} from {}", task_id, pattern);
            self.emit(Event::TaskDisconnected {
                pattern: pattern.to_string(),
                task_id: task_id.to_string(),
            })?;
        }
        Ok(removed)
    }

    /// Tasks connected exactly to `identifier`, in priority order
    pub fn connected(&self, identifier: &str) -> Vec<Arc<Task>> {
        self.state
            .read()
            .tasks
            .get(identifier)
            .cloned()
            .unwrap_or_default()
    }

    /// Every task that runs for `identifier`: exact tasks plus tasks of
    /// matching patterns, filtered by availability when a context is given.
    pub fn get_tasks(&self, identifier: &str, ctx: Option<&RunContext>) -> Vec<Arc<Task>> {
        let state = self.state.read();
        let mut tasks = state.tasks.get(identifier).cloned().unwrap_or_default();

        for (key, connected) in state.tasks.iter() {
            if key == identifier || !pattern::is_pattern(key) || !pattern::matches(key, identifier) {
                continue;
            }
            for task in connected {
                if tasks.iter().any(|t| t.id() == task.id()) {
                    continue;
                }
                insert_sorted(&mut tasks, task.clone());
            }
        }
        drop(state);

        if let Some(ctx) = ctx {
            tasks.retain(|task| task.available(ctx));
        }
        tasks
    }

    /// Drop the tasks of one identifier, or with `None` every action and task.
    pub fn clear(&self, identifier: Option<&str>) {
        let mut state = self.state.write();
        match identifier {
            Some(identifier) => {
                state.tasks.shift_remove(identifier);
            }
            None => {
                state.tasks.clear();
                state.actions.clear();
            }
        }
    }

    pub fn alias(&self, identifier: &str) -> ActionAlias {
        ActionAlias::new(self.clone(), identifier)
    }

    /// Build a ready-to-run engine for `identifier`.
    ///
    /// Parameter defaults are merged under `kwargs`, `context.setup`
    /// subscribers may rewrite them, and the result is validated.
    pub fn prepare(
        &self,
        identifier: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<ActionEngine> {
        let spec = self.get_action(identifier, None)?;

        let mut merged = params::defaults(&spec.parameters);
        merged.extend(kwargs);
        let kwargs = self.setup_kwargs(identifier, merged)?;
        params::validate_kwargs(&spec.parameters, &kwargs)?;

        let ctx = RunContext::new(identifier).with_args(args).with_kwargs(kwargs);
        if !spec.is_available(&ctx) {
            return Err(ActionError::unavailable(identifier));
        }
        let tasks = self.get_tasks(identifier, Some(&ctx));
        debug!("Prepared {} with {} tasks", identifier, tasks.len());

        let mut engine =
            ActionEngine::with_context(ctx, tasks, self.hub.clone()).with_config(self.config.clone());
        if let Some(slot) = &spec.returns {
            engine = engine.with_returns(slot.clone());
        }
        if let Some(confirm) = &self.confirm {
            let confirm = confirm.clone();
            engine = engine.with_confirm(move |id, prompt| confirm(id, prompt));
        }
        Ok(engine)
    }

    /// Prepare and run an action, stopping its async workers afterwards.
    pub async fn invoke(
        &self,
        identifier: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Invocation> {
        let mut engine = self.prepare(identifier, args, kwargs)?;
        let result = engine.run().await;
        if !engine.is_paused() {
            engine.shutdown().await;
        }
        let outcome = result?;
        Ok(Invocation {
            value: engine.returns(),
            outcome,
            engine,
        })
    }

    fn setup_kwargs(&self, identifier: &str, kwargs: Map<String, Value>) -> Result<Map<String, Value>> {
        let chained = self
            .hub
            .chain(names::CONTEXT_SETUP, Value::Object(kwargs.clone()))
            .map_err(|e| ActionError::signal(names::CONTEXT_SETUP, e))?;
        match chained {
            None | Some(Value::Null) => Ok(kwargs),
            Some(Value::Object(kwargs)) => Ok(kwargs),
            Some(other) => Err(ActionError::validation(format!(
                "{} setup returned non-object kwargs: {}",
                identifier, other
            ))),
        }
    }

    fn emit(&self, event: Event) -> Result<()> {
        self.hub
            .emit(&event)
            .map(|_| ())
            .map_err(|e| ActionError::signal(event.signal(), e))
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ActionRegistry")
            .field("actions", &state.actions.keys().collect::<Vec<_>>())
            .field("patterns", &state.tasks.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::params::{ParamKind, ParamSpec};
    use crate::signals::observers::EventRecorder;
    use crate::task::priority::Priority;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn task(id: &str, priority: i64) -> Arc<Task> {
        Task::from_sync(id, |_| Ok(Value::Null)).priority(priority).build()
    }

    fn ids(tasks: &[Arc<Task>]) -> Vec<&str> {
        tasks.iter().map(|t| t.id()).collect()
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let registry = ActionRegistry::new(SignalHub::new());
        registry.register(ActionSpec::new("new.project")).unwrap();
        let err = registry.register(ActionSpec::new("new.project")).unwrap_err();
        assert!(matches!(err, ActionError::Registration { .. }));
        assert!(registry.is_registered("new.project"));
    }

    #[test]
    fn test_get_action_availability() {
        let registry = ActionRegistry::new(SignalHub::new());
        registry
            .register(ActionSpec::new("publish.file").available(|ctx| ctx.data.contains_key("project")))
            .unwrap();

        let ctx = RunContext::new("publish.file");
        assert!(matches!(
            registry.get_action("publish.file", Some(&ctx)),
            Err(ActionError::Unavailable { .. })
        ));
        let ctx = ctx.with_data("project", json!("demo"));
        assert!(registry.get_action("publish.file", Some(&ctx)).is_ok());
        assert!(matches!(
            registry.get_action("missing", None),
            Err(ActionError::UnknownAction { .. })
        ));
        assert!(registry.actions(Some(&RunContext::new("x"))).is_empty());
    }

    #[test]
    fn test_connect_orders_by_priority() {
        let registry = ActionRegistry::new(SignalHub::new());
        assert!(registry.connect("new.project", task("c", 3)).unwrap());
        assert!(registry.connect("new.project", task("a", 0)).unwrap());
        assert!(registry.connect("new.project", task("a2", 0)).unwrap());
        assert!(!registry.connect("new.project", task("a", 0)).unwrap());
        assert_eq!(ids(&registry.connected("new.project")), vec!["a", "a2", "c"]);
    }

    #[test]
    fn test_wildcard_tasks_merge() {
        let registry = ActionRegistry::new(SignalHub::new());
        registry.connect("new.project", task("exact0", 0)).unwrap();
        registry.connect("new.project", task("exact3", 3)).unwrap();
        registry.connect("new.*", task("wild1", 1)).unwrap();
        registry.connect("new.*", task("wild0", 0)).unwrap();

        let tasks = registry.get_tasks("new.project", None);
        assert_eq!(ids(&tasks), vec!["exact0", "wild0", "wild1", "exact3"]);
        assert_eq!(ids(&registry.get_tasks("new.asset", None)), vec!["wild0", "wild1"]);
        assert!(registry.get_tasks("publish.file", None).is_empty());

        assert!(registry.disconnect("new.*", "wild1").unwrap());
        assert!(!registry.disconnect("new.*", "wild1").unwrap());
        assert_eq!(ids(&registry.get_tasks("new.project", None)), vec!["exact0", "wild0", "exact3"]);
    }

    #[test]
    fn test_registry_signals() {
        let hub = SignalHub::new();
        let recorder = EventRecorder::new();
        recorder.attach(&hub, "registry.*");
        let registry = ActionRegistry::new(hub);

        registry.register(ActionSpec::new("save")).unwrap();
        registry.connect("save", task("write", Priority::COMMIT.value())).unwrap();
        registry.disconnect("save", "write").unwrap();
        registry.unregister("save").unwrap();

        assert_eq!(
            recorder.signals(),
            vec![
                names::ACTION_REGISTERED,
                names::TASK_CONNECTED,
                names::TASK_DISCONNECTED,
                names::ACTION_UNREGISTERED,
            ]
        );
    }

    #[test]
    fn test_prepare_merges_defaults_and_setup() {
        let hub = SignalHub::new();
        let setup = crate::signals::hub::Subscriber::new("setup", |payload: &Value| {
            let mut kwargs = payload.clone();
            kwargs["user"] = json!("artist");
            Ok(kwargs)
        });
        hub.connect(names::CONTEXT_SETUP, &setup, 0);

        let registry = ActionRegistry::new(hub);
        registry
            .register(
                ActionSpec::new("new.shot")
                    .param(ParamSpec::new("name", "Name", ParamKind::String).required())
                    .param(ParamSpec::new("frames", "Frames", ParamKind::Integer).default_value(json!(24)))
                    .param(ParamSpec::new("user", "User", ParamKind::String)),
            )
            .unwrap();

        let mut kwargs = Map::new();
        kwargs.insert("name".into(), json!("sh010"));
        let engine = registry.prepare("new.shot", vec![], kwargs).unwrap();
        let ctx = engine.context();
        assert_eq!(ctx.kwargs["frames"], json!(24));
        assert_eq!(ctx.kwargs["user"], json!("artist"));

        assert!(matches!(
            registry.prepare("new.shot", vec![], Map::new()),
            Err(ActionError::Validation { .. })
        ));
    }

    #[test]
    fn test_clear() {
        let registry = ActionRegistry::new(SignalHub::new());
        registry.register(ActionSpec::new("save")).unwrap();
        registry.connect("save", task("a", 0)).unwrap();
        registry.clear(Some("save"));
        assert!(registry.connected("save").is_empty());
        assert!(registry.is_registered("save"));
        registry.clear(None);
        assert!(!registry.is_registered("save"));
    }
}

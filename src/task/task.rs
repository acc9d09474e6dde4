use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::context::RunContext;
use crate::task::error::TaskError;
use crate::task::params::{Params, Slot};
use crate::task::priority::Priority;

/// Readiness, skip and availability checks
pub type Predicate = Arc<dyn Fn(&RunContext) -> bool + Send + Sync>;
/// Produces one argument value from the run
pub type Getter = Arc<dyn Fn(&RunContext) -> Result<Value, TaskError> + Send + Sync>;
/// Writes a successful result back into the run
pub type Injector = Arc<dyn Fn(&mut RunContext, &Value) -> Result<(), TaskError> + Send + Sync>;

/// The work a task performs
#[async_trait]
pub trait TaskBody: Send + Sync {
    async fn call(&self, params: Params) -> Result<Value, TaskError>;
}

/// Adapts an async closure into a [`TaskBody`]
pub struct FnBody<F>(F);

#[async_trait]
impl<F, Fut> TaskBody for FnBody<F>
where
    F: Fn(Params) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
{
    async fn call(&self, params: Params) -> Result<Value, TaskError> {
        (self.0)(params).await
    }
}

/// Adapts a blocking closure into a [`TaskBody`]
pub struct SyncFnBody<F>(F);

#[async_trait]
impl<F> TaskBody for SyncFnBody<F>
where
    F: Fn(Params) -> Result<Value, TaskError> + Send + Sync,
{
    async fn call(&self, params: Params) -> Result<Value, TaskError> {
        (self.0)(params)
    }
}

/// How a task's requests execute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Inline on the scheduler
    Sync,
    /// On a background worker; `None` falls back to the engine config
    Async {
        retries: Option<u32>,
        interval: Option<Duration>,
    },
}

enum ArgSource {
    Getter(Getter),
    Args,
}

/// An immutable unit of work attached to one or more actions.
///
/// Build with [`Task::builder`], [`Task::from_fn`] or [`Task::from_sync`].
pub struct Task {
    id: String,
    description: Option<String>,
    priority: Priority,
    mode: ExecMode,
    requires: Vec<Predicate>,
    skips: Vec<Predicate>,
    args: Vec<ArgSource>,
    kwargs: Vec<(String, Getter)>,
    pass_kwargs: bool,
    injectors: Vec<Injector>,
    available: Option<Predicate>,
    body: Arc<dyn TaskBody>,
}

impl Task {
    pub fn builder<S: Into<String>>(id: S, body: Arc<dyn TaskBody>) -> TaskBuilder {
        TaskBuilder::new(id, body)
    }

    pub fn from_fn<S, F, Fut>(id: S, func: F) -> TaskBuilder
    where
        S: Into<String>,
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        TaskBuilder::new(id, Arc::new(FnBody(func)))
    }

    pub fn from_sync<S, F>(id: S, func: F) -> TaskBuilder
    where
        S: Into<String>,
        F: Fn(Params) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        TaskBuilder::new(id, Arc::new(SyncFnBody(func)))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub fn is_async(&self) -> bool {
        matches!(self.mode, ExecMode::Async { .. })
    }

    /// All readiness predicates hold
    pub fn ready(&self, ctx: &RunContext) -> bool {
        self.requires.iter().all(|pred| pred(ctx))
    }

    /// Any skip predicate holds
    pub fn skip(&self, ctx: &RunContext) -> bool {
        self.skips.iter().any(|pred| pred(ctx))
    }

    /// Whether the task takes part in runs described by `ctx`
    pub fn available(&self, ctx: &RunContext) -> bool {
        self.available.as_ref().map_or(true, |pred| pred(ctx))
    }

    /// Build the arguments for one execution.
    pub fn params(&self, ctx: &RunContext, confirmed: bool) -> Result<Params, TaskError> {
        let mut params = Params {
            confirmed,
            ..Params::default()
        };
        for source in &self.args {
            match source {
                ArgSource::Getter(getter) => params.args.push(getter(ctx)?),
                ArgSource::Args => params.args.extend(ctx.args.iter().cloned()),
            }
        }
        if self.pass_kwargs {
            params.kwargs.extend(ctx.kwargs.clone());
        }
        for (name, getter) in &self.kwargs {
            params.kwargs.insert(name.clone(), getter(ctx)?);
        }
        Ok(params)
    }

    /// Apply every result injector in attachment order.
    pub fn inject(&self, ctx: &mut RunContext, value: &Value) -> Result<(), TaskError> {
        for injector in &self.injectors {
            injector(ctx, value)?;
        }
        Ok(())
    }

    pub fn body(&self) -> Arc<dyn TaskBody> {
        self.body.clone()
    }

    pub async fn execute(&self, params: Params) -> Result<Value, TaskError> {
        self.body.call(params).await
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("mode", &self.mode)
            .field("requires", &self.requires.len())
            .field("skips", &self.skips.len())
            .finish()
    }
}

/// Composes a [`Task`]
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new<S: Into<String>>(id: S, body: Arc<dyn TaskBody>) -> Self {
        Self {
            task: Task {
                id: id.into(),
                description: None,
                priority: Priority::default(),
                mode: ExecMode::Sync,
                requires: Vec::new(),
                skips: Vec::new(),
                args: Vec::new(),
                kwargs: Vec::new(),
                pass_kwargs: false,
                injectors: Vec::new(),
                available: None,
                body,
            },
        }
    }

    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.task.description = Some(description.into());
        self
    }

    pub fn priority<P: Into<Priority>>(mut self, priority: P) -> Self {
        self.task.priority = priority.into();
        self
    }

    /// Run on a background worker with the engine's retry defaults
    pub fn asynchronous(mut self) -> Self {
        self.task.mode = ExecMode::Async {
            retries: None,
            interval: None,
        };
        self
    }

    /// Run on a background worker, retrying up to `retries` times
    pub fn retries(mut self, retries: u32, interval: Duration) -> Self {
        self.task.mode = ExecMode::Async {
            retries: Some(retries),
            interval: Some(interval),
        };
        self
    }

    pub fn requires(mut self, predicate: Predicate) -> Self {
        self.task.requires.push(predicate);
        self
    }

    pub fn requires_fn<F>(self, predicate: F) -> Self
    where
        F: Fn(&RunContext) -> bool + Send + Sync + 'static,
    {
        self.requires(Arc::new(predicate))
    }

    pub fn skips(mut self, predicate: Predicate) -> Self {
        self.task.skips.push(predicate);
        self
    }

    pub fn skips_fn<F>(self, predicate: F) -> Self
    where
        F: Fn(&RunContext) -> bool + Send + Sync + 'static,
    {
        self.skips(Arc::new(predicate))
    }

    pub fn available<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RunContext) -> bool + Send + Sync + 'static,
    {
        self.task.available = Some(Arc::new(predicate));
        self
    }

    /// Append a positional argument read from `slot`
    pub fn arg(mut self, slot: Slot) -> Self {
        self.task
            .args
            .push(ArgSource::Getter(Arc::new(move |ctx: &RunContext| slot.get(ctx))));
        self
    }

    pub fn arg_fn<F>(mut self, getter: F) -> Self
    where
        F: Fn(&RunContext) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        self.task.args.push(ArgSource::Getter(Arc::new(getter)));
        self
    }

    /// Append the invocation's positional args
    pub fn pass_args(mut self) -> Self {
        self.task.args.push(ArgSource::Args);
        self
    }

    /// Keyword argument `name` read from `slot`
    pub fn kwarg<S: Into<String>>(mut self, name: S, slot: Slot) -> Self {
        self.task
            .kwargs
            .push((name.into(), Arc::new(move |ctx: &RunContext| slot.get(ctx))));
        self
    }

    pub fn kwarg_fn<S, F>(mut self, name: S, getter: F) -> Self
    where
        S: Into<String>,
        F: Fn(&RunContext) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        self.task.kwargs.push((name.into(), Arc::new(getter)));
        self
    }

    /// Pass every invocation kwarg through; explicit kwargs take precedence
    pub fn pass_kwargs(mut self) -> Self {
        self.task.pass_kwargs = true;
        self
    }

    /// Write the result into `slot` on success
    pub fn returns(mut self, slot: Slot) -> Self {
        self.task
            .injectors
            .push(Arc::new(move |ctx: &mut RunContext, value: &Value| {
                slot.set(ctx, value.clone())
            }));
        self
    }

    pub fn returns_fn<F>(mut self, injector: F) -> Self
    where
        F: Fn(&mut RunContext, &Value) -> Result<(), TaskError> + Send + Sync + 'static,
    {
        self.task.injectors.push(Arc::new(injector));
        self
    }

    pub fn build(self) -> Arc<Task> {
        Arc::new(self.task)
    }
}

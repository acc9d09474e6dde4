use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::request::async_request::AsyncRequest;
use crate::request::status::Status;
use crate::task::error::{RequestError, TaskError};
use crate::task::params::Params;
use crate::task::task::{ExecMode, Task};

/// The status a finished execution settles into
pub(crate) fn status_for(result: &Result<Value, TaskError>) -> Status {
    match result {
        Ok(_) | Err(TaskError::Pause { .. }) => Status::Success,
        Err(TaskError::Skip(_)) => Status::Skipped,
        Err(TaskError::Disable(_)) => Status::Disabled,
        Err(_) => Status::Failed,
    }
}

/// One invocation of a task within one run.
///
/// Status moves forward through WAITING, PENDING, RUNNING and a resolved
/// state; only [`reset`](Self::reset) returns it to WAITING.
pub struct Request {
    task: Arc<Task>,
    status: Status,
    enabled: bool,
    confirmed: bool,
    attempts: u32,
    value: Option<Value>,
    error: Option<TaskError>,
    async_retries: u32,
    async_interval: Duration,
    worker: Option<AsyncRequest>,
}

impl Request {
    pub fn new(task: Arc<Task>) -> Self {
        Self::with_async_defaults(task, 0, Duration::from_secs(1))
    }

    /// Retry settings used when an async task leaves them unset
    pub fn with_async_defaults(task: Arc<Task>, retries: u32, interval: Duration) -> Self {
        let (async_retries, async_interval) = match task.mode() {
            ExecMode::Async { retries: r, interval: i } => {
                (r.unwrap_or(retries), i.unwrap_or(interval))
            }
            ExecMode::Sync => (retries, interval),
        };
        Self {
            task,
            status: Status::Waiting,
            enabled: true,
            confirmed: false,
            attempts: 0,
            value: None,
            error: None,
            async_retries,
            async_interval,
            worker: None,
        }
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub fn id(&self) -> &str {
        self.task.id()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_async(&self) -> bool {
        self.task.is_async()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.error.as_ref()
    }

    /// Skipped because the body raised `Skip`, not because of a predicate
    pub fn skipped_by_task(&self) -> bool {
        matches!(self.error, Some(TaskError::Skip(_)))
    }

    /// Whether execution has begun (always true once resolved)
    pub fn is_started(&self) -> bool {
        match &self.worker {
            Some(worker) => worker.is_started(),
            None => self.status != Status::Waiting,
        }
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

    /// Returns `true` if the flag changed.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        let changed = self.enabled != enabled;
        self.enabled = enabled;
        changed
    }

    pub fn set_confirmed(&mut self, confirmed: bool) {
        self.confirmed = confirmed;
    }

    /// Record an outcome produced outside `get`, such as a failed injector.
    pub(crate) fn settle(&mut self, result: Result<Value, TaskError>) -> Result<Value, RequestError> {
        self.status = status_for(&result);
        match result {
            Ok(value) => {
                self.value = Some(value.clone());
                self.error = None;
                Ok(value)
            }
            Err(err) => {
                match &err {
                    TaskError::Pause { partial, .. } => self.value = Some(partial.clone()),
                    TaskError::Disable(_) => self.enabled = false,
                    _ => {}
                }
                self.error = Some(err.clone());
                Err(RequestError::Task(err))
            }
        }
    }

    fn resolved(&self) -> Option<Result<Value, RequestError>> {
        match (self.status, &self.error) {
            (Status::Success, None) => Some(Ok(self.value.clone().unwrap_or_default())),
            (status, Some(err)) if status.is_done() => Some(Err(RequestError::Task(err.clone()))),
            _ => None,
        }
    }

    /// Execute the task, or return the recorded outcome if already resolved.
    ///
    /// Sync tasks run inline and ignore `timeout`. Async tasks start their
    /// worker on first call; `Some(Duration::ZERO)` polls without blocking
    /// and yields [`RequestError::NotReady`] until the worker finishes.
    /// `params` is only consulted when execution starts.
    pub async fn get(
        &mut self,
        params: Option<Params>,
        timeout: Option<Duration>,
    ) -> Result<Value, RequestError> {
        if let Some(outcome) = self.resolved() {
            return outcome;
        }

        if !self.task.is_async() {
            self.status = Status::Running;
            self.attempts += 1;
            let result = self.task.execute(params.unwrap_or_default()).await;
            return self.settle(result);
        }

        let (task, retries, interval) = (self.task.clone(), self.async_retries, self.async_interval);
        let worker = self
            .worker
            .get_or_insert_with(|| AsyncRequest::new(task, retries, interval));
        let polled = worker.get(params, timeout).await;
        self.attempts = worker.attempts();
        self.status = worker.status();

        match polled {
            Ok(value) => self.settle(Ok(value)),
            Err(RequestError::Task(err)) => self.settle(Err(err)),
            Err(not_ready) => Err(not_ready),
        }
    }

    /// Stop the async worker, if any, and wait for it.
    pub async fn stop(&mut self) {
        if let Some(worker) = self.worker.as_mut() {
            worker.stop().await;
        }
    }

    /// Stop any worker and resolve as FAILED with `reason`.
    pub async fn cancel<S: Into<String>>(&mut self, reason: S) {
        self.stop().await;
        let _ = self.settle(Err(TaskError::fail(reason)));
    }

    /// Discard every outcome and return to WAITING.
    pub async fn reset(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop().await;
        }
        self.status = Status::Waiting;
        self.enabled = true;
        self.confirmed = false;
        self.attempts = 0;
        self.value = None;
        self.error = None;
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("task", &self.task.id())
            .field("status", &self.status)
            .field("enabled", &self.enabled)
            .field("attempts", &self.attempts)
            .field("error", &self.error)
            .finish()
    }
}

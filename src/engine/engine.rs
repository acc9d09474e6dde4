//! ActionEngine - drives one action's priority groups to completion
//!
//! Groups run strictly in ascending priority. Within a group a cooperative
//! scheduling loop moves requests between waiting, ready, success, failed,
//! skipped and disabled buckets until no request can make progress.

use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::core::config::EngineConfig;
use crate::core::errors::{ActionError, Result};
use crate::engine::context::RunContext;
use crate::engine::group::{group_tasks, PriorityGroup};
use crate::request::request::Request;
use crate::request::status::Status;
use crate::signals::event::{Event, RunOutcomeKind};
use crate::signals::hub::SignalHub;
use crate::signals::names;
use crate::task::error::{RequestError, TaskError};
use crate::task::params::Slot;
use crate::task::priority::{Priority, PriorityTable};
use crate::task::task::Task;

/// Asked to approve a task's confirmation prompt: `(task_id, prompt)`
pub type ConfirmHandler = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// How a run ended when it did not stop with an error
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every group ran; lists the groups that ended FAILED
    Completed { failed_groups: Vec<Priority> },
    /// A task paused the run; call `resume` to continue
    Paused {
        priority: Priority,
        task_id: String,
        message: String,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { failed_groups } if failed_groups.is_empty())
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }
}

#[derive(Debug, Clone)]
struct PauseInfo {
    priority: Priority,
    task_id: String,
    message: String,
}

/// Request ids by scheduling state, for the group being run
#[derive(Debug, Default)]
struct Buckets {
    waiting: VecDeque<String>,
    ready: VecDeque<String>,
    success: Vec<String>,
    failed: Vec<String>,
    skipped: VecDeque<String>,
    disabled: VecDeque<String>,
}

/// What the scheduling loop should do after handling an outcome
enum Flow {
    Continue,
    Pause,
}

pub struct ActionEngine {
    ctx: RunContext,
    hub: SignalHub,
    config: EngineConfig,
    labels: PriorityTable,
    groups: BTreeMap<Priority, PriorityGroup>,
    buckets: Buckets,
    confirm: Option<ConfirmHandler>,
    returns: Option<Slot>,
    paused: Option<PauseInfo>,
    current: Option<Priority>,
}

impl ActionEngine {
    /// Build an engine for `tasks` with a fresh context for `action`.
    pub fn new<S: Into<String>>(action: S, tasks: Vec<Arc<Task>>, hub: SignalHub) -> Self {
        Self::with_context(RunContext::new(action), tasks, hub)
    }

    /// Build an engine around a caller-prepared context.
    pub fn with_context(mut ctx: RunContext, tasks: Vec<Arc<Task>>, hub: SignalHub) -> Self {
        let labels = PriorityTable::default();
        let groups: BTreeMap<_, _> = group_tasks(&tasks)
            .into_iter()
            .map(|(priority, tasks)| {
                let group = PriorityGroup::new(priority, labels.label(priority), tasks);
                (priority, group)
            })
            .collect();
        ctx.priorities = groups.keys().copied().collect();

        Self {
            ctx,
            hub,
            config: EngineConfig::default(),
            labels,
            groups,
            buckets: Buckets::default(),
            confirm: None,
            returns: None,
            paused: None,
            current: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_labels(mut self, labels: PriorityTable) -> Self {
        for (priority, group) in self.groups.iter_mut() {
            *group = PriorityGroup::new(
                *priority,
                labels.label(*priority),
                group.tasks().to_vec(),
            );
        }
        self.labels = labels;
        self
    }

    pub fn with_confirm<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        self.confirm = Some(Arc::new(handler));
        self
    }

    /// Select the action's return value from the finished context
    pub fn with_returns(mut self, slot: Slot) -> Self {
        self.returns = Some(slot);
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut RunContext {
        &mut self.ctx
    }

    pub fn into_context(self) -> RunContext {
        self.ctx
    }

    pub fn hub(&self) -> &SignalHub {
        &self.hub
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn labels(&self) -> &PriorityTable {
        &self.labels
    }

    pub fn group(&self, priority: Priority) -> Option<&PriorityGroup> {
        self.groups.get(&priority)
    }

    pub fn groups(&self) -> impl Iterator<Item = &PriorityGroup> {
        self.groups.values()
    }

    pub fn request(&self, task_id: &str) -> Option<&Request> {
        self.ctx.requests.get(task_id)
    }

    pub fn status(&self, task_id: &str) -> Option<Status> {
        self.ctx.status(task_id)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.is_some()
    }

    /// The action's return value: the `returns` slot, or every artifact
    pub fn returns(&self) -> Value {
        match &self.returns {
            Some(slot) => slot.lookup(&self.ctx).cloned().unwrap_or(Value::Null),
            None => Value::Object(self.ctx.artifacts.clone()),
        }
    }

    /// Run every group in ascending priority.
    ///
    /// Abort, unrecognized task errors and refused confirmations stop the
    /// run with an error. A pause stops it with [`RunOutcome::Paused`].
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let priorities = self.ctx.priorities.clone();
        self.drive(None, priorities).await
    }

    /// Continue a paused run from the group that paused it.
    pub async fn resume(&mut self) -> Result<RunOutcome> {
        let info = self
            .paused
            .take()
            .ok_or_else(|| ActionError::internal(format!("{} is not paused", self.ctx.action)))?;
        let remaining = self
            .ctx
            .priorities
            .iter()
            .copied()
            .filter(|p| *p > info.priority)
            .collect();
        self.drive(Some(info.priority), remaining).await
    }

    async fn drive(&mut self, resume: Option<Priority>, priorities: Vec<Priority>) -> Result<RunOutcome> {
        let _mute = self
            .config
            .suppress_signals
            .then(|| self.hub.mute(names::ENGINE_SIGNALS.iter().copied()));

        info!(run_id = %self.ctx.run_id, "Running action {}", self.ctx.action);
        self.emit(Event::ActionBefore {
            run_id: self.ctx.run_id.clone(),
            action: self.ctx.action.clone(),
            priorities: self.ctx.priorities.iter().map(|p| p.value()).collect(),
        })?;

        let result = self.run_sequence(resume, priorities).await;

        let outcome = match &result {
            Ok(RunOutcome::Paused { .. }) => RunOutcomeKind::Paused,
            Ok(RunOutcome::Completed { failed_groups }) if failed_groups.is_empty() => {
                RunOutcomeKind::Success
            }
            Ok(RunOutcome::Completed { .. }) => RunOutcomeKind::Failed,
            Err(err) => {
                error!(run_id = %self.ctx.run_id, "Action {} stopped: {}", self.ctx.action, err);
                let failed = self.emit(Event::ActionFailed {
                    run_id: self.ctx.run_id.clone(),
                    action: self.ctx.action.clone(),
                    priority: self.current.map(|p| p.value()),
                    error: err.to_string(),
                    stopped: true,
                });
                if let Err(e) = failed {
                    warn!("action.failed subscriber error: {}", e);
                }
                RunOutcomeKind::Stopped
            }
        };

        let after = self.emit(Event::ActionAfter {
            run_id: self.ctx.run_id.clone(),
            action: self.ctx.action.clone(),
            outcome,
        });
        info!(run_id = %self.ctx.run_id, "Action {} finished: {:?}", self.ctx.action, outcome);

        let result = result?;
        after?;
        Ok(result)
    }

    async fn run_sequence(
        &mut self,
        resume: Option<Priority>,
        priorities: Vec<Priority>,
    ) -> Result<RunOutcome> {
        let mut failed_groups = Vec::new();

        if let Some(priority) = resume {
            let status = self.continue_group(priority).await?;
            if let Some(outcome) = self.after_group(priority, status, &mut failed_groups)? {
                return Ok(outcome);
            }
        }
        for priority in priorities {
            let status = self.run_group(priority).await?;
            if let Some(outcome) = self.after_group(priority, status, &mut failed_groups)? {
                return Ok(outcome);
            }
        }
        Ok(RunOutcome::Completed { failed_groups })
    }

    fn after_group(
        &self,
        priority: Priority,
        status: Status,
        failed_groups: &mut Vec<Priority>,
    ) -> Result<Option<RunOutcome>> {
        match status {
            Status::Paused => {
                let info = self
                    .paused
                    .clone()
                    .ok_or_else(|| ActionError::internal("group paused without a pausing task"))?;
                Ok(Some(RunOutcome::Paused {
                    priority: info.priority,
                    task_id: info.task_id,
                    message: info.message,
                }))
            }
            Status::Failed => {
                failed_groups.push(priority);
                if self.config.continue_on_error {
                    Ok(None)
                } else {
                    Err(ActionError::GroupFailed {
                        priority: priority.value(),
                        failed: self.group_failures(priority),
                    })
                }
            }
            _ => Ok(None),
        }
    }

    fn group_failures(&self, priority: Priority) -> Vec<String> {
        self.groups
            .get(&priority)
            .map(|g| g.failed_tasks().to_vec())
            .unwrap_or_default()
    }

    /// Run one group to quiescence and return its final status.
    ///
    /// Groups that already ran must go through [`retry_group`](Self::retry_group).
    pub async fn run_group(&mut self, priority: Priority) -> Result<Status> {
        let group = self
            .groups
            .get(&priority)
            .ok_or(ActionError::UnknownGroup {
                priority: priority.value(),
            })?;
        if !group.is_waiting() {
            return Err(ActionError::GroupState {
                priority: priority.value(),
                status: group.status().to_string(),
            });
        }
        let tasks = group.tasks().to_vec();
        let label = group.label().to_string();

        info!("Running group {} ({}) of {}", priority, label, self.ctx.action);
        self.current = Some(priority);
        self.emit(Event::GroupBefore {
            run_id: self.ctx.run_id.clone(),
            action: self.ctx.action.clone(),
            priority: priority.value(),
            label,
            tasks: tasks.iter().map(|t| t.id().to_string()).collect(),
        })?;

        self.buckets = Buckets::default();
        for task in &tasks {
            self.ensure_request(task);
            self.buckets.waiting.push_back(task.id().to_string());
        }
        self.set_group_status(priority, Status::Pending)?;
        self.set_group_status(priority, Status::Running)?;

        let result = self.run_passes(priority).await;
        self.finish_group(priority, result)
    }

    /// Reset every member of a group to WAITING and run it again.
    pub async fn retry_group(&mut self, priority: Priority) -> Result<Status> {
        let ids = self
            .groups
            .get(&priority)
            .map(|g| g.task_ids())
            .ok_or(ActionError::UnknownGroup {
                priority: priority.value(),
            })?;

        debug!("Resetting group {} of {}", priority, self.ctx.action);
        for id in &ids {
            self.reset_request(id).await?;
            self.ctx.results.shift_remove(id);
        }
        if self.paused.as_ref().is_some_and(|p| p.priority == priority) {
            self.paused = None;
        }
        if let Some(group) = self.groups.get_mut(&priority) {
            if let Some(from) = group.reset() {
                self.emit_group_change(priority, from, Status::Waiting)?;
            }
        }
        self.run_group(priority).await
    }

    async fn continue_group(&mut self, priority: Priority) -> Result<Status> {
        info!("Resuming group {} of {}", priority, self.ctx.action);
        self.current = Some(priority);
        self.set_group_status(priority, Status::Running)?;
        let result = self.run_passes(priority).await;
        self.finish_group(priority, result)
    }

    fn finish_group(&mut self, priority: Priority, result: Result<()>) -> Result<Status> {
        let current = self
            .groups
            .get(&priority)
            .map(PriorityGroup::status)
            .unwrap_or(Status::Failed);
        let status = match (&result, current) {
            (_, Status::Failed) | (Err(_), _) => Status::Failed,
            (Ok(()), _) if self.paused.is_some() => Status::Paused,
            (Ok(()), _) => Status::Success,
        };
        self.set_group_status(priority, status)?;
        debug!(
            "Group {}: {} succeeded, {} failed, {} skipped, {} disabled",
            priority,
            self.buckets.success.len(),
            self.buckets.failed.len(),
            self.buckets.skipped.len(),
            self.buckets.disabled.len()
        );

        self.emit(Event::GroupAfter {
            run_id: self.ctx.run_id.clone(),
            action: self.ctx.action.clone(),
            priority: priority.value(),
            status,
        })?;
        result?;

        if status == Status::Failed {
            let failed = self.group_failures(priority);
            warn!("Group {} of {} failed: {:?}", priority, self.ctx.action, failed);
            self.emit(Event::ActionFailed {
                run_id: self.ctx.run_id.clone(),
                action: self.ctx.action.clone(),
                priority: Some(priority.value()),
                error: format!("task group {} failed: {:?}", priority, failed),
                stopped: !self.config.continue_on_error,
            })?;
        } else {
            info!("Group {} of {} finished: {}", priority, self.ctx.action, status);
        }
        Ok(status)
    }

    /// The inner scheduling loop for one group.
    async fn run_passes(&mut self, priority: Priority) -> Result<()> {
        let mut passes = 0usize;
        loop {
            passes += 1;
            if self.config.max_passes > 0 && passes > self.config.max_passes {
                warn!(
                    "Group {} of {} hit the pass limit ({})",
                    priority, self.ctx.action, self.config.max_passes
                );
                self.abandon_ready(priority, "scheduling pass limit reached").await?;
                self.skip_waiting()?;
                return Ok(());
            }

            self.recheck_disabled().await?;
            self.process_waiting()?;

            if self.buckets.ready.is_empty() {
                self.skip_waiting()?;
                return Ok(());
            }

            let (flow, progressed) = match self.process_ready(priority).await {
                Ok(step) => step,
                Err(err) => {
                    self.abandon_ready(priority, "run stopped").await?;
                    self.skip_waiting()?;
                    return Err(err);
                }
            };
            if let Flow::Pause = flow {
                return Ok(());
            }
            self.process_skipped()?;

            if !progressed {
                tokio::time::sleep(self.config.poll_interval()).await;
            }
        }
    }

    /// Return re-enabled requests to the waiting bucket.
    async fn recheck_disabled(&mut self) -> Result<()> {
        for _ in 0..self.buckets.disabled.len() {
            let Some(id) = self.buckets.disabled.pop_front() else {
                break;
            };
            if self.request_ref(&id)?.enabled() {
                if self.request_ref(&id)?.status() == Status::Disabled {
                    self.reset_request(&id).await?;
                }
                self.buckets.waiting.push_back(id);
            } else {
                self.buckets.disabled.push_back(id);
            }
        }
        Ok(())
    }

    fn process_waiting(&mut self) -> Result<()> {
        for _ in 0..self.buckets.waiting.len() {
            let Some(id) = self.buckets.waiting.pop_front() else {
                break;
            };
            let request = self.request_ref(&id)?;
            let task = request.task().clone();

            if !request.enabled() {
                debug!("{} is disabled, holding", id);
                self.buckets.disabled.push_back(id);
            } else if task.ready(&self.ctx) {
                self.buckets.ready.push_back(id);
            } else if task.skip(&self.ctx) {
                self.transition(&id, Status::Skipped, None)?;
                self.buckets.skipped.push_back(id);
            } else {
                self.buckets.waiting.push_back(id);
            }
        }
        Ok(())
    }

    /// Resolve every ready request once. Returns whether any resolved.
    async fn process_ready(&mut self, priority: Priority) -> Result<(Flow, bool)> {
        let mut progressed = false;

        for _ in 0..self.buckets.ready.len() {
            let Some(id) = self.buckets.ready.pop_front() else {
                break;
            };
            let request = self.request_ref(&id)?;
            let task = request.task().clone();
            let started = request.is_started();
            let confirmed = request.confirmed();

            if !started && task.skip(&self.ctx) {
                self.transition(&id, Status::Skipped, None)?;
                self.buckets.skipped.push_back(id);
                progressed = true;
                continue;
            }

            let params = if started {
                Ok(None)
            } else {
                task.params(&self.ctx, confirmed).map(Some)
            };
            let outcome = match params {
                Err(err) => {
                    self.transition(&id, Status::Running, None)?;
                    let message = err.to_string();
                    let outcome = self.request_mut(&id)?.settle(Err(err));
                    let to = self.request_ref(&id)?.status();
                    self.emit_request_change(&id, Status::Running, to, Some(message))?;
                    outcome
                }
                Ok(params) => {
                    if !task.is_async() {
                        self.transition(&id, Status::Running, None)?;
                    }
                    let timeout = task.is_async().then_some(Duration::ZERO);
                    let before = self.request_ref(&id)?.status();
                    let outcome = self.request_mut(&id)?.get(params, timeout).await;
                    self.mirror(&id, before, &outcome)?;
                    outcome
                }
            };

            match outcome {
                Err(RequestError::NotReady { .. }) => {
                    self.buckets.ready.push_back(id);
                }
                Ok(value) => {
                    progressed = true;
                    if let Err(err) = task.inject(&mut self.ctx, &value) {
                        warn!("Result injection for {} failed: {}", id, err);
                        let _ = self.request_mut(&id)?.settle(Err(err.clone()));
                        self.emit_request_change(&id, Status::Success, Status::Failed, Some(err.to_string()))?;
                        if let Flow::Pause = self.handle_error(priority, &id, err).await? {
                            return Ok((Flow::Pause, true));
                        }
                        continue;
                    }
                    debug!("{} succeeded", id);
                    self.ctx.results.insert(id.clone(), value);
                    self.buckets.success.push(id);
                }
                Err(RequestError::Task(err)) => {
                    progressed = true;
                    if let Flow::Pause = self.handle_error(priority, &id, err).await? {
                        return Ok((Flow::Pause, true));
                    }
                }
            }
        }
        Ok((Flow::Continue, progressed))
    }

    /// Emit the status change a `get` produced, if any.
    fn mirror(
        &self,
        id: &str,
        before: Status,
        outcome: &std::result::Result<Value, RequestError>,
    ) -> Result<()> {
        let after = self.request_ref(id)?.status();
        if after == before {
            return Ok(());
        }
        let message = match outcome {
            Err(RequestError::Task(err)) => Some(err.to_string()),
            _ => None,
        };
        self.emit_request_change(id, before, after, message)
    }

    /// Apply the policy for a task error.
    async fn handle_error(&mut self, priority: Priority, id: &str, err: TaskError) -> Result<Flow> {
        match err {
            TaskError::Validation(_) | TaskError::Fail(_) => {
                warn!("{} failed: {}", id, err);
                self.fail_request(priority, id)?;
                Ok(Flow::Continue)
            }
            TaskError::Abort(message) => {
                error!("{} aborted the run: {}", id, message);
                self.fail_request(priority, id)?;
                Err(ActionError::aborted(id, message))
            }
            TaskError::Skip(message) => {
                debug!("{} skipped itself: {}", id, message);
                self.buckets.skipped.push_back(id.to_string());
                Ok(Flow::Continue)
            }
            TaskError::Disable(message) => {
                debug!("{} disabled itself: {}", id, message);
                self.buckets.disabled.push_back(id.to_string());
                self.emit_enabled(id, false)?;
                Ok(Flow::Continue)
            }
            TaskError::Pause { message, partial } => {
                info!("{} paused {}: {}", id, self.ctx.action, message);
                self.ctx.results.insert(id.to_string(), partial);
                self.buckets.success.push(id.to_string());
                self.paused = Some(PauseInfo {
                    priority,
                    task_id: id.to_string(),
                    message: message.clone(),
                });
                self.emit(Event::ActionPaused {
                    run_id: self.ctx.run_id.clone(),
                    action: self.ctx.action.clone(),
                    task_id: id.to_string(),
                    message,
                })?;
                Ok(Flow::Pause)
            }
            TaskError::Confirm { prompt } => {
                if self.request_ref(id)?.confirmed() {
                    warn!("{} asked for confirmation again after approval: {}", id, prompt);
                    self.fail_request(priority, id)?;
                    return Ok(Flow::Continue);
                }
                let approved = self
                    .confirm
                    .as_ref()
                    .map_or(false, |handler| handler(id, &prompt));
                if approved {
                    debug!("{} confirmed: {}", id, prompt);
                    self.reset_request(id).await?;
                    self.request_mut(id)?.set_confirmed(true);
                    self.buckets.ready.push_back(id.to_string());
                    return Ok(Flow::Continue);
                }
                warn!("{} was not confirmed: {}", id, prompt);
                self.fail_request(priority, id)?;
                Err(ActionError::Unconfirmed {
                    task_id: id.to_string(),
                    prompt,
                })
            }
            TaskError::Other(source) => {
                error!("{} raised an unexpected error: {:#}", id, source);
                self.fail_request(priority, id)?;
                Err(ActionError::task_failed(id, format!("{:#}", source))
                    .with_context("action", self.ctx.action.clone())
                    .with_context("priority", priority.to_string()))
            }
        }
    }

    fn fail_request(&mut self, priority: Priority, id: &str) -> Result<()> {
        self.buckets.failed.push(id.to_string());
        let became_failed = match self.groups.get_mut(&priority) {
            Some(group) => {
                group.record_failure(id);
                group.status() == Status::Running
            }
            None => false,
        };
        if became_failed {
            self.set_group_status(priority, Status::Failed)?;
        }
        Ok(())
    }

    /// Revive predicate-skipped requests that have become runnable.
    fn process_skipped(&mut self) -> Result<()> {
        for _ in 0..self.buckets.skipped.len() {
            let Some(id) = self.buckets.skipped.pop_front() else {
                break;
            };
            let request = self.request_ref(&id)?;
            let task = request.task().clone();
            if !request.skipped_by_task() && task.ready(&self.ctx) && !task.skip(&self.ctx) {
                debug!("{} is runnable again", id);
                self.transition(&id, Status::Waiting, None)?;
                self.buckets.ready.push_back(id);
            } else {
                self.buckets.skipped.push_back(id);
            }
        }
        Ok(())
    }

    /// Requirements can no longer change; skip everything still waiting.
    fn skip_waiting(&mut self) -> Result<()> {
        while let Some(id) = self.buckets.waiting.pop_front() {
            debug!("{} never became ready, skipping", id);
            self.transition(&id, Status::Skipped, Some("requirements not met".to_string()))?;
            self.buckets.skipped.push_back(id);
        }
        Ok(())
    }

    /// Cancel everything still in the ready bucket, stopping its workers.
    async fn abandon_ready(&mut self, priority: Priority, reason: &str) -> Result<()> {
        while let Some(id) = self.buckets.ready.pop_front() {
            let request = self.request_mut(&id)?;
            let before = request.status();
            request.cancel(reason).await;
            self.emit_request_change(&id, before, Status::Failed, Some(reason.to_string()))?;
            self.fail_request(priority, &id)?;
        }
        Ok(())
    }

    /// Enable or disable a request between runs.
    ///
    /// Re-enabling a DISABLED request returns it to WAITING.
    pub async fn set_enabled(&mut self, task_id: &str, enabled: bool) -> Result<bool> {
        let task = self
            .groups
            .values()
            .flat_map(|g| g.tasks())
            .find(|t| t.id() == task_id)
            .cloned()
            .ok_or_else(|| ActionError::validation_field("no such task", task_id))?;
        self.ensure_request(&task);

        let request = self.request_mut(task_id)?;
        if !request.set_enabled(enabled) {
            return Ok(false);
        }
        let disabled = request.status() == Status::Disabled;
        self.emit_enabled(task_id, enabled)?;
        if enabled && disabled {
            self.reset_request(task_id).await?;
        }
        Ok(true)
    }

    /// Stop every running async worker.
    pub async fn shutdown(&mut self) {
        let limit = self.config.stop_timeout();
        let stops = self.ctx.requests.values_mut().map(move |request| async move {
            let id = request.id().to_string();
            if tokio::time::timeout(limit, request.stop()).await.is_err() {
                warn!("Worker for {} did not stop within {:?}", id, limit);
            }
        });
        futures::future::join_all(stops).await;
    }

    fn ensure_request(&mut self, task: &Arc<Task>) {
        if !self.ctx.requests.contains_key(task.id()) {
            let request = Request::with_async_defaults(
                task.clone(),
                self.config.default_async_retries,
                self.config.default_retry_interval(),
            );
            self.ctx.requests.insert(task.id().to_string(), request);
        }
    }

    fn request_ref(&self, id: &str) -> Result<&Request> {
        self.ctx
            .requests
            .get(id)
            .ok_or_else(|| ActionError::internal(format!("no request for {}", id)))
    }

    fn request_mut(&mut self, id: &str) -> Result<&mut Request> {
        self.ctx
            .requests
            .get_mut(id)
            .ok_or_else(|| ActionError::internal(format!("no request for {}", id)))
    }

    async fn reset_request(&mut self, id: &str) -> Result<()> {
        let Some(request) = self.ctx.requests.get_mut(id) else {
            return Ok(());
        };
        let before = request.status();
        request.reset().await;
        if before != Status::Waiting {
            self.emit_request_change(id, before, Status::Waiting, None)?;
        }
        Ok(())
    }

    fn transition(&mut self, id: &str, to: Status, message: Option<String>) -> Result<()> {
        if let Some(from) = self.request_mut(id)?.set_status(to) {
            self.emit_request_change(id, from, to, message)?;
        }
        Ok(())
    }

    fn set_group_status(&mut self, priority: Priority, to: Status) -> Result<()> {
        let from = self
            .groups
            .get_mut(&priority)
            .and_then(|group| group.set_status(to));
        if let Some(from) = from {
            self.emit_group_change(priority, from, to)?;
        }
        Ok(())
    }

    fn emit_group_change(&self, priority: Priority, from: Status, to: Status) -> Result<()> {
        self.emit(Event::GroupStatusChanged {
            run_id: self.ctx.run_id.clone(),
            action: self.ctx.action.clone(),
            priority: priority.value(),
            from,
            to,
        })
    }

    fn emit_request_change(
        &self,
        id: &str,
        from: Status,
        to: Status,
        message: Option<String>,
    ) -> Result<()> {
        let priority = self.request_ref(id)?.task().priority();
        self.emit(Event::RequestStatusChanged {
            run_id: self.ctx.run_id.clone(),
            action: self.ctx.action.clone(),
            task_id: id.to_string(),
            priority: priority.value(),
            from,
            to,
            message,
        })
    }

    fn emit_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        self.emit(Event::RequestEnabled {
            run_id: self.ctx.run_id.clone(),
            action: self.ctx.action.clone(),
            task_id: id.to_string(),
            enabled,
        })
    }

    fn emit(&self, event: Event) -> Result<()> {
        self.hub
            .emit(&event)
            .map(|_| ())
            .map_err(|e| ActionError::signal(event.signal(), e))
    }
}

impl std::fmt::Debug for ActionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionEngine")
            .field("action", &self.ctx.action)
            .field("run_id", &self.ctx.run_id)
            .field("priorities", &self.ctx.priorities)
            .field("paused", &self.paused)
            .finish()
    }
}

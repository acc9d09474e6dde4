use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::request::request::status_for;
use crate::request::status::Status;
use crate::task::error::{RequestError, TaskError};
use crate::task::params::Params;
use crate::task::task::Task;

/// Written only by the worker; read by the owner
#[derive(Debug)]
struct WorkerState {
    status: Status,
    attempts: u32,
    outcome: Option<Result<Value, TaskError>>,
}

/// Executes a task on a dedicated background worker.
///
/// The worker starts on the first [`get`](Self::get) and retries retryable
/// errors every `interval` until the retry budget is spent.
pub struct AsyncRequest {
    task: Arc<Task>,
    retries: u32,
    interval: Duration,
    state: Arc<Mutex<WorkerState>>,
    shutdown: watch::Sender<bool>,
    finished: Option<watch::Receiver<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl AsyncRequest {
    pub fn new(task: Arc<Task>, retries: u32, interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            task,
            retries,
            interval,
            state: Arc::new(Mutex::new(WorkerState {
                status: Status::Waiting,
                attempts: 0,
                outcome: None,
            })),
            shutdown,
            finished: None,
            handle: None,
        }
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub fn status(&self) -> Status {
        self.state.lock().status
    }

    pub fn attempts(&self) -> u32 {
        self.state.lock().attempts
    }

    pub fn is_started(&self) -> bool {
        self.finished.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().outcome.is_some()
    }

    fn start(&mut self, params: Params) {
        let task = self.task.clone();
        let state = self.state.clone();
        let retries = self.retries;
        let interval = self.interval;
        let mut shutdown = self.shutdown.subscribe();
        let (finished_tx, finished_rx) = watch::channel(false);

        state.lock().status = Status::Pending;
        debug!("Starting worker for {} (retries={})", task.id(), retries);

        self.handle = Some(tokio::spawn(async move {
            let mut attempt = 0;
            loop {
                {
                    let mut s = state.lock();
                    s.status = Status::Running;
                    s.attempts += 1;
                }

                let result = tokio::select! {
                    result = task.execute(params.clone()) => result,
                    _ = shutdown.changed() => Err(TaskError::fail("stopped before completion")),
                };
                let retry = match &result {
                    Err(err) => err.is_retryable() && attempt < retries,
                    Ok(_) => false,
                };
                if !retry || *shutdown.borrow() {
                    let mut s = state.lock();
                    s.status = status_for(&result);
                    s.outcome = Some(result);
                    break;
                }

                attempt += 1;
                debug!("{} failed, retry {}/{} in {:?}", task.id(), attempt, retries, interval);
                let stopped = tokio::select! {
                    _ = shutdown.changed() => true,
                    _ = tokio::time::sleep(interval) => false,
                };
                if stopped {
                    let mut s = state.lock();
                    s.status = status_for(&result);
                    s.outcome = Some(result);
                    break;
                }
            }
            let _ = finished_tx.send(true);
        }));
        self.finished = Some(finished_rx);
    }

    fn outcome(&self) -> Option<Result<Value, TaskError>> {
        self.state.lock().outcome.clone()
    }

    /// Start the worker if needed, then wait up to `timeout` for its outcome.
    ///
    /// `Some(Duration::ZERO)` polls without blocking; `None` waits for
    /// completion. Timing out never cancels the worker.
    pub async fn get(
        &mut self,
        params: Option<Params>,
        timeout: Option<Duration>,
    ) -> Result<Value, RequestError> {
        if !self.is_started() {
            self.start(params.unwrap_or_default());
        }
        if let Some(outcome) = self.outcome() {
            return outcome.map_err(RequestError::from);
        }

        let not_ready = |waited| RequestError::NotReady {
            task_id: self.task.id().to_string(),
            waited,
        };
        let Some(finished) = self.finished.as_mut() else {
            return Err(not_ready(Duration::ZERO));
        };
        match timeout {
            Some(limit) if limit.is_zero() => return Err(not_ready(limit)),
            Some(limit) => {
                if tokio::time::timeout(limit, finished.wait_for(|done| *done))
                    .await
                    .is_err()
                {
                    return Err(not_ready(limit));
                }
            }
            None => {
                let _ = finished.wait_for(|done| *done).await;
            }
        }

        match self.outcome() {
            Some(outcome) => outcome.map_err(RequestError::from),
            None => Err(RequestError::Task(TaskError::other(anyhow::anyhow!(
                "worker for {} exited without a result",
                self.task.id()
            )))),
        }
    }

    /// Halt the worker and wait for it. A running body is dropped.
    pub async fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Worker for {} did not stop cleanly: {}", self.task.id(), e);
            }
        }
    }
}

impl Drop for AsyncRequest {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

impl std::fmt::Debug for AsyncRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncRequest")
            .field("task", &self.task.id())
            .field("retries", &self.retries)
            .field("interval", &self.interval)
            .field("state", &*self.state.lock())
            .finish()
    }
}

//! Ready-made subscribers: tracing output and an in-memory recorder.

use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::request::status::Status;
use crate::signals::event::Event;
use crate::signals::hub::{SignalHub, Subscriber};

/// Renders engine and registry events through `tracing`.
pub struct LoggingObserver;

impl LoggingObserver {
    pub fn subscriber() -> Subscriber {
        Subscriber::observer("logging-observer", |payload| {
            if let Some(event) = Event::from_payload(payload) {
                log_event(&event);
            }
        })
    }

    /// Connect a logging subscriber to every signal on `hub`.
    pub fn attach(hub: &SignalHub) -> Subscriber {
        let subscriber = Self::subscriber();
        hub.connect("*", &subscriber, i64::MAX);
        subscriber
    }
}

fn log_event(event: &Event) {
    match event {
        Event::ActionBefore { run_id, action, priorities } => {
            info!(run_id = %run_id, "Running action {} over {} groups", action, priorities.len());
        }
        Event::ActionAfter { run_id, action, outcome } => {
            info!(run_id = %run_id, "Action {} finished: {:?}", action, outcome);
        }
        Event::ActionPaused { action, task_id, message, .. } => {
            info!("Action {} paused by {}: {}", action, task_id, message);
        }
        Event::ActionFailed { action, error, stopped, .. } => {
            if *stopped {
                error!("Action {} stopped: {}", action, error);
            } else {
                warn!("Action {} continued past failure: {}", action, error);
            }
        }
        Event::GroupBefore { priority, label, tasks, .. } => {
            debug!("Group {} ({}) starting with {:?}", priority, label, tasks);
        }
        Event::GroupAfter { priority, status, .. } => {
            debug!("Group {} finished: {}", priority, status);
        }
        Event::GroupStatusChanged { priority, from, to, .. } => {
            debug!("Group {}: {} -> {}", priority, from, to);
        }
        Event::RequestStatusChanged { task_id, from, to, message, .. } => match (to, message) {
            (Status::Failed, Some(message)) => warn!("{}: {} -> {} ({})", task_id, from, to, message),
            _ => debug!("{}: {} -> {}", task_id, from, to),
        },
        Event::RequestEnabled { task_id, enabled, .. } => {
            debug!("{} enabled={}", task_id, enabled);
        }
        Event::ActionRegistered { identifier } => debug!("Registered action {}", identifier),
        Event::ActionUnregistered { identifier } => debug!("Unregistered action {}", identifier),
        Event::TaskConnected { pattern, task_id, priority } => {
            debug!("Connected {} to {} at priority {}", task_id, pattern, priority);
        }
        Event::TaskDisconnected { pattern, task_id } => {
            debug!("Disconnected {} from {}", task_id, pattern);
        }
    }
}

/// Buffers every event it receives, for assertions and replay.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<RwLock<Vec<Event>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber(&self) -> Subscriber {
        let events = self.events.clone();
        Subscriber::observer("event-recorder", move |payload: &Value| {
            if let Some(event) = Event::from_payload(payload) {
                events.write().push(event);
            }
        })
    }

    /// Connect a recording subscriber to `pattern` on `hub`.
    pub fn attach(&self, hub: &SignalHub, pattern: &str) -> Subscriber {
        let subscriber = self.subscriber();
        hub.connect(pattern, &subscriber, i64::MAX);
        subscriber
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Signal names of the recorded events, in order
    pub fn signals(&self) -> Vec<&'static str> {
        self.events.read().iter().map(Event::signal).collect()
    }

    /// Every status `task_id` moved into, in order
    pub fn statuses_for(&self, task_id: &str) -> Vec<Status> {
        self.events
            .read()
            .iter()
            .filter_map(|event| match event {
                Event::RequestStatusChanged { task_id: id, to, .. } if id == task_id => Some(*to),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_collects_events() {
        let hub = SignalHub::new();
        let recorder = EventRecorder::new();
        recorder.attach(&hub, "registry.*");
        LoggingObserver::attach(&hub);

        hub.emit(&Event::ActionRegistered {
            identifier: "new.project".into(),
        })
        .unwrap();
        hub.send("registry.other", &serde_json::json!({"not": "an event"}))
            .unwrap();

        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.signals(), vec!["registry.action.registered"]);
        recorder.clear();
        assert!(recorder.is_empty());
    }
}

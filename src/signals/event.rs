//! Typed payloads for engine and registry signals

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::status::Status;
use crate::signals::names;

/// Outcome reported by `action.after`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcomeKind {
    Success,
    Failed,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ActionBefore {
        run_id: String,
        action: String,
        priorities: Vec<i64>,
    },
    ActionAfter {
        run_id: String,
        action: String,
        outcome: RunOutcomeKind,
    },
    ActionPaused {
        run_id: String,
        action: String,
        task_id: String,
        message: String,
    },
    ActionFailed {
        run_id: String,
        action: String,
        priority: Option<i64>,
        error: String,
        /// Whether the failure stopped the run
        stopped: bool,
    },
    GroupBefore {
        run_id: String,
        action: String,
        priority: i64,
        label: String,
        tasks: Vec<String>,
    },
    GroupAfter {
        run_id: String,
        action: String,
        priority: i64,
        status: Status,
    },
    GroupStatusChanged {
        run_id: String,
        action: String,
        priority: i64,
        from: Status,
        to: Status,
    },
    RequestStatusChanged {
        run_id: String,
        action: String,
        task_id: String,
        priority: i64,
        from: Status,
        to: Status,
        message: Option<String>,
    },
    RequestEnabled {
        run_id: String,
        action: String,
        task_id: String,
        enabled: bool,
    },
    ActionRegistered {
        identifier: String,
    },
    ActionUnregistered {
        identifier: String,
    },
    TaskConnected {
        pattern: String,
        task_id: String,
        priority: i64,
    },
    TaskDisconnected {
        pattern: String,
        task_id: String,
    },
}

impl Event {
    /// The signal this event is sent on
    pub fn signal(&self) -> &'static str {
        match self {
            Self::ActionBefore { .. } => names::ACTION_BEFORE,
            Self::ActionAfter { .. } => names::ACTION_AFTER,
            Self::ActionPaused { .. } => names::ACTION_PAUSED,
            Self::ActionFailed { .. } => names::ACTION_FAILED,
            Self::GroupBefore { .. } => names::GROUP_BEFORE,
            Self::GroupAfter { .. } => names::GROUP_AFTER,
            Self::GroupStatusChanged { .. } => names::GROUP_STATUS_CHANGED,
            Self::RequestStatusChanged { .. } => names::REQUEST_STATUS_CHANGED,
            Self::RequestEnabled { .. } => names::REQUEST_ENABLED,
            Self::ActionRegistered { .. } => names::ACTION_REGISTERED,
            Self::ActionUnregistered { .. } => names::ACTION_UNREGISTERED,
            Self::TaskConnected { .. } => names::TASK_CONNECTED,
            Self::TaskDisconnected { .. } => names::TASK_DISCONNECTED,
        }
    }

    pub fn to_payload(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Parse a payload back into an event; `None` for foreign payloads.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_is_tagged() {
        let event = Event::RequestStatusChanged {
            run_id: "r".into(),
            action: "x".into(),
            task_id: "a".into(),
            priority: 0,
            from: Status::Running,
            to: Status::Success,
            message: None,
        };
        let payload = event.to_payload().unwrap();
        assert_eq!(payload["type"], "request_status_changed");
        assert_eq!(payload["to"], "success");
        assert_eq!(Event::from_payload(&payload), Some(event.clone()));
        assert_eq!(event.signal(), "request.status.changed");
    }

    #[test]
    fn test_foreign_payload() {
        assert_eq!(Event::from_payload(&json!({"hello": "world"})), None);
    }
}

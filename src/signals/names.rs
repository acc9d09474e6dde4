//! Signal names emitted by the engine and the registry.

pub const ACTION_BEFORE: &str = "action.before";
pub const ACTION_AFTER: &str = "action.after";
pub const ACTION_PAUSED: &str = "action.paused";
pub const ACTION_FAILED: &str = "action.failed";

pub const GROUP_BEFORE: &str = "group.before";
pub const GROUP_AFTER: &str = "group.after";
pub const GROUP_STATUS_CHANGED: &str = "group.status.changed";

pub const REQUEST_STATUS_CHANGED: &str = "request.status.changed";
pub const REQUEST_ENABLED: &str = "request.enabled";

/// Chained with the invocation kwargs before a run starts
pub const CONTEXT_SETUP: &str = "context.setup";

pub const ACTION_REGISTERED: &str = "registry.action.registered";
pub const ACTION_UNREGISTERED: &str = "registry.action.unregistered";
pub const TASK_CONNECTED: &str = "registry.task.connected";
pub const TASK_DISCONNECTED: &str = "registry.task.disconnected";

/// Every signal the engine itself emits during a run
pub const ENGINE_SIGNALS: &[&str] = &[
    ACTION_BEFORE,
    ACTION_AFTER,
    ACTION_PAUSED,
    ACTION_FAILED,
    GROUP_BEFORE,
    GROUP_AFTER,
    GROUP_STATUS_CHANGED,
    REQUEST_STATUS_CHANGED,
    REQUEST_ENABLED,
];

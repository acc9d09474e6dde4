use std::collections::HashMap;
use thiserror::Error;

/// Unified error type for the action engine and registry
#[derive(Debug, Error)]
pub enum ActionError {
    /// Registration errors (duplicate identifiers, invalid definitions)
    #[error("Registration failed for {identifier}: {message}")]
    Registration {
        identifier: String,
        message: String,
    },

    /// Identifier does not name a registered action
    #[error("Unknown action: {identifier}")]
    UnknownAction { identifier: String },

    /// Action exists but is not available in the given context
    #[error("Action unavailable: {identifier}")]
    Unavailable { identifier: String },

    /// Parameter definition errors
    #[error("Invalid parameter {name}: {message}")]
    Parameter { name: String, message: String },

    /// Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        details: Vec<String>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// A group was asked to run while not in the WAITING state
    #[error("Task group already ran: {priority} ({status})")]
    GroupState { priority: i64, status: String },

    /// A priority with no corresponding group
    #[error("No task group for priority {priority}")]
    UnknownGroup { priority: i64 },

    /// A group finished FAILED and the engine was told to stop on error
    #[error("Task group {priority} failed: {failed:?}")]
    GroupFailed { priority: i64, failed: Vec<String> },

    /// A task explicitly aborted the run
    #[error("Action aborted by {task_id}: {message}")]
    Aborted { task_id: String, message: String },

    /// A task raised an error outside the control-flow taxonomy
    #[error("Task {task_id} failed unexpectedly: {message}")]
    TaskFailed {
        task_id: String,
        message: String,
        context: HashMap<String, String>,
    },

    /// A task asked for confirmation that was refused or could not be obtained
    #[error("Task {task_id} was not confirmed: {prompt}")]
    Unconfirmed { task_id: String, prompt: String },

    /// A signal subscriber returned an error
    #[error("Subscriber of {signal} failed")]
    Signal {
        signal: String,
        #[source]
        source: anyhow::Error,
    },

    /// Serialization errors
    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ActionError {
    /// Create a registration error
    pub fn registration<S: Into<String>, M: Into<String>>(identifier: S, message: M) -> Self {
        Self::Registration {
            identifier: identifier.into(),
            message: message.into(),
        }
    }

    pub fn unknown_action<S: Into<String>>(identifier: S) -> Self {
        Self::UnknownAction {
            identifier: identifier.into(),
        }
    }

    pub fn unavailable<S: Into<String>>(identifier: S) -> Self {
        Self::Unavailable {
            identifier: identifier.into(),
        }
    }

    /// Create a parameter definition error
    pub fn parameter<S: Into<String>, M: Into<String>>(name: S, message: M) -> Self {
        Self::Parameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
            details: Vec::new(),
        }
    }

    /// Create a validation error with field
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
            details: Vec::new(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    pub fn aborted<S: Into<String>, M: Into<String>>(task_id: S, message: M) -> Self {
        Self::Aborted {
            task_id: task_id.into(),
            message: message.into(),
        }
    }

    pub fn task_failed<S: Into<String>, M: Into<String>>(task_id: S, message: M) -> Self {
        Self::TaskFailed {
            task_id: task_id.into(),
            message: message.into(),
            context: HashMap::new(),
        }
    }

    pub fn signal<S: Into<String>>(signal: S, source: anyhow::Error) -> Self {
        Self::Signal {
            signal: signal.into(),
            source,
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        format: S,
        source: E,
    ) -> Self {
        Self::Serialization {
            format: format.into(),
            source: Box::new(source),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Add context to a task failure
    pub fn with_context<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        if let Self::TaskFailed { ref mut context, .. } = self {
            context.insert(key.into(), value.into());
        }
        self
    }

    /// Whether retrying the failed group or run can reasonably succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::GroupFailed { .. } | Self::Unconfirmed { .. } => true,
            Self::Signal { .. } => true,
            Self::Validation { .. } | Self::Configuration { .. } | Self::Parameter { .. } => false,
            Self::Aborted { .. } | Self::TaskFailed { .. } => false,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Registration { .. } => "registration",
            Self::UnknownAction { .. } => "unknown_action",
            Self::Unavailable { .. } => "unavailable",
            Self::Parameter { .. } => "parameter",
            Self::Validation { .. } => "validation",
            Self::Configuration { .. } => "configuration",
            Self::GroupState { .. } => "group_state",
            Self::UnknownGroup { .. } => "unknown_group",
            Self::GroupFailed { .. } => "group_failed",
            Self::Aborted { .. } => "aborted",
            Self::TaskFailed { .. } => "task",
            Self::Unconfirmed { .. } => "unconfirmed",
            Self::Signal { .. } => "signal",
            Self::Serialization { .. } => "serialization",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ActionError>;

impl From<serde_json::Error> for ActionError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("json", err)
    }
}

impl From<serde_yaml::Error> for ActionError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization("yaml", err)
    }
}

impl From<anyhow::Error> for ActionError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ActionError::registration("new.project", "already registered");
        assert!(matches!(err, ActionError::Registration { .. }));
        assert_eq!(err.category(), "registration");
        assert_eq!(
            err.to_string(),
            "Registration failed for new.project: already registered"
        );
    }

    #[test]
    fn test_error_recovery() {
        let group = ActionError::GroupFailed {
            priority: 1,
            failed: vec!["c".into()],
        };
        assert!(group.is_recoverable());

        let abort = ActionError::aborted("e", "stop");
        assert!(!abort.is_recoverable());
    }

    #[test]
    fn test_task_failure_context() {
        let err = ActionError::task_failed("t", "boom").with_context("action", "x");
        match err {
            ActionError::TaskFailed { context, .. } => {
                assert_eq!(context.get("action").map(String::as_str), Some("x"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ActionError = json_err.into();
        assert_eq!(err.category(), "serialization");

        let err: ActionError = anyhow::anyhow!("outer").context("wrapped").into();
        assert!(matches!(err, ActionError::Internal { .. }));
    }
}

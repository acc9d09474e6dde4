use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors a task body raises to steer the engine.
///
/// Each kind maps to a fixed scheduling policy; see `ActionEngine`.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// Inputs did not validate; the request fails and siblings continue
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Soft failure; the request fails and siblings continue
    #[error("Failed: {0}")]
    Fail(String),

    /// Stop the whole run
    #[error("Aborted: {0}")]
    Abort(String),

    /// Mark the request skipped
    #[error("Skipped: {0}")]
    Skip(String),

    /// Park the request until it is re-enabled
    #[error("Disabled: {0}")]
    Disable(String),

    /// Stop the run without failing, keeping a partial result
    #[error("Paused: {message}")]
    Pause { message: String, partial: Value },

    /// Ask the caller to confirm before continuing
    #[error("Confirmation required: {prompt}")]
    Confirm { prompt: String },

    /// Anything outside the taxonomy
    #[error("{0:#}")]
    Other(Arc<anyhow::Error>),
}

impl TaskError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub fn fail<S: Into<String>>(message: S) -> Self {
        Self::Fail(message.into())
    }

    pub fn abort<S: Into<String>>(message: S) -> Self {
        Self::Abort(message.into())
    }

    pub fn skip<S: Into<String>>(message: S) -> Self {
        Self::Skip(message.into())
    }

    pub fn disable<S: Into<String>>(message: S) -> Self {
        Self::Disable(message.into())
    }

    pub fn pause<S: Into<String>>(message: S, partial: Value) -> Self {
        Self::Pause {
            message: message.into(),
            partial,
        }
    }

    pub fn confirm<S: Into<String>>(prompt: S) -> Self {
        Self::Confirm {
            prompt: prompt.into(),
        }
    }

    pub fn other<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::Other(Arc::new(err.into()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Fail(_) => "fail",
            Self::Abort(_) => "abort",
            Self::Skip(_) => "skip",
            Self::Disable(_) => "disable",
            Self::Pause { .. } => "pause",
            Self::Confirm { .. } => "confirm",
            Self::Other(_) => "error",
        }
    }

    /// Whether an async worker should try again after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fail(_) | Self::Other(_))
    }

    /// Whether this error stops the whole run
    pub fn stops_run(&self) -> bool {
        matches!(
            self,
            Self::Abort(_) | Self::Pause { .. } | Self::Confirm { .. } | Self::Other(_)
        )
    }

    /// Message without the kind prefix
    pub fn message(&self) -> String {
        match self {
            Self::Validation(m) | Self::Fail(m) | Self::Abort(m) | Self::Skip(m) | Self::Disable(m) => {
                m.clone()
            }
            Self::Pause { message, .. } => message.clone(),
            Self::Confirm { prompt } => prompt.clone(),
            Self::Other(err) => format!("{:#}", err),
        }
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(Arc::new(err))
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        Self::other(err)
    }
}

/// Why `Request::get` returned without a value
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// An async worker has not finished yet; poll again later
    #[error("Request {task_id} not ready after {waited:?}")]
    NotReady { task_id: String, waited: Duration },

    #[error(transparent)]
    Task(#[from] TaskError),
}

impl RequestError {
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }

    pub fn task_error(&self) -> Option<&TaskError> {
        match self {
            Self::Task(err) => Some(err),
            Self::NotReady { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_kinds() {
        assert_eq!(TaskError::fail("x").kind(), "fail");
        assert!(TaskError::fail("x").is_retryable());
        assert!(!TaskError::skip("x").is_retryable());
        assert!(TaskError::abort("x").stops_run());
        assert!(!TaskError::validation("x").stops_run());
    }

    #[test]
    fn test_other_keeps_chain() {
        let err: anyhow::Result<()> = Err(anyhow::anyhow!("disk full")).context("writing scene");
        let task_err: TaskError = err.unwrap_err().into();
        assert_eq!(task_err.kind(), "error");
        assert_eq!(task_err.to_string(), "writing scene: disk full");
    }

    #[test]
    fn test_request_error() {
        let not_ready = RequestError::NotReady {
            task_id: "a".into(),
            waited: Duration::ZERO,
        };
        assert!(not_ready.is_not_ready());
        assert!(not_ready.task_error().is_none());

        let err: RequestError = TaskError::fail("nope").into();
        assert_eq!(err.to_string(), "Failed: nope");
    }
}

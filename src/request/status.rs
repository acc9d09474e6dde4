use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a request, and the aggregate state of a priority group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Status {
    Waiting = 0,
    Pending = 1,
    Running = 2,
    Success = 3,
    Failed = 4,
    Skipped = 5,
    Disabled = 6,
    /// Groups only: a task paused the run
    Paused = 7,
}

impl Status {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Waiting),
            1 => Some(Self::Pending),
            2 => Some(Self::Running),
            3 => Some(Self::Success),
            4 => Some(Self::Failed),
            5 => Some(Self::Skipped),
            6 => Some(Self::Disabled),
            7 => Some(Self::Paused),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Disabled => "disabled",
            Self::Paused => "paused",
        }
    }

    /// A resolved state; only an explicit reset leaves it
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Skipped | Self::Disabled | Self::Paused
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Ordered execution stages.
//!
//! A [`Priority`] is a plain integer key; display metadata lives in a
//! separate [`PriorityTable`] so any integer is a valid stage.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub i64);

impl Priority {
    /// Gather inputs and prepare state
    pub const STAGE: Priority = Priority(0);
    /// Check prepared state
    pub const VALIDATE: Priority = Priority(1);
    /// Fix what validation reported
    pub const REPAIR: Priority = Priority(2);
    /// Write results out
    pub const COMMIT: Priority = Priority(3);

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for Priority {
    fn from(value: i64) -> Self {
        Priority(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityInfo {
    pub label: String,
    pub description: String,
}

/// Labels and descriptions for priorities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityTable {
    entries: IndexMap<i64, PriorityInfo>,
}

impl Default for PriorityTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert(Priority::STAGE, "Stage", "Collect inputs and stage work");
        table.insert(Priority::VALIDATE, "Validate", "Validate staged work");
        table.insert(Priority::REPAIR, "Repair", "Repair validation failures");
        table.insert(Priority::COMMIT, "Commit", "Commit staged work");
        table
    }
}

impl PriorityTable {
    pub fn empty() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn insert<L: Into<String>, D: Into<String>>(&mut self, priority: Priority, label: L, description: D) {
        self.entries.insert(
            priority.0,
            PriorityInfo {
                label: label.into(),
                description: description.into(),
            },
        );
    }

    pub fn get(&self, priority: Priority) -> Option<&PriorityInfo> {
        self.entries.get(&priority.0)
    }

    /// Display label, falling back to `Priority-N`
    pub fn label(&self, priority: Priority) -> String {
        self.get(priority)
            .map(|info| info.label.clone())
            .unwrap_or_else(|| format!("Priority-{}", priority.0))
    }

    pub fn description(&self, priority: Priority) -> String {
        self.get(priority)
            .map(|info| info.description.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_order() {
        assert!(Priority::STAGE < Priority::VALIDATE);
        assert!(Priority::VALIDATE < Priority::REPAIR);
        assert!(Priority::REPAIR < Priority::COMMIT);
        assert!(Priority(-5) < Priority::STAGE);
    }

    #[test]
    fn test_labels() {
        let mut table = PriorityTable::default();
        assert_eq!(table.label(Priority::COMMIT), "Commit");
        assert_eq!(table.label(Priority(42)), "Priority-42");
        table.insert(Priority(42), "Publish", "Publish outputs");
        assert_eq!(table.label(Priority(42)), "Publish");
        assert_eq!(table.description(Priority(7)), "");
    }
}

pub mod context;
#[allow(clippy::module_inception)]
pub mod engine;
pub mod group;

pub use context::{ContextSnapshot, RunContext};
pub use engine::{ActionEngine, ConfirmHandler, RunOutcome};
pub use group::{group_tasks, sort_tasks, PriorityGroup};

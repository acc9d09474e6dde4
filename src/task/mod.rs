pub mod conditions;
pub mod error;
pub mod params;
pub mod priority;
#[allow(clippy::module_inception)]
pub mod task;

pub use error::{RequestError, TaskError};
pub use params::{InjectMode, Params, Section, Slot};
pub use priority::{Priority, PriorityInfo, PriorityTable};
pub use task::{ExecMode, Getter, Injector, Predicate, Task, TaskBody, TaskBuilder};

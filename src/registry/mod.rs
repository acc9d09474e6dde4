pub mod action;
pub mod alias;
pub mod params;
#[allow(clippy::module_inception)]
pub mod registry;

pub use action::{group_actions, ActionGroup, ActionKind, ActionSpec, LaunchDescriptor};
pub use alias::ActionAlias;
pub use params::{ParamKind, ParamSpec};
pub use registry::{ActionRegistry, Invocation};

//! Priority-staged action engine.
//!
//! An action is a named operation made of tasks. Tasks are connected to
//! action identifiers (or glob patterns) in an [`ActionRegistry`], grouped by
//! [`Priority`] and executed group by group by an [`ActionEngine`]. Every
//! state change is broadcast on a [`SignalHub`].

// Core infrastructure modules
pub mod core {
    pub mod config;
    pub mod errors;
    pub mod logging;
    pub mod pattern;
}

pub mod engine;
pub mod registry;
pub mod request;
pub mod signals;
pub mod task;

// Re-exports for convenience
pub use core::config::{EngineConfig, EngineConfigBuilder};
pub use core::errors::{ActionError, Result};
pub use core::logging::init_logging;
pub use engine::{ActionEngine, RunContext, RunOutcome};
pub use registry::{ActionAlias, ActionRegistry, ActionSpec, Invocation, ParamKind, ParamSpec};
pub use request::{Request, Status};
pub use signals::{Event, SignalHub, Subscriber};
pub use task::{conditions, Params, Priority, Slot, Task, TaskError};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[tokio::test]
    async fn test_end_to_end() {
        let registry = ActionRegistry::new(SignalHub::new());
        let alias = registry
            .register(
                ActionSpec::new("new.project")
                    .param(ParamSpec::new("name", "Name", ParamKind::String).required())
                    .returns(Slot::artifact("project")),
            )
            .unwrap();

        alias
            .connect(
                Task::from_sync("stage", |params: Params| {
                    let name: String = params.get("name")?;
                    Ok(json!({ "name": name, "root": format!("/projects/{}", name) }))
                })
                .priority(Priority::STAGE)
                .pass_kwargs()
                .returns(Slot::store("project"))
                .build(),
            )
            .unwrap();
        alias
            .connect(
                Task::from_sync("commit", |params: Params| Ok(params.arg(0).cloned().unwrap_or_default()))
                    .priority(Priority::COMMIT)
                    .requires(conditions::success("stage"))
                    .arg(Slot::store("project"))
                    .returns(Slot::artifact("project"))
                    .build(),
            )
            .unwrap();

        let mut kwargs = Map::new();
        kwargs.insert("name".into(), json!("demo"));
        let invocation = registry.invoke("new.project", vec![], kwargs).await.unwrap();

        assert!(invocation.outcome.is_success());
        assert_eq!(invocation.value["root"], json!("/projects/demo"));
    }
}

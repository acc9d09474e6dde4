//! Predicates over a run, for use with `TaskBuilder::requires` and `skips`.
//!
//! Predicates naming a task with no request in the run evaluate to `false`.

use serde_json::Value;
use std::sync::Arc;

use crate::engine::context::RunContext;
use crate::request::status::Status;
use crate::task::params::Slot;
use crate::task::task::Predicate;

fn status_of(ctx: &RunContext, task_id: &str) -> Option<Status> {
    ctx.requests.get(task_id).map(|request| request.status())
}

/// The task finished successfully
pub fn success(task_id: &str) -> Predicate {
    let task_id = task_id.to_string();
    Arc::new(move |ctx: &RunContext| status_of(ctx, &task_id) == Some(Status::Success))
}

/// The task finished FAILED
pub fn failure(task_id: &str) -> Predicate {
    let task_id = task_id.to_string();
    Arc::new(move |ctx: &RunContext| status_of(ctx, &task_id) == Some(Status::Failed))
}

/// The task reached any resolved state
pub fn done(task_id: &str) -> Predicate {
    let task_id = task_id.to_string();
    Arc::new(move |ctx: &RunContext| status_of(ctx, &task_id).is_some_and(|s| s.is_done()))
}

/// A result for the task has been recorded
pub fn has_result(task_id: &str) -> Predicate {
    let task_id = task_id.to_string();
    Arc::new(move |ctx: &RunContext| ctx.results.contains_key(&task_id))
}

/// The slot holds a value
pub fn has_value(slot: Slot) -> Predicate {
    Arc::new(move |ctx: &RunContext| slot.lookup(ctx).is_some())
}

/// The slot holds exactly `expected`
pub fn equals(slot: Slot, expected: Value) -> Predicate {
    Arc::new(move |ctx: &RunContext| slot.lookup(ctx) == Some(&expected))
}

pub fn not(predicate: Predicate) -> Predicate {
    Arc::new(move |ctx: &RunContext| !predicate(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_request_is_false() {
        let ctx = RunContext::new("x");
        assert!(!success("a")(&ctx));
        assert!(!failure("a")(&ctx));
        assert!(!done("a")(&ctx));
        assert!(!has_result("a")(&ctx));
        assert!(not(has_result("a"))(&ctx));
    }

    #[test]
    fn test_slot_predicates() {
        let ctx = RunContext::new("x").with_kwarg("mode", json!("publish"));
        assert!(has_value(Slot::kwarg("mode"))(&ctx));
        assert!(equals(Slot::kwarg("mode"), json!("publish"))(&ctx));
        assert!(!equals(Slot::kwarg("mode"), json!("stage"))(&ctx));
    }
}

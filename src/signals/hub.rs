//! Priority-ordered publish/subscribe hub with glob-pattern subscriptions.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::core::pattern;
use crate::signals::event::Event;

static SUBSCRIBER_IDS: AtomicU64 = AtomicU64::new(1);

type SubscriberFn = dyn Fn(&Value) -> anyhow::Result<Value> + Send + Sync;

/// A callable connected to one or more signals.
///
/// Identity is fixed at construction: clones compare equal, so connecting a
/// clone of an already connected subscriber is a no-op.
#[derive(Clone)]
pub struct Subscriber {
    id: u64,
    name: String,
    func: Arc<SubscriberFn>,
}

impl Subscriber {
    pub fn new<S, F>(name: S, func: F) -> Self
    where
        S: Into<String>,
        F: Fn(&Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            id: SUBSCRIBER_IDS.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// A subscriber that only observes; it returns `Value::Null`.
    pub fn observer<S, F>(name: S, func: F) -> Self
    where
        S: Into<String>,
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self::new(name, move |payload| {
            func(payload);
            Ok(Value::Null)
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, payload: &Value) -> anyhow::Result<Value> {
        (self.func)(payload)
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscriber {}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Clone)]
struct Entry {
    priority: i64,
    subscriber: Subscriber,
}

/// Insert after every entry whose priority is <= `entry.priority`.
fn insert_sorted(entries: &mut Vec<Entry>, entry: Entry) {
    let index = entries.partition_point(|e| e.priority <= entry.priority);
    entries.insert(index, entry);
}

#[derive(Default)]
struct HubState {
    signals: IndexMap<String, Vec<Entry>>,
    mutes: Vec<(u64, Vec<String>)>,
}

impl HubState {
    fn is_muted(&self, id: &str) -> bool {
        self.mutes.iter().any(|(_, patterns)| {
            patterns
                .iter()
                .any(|p| p == id || (pattern::is_pattern(p) && pattern::matches(p, id)))
        })
    }

    fn resolve(&self, id: &str) -> Vec<Entry> {
        let mut resolved = self.signals.get(id).cloned().unwrap_or_default();
        for (key, entries) in &self.signals {
            if key == id || !pattern::is_pattern(key) || !pattern::matches(key, id) {
                continue;
            }
            for entry in entries {
                if resolved.iter().any(|e| e.subscriber == entry.subscriber) {
                    continue;
                }
                insert_sorted(&mut resolved, entry.clone());
            }
        }
        resolved
    }
}

/// Named signals with ordered, optionally wildcard-matched subscribers.
///
/// The hub is a cheap handle; clones share the same subscriptions.
#[derive(Clone, Default)]
pub struct SignalHub {
    state: Arc<RwLock<HubState>>,
    next_mute: Arc<AtomicU64>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `subscriber` to `id` (an exact name or a glob pattern).
    ///
    /// Returns `false` if it was already connected to `id`.
    pub fn connect(&self, id: &str, subscriber: &Subscriber, priority: i64) -> bool {
        let mut state = self.state.write();
        let entries = state.signals.entry(id.to_string()).or_default();
        if entries.iter().any(|e| &e.subscriber == subscriber) {
            return false;
        }
        insert_sorted(
            entries,
            Entry {
                priority,
                subscriber: subscriber.clone(),
            },
        );
        trace!(signal = id, subscriber = subscriber.name(), priority, "connected");
        true
    }

    /// Returns `false` if `subscriber` was not connected to `id`.
    pub fn disconnect(&self, id: &str, subscriber: &Subscriber) -> bool {
        let mut state = self.state.write();
        let Some(entries) = state.signals.get_mut(id) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| &e.subscriber != subscriber);
        let removed = entries.len() != before;
        if entries.is_empty() {
            state.signals.shift_remove(id);
        }
        removed
    }

    /// Exact subscribers of `id` merged with those of every matching pattern.
    pub fn subscribers(&self, id: &str) -> Vec<Subscriber> {
        self.state
            .read()
            .resolve(id)
            .into_iter()
            .map(|e| e.subscriber)
            .collect()
    }

    /// Remove the subscribers of one signal, or of every signal.
    pub fn clear(&self, id: Option<&str>) {
        let mut state = self.state.write();
        match id {
            Some(id) => {
                state.signals.shift_remove(id);
            }
            None => state.signals.clear(),
        }
    }

    /// Names (and patterns) that currently have subscribers
    pub fn signal_ids(&self) -> Vec<String> {
        self.state.read().signals.keys().cloned().collect()
    }

    pub fn is_muted(&self, id: &str) -> bool {
        self.state.read().is_muted(id)
    }

    /// Invoke every resolved subscriber and collect their return values.
    ///
    /// The first subscriber error is returned as-is and stops delivery.
    pub fn send(&self, id: &str, payload: &Value) -> anyhow::Result<Vec<Value>> {
        let resolved = {
            let state = self.state.read();
            if state.is_muted(id) {
                return Ok(Vec::new());
            }
            state.resolve(id)
        };

        let mut results = Vec::with_capacity(resolved.len());
        for entry in resolved {
            results.push(entry.subscriber.call(payload)?);
        }
        Ok(results)
    }

    /// Thread `payload` through every subscriber, returning the last value.
    pub fn chain(&self, id: &str, payload: Value) -> anyhow::Result<Option<Value>> {
        let resolved = {
            let state = self.state.read();
            if state.is_muted(id) {
                return Ok(None);
            }
            state.resolve(id)
        };
        if resolved.is_empty() {
            return Ok(None);
        }

        let mut value = payload;
        for entry in resolved {
            value = entry.subscriber.call(&value)?;
        }
        Ok(Some(value))
    }

    /// Serialize `event` and send it on its signal.
    pub fn emit(&self, event: &Event) -> anyhow::Result<Vec<Value>> {
        let id = event.signal();
        if self.is_muted(id) {
            return Ok(Vec::new());
        }
        let payload = event.to_payload()?;
        self.send(id, &payload)
    }

    /// A handle bound to a single signal name
    pub fn signal(&self, id: &str) -> Signal {
        Signal {
            hub: self.clone(),
            id: id.to_string(),
        }
    }

    /// Suppress delivery of every signal matching `patterns` until the guard drops.
    pub fn mute<I, S>(&self, patterns: I) -> MuteGuard
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let token = self.next_mute.fetch_add(1, Ordering::Relaxed);
        let patterns = patterns.into_iter().map(Into::into).collect();
        self.state.write().mutes.push((token, patterns));
        MuteGuard {
            hub: self.clone(),
            token,
        }
    }
}

impl fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("SignalHub")
            .field("signals", &state.signals.keys().collect::<Vec<_>>())
            .field("mutes", &state.mutes.len())
            .finish()
    }
}

/// Restores delivery for the muted patterns when dropped.
#[must_use = "signals are unmuted as soon as the guard is dropped"]
pub struct MuteGuard {
    hub: SignalHub,
    token: u64,
}

impl Drop for MuteGuard {
    fn drop(&mut self) {
        self.hub
            .state
            .write()
            .mutes
            .retain(|(token, _)| *token != self.token);
    }
}

/// A single named signal on a hub.
#[derive(Clone, Debug)]
pub struct Signal {
    hub: SignalHub,
    id: String,
}

impl Signal {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn connect(&self, subscriber: &Subscriber, priority: i64) -> bool {
        self.hub.connect(&self.id, subscriber, priority)
    }

    pub fn disconnect(&self, subscriber: &Subscriber) -> bool {
        self.hub.disconnect(&self.id, subscriber)
    }

    pub fn subscribers(&self) -> Vec<Subscriber> {
        self.hub.subscribers(&self.id)
    }

    pub fn send(&self, payload: &Value) -> anyhow::Result<Vec<Value>> {
        self.hub.send(&self.id, payload)
    }

    pub fn chain(&self, payload: Value) -> anyhow::Result<Option<Value>> {
        self.hub.chain(&self.id, payload)
    }

    pub fn clear(&self) {
        self.hub.clear(Some(&self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn returning(name: &str, value: Value) -> Subscriber {
        Subscriber::new(name, move |_| Ok(value.clone()))
    }

    #[test]
    fn test_priority_order_is_stable() {
        let hub = SignalHub::new();
        hub.connect("sig", &returning("late", json!("late")), 10);
        hub.connect("sig", &returning("first", json!("first")), 0);
        hub.connect("sig", &returning("second", json!("second")), 0);

        let names: Vec<_> = hub
            .subscribers("sig")
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["first", "second", "late"]);
    }

    #[test]
    fn test_connect_is_idempotent() {
        let hub = SignalHub::new();
        let sub = returning("a", json!(1));
        assert!(hub.connect("sig", &sub, 0));
        assert!(!hub.connect("sig", &sub.clone(), 5));
        assert_eq!(hub.send("sig", &Value::Null).unwrap().len(), 1);
    }

    #[test]
    fn test_disconnect_missing_is_noop() {
        let hub = SignalHub::new();
        let sub = returning("a", json!(1));
        assert!(!hub.disconnect("sig", &sub));
        hub.connect("sig", &sub, 0);
        assert!(hub.disconnect("sig", &sub));
        assert!(hub.subscribers("sig").is_empty());
        assert!(hub.signal_ids().is_empty());
    }

    #[test]
    fn test_wildcard_merge_keeps_exact_order() {
        let hub = SignalHub::new();
        hub.connect("group.after", &returning("exact-a", json!("a")), 0);
        hub.connect("group.after", &returning("exact-b", json!("b")), 5);
        hub.connect("group.*", &returning("wild", json!("w")), 0);
        hub.connect("*", &returning("all", json!("*")), 10);

        let results = hub.send("group.after", &Value::Null).unwrap();
        assert_eq!(results, vec![json!("a"), json!("w"), json!("b"), json!("*")]);

        assert_eq!(hub.send("group.before", &Value::Null).unwrap().len(), 2);
    }

    #[test]
    fn test_pattern_subscriber_not_duplicated() {
        let hub = SignalHub::new();
        let sub = returning("both", json!(1));
        hub.connect("action.before", &sub, 0);
        hub.connect("action.*", &sub, 0);
        assert_eq!(hub.subscribers("action.before").len(), 1);
    }

    #[test]
    fn test_send_propagates_subscriber_error() {
        let hub = SignalHub::new();
        hub.connect("sig", &returning("ok", json!(1)), 0);
        hub.connect("sig", &Subscriber::new("bad", |_| anyhow::bail!("subscriber broke")), 1);
        hub.connect("sig", &returning("never", json!(3)), 2);

        let err = hub.send("sig", &Value::Null).unwrap_err();
        assert_eq!(err.to_string(), "subscriber broke");
    }

    #[test]
    fn test_chain_threads_values() {
        let hub = SignalHub::new();
        hub.connect(
            "context.setup",
            &Subscriber::new("add-a", |v| {
                let mut v = v.clone();
                v["a"] = json!(1);
                Ok(v)
            }),
            0,
        );
        hub.connect(
            "context.*",
            &Subscriber::new("add-b", |v| {
                let mut v = v.clone();
                v["b"] = json!(v["a"].as_i64().unwrap_or(0) + 1);
                Ok(v)
            }),
            1,
        );

        let out = hub.chain("context.setup", json!({})).unwrap();
        assert_eq!(out, Some(json!({"a": 1, "b": 2})));
        assert_eq!(hub.chain("nobody.listens", json!(1)).unwrap(), None);
    }

    #[test]
    fn test_clear() {
        let hub = SignalHub::new();
        hub.connect("a", &returning("a", json!(1)), 0);
        hub.connect("b", &returning("b", json!(1)), 0);
        hub.clear(Some("a"));
        assert!(hub.subscribers("a").is_empty());
        assert_eq!(hub.subscribers("b").len(), 1);
        hub.clear(None);
        assert!(hub.signal_ids().is_empty());
    }

    #[test]
    fn test_mute_guard() {
        let hub = SignalHub::new();
        hub.connect("request.status.changed", &returning("a", json!(1)), 0);
        {
            let _guard = hub.mute(["request.*"]);
            assert!(hub.is_muted("request.status.changed"));
            assert!(hub.send("request.status.changed", &Value::Null).unwrap().is_empty());
        }
        assert_eq!(hub.send("request.status.changed", &Value::Null).unwrap().len(), 1);
    }

    #[test]
    fn test_signal_alias() {
        let hub = SignalHub::new();
        let signal = hub.signal("publish.done");
        signal.connect(&returning("a", json!("x")), 0);
        assert_eq!(signal.id(), "publish.done");
        assert_eq!(signal.send(&Value::Null).unwrap(), vec![json!("x")]);
        assert_eq!(hub.subscribers("publish.done").len(), 1);
        signal.clear();
        assert!(signal.subscribers().is_empty());
    }
}

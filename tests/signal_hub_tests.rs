//! SignalHub delivery, ordering and wildcard behavior

use actionflow::signals::{SignalHub, Subscriber};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

fn constant(name: &str, value: Value) -> Subscriber {
    Subscriber::new(name, move |_| Ok(value.clone()))
}

#[test]
fn test_send_counts_exact_and_wildcard_subscribers() {
    let hub = SignalHub::new();
    hub.connect("new.project", &constant("exact", json!(1)), 0);
    hub.connect("new.*", &constant("wild", json!(2)), 0);
    hub.connect("publish.*", &constant("other", json!(3)), 0);

    let results = hub.send("new.project", &Value::Null).unwrap();
    assert_eq!(results, vec![json!(1), json!(2)]);
    assert_eq!(hub.subscribers("new.project").len(), 2);
}

#[test]
fn test_connect_is_idempotent() {
    let hub = SignalHub::new();
    let sub = constant("once", json!("hit"));
    assert!(hub.connect("save", &sub, 0));
    assert!(!hub.connect("save", &sub, 5));
    assert!(!hub.connect("save", &sub.clone(), 0));
    assert_eq!(hub.send("save", &Value::Null).unwrap().len(), 1);
}

#[test]
fn test_priority_order_with_ties() {
    let hub = SignalHub::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for (name, priority) in [("late", 10), ("first", -1), ("tie-a", 0), ("tie-b", 0)] {
        let order = order.clone();
        let sub = Subscriber::observer(name, move |_| order.lock().push(name));
        hub.connect("evt", &sub, priority);
    }

    hub.send("evt", &Value::Null).unwrap();
    assert_eq!(*order.lock(), vec!["first", "tie-a", "tie-b", "late"]);
}

#[test]
fn test_chain_threads_values() {
    let hub = SignalHub::new();
    assert_eq!(hub.chain("math", json!(1)).unwrap(), None);

    let add = Subscriber::new("add", |v: &Value| Ok(json!(v.as_i64().unwrap_or(0) + 2)));
    let double = Subscriber::new("double", |v: &Value| Ok(json!(v.as_i64().unwrap_or(0) * 2)));
    hub.connect("math", &add, 0);
    hub.connect("math", &double, 1);
    assert_eq!(hub.chain("math", json!(1)).unwrap(), Some(json!(6)));
}

#[test]
fn test_subscriber_error_stops_delivery() {
    let hub = SignalHub::new();
    let reached = Arc::new(Mutex::new(false));
    let flag = reached.clone();
    hub.connect("evt", &Subscriber::new("boom", |_| Err(anyhow::anyhow!("boom"))), 0);
    hub.connect("evt", &Subscriber::observer("after", move |_| *flag.lock() = true), 1);

    let err = hub.send("evt", &Value::Null).unwrap_err();
    assert_eq!(err.to_string(), "boom");
    assert!(!*reached.lock());
}

#[test]
fn test_disconnect_and_clear() {
    let hub = SignalHub::new();
    let sub = constant("s", json!(1));
    hub.connect("a.*", &sub, 0);
    hub.connect("b", &sub, 0);

    assert!(hub.disconnect("a.*", &sub));
    assert!(!hub.disconnect("a.*", &sub));
    assert!(hub.send("a.one", &Value::Null).unwrap().is_empty());

    hub.clear(None);
    assert!(hub.signal_ids().is_empty());
}

#[test]
fn test_mute_guard() {
    let hub = SignalHub::new();
    hub.connect("request.status.changed", &constant("s", json!(1)), 0);
    {
        let _guard = hub.mute(["request.*"]);
        assert!(hub.send("request.status.changed", &Value::Null).unwrap().is_empty());
    }
    assert_eq!(hub.send("request.status.changed", &Value::Null).unwrap().len(), 1);
}

#[test]
fn test_signal_alias() {
    let hub = SignalHub::new();
    let signal = hub.signal("render.done");
    signal.connect(&constant("s", json!("ok")), 0);

    assert_eq!(signal.id(), "render.done");
    assert_eq!(hub.send("render.done", &Value::Null).unwrap(), vec![json!("ok")]);
    assert_eq!(signal.chain(Value::Null).unwrap(), Some(json!("ok")));
    signal.clear();
    assert!(signal.subscribers().is_empty());
}

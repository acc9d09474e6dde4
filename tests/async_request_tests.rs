//! Background execution through AsyncRequest and Request

use actionflow::request::{AsyncRequest, Request};
use actionflow::{Status, Task, TaskError};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::{Duration, Instant};

fn one_second_task() -> std::sync::Arc<Task> {
    Task::from_fn("bake", |_| async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<_, TaskError>(json!("baked"))
    })
    .asynchronous()
    .build()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_zero_timeout_polls_do_not_block() {
    let mut request = AsyncRequest::new(one_second_task(), 0, Duration::ZERO);

    let started = Instant::now();
    for _ in 0..2 {
        let err = request.get(None, Some(Duration::ZERO)).await.unwrap_err();
        assert!(err.is_not_ready());
    }
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(request.is_started());
    assert!(!request.is_finished());

    let value = request.get(None, None).await.unwrap();
    assert_eq!(value, json!("baked"));
    assert_eq!(request.status(), Status::Success);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bounded_wait_times_out_without_cancelling() {
    let mut request = AsyncRequest::new(one_second_task(), 0, Duration::ZERO);

    let err = request
        .get(None, Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(err.is_not_ready());

    assert_eq!(request.get(None, Some(Duration::from_secs(5))).await.unwrap(), json!("baked"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_request_mirrors_worker_state() {
    let mut request = Request::new(one_second_task());
    assert!(request.get(None, Some(Duration::ZERO)).await.unwrap_err().is_not_ready());
    assert!(matches!(request.status(), Status::Pending | Status::Running));

    request.get(None, None).await.unwrap();
    assert_eq!(request.status(), Status::Success);
    assert_eq!(request.attempts(), 1);

    request.reset().await;
    assert_eq!(request.status(), Status::Waiting);
    assert!(!request.is_started());
}

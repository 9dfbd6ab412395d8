//! Dispatcher behavior against live mock downstreams.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use service_gateway::config::{CircuitBreakerConfig, RetryConfig, ServiceConfig};
use service_gateway::dispatch::{DispatchError, DownstreamError, RequestSpec, ServiceDispatcher};
use service_gateway::resilience::CircuitState;

mod common;

/// Backend answering 503 until `healthy` is set, counting every hit.
async fn flaky_backend(healthy: Arc<AtomicBool>, hits: Arc<AtomicU32>) -> std::net::SocketAddr {
    common::start_programmable_backend(move |_| {
        let healthy = healthy.clone();
        let hits = hits.clone();
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            if healthy.load(Ordering::SeqCst) {
                (200, r#"{"id":42,"status":"confirmed"}"#.to_string())
            } else {
                (503, r#"{"error":"unavailable"}"#.to_string())
            }
        }
    })
    .await
}

fn service(name: &str, addr: std::net::SocketAddr) -> ServiceConfig {
    ServiceConfig::new(name, format!("http://{addr}"))
}

fn fast_retry(max_attempts: u32, retryable_errors: &[&str]) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms: 10,
        backoff_multiplier: 2.0,
        max_delay_ms: 50,
        retryable_errors: retryable_errors.iter().map(|s| s.to_string()).collect(),
        jitter_ratio: 0.0,
    }
}

#[tokio::test]
async fn test_orders_breaker_scenario() {
    let healthy = Arc::new(AtomicBool::new(false));
    let hits = Arc::new(AtomicU32::new(0));
    let addr = flaky_backend(healthy.clone(), hits.clone()).await;

    let mut orders = service("orders", addr);
    orders.circuit_breaker = Some(CircuitBreakerConfig {
        failure_threshold: 3,
        reset_timeout_ms: 200,
    });
    let dispatcher = ServiceDispatcher::new(&[orders]);

    for _ in 0..3 {
        let err = dispatcher.get("orders", "/orders/42").await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Downstream(DownstreamError::Status { status, .. }) if status.as_u16() == 503
        ));
    }
    assert_eq!(dispatcher.breaker_status("orders"), Some(CircuitState::Open));
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    // Fourth call fails fast without reaching the downstream
    let err = dispatcher.get("orders", "/orders/42").await.unwrap_err();
    assert!(matches!(err, DispatchError::CircuitOpen { ref service } if service == "orders"));
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(250)).await;

    let trial = dispatcher.get("orders", "/orders/42").await.unwrap();
    assert_eq!(trial.status.as_u16(), 200);
    assert_eq!(dispatcher.breaker_status("orders"), Some(CircuitState::Closed));

    let fifth = dispatcher.get("orders", "/orders/42").await.unwrap();
    let order: Value = fifth.json().unwrap();
    assert_eq!(order["status"], "confirmed");
    assert_eq!(hits.load(Ordering::SeqCst), 5);
    assert_eq!(dispatcher.breaker_snapshot("orders").unwrap().consecutive_failures, 0);
}

#[tokio::test]
async fn test_failed_trial_call_reopens() {
    let healthy = Arc::new(AtomicBool::new(false));
    let hits = Arc::new(AtomicU32::new(0));
    let addr = flaky_backend(healthy, hits.clone()).await;

    let mut orders = service("orders", addr);
    orders.circuit_breaker = Some(CircuitBreakerConfig {
        failure_threshold: 1,
        reset_timeout_ms: 100,
    });
    let dispatcher = ServiceDispatcher::new(&[orders]);

    dispatcher.get("orders", "/").await.unwrap_err();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let trial = dispatcher.get("orders", "/").await.unwrap_err();
    assert!(matches!(trial, DispatchError::Downstream(_)));
    assert_eq!(dispatcher.breaker_status("orders"), Some(CircuitState::Open));

    let rejected = dispatcher.get("orders", "/").await.unwrap_err();
    assert!(matches!(rejected, DispatchError::CircuitOpen { .. }));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_abandoned_trial_call_does_not_wedge_breaker() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let addr = common::start_programmable_backend(move |_| {
        let counter = counter.clone();
        async move {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => (503, "{}".to_string()),
                1 => {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    (200, "{}".to_string())
                }
                _ => (200, r#"{"ok":true}"#.to_string()),
            }
        }
    })
    .await;

    let mut orders = service("orders", addr);
    orders.circuit_breaker = Some(CircuitBreakerConfig {
        failure_threshold: 1,
        reset_timeout_ms: 100,
    });
    let dispatcher = ServiceDispatcher::new(&[orders]);

    dispatcher.get("orders", "/").await.unwrap_err();
    tokio::time::sleep(Duration::from_millis(150)).await;

    // The caller gives up on the trial call mid-flight
    let abandoned = tokio::time::timeout(Duration::from_millis(50), dispatcher.get("orders", "/")).await;
    assert!(abandoned.is_err());
    assert_eq!(dispatcher.breaker_status("orders"), Some(CircuitState::Open));

    tokio::time::sleep(Duration::from_millis(150)).await;
    let recovered = dispatcher.get("orders", "/").await.unwrap();
    assert_eq!(recovered.status.as_u16(), 200);
    assert_eq!(dispatcher.breaker_status("orders"), Some(CircuitState::Closed));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_downstream_bodies_are_buffered() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let addr = common::start_programmable_backend(move |_| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                (200, r#"{"items":[1,2,3]}"#.to_string())
            } else {
                (502, r#"{"error":"upstream of upstream"}"#.to_string())
            }
        }
    })
    .await;

    let dispatcher = ServiceDispatcher::new(&[service("catalog", addr)]);

    let ok = dispatcher.get("catalog", "/items").await.unwrap();
    assert_eq!(&ok.body[..], br#"{"items":[1,2,3]}"#);

    let err = dispatcher.get("catalog", "/items").await.unwrap_err();
    match err {
        DispatchError::Downstream(DownstreamError::Status { status, body }) => {
            assert_eq!(status.as_u16(), 502);
            assert_eq!(&body[..], br#"{"error":"upstream of upstream"}"#);
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn test_retry_exhaustion_counts_attempts() {
    let hits = Arc::new(AtomicU32::new(0));
    let addr = flaky_backend(Arc::new(AtomicBool::new(false)), hits.clone()).await;

    let mut payments = service("payments", addr);
    payments.retry = Some(fast_retry(3, &[]));
    let dispatcher = ServiceDispatcher::new(&[payments]);
    let mut events = dispatcher.subscribe_retries("payments").unwrap();

    let err = dispatcher
        .post("payments", "/charges", json!({"amount": 1200}))
        .await
        .unwrap_err();

    match &err {
        DispatchError::RetryExhausted { service, attempts, cause } => {
            assert_eq!(service, "payments");
            assert_eq!(*attempts, 3);
            assert!(matches!(**cause, DispatchError::Downstream(DownstreamError::Status { .. })));
        }
        other => panic!("expected RetryExhausted, got {other:?}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let first = events.try_recv().unwrap();
    assert_eq!(first.attempt, 1);
    assert_eq!(first.delay, Duration::from_millis(10));
    let second = events.try_recv().unwrap();
    assert_eq!(second.attempt, 2);
    assert_eq!(second.delay, Duration::from_millis(20));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_retry_recovers_before_exhaustion() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let addr = common::start_programmable_backend(move |_| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                (503, "{}".to_string())
            } else {
                (200, r#"{"ok":true}"#.to_string())
            }
        }
    })
    .await;

    let mut inventory = service("inventory", addr);
    inventory.retry = Some(fast_retry(3, &["HTTP_503"]));
    let dispatcher = ServiceDispatcher::new(&[inventory]);

    let response = dispatcher.get("inventory", "/items").await.unwrap();
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(dispatcher.breaker_status("inventory"), Some(CircuitState::Closed));
}

#[tokio::test]
async fn test_non_retryable_error_aborts() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let addr = common::start_programmable_backend(move |_| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (500, r#"{"error":"boom"}"#.to_string())
        }
    })
    .await;

    let mut orders = service("orders", addr);
    orders.retry = Some(fast_retry(5, &["HTTP_503", "TIMEOUT"]));
    let dispatcher = ServiceDispatcher::new(&[orders]);

    let err = dispatcher.get("orders", "/orders").await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Downstream(DownstreamError::Status { status, .. }) if status.as_u16() == 500
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timeout_counts_as_failure() {
    let addr = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        (200, "{}".to_string())
    })
    .await;

    let mut slow = service("reports", addr);
    slow.request_timeout_ms = 50;
    let dispatcher = ServiceDispatcher::new(&[slow]);

    let err = dispatcher.get("reports", "/daily").await.unwrap_err();
    assert!(matches!(err, DispatchError::Downstream(DownstreamError::Timeout { after_ms: 50 })));
    assert_eq!(dispatcher.breaker_snapshot("reports").unwrap().consecutive_failures, 1);
}

#[tokio::test]
async fn test_connect_failure() {
    let addr = common::closed_port().await;
    let dispatcher = ServiceDispatcher::new(&[service("ghost", addr)]);

    let err = dispatcher.get("ghost", "/").await.unwrap_err();
    assert!(matches!(err, DispatchError::Downstream(DownstreamError::Connect(_))));
}

#[tokio::test]
async fn test_request_spec_reaches_downstream() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let addr = common::start_programmable_backend(move |head| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(head);
            (201, r#"{"id":7}"#.to_string())
        }
    })
    .await;

    let dispatcher = ServiceDispatcher::new(&[service("orders", addr)]);
    let spec = RequestSpec::new(axum::http::Method::PUT, "/orders/7?notify=true")
        .with_body(json!({"quantity": 2}))
        .with_header(
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderValue::from_static("Bearer user-token"),
        );

    let response = dispatcher.request("orders", spec).await.unwrap();
    assert_eq!(response.status.as_u16(), 201);

    let head = rx.recv().await.unwrap().to_ascii_lowercase();
    assert!(head.starts_with("put /orders/7?notify=true http/1.1"));
    assert!(head.contains("content-type: application/json"));
    assert!(head.contains("authorization: bearer user-token"));
}

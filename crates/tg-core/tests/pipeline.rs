mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use common::FakeServer;
use tg_core::errors::{InvokeError, RpcError};
use tg_core::invoke::{Chain, FloodGate, GateOptions, Invoker, RetryPolicy, TraceLayer};
use tg_core::rpc::{Request, Response};

fn request() -> Request {
    Request::new("messages.sendMessage", json!({"message": "hi"}))
}

#[tokio::test(start_paused = true)]
async fn rate_limited_call_waits_and_resends_same_request() {
    let server = FakeServer::with_handler(|_, seen| match seen {
        0 => Err(RpcError::new(420, "FLOOD_WAIT_3").into_invoke_error()),
        _ => Ok(Response(json!({"id": 1}))),
    })
    .shared();
    let gate = FloodGate::start(GateOptions::default());
    let chain = Chain::new(server.clone())
        .with(&gate)
        .with(RetryPolicy::default())
        .build();

    let started = Instant::now();
    let response = chain
        .invoke(&CancellationToken::new(), &request())
        .await
        .unwrap();
    gate.stop().await;

    assert_eq!(response.0, json!({"id": 1}));
    assert!(started.elapsed() >= Duration::from_secs(3));
    let calls = server.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].request, calls[1].request);
    assert!(calls[1].started - calls[0].started >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn enormous_flood_wait_is_survivable_and_cancellable() {
    let server = FakeServer::with_handler(|_, seen| match seen {
        0 => Err(RpcError::new(420, format!("FLOOD_WAIT_{}", u64::MAX)).into_invoke_error()),
        _ => Ok(Response::empty()),
    })
    .shared();
    let gate = FloodGate::start(GateOptions::default());
    let chain = Chain::new(server.clone())
        .with(&gate)
        .with(RetryPolicy::default())
        .build();

    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            cancel.cancel();
        })
    };
    let err = chain.invoke(&cancel, &request()).await.unwrap_err();
    canceller.await.unwrap();
    gate.stop().await;

    assert_eq!(err, InvokeError::Cancelled);
    assert_eq!(server.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn permanent_error_reaches_transport_once() {
    let server =
        FakeServer::with_handler(|_, _| Err(InvokeError::permanent("PEER_ID_INVALID"))).shared();
    let gate = FloodGate::start(GateOptions::default());
    let chain = Chain::new(server.clone())
        .with(&gate)
        .with(RetryPolicy::default())
        .build();

    let err = chain
        .invoke(&CancellationToken::new(), &request())
        .await
        .unwrap_err();
    gate.stop().await;

    assert!(matches!(err, InvokeError::Permanent(_)));
    assert_eq!(server.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_stops_retrying() {
    let server =
        FakeServer::with_handler(|_, _| Err(InvokeError::Transient("connection reset".into())))
            .shared();
    let gate = FloodGate::start(GateOptions::default());
    let chain = Chain::new(server.clone())
        .with(&gate)
        .with(RetryPolicy::default())
        .build();

    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        })
    };
    let err = chain.invoke(&cancel, &request()).await.unwrap_err();
    canceller.await.unwrap();
    gate.stop().await;

    assert_eq!(err, InvokeError::Cancelled);
    assert_eq!(server.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_errors_recover_through_the_chain() {
    let server = FakeServer::with_handler(|_, seen| {
        if seen < 2 {
            Err(InvokeError::Transient("timeout".into()))
        } else {
            Ok(Response::empty())
        }
    })
    .shared();
    let gate = FloodGate::start(GateOptions::default());
    let chain = Chain::new(server.clone())
        .with(&gate)
        .with(RetryPolicy::default())
        .build();

    chain
        .invoke(&CancellationToken::new(), &request())
        .await
        .unwrap();
    gate.stop().await;
    assert_eq!(server.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn gate_paces_concurrent_callers() {
    let server = FakeServer::new().shared();
    let options = GateOptions {
        min_interval: Duration::from_millis(100),
        ..GateOptions::default()
    };
    let gate = FloodGate::start(options);
    let chain = Chain::new(server.clone()).with(&gate).build();

    let cancel = CancellationToken::new();
    let request = request();
    let calls = (0..4).map(|_| chain.invoke(&cancel, &request));
    for result in futures::future::join_all(calls).await {
        result.unwrap();
    }
    gate.stop().await;

    let mut starts: Vec<Instant> = server.calls().iter().map(|call| call.started).collect();
    starts.sort();
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(100));
    }
}

#[tokio::test]
async fn stopped_gate_fails_calls_permanently() {
    let server = FakeServer::new().shared();
    let gate = FloodGate::start(GateOptions::default());
    let chain = Chain::new(server.clone())
        .with(&gate)
        .with(RetryPolicy::default())
        .build();
    gate.stop().await;

    let err = chain
        .invoke(&CancellationToken::new(), &request())
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::Permanent(_)));
    assert!(server.calls().is_empty());
}

#[derive(Clone, Default)]
struct Capture(Arc<parking_lot::Mutex<Vec<u8>>>);

impl std::io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn trace_sees_one_outcome_per_logical_call() {
    let server = FakeServer::with_handler(|_, seen| match seen {
        0 => Err(InvokeError::RateLimited(Duration::from_secs(1))),
        _ => Ok(Response::empty()),
    })
    .shared();
    let capture = Capture::default();
    let gate = FloodGate::start(GateOptions::default());
    let chain = Chain::new(server.clone())
        .with(&gate)
        .with(RetryPolicy::default())
        .with(TraceLayer::new(capture.clone()))
        .build();

    chain
        .invoke(&CancellationToken::new(), &request())
        .await
        .unwrap();
    gate.stop().await;

    let text = String::from_utf8(capture.0.lock().clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("→ messages.sendMessage"));
    assert!(lines[1].starts_with("← ("));
    assert_eq!(server.calls().len(), 2);
}

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use tg_core::errors::InvokeError;
use tg_core::invoke::Invoker;
use tg_core::rpc::{Request, Response};

type Handler = dyn Fn(&Request, usize) -> Result<Response, InvokeError> + Send + Sync;

/// One recorded call: when it started, when it finished, and what was sent.
#[derive(Debug, Clone)]
pub struct Call {
    pub started: Instant,
    pub finished: Option<Instant>,
    pub request: Request,
}

/// Fake transport answering by method, with a fixed latency per call.
pub struct FakeServer {
    handler: Box<Handler>,
    latency: Duration,
    calls: Mutex<Vec<Call>>,
}

impl FakeServer {
    /// Answers `auth.status` as authorized and everything else with an empty result.
    pub fn new() -> Self {
        Self::with_handler(|request, _| Ok(default_reply(request)))
    }

    /// `handler` receives the request and how many times its method was called before.
    pub fn with_handler(
        handler: impl Fn(&Request, usize) -> Result<Response, InvokeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.request.method == method)
            .collect()
    }
}

#[async_trait]
impl Invoker for FakeServer {
    async fn invoke(
        &self,
        cancel: &CancellationToken,
        request: &Request,
    ) -> Result<Response, InvokeError> {
        let (slot, seen) = {
            let mut calls = self.calls.lock();
            let seen = calls
                .iter()
                .filter(|call| call.request.method == request.method)
                .count();
            calls.push(Call {
                started: Instant::now(),
                finished: None,
                request: request.clone(),
            });
            (calls.len() - 1, seen)
        };

        if !self.latency.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(InvokeError::Cancelled),
                _ = tokio::time::sleep(self.latency) => {}
            }
        }
        let reply = (self.handler)(request, seen);
        self.calls.lock()[slot].finished = Some(Instant::now());
        reply
    }
}

pub fn default_reply(request: &Request) -> Response {
    match request.method {
        "auth.status" => Response(json!({"authorized": true})),
        _ => Response::empty(),
    }
}

/// Deterministic bytes so reassembly can be checked.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

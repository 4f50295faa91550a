//! Diagnostic pass-through: prints every request, its reply and latency.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{Invoker, Middleware, SharedInvoker};
use crate::errors::InvokeError;
use crate::rpc::{Request, Response};

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Middleware factory for [`Trace`].
#[derive(Clone)]
pub struct TraceLayer {
    sink: Sink,
}

impl TraceLayer {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl Middleware for TraceLayer {
    fn wrap(self, inner: SharedInvoker) -> SharedInvoker {
        Arc::new(Trace {
            inner,
            sink: self.sink,
        })
    }
}

pub struct Trace {
    inner: SharedInvoker,
    sink: Sink,
}

impl Trace {
    fn emit(&self, line: std::fmt::Arguments<'_>) {
        let mut sink = self.sink.lock();
        if let Err(err) = sink.write_fmt(line).and_then(|_| sink.flush()) {
            log::debug!("trace sink write failed: {err}");
        }
    }
}

#[async_trait]
impl Invoker for Trace {
    async fn invoke(
        &self,
        cancel: &CancellationToken,
        request: &Request,
    ) -> Result<Response, InvokeError> {
        self.emit(format_args!("→ {request}\n"));
        let start = Instant::now();
        let result = self.inner.invoke(cancel, request).await;
        match &result {
            Ok(response) => {
                let elapsed = round_millis(start.elapsed());
                self.emit(format_args!("← ({elapsed:?}) {response}\n"));
            }
            Err(err) => self.emit(format_args!("← {err}\n")),
        }
        result
    }
}

fn round_millis(elapsed: Duration) -> Duration {
    Duration::from_millis((elapsed.as_secs_f64() * 1000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::mock::ScriptedInvoker;
    use crate::invoke::Chain;
    use serde_json::json;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn logs_request_response_and_latency() {
        let capture = Capture::default();
        let transport = Arc::new(
            ScriptedInvoker::new(vec![Ok(Response(json!({"id": 1})))])
                .with_latency(Duration::from_millis(40)),
        );
        let chain = Chain::new(transport)
            .with(TraceLayer::new(capture.clone()))
            .build();

        let response = chain
            .invoke(
                &CancellationToken::new(),
                &Request::new("messages.sendMessage", json!({"message": "hi"})),
            )
            .await
            .unwrap();

        assert_eq!(response, Response(json!({"id": 1})));
        let text = capture.text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], r#"→ messages.sendMessage {"message":"hi"}"#);
        assert!(lines[1].starts_with("← (4"), "{}", lines[1]);
        assert!(lines[1].ends_with(r#"ms) {"id":1}"#));
    }

    #[tokio::test]
    async fn errors_pass_through_unchanged() {
        let capture = Capture::default();
        let transport = Arc::new(ScriptedInvoker::new(vec![Err(InvokeError::permanent(
            "boom",
        ))]));
        let chain = Chain::new(transport)
            .with(TraceLayer::new(capture.clone()))
            .build();

        let err = chain
            .invoke(
                &CancellationToken::new(),
                &Request::new("help.getConfig", json!({})),
            )
            .await
            .unwrap_err();

        assert_eq!(err, InvokeError::permanent("boom"));
        assert!(capture.text().contains("← rpc error 0: boom"));
    }
}

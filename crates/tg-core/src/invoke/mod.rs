//! Composable invocation chain.
//!
//! Every layer, the transport included, implements [`Invoker`]. Middleware
//! wraps an inner invoker and yields a new one, so a chain is built inside
//! out: transport, then flood-control gate, then retry, then (optionally)
//! diagnostics. Outer layers observe the realized latency and outcome of
//! everything beneath them.

pub mod flood;
pub mod retry;
pub mod trace;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::InvokeError;
use crate::rpc::{Request, Response};

pub use flood::{FloodGate, FloodGateHandle, GateOptions};
pub use retry::{Backoff, Retry, RetryPolicy};
pub use trace::{Trace, TraceLayer};

/// Capability to dispatch one request and receive one response.
///
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(
        &self,
        cancel: &CancellationToken,
        request: &Request,
    ) -> Result<Response, InvokeError>;
}

pub type SharedInvoker = Arc<dyn Invoker>;

#[async_trait]
impl<T: Invoker + ?Sized> Invoker for Arc<T> {
    async fn invoke(
        &self,
        cancel: &CancellationToken,
        request: &Request,
    ) -> Result<Response, InvokeError> {
        (**self).invoke(cancel, request).await
    }
}

/// A decorator that can be stacked on top of an invoker.
pub trait Middleware {
    fn wrap(self, inner: SharedInvoker) -> SharedInvoker;
}

/// Builder for an invoker chain, innermost layer first.
pub struct Chain {
    invoker: SharedInvoker,
}

impl Chain {
    pub fn new(transport: SharedInvoker) -> Self {
        Self { invoker: transport }
    }

    pub fn with(self, middleware: impl Middleware) -> Self {
        Self {
            invoker: middleware.wrap(self.invoker),
        }
    }

    pub fn with_optional(self, middleware: Option<impl Middleware>) -> Self {
        match middleware {
            Some(middleware) => self.with(middleware),
            None => self,
        }
    }

    pub fn build(self) -> SharedInvoker {
        self.invoker
    }
}


#[cfg(test)]
mod tests {
    use super::mock::ScriptedInvoker;
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Tag {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    struct Tagged {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        inner: SharedInvoker,
    }

    #[async_trait]
    impl Invoker for Tagged {
        async fn invoke(
            &self,
            cancel: &CancellationToken,
            request: &Request,
        ) -> Result<Response, InvokeError> {
            self.log.lock().push(format!("enter {}", self.name));
            let result = self.inner.invoke(cancel, request).await;
            self.log.lock().push(format!("leave {}", self.name));
            result
        }
    }

    impl Middleware for Tag {
        fn wrap(self, inner: SharedInvoker) -> SharedInvoker {
            Arc::new(Tagged {
                name: self.name,
                log: self.log,
                inner,
            })
        }
    }

    #[tokio::test]
    async fn later_layers_wrap_earlier_ones() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let transport = Arc::new(ScriptedInvoker::default());
        let chain = Chain::new(transport.clone())
            .with(Tag {
                name: "inner",
                log: log.clone(),
            })
            .with_optional(None::<Tag>)
            .with(Tag {
                name: "outer",
                log: log.clone(),
            })
            .build();

        let request = Request::new("help.getConfig", json!({}));
        chain
            .invoke(&CancellationToken::new(), &request)
            .await
            .unwrap();

        assert_eq!(
            *log.lock(),
            vec!["enter outer", "enter inner", "leave inner", "leave outer"]
        );
        assert_eq!(transport.call_count(), 1);
    }
}

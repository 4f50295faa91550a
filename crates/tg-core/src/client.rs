//! Composition root: builds the invoker chain and owns the flood-control gate.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::Api;
use crate::config::Config;
use crate::errors::InvokeError;
use crate::invoke::{Chain, FloodGate, FloodGateHandle, GateOptions, RetryPolicy, SharedInvoker, TraceLayer};
use crate::transport::{HttpTransport, TransportOptions, DEFAULT_ENDPOINT, TEST_ENDPOINT};

#[derive(Clone)]
pub struct ClientOptions {
    pub app_id: i32,
    pub app_hash: String,
    pub bot_token: String,
    pub endpoint: String,
    pub session_path: Option<PathBuf>,
    pub gate: GateOptions,
    pub retry: RetryPolicy,
    /// Print every call; `None` disables tracing.
    pub trace: Option<TraceLayer>,
}

impl ClientOptions {
    /// Options for `config`, using the staging gateway when `test` is set.
    pub fn from_config(config: &Config, test: bool) -> Self {
        let endpoint = match (&config.endpoint, test) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, true) => TEST_ENDPOINT.to_string(),
            (None, false) => DEFAULT_ENDPOINT.to_string(),
        };
        Self {
            app_id: config.app_id,
            app_hash: config.app_hash.clone(),
            bot_token: config.bot_token.clone(),
            endpoint,
            session_path: None,
            gate: GateOptions::default(),
            retry: RetryPolicy::default(),
            trace: None,
        }
    }

    pub fn with_session_path(mut self, path: PathBuf) -> Self {
        self.session_path = Some(path);
        self
    }

    pub fn with_trace(mut self, trace: Option<TraceLayer>) -> Self {
        self.trace = trace;
        self
    }
}

/// A connected, authorized client.
pub struct Client {
    api: Api,
    gate: FloodGateHandle,
}

impl Client {
    /// Connect over HTTP and authorize as a bot.
    pub async fn connect(
        cancel: &CancellationToken,
        options: ClientOptions,
    ) -> Result<Self, InvokeError> {
        let mut transport = TransportOptions::new(&options.endpoint, &options.bot_token);
        transport.session_path = options.session_path.clone();
        let transport = HttpTransport::new(transport)?;
        Self::with_transport(cancel, Arc::new(transport), options).await
    }

    /// Build the chain on top of an existing transport and authorize.
    ///
    /// The gate is stopped again if authorization fails.
    pub async fn with_transport(
        cancel: &CancellationToken,
        transport: SharedInvoker,
        options: ClientOptions,
    ) -> Result<Self, InvokeError> {
        let client = Self::assemble(transport, &options);
        if let Err(err) = client.authorize(cancel, &options).await {
            client.shutdown().await;
            return Err(err);
        }
        Ok(client)
    }

    /// Chain order, innermost first: transport, gate, retry, trace.
    fn assemble(transport: SharedInvoker, options: &ClientOptions) -> Self {
        let gate = FloodGate::start(options.gate.clone());
        let invoker = Chain::new(transport)
            .with(&gate)
            .with(options.retry.clone())
            .with_optional(options.trace.clone())
            .build();
        Self {
            api: Api::new(invoker),
            gate,
        }
    }

    async fn authorize(
        &self,
        cancel: &CancellationToken,
        options: &ClientOptions,
    ) -> Result<(), InvokeError> {
        if self.api.is_authorized(cancel).await? {
            log::debug!("reusing stored session");
            return Ok(());
        }
        log::debug!("importing bot authorization");
        self.api
            .import_bot_authorization(cancel, options.app_id, &options.app_hash, &options.bot_token)
            .await
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    /// Stop the flood-control gate. Calls still queued fail permanently.
    pub async fn shutdown(self) {
        self.gate.stop().await;
    }
}

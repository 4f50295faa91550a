//! Innermost invoker: JSON over HTTP to the RPC gateway.
//!
//! Calls are POSTed to `{endpoint}/bot{token}/{method}`. Replies use the
//! envelope `{"ok": true, "result": ...}` or
//! `{"ok": false, "error_code": N, "description": "...", "parameters": {"retry_after": S}}`.

pub mod session;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::{InvokeError, RpcError};
use crate::invoke::Invoker;
use crate::rpc::{Request, Response};

pub use session::SessionStore;

pub const DEFAULT_ENDPOINT: &str = "https://api.telegram.org";
pub const TEST_ENDPOINT: &str = "https://api.telegram.org/test";
const SESSION_HEADER: &str = "x-session";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub endpoint: String,
    pub bot_token: String,
    pub session_path: Option<PathBuf>,
    pub timeout: Duration,
}

impl TransportOptions {
    pub fn new(endpoint: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            bot_token: bot_token.into(),
            session_path: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    base: String,
    session: SessionStore,
}

impl HttpTransport {
    pub fn new(options: TransportOptions) -> Result<Self, InvokeError> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|err| InvokeError::permanent(format!("build http client: {err}")))?;
        let session = match &options.session_path {
            Some(path) => SessionStore::open(path).map_err(|err| {
                InvokeError::permanent(format!("open session {}: {err}", path.display()))
            })?,
            None => SessionStore::ephemeral(),
        };
        Ok(Self {
            client,
            base: format!(
                "{}/bot{}",
                options.endpoint.trim_end_matches('/'),
                options.bot_token
            ),
            session,
        })
    }

    async fn send(&self, request: &Request) -> Result<Response, InvokeError> {
        let mut body = request.params.clone();
        if let (Some(payload), Value::Object(map)) = (&request.payload, &mut body) {
            map.insert("bytes".into(), Value::String(BASE64.encode(payload)));
        }

        let mut builder = self
            .client
            .post(format!("{}/{}", self.base, request.method))
            .json(&body);
        if let Some(session) = self.session.get() {
            builder = builder.header(SESSION_HEADER, session);
        }

        let reply = builder.send().await.map_err(classify_reqwest)?;
        let status = reply.status().as_u16();
        let bytes = reply.bytes().await.map_err(classify_reqwest)?;
        let envelope = decode_envelope(status, &bytes)?;

        if let Some(session) = envelope.session {
            if let Err(err) = self.session.store(session) {
                log::warn!("failed to persist session: {err}");
            }
        }
        Ok(Response(envelope.result))
    }
}

#[async_trait]
impl Invoker for HttpTransport {
    async fn invoke(
        &self,
        cancel: &CancellationToken,
        request: &Request,
    ) -> Result<Response, InvokeError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(InvokeError::Cancelled),
            result = self.send(request) => result,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    session: Option<String>,
    #[serde(default)]
    error_code: Option<i32>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<Parameters>,
}

#[derive(Debug, Deserialize)]
struct Parameters {
    retry_after: Option<u64>,
}

#[derive(Debug)]
struct Decoded {
    result: Value,
    session: Option<String>,
}

fn decode_envelope(status: u16, body: &[u8]) -> Result<Decoded, InvokeError> {
    let envelope: Envelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(_) if status == 429 => {
            return Err(RpcError::new(429, "Too Many Requests").into_invoke_error())
        }
        Err(err) if status >= 500 => {
            return Err(InvokeError::Transient(format!("http {status}: {err}")))
        }
        Err(err) => return Err(InvokeError::permanent(format!("http {status}: {err}"))),
    };

    if envelope.ok {
        return Ok(Decoded {
            result: envelope.result.unwrap_or(Value::Bool(true)),
            session: envelope.session,
        });
    }

    let mut err = RpcError::new(
        envelope.error_code.unwrap_or(i32::from(status)),
        envelope.description.unwrap_or_else(|| "unknown error".into()),
    );
    if let Some(seconds) = envelope.parameters.and_then(|p| p.retry_after) {
        err = err.with_retry_after(seconds);
    }
    Err(err.into_invoke_error())
}

fn classify_reqwest(err: reqwest::Error) -> InvokeError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        InvokeError::Transient(err.to_string())
    } else {
        InvokeError::permanent(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;
    use serde_json::json;

    #[test]
    fn ok_envelope_yields_result_and_session() {
        let body = br#"{"ok":true,"result":{"id":5},"session":"s1"}"#;
        let decoded = decode_envelope(200, body).unwrap();
        assert_eq!(decoded.result, json!({"id": 5}));
        assert_eq!(decoded.session.as_deref(), Some("s1"));
    }

    #[test]
    fn ok_without_result_is_true() {
        let decoded = decode_envelope(200, br#"{"ok":true}"#).unwrap();
        assert_eq!(decoded.result, Value::Bool(true));
    }

    #[test]
    fn retry_after_maps_to_rate_limit() {
        let body = br#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":3}}"#;
        let err = decode_envelope(429, body).unwrap_err();
        assert_eq!(err, InvokeError::RateLimited(Duration::from_secs(3)));
    }

    #[test]
    fn flood_wait_description_maps_to_rate_limit() {
        let body = br#"{"ok":false,"error_code":420,"description":"FLOOD_WAIT_12"}"#;
        let err = decode_envelope(420, body).unwrap_err();
        assert_eq!(err, InvokeError::RateLimited(Duration::from_secs(12)));
    }

    #[test]
    fn too_many_requests_without_wait_still_backs_off() {
        let body = br#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 5"}"#;
        let err = decode_envelope(429, body).unwrap_err();
        assert_eq!(err, InvokeError::RateLimited(Duration::from_secs(5)));

        let err = decode_envelope(429, b"slow down").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::RateLimited);
    }

    #[test]
    fn garbage_from_server_error_is_transient() {
        let err = decode_envelope(502, b"<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Transient);
        let err = decode_envelope(200, b"not json").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Permanent);
    }

    #[test]
    fn base_url_joins_endpoint_and_token() {
        let transport =
            HttpTransport::new(TransportOptions::new("https://gw.example/", "1:abc")).unwrap();
        assert_eq!(transport.base, "https://gw.example/bot1:abc");
    }
}

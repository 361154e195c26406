//! Minimal JSON-RPC 2.0 client over HTTP.
//!
//! Both the wallet provider and the ledger reads speak JSON-RPC to the same
//! kind of endpoint, so they share this transport and translate
//! [`RpcFailure`] into their own error types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// Why a JSON-RPC request did not produce a result.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcFailure {
    /// Request never got a well-formed JSON-RPC answer.
    Transport(String),
    /// The endpoint answered with an error object.
    Error {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    /// The result was present but not of the expected shape.
    Decode(String),
}

impl std::fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(reason) => write!(f, "transport: {}", reason),
            Self::Error { code, message, .. } => write!(f, "rpc error {}: {}", code, message),
            Self::Decode(reason) => write!(f, "decode: {}", reason),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Build a JSON-RPC 2.0 request body.
pub fn request_body(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Interpret a raw JSON-RPC response body.
pub fn parse_response(body: Value) -> Result<Value, RpcFailure> {
    let response: RpcResponse =
        serde_json::from_value(body).map_err(|e| RpcFailure::Transport(format!("malformed envelope: {e}")))?;
    if let Some(error) = response.error {
        return Err(RpcFailure::Error {
            code: error.code,
            message: error.message,
            data: error.data,
        });
    }
    Ok(response.result.unwrap_or(Value::Null))
}

/// Shared HTTP JSON-RPC client.
#[derive(Debug)]
pub struct JsonRpcClient {
    url: String,
    client: Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue a request and return the raw `result` value.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(method, id, "json-rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&request_body(id, method, params))
            .send()
            .await
            .map_err(|e| RpcFailure::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(RpcFailure::Transport(format!("HTTP {}", status.as_u16())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RpcFailure::Transport(format!("HTTP {}: {}", status.as_u16(), e)))?;
        parse_response(body)
    }

    /// Issue a request and deserialize the `result`.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RpcFailure> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value).map_err(|e| RpcFailure::Decode(e.to_string()))
    }
}

//! JSON-RPC 2.0 client over HTTP.
//!
//! Handles request ID generation, the HTTP round trip and response
//! unwrapping. Transport failures and HTTP 429/5xx are reported as
//! transient so the submit loop can retry them.

use super::types::{RpcRequest, RpcResponse};
use crate::error::{DispatchError, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, instrument};

/// JSON-RPC 2.0 client bound to one endpoint.
#[derive(Debug)]
pub struct RpcClient {
    http: Client,
    /// RPC endpoint URL.
    pub endpoint: String,
    /// Next request ID (atomically incremented).
    next_id: AtomicU64,
}

impl RpcClient {
    /// Creates a client for `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_http_client(Client::new(), endpoint)
    }

    /// Creates a client reusing an existing HTTP client.
    pub fn with_http_client(http: Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns the next request ID and increments the counter.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Builds a request with an auto-incrementing ID.
    pub fn build_request(&self, method: &'static str, params: Value) -> RpcRequest {
        RpcRequest::with_id(method, params, self.next_id())
    }

    /// Sends one request and deserializes its result.
    #[instrument(skip(self, params))]
    pub async fn call<T: DeserializeOwned>(&self, method: &'static str, params: Value) -> Result<T> {
        let request = self.build_request(method, params);
        debug!("RPC {} (id {})", method, request.id);

        let response = self.http.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(DispatchError::transient(format!(
                "{} returned HTTP {}",
                self.endpoint, status
            )));
        }
        if !status.is_success() {
            return Err(DispatchError::ledger(format!(
                "{} returned HTTP {}",
                self.endpoint, status
            )));
        }

        let rpc_response: RpcResponse = response.json().await?;
        rpc_response.into_typed_result()
    }
}

impl Clone for RpcClient {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            endpoint: self.endpoint.clone(),
            // Start new clone with fresh ID counter
            next_id: AtomicU64::new(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_id_increment() {
        let client = RpcClient::new("http://localhost:8899");
        assert_eq!(client.next_id(), 1);
        assert_eq!(client.next_id(), 2);
        assert_eq!(client.next_id(), 3);
    }

    #[test]
    fn test_build_request() {
        let client = RpcClient::new("http://localhost:8899");
        let req1 = client.build_request("getAccountInfo", json!(["key"]));
        assert_eq!(req1.method, "getAccountInfo");
        assert_eq!(req1.jsonrpc, "2.0");
        assert_eq!(req1.id, 1);
        let req2 = client.build_request("getLatestBlockhash", json!([]));
        assert_eq!(req2.id, 2);
    }

    #[test]
    fn test_client_clone() {
        let client = RpcClient::new("http://localhost:8899");
        client.next_id();
        client.next_id();
        let cloned = client.clone();
        assert_eq!(cloned.endpoint, client.endpoint);
        assert_eq!(cloned.next_id(), 1);
    }
}

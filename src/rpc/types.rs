//! JSON-RPC 2.0 envelopes and the ledger node's result shapes.
//!
//! ## Envelopes
//!
//! - [`RpcRequest`]: outgoing request
//! - [`RpcResponse`]: incoming response, unwrapped with
//!   [`RpcResponse::into_typed_result`]
//! - [`RpcError`]: error object, mapped onto [`DispatchError`]
//!
//! ## Ledger results
//!
//! Account data arrives as `[base64, "base64"]` pairs inside a
//! `{context, value}` wrapper; see [`WithContext`] and [`UiAccount`].

use crate::error::{DispatchError, Result};
use crate::program::errors::decode_program_error;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 protocol version.
pub const JSON_RPC_VERSION: &str = "2.0";

// =============================================================================
// Envelopes
// =============================================================================

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    /// Protocol version (always "2.0").
    pub jsonrpc: &'static str,
    /// Method name.
    pub method: &'static str,
    /// Method parameters.
    pub params: Value,
    /// Request ID.
    pub id: u64,
}

impl RpcRequest {
    /// Creates a request with a specific ID.
    pub fn with_id(method: &'static str, params: Value, id: u64) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION,
            method,
            params,
            id,
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    /// Result (present on success).
    pub result: Option<Value>,
    /// Error (present on failure).
    pub error: Option<RpcError>,
    /// Request ID.
    pub id: Option<Value>,
}

impl RpcResponse {
    /// Extracts the result value, mapping an error object onto
    /// [`DispatchError`].
    pub fn into_result(self) -> Result<Value> {
        if let Some(err) = self.error {
            return Err(err.into_error());
        }
        self.result
            .ok_or_else(|| DispatchError::ledger("Empty RPC result"))
    }

    /// Extracts and deserializes the result.
    pub fn into_typed_result<T: DeserializeOwned>(self) -> Result<T> {
        let value = self.into_result()?;
        serde_json::from_value(value)
            .map_err(|e| DispatchError::serialization(format!("Failed to parse RPC result: {}", e)))
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
    /// Additional error data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Transaction simulation failed during preflight.
    pub const SEND_TRANSACTION_PREFLIGHT_FAILURE: i64 = -32002;
    /// The node is behind or otherwise unhealthy.
    pub const NODE_UNHEALTHY: i64 = -32005;
    /// The requested slot or block is not available yet.
    pub const BLOCK_NOT_AVAILABLE: i64 = -32004;
    /// Internal error.
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Maps the error onto the client taxonomy: custom program errors are
    /// decoded, node-side hiccups are transient, the rest is `Ledger`.
    pub fn into_error(self) -> DispatchError {
        if let Some(code) = self.data.as_ref().and_then(custom_error_code) {
            return decode_program_error(code);
        }
        if let Some(code) = parse_custom_error_message(&self.message) {
            return decode_program_error(code);
        }
        if self.message.contains("Blockhash not found") {
            return DispatchError::transient(self.message);
        }
        match self.code {
            Self::NODE_UNHEALTHY | Self::BLOCK_NOT_AVAILABLE | Self::INTERNAL_ERROR => {
                DispatchError::transient(format!("RPC error {}: {}", self.code, self.message))
            }
            _ => DispatchError::ledger(format!("RPC error {}: {}", self.code, self.message)),
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RPC error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// Finds `{"InstructionError": [i, {"Custom": n}]}` in a transaction error.
pub fn custom_error_code(err: &Value) -> Option<u32> {
    let err = err.get("err").unwrap_or(err);
    let custom = err
        .get("InstructionError")?
        .as_array()?
        .get(1)?
        .get("Custom")?
        .as_u64()?;
    u32::try_from(custom).ok()
}

/// Extracts `n` from "... custom program error: 0x<n>".
pub fn parse_custom_error_message(message: &str) -> Option<u32> {
    let (_, tail) = message.split_once("custom program error: 0x")?;
    let hex: String = tail.chars().take_while(|c| c.is_ascii_hexdigit()).collect();
    u32::from_str_radix(&hex, 16).ok()
}

// =============================================================================
// Result Shapes
// =============================================================================

/// `{context, value}` wrapper used by most ledger methods.
#[derive(Debug, Clone, Deserialize)]
pub struct WithContext<T> {
    /// Wrapped value.
    pub value: T,
}

/// Account as returned with `"encoding": "base64"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiAccount {
    /// `[data, "base64"]`.
    pub data: (String, String),
    /// Owning program, base58.
    pub owner: String,
    /// Balance.
    pub lamports: u64,
}

impl UiAccount {
    /// Decodes the account data.
    pub fn decode_data(&self) -> Result<Vec<u8>> {
        if self.data.1 != "base64" {
            return Err(DispatchError::serialization(format!(
                "Unexpected account encoding '{}'",
                self.data.1
            )));
        }
        BASE64
            .decode(&self.data.0)
            .map_err(|e| DispatchError::serialization(format!("Bad account data: {}", e)))
    }
}

/// One entry of `getTokenAccountsByOwner` / `getProgramAccounts`.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyedAccount {
    /// Account address, base58.
    pub pubkey: String,
    /// Account contents.
    pub account: UiAccount,
}

/// Result of `getLatestBlockhash`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestBlockhash {
    /// Recent blockhash, base58.
    pub blockhash: String,
    /// Last block height at which the blockhash is valid.
    pub last_valid_block_height: u64,
}

/// One entry of `getSignatureStatuses`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    /// Transaction error, if it failed.
    pub err: Option<Value>,
    /// Reached commitment level.
    pub confirmation_status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = RpcRequest::with_id("getAccountInfo", json!(["abc"]), 42);
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"getAccountInfo\""));
        assert!(json.contains("\"id\":42"));
    }

    #[test]
    fn test_response_success() {
        let response: RpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "result": {"value": 7}, "id": 1}))
                .unwrap();
        let result: WithContext<u64> = response.into_typed_result().unwrap();
        assert_eq!(result.value, 7);
    }

    #[test]
    fn test_program_error_from_data() {
        let error = RpcError {
            code: RpcError::SEND_TRANSACTION_PREFLIGHT_FAILURE,
            message: "Transaction simulation failed".into(),
            data: Some(json!({"err": {"InstructionError": [0, {"Custom": 6210}]}, "logs": []})),
        };
        assert!(error.into_error().is_conflict());
    }

    #[test]
    fn test_program_error_from_message() {
        assert_eq!(
            parse_custom_error_message(
                "Transaction simulation failed: Error processing Instruction 0: custom program error: 0x183d"
            ),
            Some(0x183d)
        );
        let error = RpcError {
            code: RpcError::SEND_TRANSACTION_PREFLIGHT_FAILURE,
            message: "custom program error: 0x183d".into(),
            data: None,
        };
        assert!(error.into_error().to_string().starts_with("Permission denied"));
    }

    #[test]
    fn test_node_errors_are_transient() {
        let unhealthy = RpcError {
            code: RpcError::NODE_UNHEALTHY,
            message: "Node is behind".into(),
            data: None,
        };
        assert!(unhealthy.into_error().is_transient());
        let stale = RpcError {
            code: RpcError::SEND_TRANSACTION_PREFLIGHT_FAILURE,
            message: "Transaction simulation failed: Blockhash not found".into(),
            data: None,
        };
        assert!(stale.into_error().is_transient());
        let other = RpcError {
            code: -32602,
            message: "Invalid params".into(),
            data: None,
        };
        assert!(matches!(other.into_error(), DispatchError::Ledger(_)));
    }

    #[test]
    fn test_ui_account_decode() {
        let account: UiAccount = serde_json::from_value(json!({
            "data": ["AQID", "base64"],
            "owner": "11111111111111111111111111111111",
            "lamports": 5,
            "executable": false,
            "rentEpoch": 0
        }))
        .unwrap();
        assert_eq!(account.decode_data().unwrap(), vec![1, 2, 3]);
    }
}

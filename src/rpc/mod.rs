//! JSON-RPC 2.0 plumbing for talking to a ledger node.
//!
//! ## Modules
//!
//! - `types`: request/response envelopes, error mapping and result shapes
//! - `client`: HTTP client with request ID management

pub mod client;
pub mod types;

pub use client::RpcClient;
pub use types::{RpcError, RpcRequest, RpcResponse, JSON_RPC_VERSION};

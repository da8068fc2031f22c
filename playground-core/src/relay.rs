//! # Relay
//!
//! The relay is the HTTP intermediary that receives call envelopes and executes the actual
//! gRPC call against the target address. This module holds its wire types and the HTTP
//! client for its endpoints:
//!
//! * `POST /send-request/{appId}`: single-shot JSON response, or an event stream for
//!   streaming methods.
//! * `POST /proto-info/{appId}`, `POST /upload-proto/{appId}`: schema loading.
//! * `POST /upload-cert/{appId}`: certificate loading.
pub mod client;
mod types;

pub use client::{RelayClient, RelayClientError, RelayConfig, RetryPolicy};
pub use types::*;

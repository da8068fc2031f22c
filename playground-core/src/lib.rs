//! # Playground Core
//!
//! `playground-core` is the foundational library powering the RPC playground. It executes
//! unary and streaming calls against a remote gRPC endpoint through an HTTP relay, and it
//! synthesizes example request payloads from compiled Protobuf schemas so callers never start
//! from an empty editor.
//!
//! ## Key Components
//!
//! * **[`schema::Schema`] & [`schema::ServiceMethodView`]:** Read views over a compiled
//!   `DescriptorPool`. The view exposes the stream directionality of one service method.
//! * **[`mock`]:** Turns a message descriptor into an example JSON value tree.
//! * **[`call::RpcCall`]:** Owns one in-flight logical call. It builds the relay envelope,
//!   picks the transport, classifies failures and reports everything on a single ordered
//!   channel of [`call::CallEvent`]s.
//! * **[`negotiation::DependencyBridge`]:** Lets a call pause when the relay reports missing
//!   schema imports or certificate files, and resume once the gap has been filled.
//! * **[`relay::RelayClient`]:** The HTTP client for the relay endpoints.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect` and `serde_json` to ensure that consumers
//! use compatible versions of these underlying dependencies.
pub mod call;
pub mod mock;
pub mod negotiation;
pub mod relay;
pub mod schema;

// Re-exports
pub use prost;
pub use prost_reflect;
pub use serde_json;

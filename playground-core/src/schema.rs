//! # Schema Introspection
//!
//! This module provides read access to a compiled Protobuf schema. The schema arrives as a
//! binary `FileDescriptorSet` (produced by the relay's upload/compilation service, `protoc`
//! or `buf`) and is held in a `prost_reflect::DescriptorPool`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use playground_core::schema::Schema;
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("descriptor.bin")?;
//! let schema = Schema::decode(&bytes)?;
//!
//! for service in schema.list_services() {
//!     println!("{service}");
//! }
//!
//! let view = schema.method("helloworld.Greeter", "SayHello")?;
//! assert!(!view.uses_streaming());
//! # Ok(())
//! # }
//! ```
mod method;
mod types;

pub use method::ServiceMethodView;
pub use types::*;

use crate::mock;
use prost_reflect::{DescriptorError, DescriptorPool, ServiceDescriptor};
use serde_json::Value;
use std::collections::BTreeMap;

/// Errors that can occur when resolving symbols inside a [`Schema`].
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Failed to decode file descriptor set: '{0}'")]
    Descriptor(#[from] DescriptorError),
    #[error("Service '{0}' not found")]
    ServiceNotFound(String),
    #[error("Method '{method}' not found on service '{service}'")]
    MethodNotFound { service: String, method: String },
}

/// A queryable, compiled schema.
#[derive(Debug, Clone)]
pub struct Schema {
    pool: DescriptorPool,
}

impl Schema {
    /// Decodes a raw byte buffer containing a `FileDescriptorSet`.
    ///
    /// # Returns
    ///
    /// * `Ok(Schema)` - The loaded schema.
    /// * `Err(SchemaError::Descriptor)` - If the bytes are not a valid descriptor set.
    pub fn decode(file_descriptor_set: &[u8]) -> Result<Self, SchemaError> {
        let pool = DescriptorPool::decode(file_descriptor_set)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: DescriptorPool) -> Self {
        Self { pool }
    }

    pub fn descriptor_pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Lists all services defined in the schema.
    ///
    /// # Returns
    ///
    /// A list of fully qualified service names (e.g. `helloworld.Greeter`).
    pub fn list_services(&self) -> Vec<String> {
        self.pool
            .services()
            .map(|s| s.full_name().to_string())
            .collect()
    }

    /// Resolves a fully qualified name (service, message or enum) to its definition.
    ///
    /// Services win over messages, and messages over enums, should a pool ever contain
    /// clashing names.
    pub fn resolve_symbol(&self, symbol: &str) -> Option<Symbol> {
        self.pool
            .get_service_by_name(symbol)
            .map(Symbol::Service)
            .or_else(|| self.pool.get_message_by_name(symbol).map(Symbol::Message))
            .or_else(|| self.pool.get_enum_by_name(symbol).map(Symbol::Enum))
    }

    pub fn service(&self, service: &str) -> Result<ServiceDescriptor, SchemaError> {
        self.pool
            .get_service_by_name(service)
            .ok_or_else(|| SchemaError::ServiceNotFound(service.to_string()))
    }

    /// Resolves one service method into a [`ServiceMethodView`].
    pub fn method(&self, service: &str, method: &str) -> Result<ServiceMethodView, SchemaError> {
        ServiceMethodView::new(&self.service(service)?, method)
    }

    /// Synthesizes an example request payload for every method of `service`, keyed by
    /// method name.
    pub fn mock_requests(&self, service: &str) -> Result<BTreeMap<String, Value>, SchemaError> {
        Ok(mock::mock_service_requests(&self.service(service)?))
    }
}

use super::SchemaError;
use crate::relay::SchemaFile;
use prost_reflect::{MessageDescriptor, MethodDescriptor, ServiceDescriptor};

/// A read view over one resolved service + method pair.
///
/// Cheap to clone and safe to share: the underlying descriptors are reference counted and
/// immutable.
#[derive(Debug, Clone)]
pub struct ServiceMethodView {
    method: MethodDescriptor,
    service_name: String,
    schema_file_path: String,
}

impl ServiceMethodView {
    /// Resolves `method_name` on `service`.
    ///
    /// # Returns
    ///
    /// * `Ok(ServiceMethodView)` - The view.
    /// * `Err(SchemaError::MethodNotFound)` - If the service has no such method.
    pub fn new(service: &ServiceDescriptor, method_name: &str) -> Result<Self, SchemaError> {
        let method = service
            .methods()
            .find(|m| m.name() == method_name)
            .ok_or_else(|| SchemaError::MethodNotFound {
                service: service.full_name().to_string(),
                method: method_name.to_string(),
            })?;

        Ok(Self {
            service_name: service.full_name().to_string(),
            schema_file_path: service.parent_file().name().to_string(),
            method,
        })
    }

    /// The fully qualified service name (e.g. `helloworld.Greeter`).
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn method_name(&self) -> &str {
        self.method.name()
    }

    pub fn is_client_streaming(&self) -> bool {
        self.method.is_client_streaming()
    }

    pub fn is_server_streaming(&self) -> bool {
        self.method.is_server_streaming()
    }

    pub fn is_bidirectional(&self) -> bool {
        self.is_client_streaming() && self.is_server_streaming()
    }

    pub fn uses_streaming(&self) -> bool {
        self.is_client_streaming() || self.is_server_streaming()
    }

    pub fn request_schema(&self) -> MessageDescriptor {
        self.method.input()
    }

    pub fn response_schema(&self) -> MessageDescriptor {
        self.method.output()
    }

    /// Path of the schema file declaring the service. This is the identity the relay uses
    /// when it reports missing imports for this method.
    pub fn schema_file_path(&self) -> &str {
        &self.schema_file_path
    }

    /// Direct imports of the declaring schema file.
    pub fn imports(&self) -> Vec<SchemaFile> {
        self.method
            .parent_file()
            .dependencies()
            .map(|file| SchemaFile::placeholder(file.name()))
            .collect()
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.method
    }
}

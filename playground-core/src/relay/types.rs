//! Wire types exchanged with the relay. All of them use camelCase JSON.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A schema file reference: a file the relay has (or should have) loaded, together with the
/// files it imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaFile {
    pub file_name: String,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<SchemaFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<SchemaFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_preloaded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_library: Option<bool>,
}

impl SchemaFile {
    /// A bare placeholder for `file_path`. The file name is the last path segment.
    pub fn placeholder(file_path: impl Into<String>) -> Self {
        let file_path = file_path.into();
        let file_name = file_path
            .rsplit('/')
            .next()
            .unwrap_or(file_path.as_str())
            .to_string();

        Self {
            file_name,
            file_path,
            imports: Vec::new(),
            missing: Vec::new(),
            is_preloaded: None,
            url: None,
            is_library: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CertType {
    RootCert,
    PrivateKey,
    CertChain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertFile {
    pub file_name: String,
    pub file_path: String,
    #[serde(rename = "type")]
    pub cert_type: CertType,
}

/// TLS material for one target, referenced by file paths the relay knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub root_cert: CertFile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<CertFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_chain: Option<CertFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_target_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_server_certificate: Option<bool>,
}

impl Certificate {
    /// A certificate made of a single root certificate file.
    pub fn from_root_cert(file_path: impl Into<String>) -> Self {
        let file = SchemaFile::placeholder(file_path);
        Self {
            id: None,
            root_cert: CertFile {
                file_name: file.file_name,
                file_path: file.file_path,
                cert_type: CertType::RootCert,
            },
            private_key: None,
            cert_chain: None,
            ssl_target_host: None,
            use_server_certificate: None,
        }
    }
}

/// Outcome of loading schema files on the relay. Serialized as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum LoadProtoStatus {
    Ok,
    Fail,
    /// Some of the files were loaded but imports are missing.
    Part,
}

impl TryFrom<i32> for LoadProtoStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Ok),
            -1 => Ok(Self::Fail),
            0 => Ok(Self::Part),
            other => Err(format!("unknown schema load status {other}")),
        }
    }
}

impl From<LoadProtoStatus> for i32 {
    fn from(status: LoadProtoStatus) -> Self {
        match status {
            LoadProtoStatus::Ok => 1,
            LoadProtoStatus::Fail => -1,
            LoadProtoStatus::Part => 0,
        }
    }
}

/// Outcome of loading certificate files on the relay. Serialized as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum LoadCertStatus {
    Ok,
    Fail,
    Part,
}

impl TryFrom<i32> for LoadCertStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(Self::Ok),
            4 => Ok(Self::Fail),
            5 => Ok(Self::Part),
            other => Err(format!("unknown certificate load status {other}")),
        }
    }
}

impl From<LoadCertStatus> for i32 {
    fn from(status: LoadCertStatus) -> Self {
        match status {
            LoadCertStatus::Ok => 3,
            LoadCertStatus::Fail => 4,
            LoadCertStatus::Part => 5,
        }
    }
}

/// The source of one schema file the relay loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtoSource {
    pub file_name: String,
    pub file_path: String,
    #[serde(default)]
    pub proto_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedProto {
    pub file_name: String,
    pub proto: ProtoSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProtoResponse {
    pub status: LoadProtoStatus,
    #[serde(default)]
    pub protos: Option<Vec<LoadedProto>>,
    #[serde(default)]
    pub missing_imports: Option<Vec<SchemaFile>>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCertificateResponse {
    pub status: LoadCertStatus,
    #[serde(default)]
    pub certificate: Option<Certificate>,
    #[serde(default)]
    pub certs: Option<Vec<CertFile>>,
    #[serde(default)]
    pub missing_certs: Option<Vec<CertFile>>,
    #[serde(default)]
    pub message: Option<String>,
}

/// The body of `POST /proto-info/{appId}`: asks the relay for the schema files an entity
/// declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetProtoPayload {
    pub entity_spec: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_gen_doc: Option<bool>,
}

/// A file to upload in a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadProtoPayload {
    pub files: Vec<UploadFile>,
    /// The file whose missing imports these uploads are meant to satisfy.
    pub import_for: Option<SchemaFile>,
    /// Uploaded file name -> schema file path it stands for.
    pub file_mappings: Option<std::collections::BTreeMap<String, String>>,
    pub is_gen_doc: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadCertificatePayload {
    pub files: Vec<UploadFile>,
    pub file_mappings: Option<std::collections::BTreeMap<String, String>>,
}

/// Timing information the relay attaches to responses and stream frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaInfo {
    /// Seconds the downstream call took.
    #[serde(default)]
    pub response_time: Option<f64>,
    #[serde(default)]
    pub stream: Option<bool>,
}

/// An error the relay reports after executing the downstream call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayError {
    #[serde(default)]
    pub details: String,
    /// gRPC status code of the failed downstream call.
    #[serde(default)]
    pub code: Option<i32>,
}

impl RelayError {
    pub fn status_code(&self) -> Option<tonic::Code> {
        self.code.map(tonic::Code::from_i32)
    }
}

/// A single-shot response body, and also the payload of every stream frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    #[serde(default)]
    pub error: Option<RelayError>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub meta_info: Option<MetaInfo>,
}

/// The body of a `400` send-request response when dependencies are missing.
///
/// The relay reuses the upload response shapes here, so the status is decoded as a plain
/// integer and matched against both status families.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PartialLoadBody {
    pub status: i32,
    #[serde(default)]
    pub missing_imports: Option<Vec<SchemaFile>>,
    #[serde(default)]
    pub missing_certs: Option<Vec<CertFile>>,
    #[serde(default)]
    pub certificate: Option<Certificate>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestData {
    pub inputs: Value,
    pub metadata: Value,
}

/// The request the engine sends to the relay.
///
/// A fresh envelope (with a fresh `request_id`) is built for every transmission, including
/// the automatic re-send after a dependency gap has been resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEnvelope {
    pub request_id: Uuid,
    /// Address of the downstream gRPC server.
    pub url: String,
    pub schema_file_path: String,
    pub service_name: String,
    pub method_name: String,
    pub request_data: RequestData,
    #[serde(default)]
    pub imports: Vec<SchemaFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_certificate: Option<Certificate>,
    pub interactive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_statuses_are_integers_on_the_wire() {
        let res: UploadProtoResponse = serde_json::from_value(json!({
            "status": 0,
            "missingImports": [{ "fileName": "b.proto", "filePath": "deps/b.proto" }]
        }))
        .unwrap();

        assert_eq!(res.status, LoadProtoStatus::Part);
        assert_eq!(res.missing_imports.unwrap()[0].file_path, "deps/b.proto");

        assert_eq!(serde_json::to_value(LoadCertStatus::Part).unwrap(), json!(5));
        assert!(serde_json::from_value::<LoadProtoStatus>(json!(7)).is_err());
    }

    #[test]
    fn test_relay_error_code_maps_to_grpc_code() {
        let res: RelayResponse = serde_json::from_value(json!({
            "error": { "details": "no such user", "code": 5 }
        }))
        .unwrap();

        let error = res.error.unwrap();
        assert_eq!(error.details, "no such user");
        assert_eq!(error.status_code(), Some(tonic::Code::NotFound));
    }

    #[test]
    fn test_placeholder_takes_last_segment_as_name() {
        let file = SchemaFile::placeholder("google/api/annotations.proto");
        assert_eq!(file.file_name, "annotations.proto");
        assert_eq!(file.file_path, "google/api/annotations.proto");
    }
}

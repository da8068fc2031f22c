//! # Relay HTTP Client
//!
//! A thin wrapper over a shared `reqwest::Client`. It knows the relay's routes, attaches the
//! bearer token and (de)serializes the wire types. Transport policy (retries, stream
//! decoding, failure classification) lives with the execution engine in [`crate::call`].
use super::types::{
    CallEnvelope, GetProtoPayload, UploadCertificatePayload, UploadCertificateResponse,
    UploadFile, UploadProtoPayload, UploadProtoResponse,
};
use http::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{sync::Arc, time::Duration};

pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

#[derive(Debug, thiserror::Error)]
pub enum RelayClientError {
    #[error("Failed to build the HTTP client: '{0}'")]
    Build(#[source] reqwest::Error),
    #[error("Request to '{url}' failed: '{source}'")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Relay responded to '{url}' with status {status}: '{body}'")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Failed to encode '{field}' for upload: '{source}'")]
    Encode {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Nothing to upload")]
    EmptyUpload,
}

/// Automatic retry policy for transient relay failures (HTTP 429 and 5xx) on event streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (starting at 1): exponential, capped at the max.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Base URL of the relay plugin (e.g. `http://localhost:7007/api/grpc-playground`).
    pub base_url: String,
    /// The application (catalog entity) the schemas and certificates belong to.
    pub app_id: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl RelayConfig {
    pub fn new(base_url: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            app_id: app_id.into(),
            token: None,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    config: Arc<RelayConfig>,
}

impl RelayClient {
    pub fn new(config: RelayConfig) -> Result<Self, RelayClientError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(RelayClientError::Build)?;

        Ok(Self::with_http_client(http, config))
    }

    pub fn with_http_client(http: reqwest::Client, config: RelayConfig) -> Self {
        Self {
            http,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// `{base_url}/{route}/{app_id}`
    pub fn endpoint(&self, route: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            route,
            self.config.app_id
        )
    }

    /// Posts a call envelope. The raw response is returned untouched: the caller decides
    /// how to interpret status codes and the body.
    pub async fn send_request(
        &self,
        envelope: &CallEnvelope,
        streaming: bool,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut request = self
            .authorized(self.http.post(self.endpoint("send-request")))
            .json(envelope);

        if streaming {
            request = request.header(ACCEPT, EVENT_STREAM_CONTENT_TYPE);
        }

        request.send().await
    }

    /// Asks the relay which schema files an entity declares and loads them.
    pub async fn get_proto_info(
        &self,
        payload: &GetProtoPayload,
    ) -> Result<UploadProtoResponse, RelayClientError> {
        let url = self.endpoint("proto-info");
        let request = self.authorized(self.http.post(&url)).json(payload);
        self.read_json(url, request).await
    }

    pub async fn upload_proto(
        &self,
        payload: UploadProtoPayload,
    ) -> Result<UploadProtoResponse, RelayClientError> {
        let mut form = files_form(payload.files)?;

        if let Some(import_for) = &payload.import_for {
            form = form.text("importFor", encode("importFor", import_for)?);
        }
        if let Some(mappings) = &payload.file_mappings {
            form = form.text("fileMappings", encode("fileMappings", mappings)?);
        }
        if let Some(is_gen_doc) = payload.is_gen_doc {
            form = form.text("isGenDoc", is_gen_doc.to_string());
        }

        let url = self.endpoint("upload-proto");
        let request = self.authorized(self.http.post(&url)).multipart(form);
        self.read_json(url, request).await
    }

    pub async fn upload_certificate(
        &self,
        payload: UploadCertificatePayload,
    ) -> Result<UploadCertificateResponse, RelayClientError> {
        let mut form = files_form(payload.files)?;

        if let Some(mappings) = &payload.file_mappings {
            form = form.text("fileMappings", encode("fileMappings", mappings)?);
        }

        let url = self.endpoint("upload-cert");
        let request = self.authorized(self.http.post(&url)).multipart(form);
        self.read_json(url, request).await
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        url: String,
        request: reqwest::RequestBuilder,
    ) -> Result<T, RelayClientError> {
        let response = match request.send().await {
            Ok(response) => response,
            Err(source) => return Err(RelayClientError::Request { url, source }),
        };

        let status = response.status();

        // Upload endpoints report partial loads in the body of non-2xx responses too.
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(source) => return Err(RelayClientError::Request { url, source }),
        };

        match serde_json::from_slice(&body) {
            Ok(value) => Ok(value),
            Err(_) => Err(RelayClientError::Status {
                url,
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            }),
        }
    }
}

fn files_form(files: Vec<UploadFile>) -> Result<Form, RelayClientError> {
    if files.is_empty() {
        return Err(RelayClientError::EmptyUpload);
    }

    Ok(files.into_iter().fold(Form::new(), |form, file| {
        form.part(
            "files[]",
            Part::bytes(file.content).file_name(file.file_name),
        )
    }))
}

fn encode<T: Serialize>(field: &'static str, value: &T) -> Result<String, RelayClientError> {
    serde_json::to_string(value).map_err(|source| RelayClientError::Encode { field, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 500,
        };

        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(60), Duration::from_millis(500));
    }

    #[test]
    fn test_endpoint_joins_route_and_app() {
        let client = RelayClient::new(RelayConfig::new("http://relay/api/", "orders")).unwrap();
        assert_eq!(
            client.endpoint("send-request"),
            "http://relay/api/send-request/orders"
        );
    }

    #[test]
    fn test_config_defaults_retry_policy() {
        let config: RelayConfig = serde_json::from_str(
            r#"{ "baseUrl": "http://relay", "appId": "orders", "retry": { "maxRetries": 1 } }"#,
        )
        .unwrap();

        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.initial_backoff_ms, 1_000);
        assert_eq!(config.token, None);
    }
}

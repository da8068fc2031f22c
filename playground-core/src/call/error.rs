use super::CallState;
use crate::relay::RelayError;
use std::fmt;

/// Coarse classification of why a call did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Inputs or metadata were not valid JSON. Detected before any I/O.
    MalformedInput,
    /// The relay could not be reached, or answered with a non-retriable status.
    TransportFatal,
    /// The relay signalled a transient failure. Absorbed by the transport's retries.
    TransportRetriable,
    /// The relay executed the call but the downstream RPC failed.
    ApplicationError,
    /// The relay answered with a body or frame that could not be decoded.
    MalformedResponse,
    MissingImports,
    MissingCertificate,
    Cancelled,
}

/// Which of the two user-provided JSON documents failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputField {
    Inputs,
    Metadata,
}

impl fmt::Display for InputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputField::Inputs => f.write_str("inputs"),
            InputField::Metadata => f.write_str("metadata"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    #[error("Couldn't parse JSON {field} Invalid json: {reason}")]
    MalformedInput { field: InputField, reason: String },

    #[error("Request to relay failed: {0}")]
    Connection(String),

    #[error("Relay responded with status {status}: {body}")]
    FatalStatus { status: u16, body: String },

    #[error("Relay still responding with status {status} after {attempts} attempts")]
    RetriesExhausted { status: u16, attempts: u32 },

    #[error("Failed to decode relay response: {0}")]
    MalformedResponse(String),

    #[error("{details}")]
    Application {
        details: String,
        code: Option<tonic::Code>,
    },

    #[error("Cannot {operation} while the call is {state}")]
    InvalidState {
        operation: &'static str,
        state: CallState,
    },
}

impl CallError {
    pub(crate) fn malformed_input(field: InputField, err: serde_json::Error) -> Self {
        CallError::MalformedInput {
            field,
            reason: err.to_string(),
        }
    }

    /// The failure class this error puts the call in. `None` for errors that leave the call
    /// untouched.
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            CallError::MalformedInput { .. } => Some(FailureClass::MalformedInput),
            CallError::Connection(_)
            | CallError::FatalStatus { .. }
            | CallError::RetriesExhausted { .. } => Some(FailureClass::TransportFatal),
            CallError::MalformedResponse(_) => Some(FailureClass::MalformedResponse),
            CallError::Application { .. } => Some(FailureClass::ApplicationError),
            CallError::InvalidState { .. } => None,
        }
    }
}

impl From<RelayError> for CallError {
    fn from(error: RelayError) -> Self {
        CallError::Application {
            code: error.status_code(),
            details: error.details,
        }
    }
}

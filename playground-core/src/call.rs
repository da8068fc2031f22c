//! # Request Execution
//!
//! An [`RpcCall`] owns one logical call to the relay. It parses the user's JSON, picks a
//! transport for the method's streaming shape, and runs the transmission on a background
//! task. Everything that happens afterwards is reported on the call's [`CallEvents`].
//!
//! ```rust,no_run
//! use playground_core::call::{CallEvent, CallRequest, RpcCall};
//! # async fn run(relay: playground_core::relay::RelayClient, method: playground_core::schema::ServiceMethodView) {
//! let request = CallRequest::new("localhost:50051", method).with_inputs(r#"{"name":"Alice"}"#);
//! let (mut call, mut events) = RpcCall::new(relay, request);
//!
//! call.send().ok();
//!
//! while let Some(event) = events.recv().await {
//!     if let CallEvent::Data(frame) = event {
//!         println!("{}", frame.data);
//!     }
//! }
//! # }
//! ```
//!
//! Interactive client-streaming calls are armed by `send()` and only transmitted on
//! [`RpcCall::commit_stream`], after any number of [`RpcCall::write`]s.
mod error;
mod events;
mod transport;

pub use error::{CallError, FailureClass, InputField};
pub use events::{CallEvent, CallEvents, ResponseFrame, ResponseMeta};
pub use transport::{Transport, TransportPlan};

use crate::{
    negotiation::{DependencyBridge, DependencyKey, MissingDependency},
    relay::{CallEnvelope, Certificate, RelayClient, RequestData, SchemaFile},
    schema::ServiceMethodView,
};
use events::EventSink;
use serde_json::{Value, json};
use std::{fmt, future, sync::Arc};
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};
use transport::Outcome;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    /// Interactive client stream collecting inputs until `commit_stream()`.
    Armed,
    Sent,
    Receiving,
    /// Paused on a missing schema import or certificate.
    AwaitingDependency,
    Completed,
    Failed(FailureClass),
    Cancelled,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallState::Completed | CallState::Failed(_) | CallState::Cancelled
        )
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Idle => f.write_str("idle"),
            CallState::Armed => f.write_str("armed"),
            CallState::Sent => f.write_str("sent"),
            CallState::Receiving => f.write_str("receiving"),
            CallState::AwaitingDependency => f.write_str("awaiting a dependency"),
            CallState::Completed => f.write_str("completed"),
            CallState::Failed(class) => write!(f, "failed ({class:?})"),
            CallState::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Everything needed to issue one call, as typed by the user.
#[derive(Debug, Clone)]
pub struct CallRequest {
    /// Address of the downstream gRPC server (e.g. `localhost:50051`).
    pub target: String,
    pub method: ServiceMethodView,
    /// JSON text of the request message.
    pub inputs: String,
    /// JSON text of the request metadata.
    pub metadata: String,
    pub interactive: bool,
    pub certificate: Option<Certificate>,
    /// Schema dependencies to send along. Defaults to the method's own file imports.
    pub imports: Option<Vec<SchemaFile>>,
}

impl CallRequest {
    pub fn new(target: impl Into<String>, method: ServiceMethodView) -> Self {
        Self {
            target: target.into(),
            method,
            inputs: String::new(),
            metadata: String::new(),
            interactive: false,
            certificate: None,
            imports: None,
        }
    }

    pub fn with_inputs(mut self, inputs: impl Into<String>) -> Self {
        self.inputs = inputs.into();
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn with_certificate(mut self, certificate: Certificate) -> Self {
        self.certificate = Some(certificate);
        self
    }

    pub fn with_imports(mut self, imports: Vec<SchemaFile>) -> Self {
        self.imports = Some(imports);
        self
    }

    /// The bridge key that resolves `missing` for this request.
    pub fn dependency_key(&self, missing: &MissingDependency) -> DependencyKey {
        match missing {
            MissingDependency::Imports { .. } => {
                DependencyKey::Schema(self.method.schema_file_path().to_string())
            }
            MissingDependency::Certificates { certificate, .. } => self
                .certificate
                .as_ref()
                .or(certificate.as_ref())
                .map(DependencyKey::for_certificate)
                .unwrap_or_else(|| DependencyKey::Certificate(String::new())),
        }
    }

    fn envelope(&self, request_data: &RequestData) -> CallEnvelope {
        CallEnvelope {
            request_id: Uuid::new_v4(),
            url: self.target.clone(),
            schema_file_path: self.method.schema_file_path().to_string(),
            service_name: self.method.service_name().to_string(),
            method_name: self.method.method_name().to_string(),
            request_data: request_data.clone(),
            imports: self
                .imports
                .clone()
                .unwrap_or_else(|| self.method.imports()),
            tls_certificate: self.certificate.clone(),
            interactive: self.interactive,
        }
    }
}

#[derive(Debug)]
struct ArmedStream {
    metadata: Value,
    inputs: Vec<Value>,
}

/// Handle to one in-flight call.
///
/// Transmission runs on a task spawned onto the current Tokio runtime, so `send()` and
/// `commit_stream()` must be called from within one. Dropping the handle cancels the call.
#[derive(Debug)]
pub struct RpcCall {
    relay: RelayClient,
    request: Arc<CallRequest>,
    plan: TransportPlan,
    bridge: Option<Arc<DependencyBridge>>,
    sink: Arc<EventSink>,
    state: watch::Receiver<CallState>,
    cancel: CancellationToken,
    resend: Arc<Notify>,
    armed: Option<ArmedStream>,
}

impl RpcCall {
    pub fn new(relay: RelayClient, request: CallRequest) -> (Self, CallEvents) {
        let (sink, events, state) = EventSink::new();
        let plan = TransportPlan::select(&request.method, request.interactive);

        let call = Self {
            relay,
            request: Arc::new(request),
            plan,
            bridge: None,
            sink: Arc::new(sink),
            state,
            cancel: CancellationToken::new(),
            resend: Arc::new(Notify::new()),
            armed: None,
        };

        (call, events)
    }

    /// Resumes the call automatically when `bridge` reports the missing material uploaded.
    pub fn with_bridge(mut self, bridge: Arc<DependencyBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn request(&self) -> &CallRequest {
        &self.request
    }

    pub fn plan(&self) -> TransportPlan {
        self.plan
    }

    pub fn state(&self) -> CallState {
        *self.state.borrow()
    }

    /// Starts the call.
    ///
    /// Immediate transports transmit right away. Interactive client streams become
    /// [`CallState::Armed`] instead, keeping the current inputs (if any) as the first streamed
    /// message. From [`CallState::AwaitingDependency`] this re-sends the paused call.
    ///
    /// # Errors
    ///
    /// Malformed inputs or metadata fail the call: an ERROR and END are emitted and the error
    /// is returned too. Any other state than the two above yields
    /// [`CallError::InvalidState`] without touching the call.
    pub fn send(&mut self) -> Result<(), CallError> {
        match self.state() {
            CallState::Idle => {}
            CallState::AwaitingDependency => {
                debug!("manual re-send of a paused call");
                self.resend.notify_one();
                return Ok(());
            }
            state => {
                return Err(CallError::InvalidState {
                    operation: "send",
                    state,
                });
            }
        }

        let metadata = parse_document(&self.request.metadata, InputField::Metadata)
            .map_err(|err| self.reject(err))?
            .unwrap_or_else(|| json!({}));

        let inputs = parse_document(&self.request.inputs, InputField::Inputs)
            .map_err(|err| self.reject(err))?;

        if self.plan.deferred {
            self.armed = Some(ArmedStream {
                metadata,
                inputs: inputs.into_iter().collect(),
            });
            self.sink.set_state(CallState::Armed);
            return Ok(());
        }

        let inputs = match inputs {
            Some(Value::Array(list)) if self.request.method.is_client_streaming() => {
                json!({ "stream": list })
            }
            Some(inputs) => inputs,
            None => json!({}),
        };

        self.transmit(RequestData { inputs, metadata });
        Ok(())
    }

    /// Appends one message to an armed client stream.
    ///
    /// # Errors
    ///
    /// [`CallError::InvalidState`] unless the call is armed. Malformed `data` is rejected
    /// without emitting anything; the call stays armed.
    pub fn write(&mut self, data: &str) -> Result<(), CallError> {
        let state = self.state();
        let Some(armed) = self.armed.as_mut().filter(|_| state == CallState::Armed) else {
            return Err(CallError::InvalidState {
                operation: "write",
                state,
            });
        };

        let message: Value = serde_json::from_str(data)
            .map_err(|err| CallError::malformed_input(InputField::Inputs, err))?;

        armed.inputs.push(message);
        Ok(())
    }

    /// Transmits an armed client stream with every message written so far, in order.
    pub fn commit_stream(&mut self) -> Result<(), CallError> {
        let state = self.state();
        let armed = match self.armed.take() {
            Some(armed) if state == CallState::Armed => armed,
            armed => {
                self.armed = armed;
                return Err(CallError::InvalidState {
                    operation: "commit the stream",
                    state,
                });
            }
        };

        self.transmit(RequestData {
            inputs: json!({ "stream": armed.inputs }),
            metadata: armed.metadata,
        });
        Ok(())
    }

    /// Aborts the call. Emits END unless the call already ended; no DATA follows.
    pub fn cancel(&self) {
        if self.sink.finish(CallState::Cancelled) {
            debug!(
                service = self.request.method.service_name(),
                method = self.request.method.method_name(),
                "call cancelled"
            );
        }
        self.cancel.cancel();
    }

    /// Waits until the call reaches a terminal state.
    pub async fn finished(&self) -> CallState {
        let mut state = self.state.clone();
        let _ = state.wait_for(|state| state.is_terminal()).await;
        let state = *state.borrow();
        state
    }

    fn reject(&self, error: CallError) -> CallError {
        let state = self.sink.error(error.clone());
        self.sink.finish(state);
        error
    }

    fn transmit(&self, request_data: RequestData) {
        self.sink.set_state(CallState::Sent);

        let task = CallTask {
            relay: self.relay.clone(),
            request: self.request.clone(),
            transport: self.plan.transport,
            bridge: self.bridge.clone(),
            sink: self.sink.clone(),
            cancel: self.cancel.clone(),
            resend: self.resend.clone(),
            request_data,
        };

        let span = info_span!(
            "rpc_call",
            service = self.request.method.service_name(),
            method = self.request.method.method_name(),
        );

        tokio::spawn(task.run().instrument(span));
    }
}

impl Drop for RpcCall {
    fn drop(&mut self) {
        if !self.state().is_terminal() {
            self.cancel();
        }
    }
}

/// `None` for blank text.
fn parse_document(text: &str, field: InputField) -> Result<Option<Value>, CallError> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(text)
        .map(Some)
        .map_err(|err| CallError::malformed_input(field, err))
}

/// The background side of an [`RpcCall`].
struct CallTask {
    relay: RelayClient,
    request: Arc<CallRequest>,
    transport: Transport,
    bridge: Option<Arc<DependencyBridge>>,
    sink: Arc<EventSink>,
    cancel: CancellationToken,
    resend: Arc<Notify>,
    request_data: RequestData,
}

impl CallTask {
    async fn run(self) {
        loop {
            let envelope = self.request.envelope(&self.request_data);
            debug!(request_id = %envelope.request_id, transport = ?self.transport, "sending call to relay");

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                outcome = self.transport.execute(&self.relay, &envelope, &self.sink) => outcome,
            };

            match outcome {
                Outcome::Finished(state) => {
                    debug!(request_id = %envelope.request_id, %state, "call finished");
                    self.sink.finish(state);
                    return;
                }
                Outcome::Missing(missing) => {
                    if !self.wait_for_dependency(missing).await {
                        return;
                    }
                    self.sink.set_state(CallState::Sent);
                }
            }
        }
    }

    /// Reports `missing` and parks until it is resolved, a manual re-send, or cancellation.
    /// Returns whether the call should be sent again.
    async fn wait_for_dependency(&self, missing: MissingDependency) -> bool {
        let key = self.request.dependency_key(&missing);

        // The listener must exist before the caller can see the event and start uploading.
        let listener = self.bridge.as_ref().map(|bridge| {
            bridge.record_missing(&missing);
            bridge.register(key.clone())
        });

        info!(?key, class = ?missing.failure_class(), "call paused on a missing dependency");

        self.sink.set_state(CallState::AwaitingDependency);
        self.sink.emit(CallEvent::MissingDependency(missing));

        let resolved = async {
            if let Some(listener) = listener {
                if listener.resolved().await {
                    return;
                }
            }
            // Replaced or absent: only a manual re-send or a cancel can move on.
            future::pending::<()>().await
        };

        let resume = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = self.resend.notified() => true,
            _ = resolved => {
                info!(?key, "dependency resolved, re-sending call");
                true
            }
        };

        if let Some(bridge) = &self.bridge {
            bridge.release(&key);
        }

        resume
    }
}

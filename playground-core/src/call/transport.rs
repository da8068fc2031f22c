//! # Transports
//!
//! Two ways of talking to the relay's `send-request` endpoint:
//!
//! * **Single-shot**: one request, one JSON body `{error?, data?, metaInfo?}`.
//! * **Incremental**: a long-lived event stream of `data: {data, metaInfo}` frames. Transient
//!   relay failures (HTTP 429 and 5xx) are retried with exponential backoff; any other 4xx is
//!   final.
//!
//! Both recognise a `400` whose body reports a partial schema or certificate load, and hand
//! it back to the engine as a [`MissingDependency`] instead of failing.
use super::{CallError, CallEvent, CallState, EventSink, ResponseFrame, ResponseMeta};
use crate::{
    negotiation::MissingDependency,
    relay::{CallEnvelope, RelayClient, RelayResponse, client::EVENT_STREAM_CONTENT_TYPE},
    schema::ServiceMethodView,
};
use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt, future};
use http::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    SingleShot,
    Incremental,
}

/// How a call is going to be transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportPlan {
    pub transport: Transport,
    /// Transmission waits for `commit_stream()` (interactive client streaming).
    pub deferred: bool,
}

impl TransportPlan {
    pub fn select(method: &ServiceMethodView, interactive: bool) -> Self {
        let transport = if method.uses_streaming() {
            Transport::Incremental
        } else {
            Transport::SingleShot
        };

        Self {
            transport,
            deferred: method.is_client_streaming() && interactive,
        }
    }
}

/// How one transmission ended.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// The call reached `state`. Data and errors have already been emitted.
    Finished(CallState),
    /// The relay needs more material; nothing has been emitted.
    Missing(MissingDependency),
}

impl Transport {
    pub(crate) async fn execute(
        self,
        relay: &RelayClient,
        envelope: &CallEnvelope,
        sink: &EventSink,
    ) -> Outcome {
        match self {
            Transport::SingleShot => single_shot(relay, envelope, sink).await,
            Transport::Incremental => incremental(relay, envelope, sink).await,
        }
    }
}

async fn single_shot(relay: &RelayClient, envelope: &CallEnvelope, sink: &EventSink) -> Outcome {
    let started = Instant::now();

    let response = match relay.send_request(envelope, false).await {
        Ok(response) => response,
        Err(err) => return Outcome::Finished(sink.error(CallError::Connection(err.to_string()))),
    };

    let status = response.status();
    sink.set_state(CallState::Receiving);

    match response.bytes().await {
        Ok(body) => decode_body(status, &body, started, sink),
        Err(err) => Outcome::Finished(sink.error(CallError::Connection(err.to_string()))),
    }
}

async fn incremental(relay: &RelayClient, envelope: &CallEnvelope, sink: &EventSink) -> Outcome {
    let retry = &relay.config().retry;
    let started = Instant::now();
    let mut attempt = 0;

    let response = loop {
        let response = match relay.send_request(envelope, true).await {
            Ok(response) => response,
            Err(err) => {
                return Outcome::Finished(sink.error(CallError::Connection(err.to_string())));
            }
        };

        let status = response.status();

        if status.is_success() {
            break response;
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            attempt += 1;

            if attempt > retry.max_retries {
                return Outcome::Finished(sink.error(CallError::RetriesExhausted {
                    status: status.as_u16(),
                    attempts: attempt,
                }));
            }

            let delay = retry.backoff(attempt);
            warn!(
                request_id = %envelope.request_id,
                %status,
                attempt,
                ?delay,
                "relay signalled a transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        return match response.bytes().await {
            Ok(body) => decode_body(status, &body, started, sink),
            Err(err) => Outcome::Finished(sink.error(CallError::Connection(err.to_string()))),
        };
    };

    if !is_event_stream(&response) {
        debug!(request_id = %envelope.request_id, "relay answered a stream request with a plain body");
        let status = response.status();
        return match response.bytes().await {
            Ok(body) => decode_body(status, &body, started, sink),
            Err(err) => Outcome::Finished(sink.error(CallError::Connection(err.to_string()))),
        };
    }

    sink.set_state(CallState::Receiving);

    let mut frames = std::pin::pin!(lossy_utf8(response.bytes_stream()).eventsource());
    let mut last_frame = started;
    let mut state = CallState::Completed;

    while let Some(frame) = frames.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(EventStreamError::Transport(err)) => {
                return Outcome::Finished(sink.error(CallError::Connection(err.to_string())));
            }
            Err(err) => {
                sink.error(CallError::MalformedResponse(format!(
                    "invalid stream frame: {err}"
                )));
                continue;
            }
        };

        if frame.data.trim().is_empty() {
            continue;
        }

        let frame: RelayResponse = match serde_json::from_str(&frame.data) {
            Ok(frame) => frame,
            Err(err) => {
                // A broken frame does not end the stream.
                sink.error(CallError::MalformedResponse(format!(
                    "invalid stream frame: {err}"
                )));
                continue;
            }
        };

        let meta = ResponseMeta::new(frame.meta_info.as_ref(), last_frame.elapsed(), true);
        last_frame = Instant::now();

        if let Some(error) = frame.error {
            state = sink.error(error.into());
        }

        if let Some(data) = frame.data {
            sink.emit(CallEvent::Data(ResponseFrame { data, meta }));
        }
    }

    Outcome::Finished(state)
}

/// Decodes a byte stream as UTF-8, replacing invalid sequences with U+FFFD. A character
/// split across two chunks is carried over to the next one.
fn lossy_utf8<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    bytes.scan(Vec::new(), |carry: &mut Vec<u8>, chunk: Result<B, E>| {
        let decoded = chunk.map(|chunk| {
            carry.extend_from_slice(chunk.as_ref());
            drain_utf8_lossy(carry)
        });
        future::ready(Some(decoded))
    })
}

/// Decodes as much of `buf` as possible and leaves an incomplete trailing character in it.
fn drain_utf8_lossy(buf: &mut Vec<u8>) -> String {
    let mut out = String::with_capacity(buf.len());
    let mut start = 0;

    while start < buf.len() {
        match std::str::from_utf8(&buf[start..]) {
            Ok(valid) => {
                out.push_str(valid);
                start = buf.len();
            }
            Err(err) => {
                let valid_end = start + err.valid_up_to();
                if let Ok(valid) = std::str::from_utf8(&buf[start..valid_end]) {
                    out.push_str(valid);
                }

                match err.error_len() {
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        start = valid_end + len;
                    }
                    None => {
                        start = valid_end;
                        break;
                    }
                }
            }
        }
    }

    buf.drain(..start);
    out
}

fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(EVENT_STREAM_CONTENT_TYPE))
}

/// Interprets a complete `{error?, data?, metaInfo?}` body.
fn decode_body(status: StatusCode, body: &[u8], started: Instant, sink: &EventSink) -> Outcome {
    if status == StatusCode::BAD_REQUEST {
        if let Some(missing) = MissingDependency::from_partial_body(body) {
            return Outcome::Missing(missing);
        }
    }

    let fatal_status = || CallError::FatalStatus {
        status: status.as_u16(),
        body: String::from_utf8_lossy(body).into_owned(),
    };

    let response: RelayResponse = match serde_json::from_slice(body) {
        Ok(response) => response,
        Err(_) if !status.is_success() => return Outcome::Finished(sink.error(fatal_status())),
        Err(err) => {
            return Outcome::Finished(sink.error(CallError::MalformedResponse(err.to_string())));
        }
    };

    let meta = ResponseMeta::new(response.meta_info.as_ref(), started.elapsed(), false);

    let mut state = CallState::Completed;

    if let Some(error) = response.error {
        state = sink.error(error.into());
    }

    match response.data {
        Some(data) => {
            sink.emit(CallEvent::Data(ResponseFrame { data, meta }));
        }
        None if state == CallState::Completed && !status.is_success() => {
            state = sink.error(fatal_status());
        }
        None => {}
    }

    Outcome::Finished(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_bytes_become_replacement_characters() {
        let mut buf = b"data: \xff\xfe ok".to_vec();

        assert_eq!(drain_utf8_lossy(&mut buf), "data: \u{FFFD}\u{FFFD} ok");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_split_character_is_carried_over() {
        let euro = "€".as_bytes();
        let mut buf = vec![b'a', euro[0], euro[1]];

        assert_eq!(drain_utf8_lossy(&mut buf), "a");
        assert_eq!(buf, &euro[..2]);

        buf.push(euro[2]);
        assert_eq!(drain_utf8_lossy(&mut buf), "€");
        assert!(buf.is_empty());
    }
}

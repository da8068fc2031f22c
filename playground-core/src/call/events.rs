use super::{CallError, CallState};
use crate::{negotiation::MissingDependency, relay::MetaInfo};
use futures_util::Stream;
use serde_json::Value;
use std::{
    pin::Pin,
    sync::{Mutex, PoisonError},
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseMeta {
    pub response_time_seconds: Option<f64>,
    pub is_stream_chunk: bool,
}

impl ResponseMeta {
    /// Prefers the timing the relay reports, falling back to the locally measured one.
    pub(crate) fn new(reported: Option<&MetaInfo>, measured: Duration, is_stream_chunk: bool) -> Self {
        let response_time_seconds = reported
            .and_then(|meta| meta.response_time)
            .or(Some(measured.as_secs_f64()));

        Self {
            response_time_seconds,
            is_stream_chunk,
        }
    }
}

/// One decoded response message.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    pub data: Value,
    pub meta: ResponseMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    Data(ResponseFrame),
    Error(CallError),
    /// The relay needs more schema or certificate material before the call can run.
    MissingDependency(MissingDependency),
    /// The last event of every call, whatever the outcome.
    End,
}

/// The ordered stream of events of one call.
///
/// Yields `None` once [`CallEvent::End`] has been delivered.
#[derive(Debug)]
pub struct CallEvents {
    rx: mpsc::UnboundedReceiver<CallEvent>,
    ended: bool,
}

impl CallEvents {
    pub async fn recv(&mut self) -> Option<CallEvent> {
        if self.ended {
            return None;
        }
        let event = self.rx.recv().await;
        self.observe(event)
    }

    /// Blocking variant of [`Self::recv`]. Must not be called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<CallEvent> {
        if self.ended {
            return None;
        }
        let event = self.rx.blocking_recv();
        self.observe(event)
    }

    fn observe(&mut self, event: Option<CallEvent>) -> Option<CallEvent> {
        if matches!(event, None | Some(CallEvent::End)) {
            self.ended = true;
        }
        event
    }
}

impl Stream for CallEvents {
    type Item = CallEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.ended {
            return Poll::Ready(None);
        }
        let event = std::task::ready!(self.rx.poll_recv(cx));
        Poll::Ready(self.observe(event))
    }
}

/// The producing side shared by a call handle and its background task.
///
/// Serializes emission so that nothing is delivered after `End`, and keeps the observable
/// state in step with the events.
#[derive(Debug)]
pub(crate) struct EventSink {
    inner: Mutex<SinkInner>,
    state: watch::Sender<CallState>,
}

#[derive(Debug)]
struct SinkInner {
    tx: mpsc::UnboundedSender<CallEvent>,
    ended: bool,
}

impl EventSink {
    pub(crate) fn new() -> (Self, CallEvents, watch::Receiver<CallState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(CallState::Idle);

        let sink = Self {
            inner: Mutex::new(SinkInner { tx, ended: false }),
            state,
        };

        (sink, CallEvents { rx, ended: false }, state_rx)
    }

    /// Delivers a non-terminal event. Returns `false` if the call already ended.
    pub(crate) fn emit(&self, event: CallEvent) -> bool {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.ended {
            return false;
        }
        // A dropped receiver only means nobody is listening anymore.
        let _ = inner.tx.send(event);
        true
    }

    pub(crate) fn set_state(&self, state: CallState) {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.ended {
            self.state.send_replace(state);
        }
    }

    /// Moves to the terminal `state` and delivers `End`, once. Returns `false` if the call
    /// had already ended.
    pub(crate) fn finish(&self, state: CallState) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.ended {
            return false;
        }
        inner.ended = true;
        self.state.send_replace(state);
        let _ = inner.tx.send(CallEvent::End);
        true
    }

    /// Delivers `error` and returns the terminal state it leads to.
    pub(crate) fn error(&self, error: CallError) -> CallState {
        let state = match error.failure_class() {
            Some(class) => CallState::Failed(class),
            None => CallState::Failed(super::FailureClass::TransportFatal),
        };
        self.emit(CallEvent::Error(error));
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_nothing_is_delivered_after_end() {
        let (sink, mut events, state) = EventSink::new();

        assert!(sink.emit(CallEvent::Error(CallError::Connection("down".to_string()))));
        assert!(sink.finish(CallState::Cancelled));
        assert!(!sink.finish(CallState::Completed));
        assert!(!sink.emit(CallEvent::End));

        assert!(matches!(events.recv().await, Some(CallEvent::Error(_))));
        assert_eq!(events.recv().await, Some(CallEvent::End));
        assert_eq!(events.recv().await, None);
        assert_eq!(*state.borrow(), CallState::Cancelled);
    }

    #[test]
    fn test_meta_prefers_reported_time() {
        let reported = MetaInfo {
            response_time: Some(0.25),
            stream: None,
        };

        let meta = ResponseMeta::new(Some(&reported), Duration::from_secs(3), true);
        assert_eq!(meta.response_time_seconds, Some(0.25));
        assert!(meta.is_stream_chunk);

        let meta = ResponseMeta::new(None, Duration::from_millis(1500), false);
        assert_eq!(meta.response_time_seconds, Some(1.5));
    }
}

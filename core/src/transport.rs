//! The transport primitive boundary.
//!
//! # Design
//! The core never performs byte-level HTTP itself. It drives an opaque,
//! event-driven primitive modelled on a browser request object: configure
//! it, `send`, then react to notifications (ready-state changes, network
//! error, timeout, progress) that the primitive pushes through an
//! [`EventSink`]. After the terminal ready state the primitive exposes
//! status, status text, the raw header block and the body.
//!
//! Notifications travel over an unbounded channel so a primitive may emit
//! them from any thread, including from inside `send` or `abort`.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::http::{Method, ResponseType};
use crate::payload::Payload;

/// Lifecycle of one exchange, as reported by the primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    Unsent,
    Opened,
    HeadersReceived,
    Loading,
    Done,
}

/// Byte counts for an upload or download in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub loaded: u64,
    pub total: Option<u64>,
}

impl ProgressEvent {
    pub fn length_computable(&self) -> bool {
        self.total.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    ReadyStateChange(ReadyState),
    /// Failure with no HTTP response (DNS, refused, reset, ...).
    Error(String),
    Timeout,
    UploadProgress(ProgressEvent),
    DownloadProgress(ProgressEvent),
}

/// Sending half handed to the primitive on `send`.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

pub type EventStream = mpsc::UnboundedReceiver<TransportEvent>;

impl EventSink {
    pub fn channel() -> (EventSink, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSink { tx }, rx)
    }

    /// Emit a notification. Events sent after the listener went away are
    /// dropped.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.tx.send(event);
    }
}

/// Errors a primitive raises synchronously while being configured.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("could not start exchange: {0}")]
    Spawn(String),
}

/// An event-driven HTTP request object. One instance performs one exchange.
pub trait Transport: Send {
    fn open(&mut self, method: Method, url: &str) -> Result<(), TransportError>;

    fn set_response_type(&mut self, response_type: ResponseType);

    fn set_with_credentials(&mut self, enabled: bool);

    /// `Duration::ZERO` disables the timer.
    fn set_timeout(&mut self, timeout: Duration);

    fn set_header(&mut self, name: &str, value: &str) -> Result<(), TransportError>;

    /// Start the exchange. `Payload::Null` sends no body. Completion is
    /// reported through `events`.
    fn send(&mut self, body: Payload, events: EventSink) -> Result<(), TransportError>;

    fn abort(&mut self);

    fn ready_state(&self) -> ReadyState;

    /// Zero until a response arrived, and after an abort.
    fn status(&self) -> u16;

    fn status_text(&self) -> String;

    /// Raw `name: value` lines separated by CRLF.
    fn all_response_headers(&self) -> String;

    fn response_text(&self) -> String;

    /// Body shaped by the configured response type.
    fn response(&self) -> Payload;
}

/// Creates one primitive per dispatch.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Box<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Box<dyn Transport> + Send + Sync,
{
    fn create(&self) -> Box<dyn Transport> {
        self()
    }
}

pub(crate) type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Back-reference from a response or error to the primitive that produced
/// it. It does not keep the primitive alive.
#[derive(Clone)]
pub struct TransportHandle {
    id: Uuid,
    transport: Weak<Mutex<Box<dyn Transport>>>,
}

impl TransportHandle {
    pub(crate) fn new(id: Uuid, transport: &SharedTransport) -> Self {
        TransportHandle {
            id,
            transport: Arc::downgrade(transport),
        }
    }

    /// Id of the dispatch that used the primitive.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the primitive is still alive.
    pub fn is_alive(&self) -> bool {
        self.transport.strong_count() > 0
    }

    /// Inspect the primitive if it is still alive.
    pub fn with<R>(&self, f: impl FnOnce(&dyn Transport) -> R) -> Option<R> {
        let transport = self.transport.upgrade()?;
        let guard = transport.lock();
        Some(f(&**guard))
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sink_delivers_in_order() {
        let (sink, mut stream) = EventSink::channel();
        sink.emit(TransportEvent::ReadyStateChange(ReadyState::HeadersReceived));
        sink.emit(TransportEvent::Timeout);
        drop(sink);
        assert_eq!(
            stream.recv().await,
            Some(TransportEvent::ReadyStateChange(ReadyState::HeadersReceived))
        );
        assert_eq!(stream.recv().await, Some(TransportEvent::Timeout));
        assert_eq!(stream.recv().await, None);
    }

    #[test]
    fn emit_after_listener_dropped_is_silent() {
        let (sink, stream) = EventSink::channel();
        drop(stream);
        sink.emit(TransportEvent::Error("late".into()));
    }

    #[test]
    fn ready_states_are_ordered() {
        assert!(ReadyState::Done > ReadyState::Loading);
        assert!(ReadyState::Opened > ReadyState::Unsent);
    }

    #[test]
    fn progress_length_computable() {
        assert!(ProgressEvent { loaded: 1, total: Some(2) }.length_computable());
        assert!(!ProgressEvent { loaded: 1, total: None }.length_computable());
    }
}

//! Scripted transport used by unit tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::Notify;

use crate::http::{Method, ResponseType};
use crate::payload::Payload;
use crate::transport::{
    EventSink, ProgressEvent, ReadyState, Transport, TransportError, TransportEvent,
    TransportFactory,
};

/// How the fake behaves once `send` is called.
#[derive(Debug, Clone)]
pub(crate) enum Script {
    Reply {
        status: u16,
        status_text: String,
        headers: String,
        body: String,
    },
    NetworkFailure,
    Timeout,
    /// Keep the exchange open until aborted.
    Hang,
    /// Reach the terminal state with status 0 and emit nothing else.
    StatusZero,
    /// Reply, then keep emitting failure and progress after completion.
    ReplyThenNoise,
    /// Fire the timer, then complete with a 200 anyway.
    TimeoutThenReply,
}

impl Script {
    pub(crate) fn reply(status: u16, body: &str) -> Self {
        Script::Reply {
            status,
            status_text: status_text(status).to_string(),
            headers: "Content-Type: application/json\r\nX-Trace: t-1\r\n".to_string(),
            body: body.to_string(),
        }
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "",
    }
}

/// What the code under test did to the primitive.
#[derive(Debug, Default)]
pub(crate) struct Calls {
    pub created: usize,
    pub opened: Option<(Method, String)>,
    pub headers: Vec<(String, String)>,
    pub sent: Option<Payload>,
    pub aborted: bool,
    pub timeout: Option<Duration>,
    pub response_type: Option<ResponseType>,
    pub with_credentials: Option<bool>,
}

#[derive(Clone)]
pub(crate) struct Fake {
    script: Script,
    calls: Arc<Mutex<Calls>>,
    sent: Arc<Notify>,
}

impl Fake {
    pub(crate) fn new(script: Script) -> Self {
        Fake {
            script,
            calls: Arc::default(),
            sent: Arc::new(Notify::new()),
        }
    }

    pub(crate) fn transport(&self) -> Box<dyn Transport> {
        self.calls.lock().created += 1;
        Box::new(FakeTransport {
            script: self.script.clone(),
            calls: self.calls.clone(),
            sent: self.sent.clone(),
            ready_state: ReadyState::Unsent,
            status: 0,
            status_text: String::new(),
            headers: String::new(),
            body: String::new(),
            response_type: ResponseType::Default,
            held: None,
        })
    }

    pub(crate) fn factory(&self) -> impl TransportFactory {
        let fake = self.clone();
        move || fake.transport()
    }

    pub(crate) fn calls(&self) -> MutexGuard<'_, Calls> {
        self.calls.lock()
    }

    /// Resolves once `send` has been called.
    pub(crate) async fn wait_sent(&self) {
        self.sent.notified().await;
    }
}

struct FakeTransport {
    script: Script,
    calls: Arc<Mutex<Calls>>,
    sent: Arc<Notify>,
    ready_state: ReadyState,
    status: u16,
    status_text: String,
    headers: String,
    body: String,
    response_type: ResponseType,
    held: Option<EventSink>,
}

impl FakeTransport {
    fn finish(&mut self, events: &EventSink) {
        self.ready_state = ReadyState::Done;
        events.emit(TransportEvent::ReadyStateChange(ReadyState::Done));
    }

    fn reply(&mut self, status: u16, status_text: &str, headers: &str, body: &str, events: &EventSink) {
        self.status = status;
        self.status_text = status_text.to_string();
        self.headers = headers.to_string();
        self.body = body.to_string();
        self.ready_state = ReadyState::HeadersReceived;
        events.emit(TransportEvent::ReadyStateChange(ReadyState::HeadersReceived));
        let len = body.len() as u64;
        events.emit(TransportEvent::DownloadProgress(ProgressEvent {
            loaded: len,
            total: Some(len),
        }));
        self.finish(events);
    }
}

impl Transport for FakeTransport {
    fn open(&mut self, method: Method, url: &str) -> Result<(), TransportError> {
        if url.contains(' ') {
            return Err(TransportError::InvalidUrl(url.to_string()));
        }
        self.calls.lock().opened = Some((method, url.to_string()));
        self.ready_state = ReadyState::Opened;
        Ok(())
    }

    fn set_response_type(&mut self, response_type: ResponseType) {
        self.response_type = response_type;
        self.calls.lock().response_type = Some(response_type);
    }

    fn set_with_credentials(&mut self, enabled: bool) {
        self.calls.lock().with_credentials = Some(enabled);
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.calls.lock().timeout = Some(timeout);
    }

    fn set_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        if self.ready_state != ReadyState::Opened {
            return Err(TransportError::InvalidState("not opened"));
        }
        self.calls
            .lock()
            .headers
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn send(&mut self, body: Payload, events: EventSink) -> Result<(), TransportError> {
        let upload = match &body {
            Payload::Text(text) => text.len() as u64,
            Payload::Bytes(bytes) => bytes.len() as u64,
            _ => 0,
        };
        self.calls.lock().sent = Some(body);
        if upload > 0 {
            events.emit(TransportEvent::UploadProgress(ProgressEvent {
                loaded: upload,
                total: Some(upload),
            }));
        }

        match self.script.clone() {
            Script::Reply {
                status,
                status_text,
                headers,
                body,
            } => self.reply(status, &status_text, &headers, &body, &events),
            Script::NetworkFailure => {
                events.emit(TransportEvent::Error("connection refused".into()));
                self.finish(&events);
            }
            Script::Timeout => {
                events.emit(TransportEvent::Timeout);
                self.finish(&events);
            }
            Script::TimeoutThenReply => {
                events.emit(TransportEvent::Timeout);
                self.reply(200, "OK", "", r#"{"late":true}"#, &events);
            }
            Script::Hang => self.held = Some(events),
            Script::StatusZero => self.finish(&events),
            Script::ReplyThenNoise => {
                self.reply(200, "OK", "", r#"{"ok":true}"#, &events);
                events.emit(TransportEvent::Error("late failure".into()));
                events.emit(TransportEvent::DownloadProgress(ProgressEvent {
                    loaded: 99,
                    total: None,
                }));
            }
        }
        self.sent.notify_one();
        Ok(())
    }

    fn abort(&mut self) {
        self.calls.lock().aborted = true;
        if self.ready_state != ReadyState::Done {
            self.status = 0;
            if let Some(events) = self.held.clone() {
                self.finish(&events);
            }
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    fn status(&self) -> u16 {
        self.status
    }

    fn status_text(&self) -> String {
        self.status_text.clone()
    }

    fn all_response_headers(&self) -> String {
        self.headers.clone()
    }

    fn response_text(&self) -> String {
        self.body.clone()
    }

    fn response(&self) -> Payload {
        match self.response_type {
            ResponseType::Json => serde_json::from_str(&self.body)
                .map(Payload::Json)
                .unwrap_or(Payload::Null),
            _ => Payload::Text(self.body.clone()),
        }
    }
}

//! A transport primitive backed by a blocking ureq agent.
//!
//! # Design
//! `send` builds the request, then hands the blocking exchange to a worker
//! thread which reports back through the `EventSink`, in the same order a
//! browser request object would: headers received, loading (with download
//! progress per chunk), done. State the caller reads after completion
//! (status, header block, body) lives behind a shared mutex.
//!
//! `abort` cannot interrupt a blocking read, so it flips a flag the worker
//! checks between steps and reports a terminal ready state with status 0
//! immediately. Anything the worker still emits afterwards is a stray event
//! the listener must ignore.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ureq::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use ureq::http::{HeaderName, HeaderValue, Request};
use uuid::Uuid;

use crate::http::{Method, ResponseType};
use crate::payload::Payload;
use crate::transport::{
    EventSink, ProgressEvent, ReadyState, Transport, TransportError, TransportEvent,
    TransportFactory,
};

const READ_CHUNK: usize = 16 * 1024;

#[derive(Debug)]
struct Shared {
    ready_state: ReadyState,
    status: u16,
    status_text: String,
    raw_headers: String,
    body: Vec<u8>,
    aborted: bool,
}

impl Default for Shared {
    fn default() -> Self {
        Shared {
            ready_state: ReadyState::Unsent,
            status: 0,
            status_text: String::new(),
            raw_headers: String::new(),
            body: Vec::new(),
            aborted: false,
        }
    }
}

enum Outgoing {
    Empty(Request<()>),
    Body(Request<Vec<u8>>),
}

#[derive(Debug, Default)]
pub struct UreqTransport {
    method: Method,
    url: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    response_type: ResponseType,
    with_credentials: bool,
    timeout: Duration,
    shared: Arc<Mutex<Shared>>,
    events: Option<EventSink>,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory producing a fresh primitive per dispatch.
    pub fn factory() -> impl TransportFactory {
        || Box::new(UreqTransport::new()) as Box<dyn Transport>
    }

    fn agent(&self) -> ureq::Agent {
        let mut config = ureq::Agent::config_builder().http_status_as_error(false);
        if !self.timeout.is_zero() {
            config = config.timeout_global(Some(self.timeout));
        }
        config.build().new_agent()
    }

    fn build_request(&mut self, body: Payload) -> Result<(Outgoing, u64), TransportError> {
        let body = match self.method {
            Method::Get | Method::Head => Payload::Null,
            _ => body,
        };
        let bytes = match body {
            Payload::Null => None,
            Payload::Text(text) => Some(text.into_bytes()),
            Payload::Json(value) => Some(value.to_string().into_bytes()),
            Payload::Bytes(bytes) => Some(bytes),
            Payload::Form(form) => {
                let boundary = format!("----CourierBoundary{}", Uuid::new_v4().simple());
                let content_type = format!("multipart/form-data; boundary={boundary}");
                let value = HeaderValue::from_str(&content_type)
                    .map_err(|e| TransportError::InvalidHeader(e.to_string()))?;
                self.headers.retain(|(name, _)| *name != CONTENT_TYPE);
                self.headers.push((CONTENT_TYPE, value));
                Some(form.encode(&boundary))
            }
        };

        let mut builder = Request::builder()
            .method(self.method.as_str())
            .uri(self.url.as_str());
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }

        let upload_len = bytes.as_ref().map_or(0, |b| b.len() as u64);
        let outgoing = match bytes {
            Some(bytes) => builder.body(bytes).map(Outgoing::Body),
            None => builder.body(()).map(Outgoing::Empty),
        }
        .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        Ok((outgoing, upload_len))
    }
}

impl Transport for UreqTransport {
    fn open(&mut self, method: Method, url: &str) -> Result<(), TransportError> {
        ::url::Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
        self.method = method;
        self.url = url.to_string();
        self.headers.clear();
        self.events = None;
        *self.shared.lock() = Shared {
            ready_state: ReadyState::Opened,
            ..Shared::default()
        };
        Ok(())
    }

    fn set_response_type(&mut self, response_type: ResponseType) {
        self.response_type = response_type;
    }

    fn set_with_credentials(&mut self, enabled: bool) {
        self.with_credentials = enabled;
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn set_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        if self.shared.lock().ready_state != ReadyState::Opened || self.events.is_some() {
            return Err(TransportError::InvalidState("headers must be set after open and before send"));
        }
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::InvalidHeader(name.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidHeader(format!("{name}: {value}")))?;
        self.headers.push((name, value));
        Ok(())
    }

    fn send(&mut self, body: Payload, events: EventSink) -> Result<(), TransportError> {
        {
            let shared = self.shared.lock();
            if shared.aborted {
                return Err(TransportError::InvalidState("request was aborted before send"));
            }
            if shared.ready_state != ReadyState::Opened || self.events.is_some() {
                return Err(TransportError::InvalidState("send requires an opened, unsent request"));
            }
        }
        let (outgoing, upload_len) = self.build_request(body)?;
        let agent = self.agent();
        let shared = self.shared.clone();
        let worker_events = events.clone();
        log::trace!(
            "ureq transport: {} {} (credentials: {})",
            self.method,
            self.url,
            self.with_credentials
        );

        std::thread::Builder::new()
            .name("courier-ureq".to_string())
            .spawn(move || run_exchange(agent, outgoing, upload_len, shared, worker_events))
            .map_err(|e| TransportError::Spawn(e.to_string()))?;
        self.events = Some(events);
        Ok(())
    }

    fn abort(&mut self) {
        let in_flight = {
            let mut shared = self.shared.lock();
            let in_flight = self.events.is_some()
                && !shared.aborted
                && shared.ready_state != ReadyState::Done;
            shared.aborted = true;
            shared.status = 0;
            shared.status_text.clear();
            if in_flight {
                shared.ready_state = ReadyState::Done;
            }
            in_flight
        };
        if let (true, Some(events)) = (in_flight, &self.events) {
            events.emit(TransportEvent::ReadyStateChange(ReadyState::Done));
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.shared.lock().ready_state
    }

    fn status(&self) -> u16 {
        self.shared.lock().status
    }

    fn status_text(&self) -> String {
        self.shared.lock().status_text.clone()
    }

    fn all_response_headers(&self) -> String {
        self.shared.lock().raw_headers.clone()
    }

    fn response_text(&self) -> String {
        String::from_utf8_lossy(&self.shared.lock().body).into_owned()
    }

    fn response(&self) -> Payload {
        let shared = self.shared.lock();
        if shared.ready_state != ReadyState::Done || shared.aborted {
            return Payload::Null;
        }
        match self.response_type {
            ResponseType::Json => serde_json::from_slice(&shared.body)
                .map(Payload::Json)
                .unwrap_or(Payload::Null),
            ResponseType::Blob | ResponseType::ArrayBuffer => Payload::Bytes(shared.body.clone()),
            ResponseType::Default | ResponseType::Text => {
                Payload::Text(String::from_utf8_lossy(&shared.body).into_owned())
            }
        }
    }
}

/// Emit unless the exchange was aborted. The check and the emit are not
/// atomic; a listener must still drop events that arrive after it settled.
fn emit_live(shared: &Mutex<Shared>, events: &EventSink, event: TransportEvent) -> bool {
    if shared.lock().aborted {
        return false;
    }
    events.emit(event);
    true
}

fn run_exchange(
    agent: ureq::Agent,
    outgoing: Outgoing,
    upload_len: u64,
    shared: Arc<Mutex<Shared>>,
    events: EventSink,
) {
    let result = match outgoing {
        Outgoing::Empty(request) => agent.run(request),
        Outgoing::Body(request) => agent.run(request),
    };
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Timeout(_)) => {
            emit_live(&shared, &events, TransportEvent::Timeout);
            return;
        }
        Err(err) => {
            emit_live(&shared, &events, TransportEvent::Error(err.to_string()));
            return;
        }
    };

    if upload_len > 0 {
        let progress = ProgressEvent {
            loaded: upload_len,
            total: Some(upload_len),
        };
        emit_live(&shared, &events, TransportEvent::UploadProgress(progress));
    }

    let total = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    {
        let mut state = shared.lock();
        if state.aborted {
            return;
        }
        state.status = response.status().as_u16();
        state.status_text = response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string();
        state.raw_headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                format!("{}: {}\r\n", name, String::from_utf8_lossy(value.as_bytes()))
            })
            .collect();
        state.ready_state = ReadyState::HeadersReceived;
    }
    if !emit_live(&shared, &events, TransportEvent::ReadyStateChange(ReadyState::HeadersReceived)) {
        return;
    }

    shared.lock().ready_state = ReadyState::Loading;
    emit_live(&shared, &events, TransportEvent::ReadyStateChange(ReadyState::Loading));

    let mut reader = response.into_body().into_reader();
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut body = Vec::new();
    loop {
        if shared.lock().aborted {
            return;
        }
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                body.extend_from_slice(&chunk[..n]);
                let progress = ProgressEvent {
                    loaded: body.len() as u64,
                    total,
                };
                emit_live(&shared, &events, TransportEvent::DownloadProgress(progress));
            }
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {
                emit_live(&shared, &events, TransportEvent::Timeout);
                return;
            }
            Err(err) => {
                emit_live(&shared, &events, TransportEvent::Error(err.to_string()));
                return;
            }
        }
    }

    {
        let mut state = shared.lock();
        if state.aborted {
            return;
        }
        state.body = body;
        state.ready_state = ReadyState::Done;
    }
    emit_live(&shared, &events, TransportEvent::ReadyStateChange(ReadyState::Done));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done_with(body: &[u8], response_type: ResponseType) -> UreqTransport {
        let mut transport = UreqTransport::new();
        transport.set_response_type(response_type);
        {
            let mut shared = transport.shared.lock();
            shared.ready_state = ReadyState::Done;
            shared.status = 200;
            shared.body = body.to_vec();
        }
        transport
    }

    #[test]
    fn open_rejects_relative_urls() {
        let mut transport = UreqTransport::new();
        let err = transport.open(Method::Get, "/relative").unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }

    #[test]
    fn headers_require_open() {
        let mut transport = UreqTransport::new();
        let err = transport.set_header("X-A", "1").unwrap_err();
        assert!(matches!(err, TransportError::InvalidState(_)));
        transport.open(Method::Get, "http://localhost/").unwrap();
        transport.set_header("X-A", "1").unwrap();
        assert_eq!(transport.ready_state(), ReadyState::Opened);
    }

    #[test]
    fn send_after_abort_is_refused() {
        let mut transport = UreqTransport::new();
        transport.open(Method::Post, "http://127.0.0.1:9/after-abort").unwrap();
        transport.abort();

        let (sink, mut events) = EventSink::channel();
        let err = transport.send(Payload::Text("x".into()), sink).unwrap_err();
        assert!(matches!(err, TransportError::InvalidState(_)));
        assert!(transport.events.is_none());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn invalid_header_name_is_refused() {
        let mut transport = UreqTransport::new();
        transport.open(Method::Get, "http://localhost/").unwrap();
        let err = transport.set_header("bad header", "1").unwrap_err();
        assert!(matches!(err, TransportError::InvalidHeader(_)));
    }

    #[test]
    fn response_shape_follows_response_type() {
        let body = br#"{"a":1}"#;
        assert_eq!(
            done_with(body, ResponseType::Json).response(),
            Payload::Json(serde_json::json!({"a": 1}))
        );
        assert_eq!(
            done_with(body, ResponseType::Default).response(),
            Payload::Text(r#"{"a":1}"#.into())
        );
        assert_eq!(
            done_with(body, ResponseType::ArrayBuffer).response(),
            Payload::Bytes(body.to_vec())
        );
        assert_eq!(done_with(b"nope", ResponseType::Json).response(), Payload::Null);
    }

    #[test]
    fn abort_before_send_emits_nothing() {
        let mut transport = UreqTransport::new();
        transport.open(Method::Get, "http://localhost/").unwrap();
        transport.abort();
        assert_eq!(transport.status(), 0);
        assert_eq!(transport.ready_state(), ReadyState::Opened);
    }

    #[test]
    fn form_body_gets_its_own_boundary() {
        let mut transport = UreqTransport::new();
        transport.open(Method::Post, "http://localhost/upload").unwrap();
        transport.set_header("Content-Type", "text/plain").unwrap();
        let form = crate::payload::FormData::new().text("a", "1");
        let (outgoing, len) = transport.build_request(Payload::Form(form)).unwrap();
        let Outgoing::Body(request) = outgoing else {
            panic!("form must carry a body");
        };
        let content_type = request.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary=----CourierBoundary"));
        assert_eq!(request.headers().get_all("content-type").iter().count(), 1);
        assert_eq!(len, request.body().len() as u64);
    }
}

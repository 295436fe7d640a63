//! Drives one exchange against a transport primitive.
//!
//! # Design
//! The primitive reports progress through an event channel; the adapter is
//! a single task that consumes those events until the dispatch settles.
//! Settling goes through one slot holding the `oneshot` sender: whoever
//! takes it first (completion, failure, timeout, or the cancel observer
//! running on another thread) decides the outcome; everybody else finds the
//! slot empty and drops their result.
//!
//! Lock order is settlement, then transport. The completion path reads the
//! primitive, releases it, and only then settles, so it never holds the
//! transport while waiting on the settlement.

use std::sync::Arc;

use base64::Engine as _;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::config::RequestConfig;
use crate::cookie::CookieStore;
use crate::error::DispatchError;
use crate::headers::parse_headers;
use crate::http::{HeaderMap, ResponseType};
use crate::payload::Payload;
use crate::response::Response;
use crate::transport::{
    EventSink, ReadyState, SharedTransport, Transport, TransportEvent, TransportHandle,
};
use crate::url::is_same_origin;

/// Where a dispatch runs: the page origin for the same-origin test and the
/// cookies the XSRF header is read from.
#[derive(Clone, Default)]
pub struct Environment {
    pub origin: Option<::url::Url>,
    pub cookies: Option<Arc<dyn CookieStore>>,
}

type Outcome = Result<Response, DispatchError>;

struct Settlement {
    slot: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl Settlement {
    fn new() -> (Arc<Self>, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let settlement = Settlement {
            slot: Mutex::new(Some(tx)),
        };
        (Arc::new(settlement), rx)
    }

    fn is_settled(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// Settle with the outcome `f` produces, unless already settled. `f`
    /// runs under the settlement lock.
    fn settle_with(&self, f: impl FnOnce() -> Outcome) -> bool {
        let mut slot = self.slot.lock();
        let Some(tx) = slot.take() else {
            return false;
        };
        let _ = tx.send(f());
        true
    }
}

struct Exchange {
    id: Uuid,
    config: Arc<RequestConfig>,
    transport: SharedTransport,
    handle: TransportHandle,
    settlement: Arc<Settlement>,
}

impl Exchange {
    fn settle(&self, what: &str, f: impl FnOnce() -> Outcome) {
        if !self.settlement.settle_with(f) {
            log::debug!("dispatch {}: late {what} discarded", self.id);
        }
    }

    fn on_event(&self, event: TransportEvent) {
        log::trace!("dispatch {}: {event:?}", self.id);
        match event {
            TransportEvent::ReadyStateChange(ReadyState::Done) => self.on_done(),
            TransportEvent::ReadyStateChange(_) => {}
            TransportEvent::Error(detail) => {
                log::debug!("dispatch {}: transport failure: {detail}", self.id);
                self.settle("network error", || {
                    Err(DispatchError::network(self.config.clone(), self.handle.clone()))
                });
            }
            TransportEvent::Timeout => {
                let timeout = self.config.effective_timeout();
                self.settle("timeout", || {
                    self.transport.lock().abort();
                    Err(DispatchError::timeout(self.config.clone(), timeout, self.handle.clone()))
                });
            }
            TransportEvent::UploadProgress(progress) => {
                if let Some(callback) = &self.config.on_upload_progress {
                    if !self.settlement.is_settled() {
                        callback(&progress);
                    }
                }
            }
            TransportEvent::DownloadProgress(progress) => {
                if let Some(callback) = &self.config.on_download_progress {
                    if !self.settlement.is_settled() {
                        callback(&progress);
                    }
                }
            }
        }
    }

    fn on_done(&self) {
        let (status, status_text, raw_headers, data) = {
            let transport = self.transport.lock();
            let status = transport.status();
            if status == 0 {
                log::trace!("dispatch {}: terminal state without status ignored", self.id);
                return;
            }
            let data = match self.config.effective_response_type() {
                ResponseType::Text => Payload::Text(transport.response_text()),
                _ => transport.response(),
            };
            (status, transport.status_text(), transport.all_response_headers(), data)
        };

        let response = Response {
            status,
            status_text,
            headers: parse_headers(&raw_headers),
            data,
            config: self.config.clone(),
            request: self.handle.clone(),
        };
        let outcome = if self.config.is_status_valid(status) {
            Ok(response)
        } else {
            Err(DispatchError::status(self.config.clone(), self.handle.clone(), response))
        };
        self.settle("completion", move || outcome);
    }
}

/// Apply the security headers and drop what must not reach the wire.
fn inject_headers(config: &mut RequestConfig, env: &Environment) {
    let headers: &mut HeaderMap = &mut config.headers.own;

    if config.data.is_form() {
        headers.remove("Content-Type");
    }

    let protected = config.with_credentials.unwrap_or(false)
        || env
            .origin
            .as_ref()
            .is_some_and(|origin| is_same_origin(&config.url, origin));
    if protected {
        let token = match (&config.xsrf_cookie_name, &env.cookies) {
            (Some(name), Some(cookies)) => cookies.read(name).filter(|v| !v.is_empty()),
            _ => None,
        };
        if let (Some(token), Some(header)) = (token, &config.xsrf_header_name) {
            headers.insert(header.clone(), token);
        }
    }

    if let Some(auth) = &config.auth {
        let credentials = format!("{}:{}", auth.username, auth.password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        headers.insert("Authorization", format!("Basic {encoded}"));
    }

    if config.data.is_null() {
        headers.remove("Content-Type");
    }
}

/// Run one exchange for a resolved config. Resolves or rejects exactly once.
///
/// A terminal ready state with status 0 and no other event leaves the
/// dispatch pending; only the cancel token can end it then.
pub(crate) async fn exchange(
    id: Uuid,
    mut config: RequestConfig,
    transport: Box<dyn Transport>,
    env: &Environment,
) -> Result<Response, DispatchError> {
    let transport: SharedTransport = Arc::new(Mutex::new(transport));
    let handle = TransportHandle::new(id, &transport);
    let method = config.effective_method();

    let configured = {
        let mut primitive = transport.lock();
        primitive.open(method, &config.url).map(|()| {
            primitive.set_response_type(config.effective_response_type());
            primitive.set_with_credentials(config.with_credentials.unwrap_or(false));
            primitive.set_timeout(config.effective_timeout());
        })
    };
    if let Err(err) = configured {
        log::warn!("dispatch {id}: transport refused {} {}: {err}", method, config.url);
        return Err(DispatchError::transport(Arc::new(config), &err, handle));
    }

    inject_headers(&mut config, env);
    let config = Arc::new(config);

    let refused = {
        let mut primitive = transport.lock();
        config
            .headers
            .own
            .iter()
            .try_for_each(|(name, value)| primitive.set_header(name, value))
    };
    if let Err(err) = refused {
        log::warn!("dispatch {id}: transport refused a header: {err}");
        return Err(DispatchError::transport(config.clone(), &err, handle));
    }

    let (settlement, mut outcome) = Settlement::new();
    let exchange = Exchange {
        id,
        config: config.clone(),
        transport: transport.clone(),
        handle: handle.clone(),
        settlement: settlement.clone(),
    };

    let _subscription = config.cancel_token.as_ref().map(|token| {
        let settlement = settlement.clone();
        let transport = transport.clone();
        let config = config.clone();
        let handle = handle.clone();
        token.subscribe(move |reason| {
            let cancelled = settlement.settle_with(|| {
                transport.lock().abort();
                Err(DispatchError::cancelled(config, reason.clone(), Some(handle)))
            });
            if cancelled {
                log::debug!("dispatch {id}: cancelled: {reason}");
            }
        })
    });

    let (sink, mut events) = EventSink::channel();
    if !settlement.is_settled() {
        let sent = transport.lock().send(config.data.clone(), sink);
        if let Err(err) = sent {
            log::warn!("dispatch {id}: send failed: {err}");
            exchange.settle("send failure", || {
                Err(DispatchError::transport(config.clone(), &err, handle.clone()))
            });
        }
    }

    let mut listening = true;
    loop {
        tokio::select! {
            biased;
            settled = &mut outcome => {
                return settled.unwrap_or_else(|_| {
                    Err(DispatchError::network(config.clone(), handle.clone()))
                });
            }
            event = events.recv(), if listening => match event {
                Some(event) => exchange.on_event(event),
                None => listening = false,
            },
        }
    }
}

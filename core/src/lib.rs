//! Promise-style HTTP request dispatch.
//!
//! # Overview
//! A `RequestConfig` describes one request: URL, method, payload, headers,
//! query parameters, timeout, cancellation. `Dispatcher::dispatch` turns it
//! into exactly one exchange against a transport primitive and resolves to
//! a `Response` or a classified `DispatchError`. `Client` adds defaults and
//! method shorthands on top.
//!
//! # Design
//! - The network is behind the `Transport` trait, an event-driven request
//!   object. `UreqTransport` is the bundled implementation; tests use a
//!   scripted fake.
//! - Normalization (URL, transforms, header flattening) runs on an owned
//!   config, so dispatches never share mutable state.
//! - Each dispatch settles through a single slot. Completion, failure,
//!   timeout and cancellation race for it; late events are dropped.
//! - Errors are values (`ErrorKind`), never retried here.

pub mod adapter;
pub mod cancel;
pub mod client;
pub mod config;
pub mod cookie;
pub mod dispatch;
pub mod error;
pub mod headers;
pub mod http;
pub mod payload;
pub mod response;
pub mod transform;
pub mod transport;
pub mod ureq_transport;
pub mod url;

#[cfg(test)]
mod testing;

pub use adapter::Environment;
pub use cancel::{Cancel, CancelSource, CancelToken, Subscription};
pub use client::Client;
pub use config::{merge_config, BasicAuth, RequestConfig};
pub use cookie::{CookieJar, CookieStore};
pub use dispatch::Dispatcher;
pub use error::{DispatchError, ErrorKind};
pub use headers::Headers;
pub use http::{HeaderMap, Method, ResponseType};
pub use payload::{FormData, FormPart, Payload};
pub use response::Response;
pub use transform::{Transform, TransformError};
pub use transport::{
    EventSink, ProgressEvent, ReadyState, Transport, TransportError, TransportEvent,
    TransportFactory, TransportHandle,
};
pub use ureq_transport::UreqTransport;
pub use crate::url::{ParamValue, Params};

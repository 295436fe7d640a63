//! Dispatch failures.
//!
//! # Design
//! Every failure path of a dispatch produces exactly one `DispatchError`.
//! The `kind` says what went wrong; `response` is populated only for
//! `ErrorKind::Status`, where the exchange completed but the status was
//! rejected, so callers can still read the body and headers. Nothing here
//! retries or swallows errors; that belongs to callers.

use std::sync::Arc;
use std::time::Duration;

use crate::cancel::Cancel;
use crate::config::RequestConfig;
use crate::response::Response;
use crate::transform::TransformError;
use crate::transport::{TransportError, TransportHandle};

/// Machine code attached to timeouts.
pub const TIMEOUT_CODE: &str = "ECONNABORTED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The cancel token settled before or during the exchange.
    Cancelled(Cancel),

    /// The transport's timer expired; carries the configured duration.
    Timeout(Duration),

    /// The transport failed without an HTTP response.
    Network,

    /// The exchange completed but `validate_status` rejected the status.
    Status,

    /// A request or response transform failed.
    Transform,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct DispatchError {
    pub message: String,
    pub kind: ErrorKind,
    pub code: Option<String>,
    pub config: Arc<RequestConfig>,
    pub request: Option<TransportHandle>,
    pub response: Option<Box<Response>>,
}

impl DispatchError {
    /// Build an error value. Never fails.
    pub fn new(
        message: impl Into<String>,
        kind: ErrorKind,
        config: Arc<RequestConfig>,
        code: Option<&str>,
        request: Option<TransportHandle>,
        response: Option<Response>,
    ) -> Self {
        DispatchError {
            message: message.into(),
            kind,
            code: code.map(str::to_string),
            config,
            request,
            response: response.map(Box::new),
        }
    }

    pub fn cancelled(config: Arc<RequestConfig>, reason: Cancel, request: Option<TransportHandle>) -> Self {
        let message = reason.to_string();
        Self::new(message, ErrorKind::Cancelled(reason), config, None, request, None)
    }

    pub fn timeout(config: Arc<RequestConfig>, timeout: Duration, request: TransportHandle) -> Self {
        Self::new(
            format!("Timeout of {} ms exceeded", timeout.as_millis()),
            ErrorKind::Timeout(timeout),
            config,
            Some(TIMEOUT_CODE),
            Some(request),
            None,
        )
    }

    pub fn network(config: Arc<RequestConfig>, request: TransportHandle) -> Self {
        Self::new("Network Error", ErrorKind::Network, config, None, Some(request), None)
    }

    /// The primitive refused its configuration before any exchange happened.
    pub fn transport(config: Arc<RequestConfig>, source: &TransportError, request: TransportHandle) -> Self {
        Self::new(source.to_string(), ErrorKind::Network, config, None, Some(request), None)
    }

    pub fn status(config: Arc<RequestConfig>, request: TransportHandle, response: Response) -> Self {
        Self::new(
            format!("Request failed with status code {}", response.status),
            ErrorKind::Status,
            config,
            None,
            Some(request),
            Some(response),
        )
    }

    /// A transform failed. Never carries a response; on a rejected status
    /// the status error wins and keeps its untransformed response.
    pub fn transform(
        config: Arc<RequestConfig>,
        source: &TransformError,
        request: Option<TransportHandle>,
    ) -> Self {
        Self::new(
            format!("Transform failed: {source}"),
            ErrorKind::Transform,
            config,
            None,
            request,
            None,
        )
    }

    pub fn is_cancel(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Arc<RequestConfig> {
        Arc::new(RequestConfig::new("http://localhost/x"))
    }

    #[test]
    fn cancelled_carries_reason_and_no_response() {
        let err = DispatchError::cancelled(config(), Cancel::new("user navigated away"), None);
        assert!(err.is_cancel());
        assert_eq!(err.to_string(), "user navigated away");
        assert_eq!(err.kind, ErrorKind::Cancelled(Cancel::new("user navigated away")));
        assert!(err.response.is_none());
        assert!(err.code.is_none());
    }

    #[test]
    fn transform_error_message() {
        let source = TransformError::Custom("bad body".into());
        let err = DispatchError::transform(config(), &source, None);
        assert_eq!(err.kind, ErrorKind::Transform);
        assert_eq!(err.to_string(), "Transform failed: bad body");
        assert!(err.request.is_none());
        assert!(err.response.is_none());
    }

    #[test]
    fn new_keeps_every_field() {
        let err = DispatchError::new("boom", ErrorKind::Network, config(), Some("EX"), None, None);
        assert_eq!(err.message, "boom");
        assert_eq!(err.code.as_deref(), Some("EX"));
        assert_eq!(err.config.url, "http://localhost/x");
        assert!(!err.is_timeout());
    }
}

use std::sync::Arc;

use crate::config::RequestConfig;
use crate::http::HeaderMap;
use crate::payload::Payload;
use crate::transport::TransportHandle;

/// A completed exchange.
///
/// `config` is the resolved configuration the exchange ran with (absolute
/// URL, flattened headers, transformed payload).
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    pub data: Payload,
    pub config: Arc<RequestConfig>,
    pub request: TransportHandle,
}

//! Ordered payload transforms applied before send and after receipt.

use std::sync::Arc;

use crate::http::HeaderMap;
use crate::payload::Payload;

/// Failure raised by a transform function.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("json transform failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

/// `(payload, headers) -> payload`. Request transforms see the request's
/// own header entries and may add to them; response transforms see the
/// parsed response headers.
pub type Transform =
    Arc<dyn Fn(Payload, &mut HeaderMap) -> Result<Payload, TransformError> + Send + Sync>;

/// Run `data` through `transforms` in order. An empty list is the identity.
pub fn apply(
    data: Payload,
    headers: &mut HeaderMap,
    transforms: &[Transform],
) -> Result<Payload, TransformError> {
    transforms
        .iter()
        .try_fold(data, |data, transform| transform(data, headers))
}

/// Serializes `Json` payloads to text and labels them, unless the caller
/// already chose a content type.
pub fn json_request() -> Transform {
    Arc::new(|data, headers| match data {
        Payload::Json(value) => {
            if !headers.contains("Content-Type") {
                headers.insert("Content-Type", "application/json;charset=utf-8");
            }
            Ok(Payload::Text(serde_json::to_string(&value)?))
        }
        other => Ok(other),
    })
}

/// Parses text bodies that hold JSON; anything else is left alone.
pub fn json_response() -> Transform {
    Arc::new(|data, _headers| match data {
        Payload::Text(text) => match serde_json::from_str(&text) {
            Ok(value) => Ok(Payload::Json(value)),
            Err(_) => Ok(Payload::Text(text)),
        },
        other => Ok(other),
    })
}

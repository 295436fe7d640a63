//! URL assembly: base/relative joining, query serialization, origin checks.
//!
//! # Design
//! Everything here is a pure function over strings so the rules can be
//! tested without a transport. Query encoding follows the browser's
//! component encoding, then restores `@ : $ , [ ]` to their literal forms
//! and writes spaces as `+`, which keeps bracketed array keys readable.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use ::url::Url;

// Component encoding leaves `- _ . ! ~ * ' ( )` alone; the reserved set
// below is additionally kept literal.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'@')
    .remove(b':')
    .remove(b'$')
    .remove(b',')
    .remove(b'[')
    .remove(b']');

/// Caller-supplied replacement for the built-in query serializer.
pub type ParamsSerializer = Arc<dyn Fn(&Params) -> String + Send + Sync>;

/// A single query parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(DateTime<Utc>),
    Array(Vec<ParamValue>),
    Object(serde_json::Value),
}

impl ParamValue {
    fn render(&self) -> String {
        match self {
            ParamValue::Null => "null".to_string(),
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Int(n) => n.to_string(),
            ParamValue::Float(n) => render_float(*n),
            ParamValue::Str(s) => s.clone(),
            ParamValue::Date(d) => d.to_rfc3339_opts(SecondsFormat::Millis, true),
            ParamValue::Array(items) => items
                .iter()
                .map(ParamValue::render)
                .collect::<Vec<_>>()
                .join(","),
            ParamValue::Object(v) => v.to_string(),
        }
    }
}

/// Number form of a JS runtime: exponent outside `[1e-6, 1e21)`, no `.0`.
fn render_float(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return n.to_string();
    }
    let formatted = format!("{n:e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => formatted,
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<i32> for ParamValue {
    fn from(n: i32) -> Self {
        ParamValue::Int(n.into())
    }
}

impl From<u32> for ParamValue {
    fn from(n: u32) -> Self {
        ParamValue::Int(n.into())
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        ParamValue::Int(n)
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Float(n)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(d: DateTime<Utc>) -> Self {
        ParamValue::Date(d)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(items: Vec<T>) -> Self {
        ParamValue::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Null, Into::into)
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => ParamValue::Null,
            Value::Bool(b) => ParamValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ParamValue::Int(i),
                None => ParamValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => ParamValue::Str(s),
            Value::Array(items) => ParamValue::Array(items.into_iter().map(Into::into).collect()),
            object @ Value::Object(_) => ParamValue::Object(object),
        }
    }
}

/// Query parameters: an ordered map, or a query string someone already
/// built.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Map(Vec<(String, ParamValue)>),
    Query(String),
}

impl Params {
    pub fn new() -> Self {
        Params::Map(Vec::new())
    }

    /// Append an entry. A pre-serialized query is replaced by a map.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        if let Params::Query(_) = self {
            *self = Params::new();
        }
        if let Params::Map(entries) = self {
            entries.push((key.into(), value.into()));
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Params::new()
    }
}

/// Browser-style component encoding with the reserved set kept literal and
/// space written as `+`.
pub fn encode(value: &str) -> String {
    utf8_percent_encode(value, QUERY_COMPONENT)
        .to_string()
        .replace("%20", "+")
}

/// True when `url` starts with `scheme://` or is protocol-relative (`//`).
pub fn is_absolute(url: &str) -> bool {
    if url.starts_with("//") {
        return true;
    }
    let Some(end) = url.find("://") else {
        return false;
    };
    let scheme = &url[..end];
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => chars
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
        _ => false,
    }
}

/// Join `base` and `relative` with exactly one slash. An empty `relative`
/// yields `base`; an absolute one is returned as is.
pub fn combine(base: &str, relative: &str) -> String {
    if relative.is_empty() {
        return base.to_string();
    }
    if is_absolute(relative) {
        return relative.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

/// Prefix `url` with `base_url` unless `url` is already absolute.
pub fn resolve(base_url: Option<&str>, url: &str) -> String {
    match base_url {
        Some(base) if !is_absolute(url) => combine(base, url),
        _ => url.to_string(),
    }
}

/// Serialize `params` into a query string (no leading `?`).
pub fn serialize_params(params: &Params, serializer: Option<&ParamsSerializer>) -> String {
    if let Some(serializer) = serializer {
        return serializer(params);
    }
    let entries = match params {
        Params::Query(query) => return query.clone(),
        Params::Map(entries) => entries,
    };

    let mut parts = Vec::new();
    for (key, value) in entries {
        match value {
            ParamValue::Null => {}
            ParamValue::Array(items) => {
                let key = encode(&format!("{key}[]"));
                for item in items {
                    parts.push(format!("{key}={}", encode(&item.render())));
                }
            }
            other => parts.push(format!("{}={}", encode(key), encode(&other.render()))),
        }
    }
    parts.join("&")
}

/// Append a serialized query to `url`, dropping any fragment first.
pub fn append_query(url: &str, serialized: &str) -> String {
    if serialized.is_empty() {
        return url.to_string();
    }
    let url = match url.find('#') {
        Some(mark) => &url[..mark],
        None => url,
    };
    let joiner = if url.contains('?') { '&' } else { '?' };
    format!("{url}{joiner}{serialized}")
}

/// Serialize `params` and append them to `url`. Without params the URL is
/// returned untouched.
pub fn build_url(url: &str, params: Option<&Params>, serializer: Option<&ParamsSerializer>) -> String {
    match params {
        Some(params) => append_query(url, &serialize_params(params, serializer)),
        None => url.to_string(),
    }
}

/// Whether `target`, resolved against `origin`, has the same scheme, host
/// and port as `origin`.
pub fn is_same_origin(target: &str, origin: &Url) -> bool {
    match origin.join(target) {
        Ok(resolved) => resolved.origin() == origin.origin(),
        Err(_) => false,
    }
}

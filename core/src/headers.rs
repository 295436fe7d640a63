//! Config-side header buckets and their flattening into one map.
//!
//! # Design
//! A request's headers arrive in three layers: a `common` bucket applied to
//! every method, one bucket per method, and the request's own entries.
//! Flattening for a given method overlays them in that order, so the
//! request's own entries win, then the method bucket, then `common`. The
//! buckets never reach the transport; only the flattened map does.

use crate::http::{HeaderMap, Method};

/// Header configuration before flattening.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    pub common: HeaderMap,
    methods: Vec<(Method, HeaderMap)>,
    pub own: HeaderMap,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(&self, method: Method) -> Option<&HeaderMap> {
        self.methods
            .iter()
            .find(|(m, _)| *m == method)
            .map(|(_, map)| map)
    }

    pub fn method_mut(&mut self, method: Method) -> &mut HeaderMap {
        let index = match self.methods.iter().position(|(m, _)| *m == method) {
            Some(index) => index,
            None => {
                self.methods.push((method, HeaderMap::new()));
                self.methods.len() - 1
            }
        };
        &mut self.methods[index].1
    }

    /// Iterate the method buckets in insertion order.
    pub fn method_buckets(&self) -> impl Iterator<Item = (Method, &HeaderMap)> {
        self.methods.iter().map(|(m, map)| (*m, map))
    }

    /// Overlay `other` onto `self`, bucket by bucket. `other` wins on
    /// collision.
    pub fn merge(&mut self, other: &Headers) {
        self.common.extend_from(&other.common);
        for (method, map) in other.method_buckets() {
            self.method_mut(method).extend_from(map);
        }
        self.own.extend_from(&other.own);
    }

    /// Collapse the buckets for `method` into one map. Buckets for other
    /// methods are dropped.
    pub fn flatten(&self, method: Method) -> HeaderMap {
        let mut flat = self.common.clone();
        if let Some(bucket) = self.method(method) {
            flat.extend_from(bucket);
        }
        flat.extend_from(&self.own);
        flat
    }
}

impl From<HeaderMap> for Headers {
    fn from(own: HeaderMap) -> Self {
        Headers {
            own,
            ..Headers::default()
        }
    }
}

/// Parse a raw response header block (`name: value` lines) into a map.
/// Names are lower-cased and values trimmed; a repeated name keeps the last
/// value. Lines without a name are skipped.
pub fn parse_headers(raw: &str) -> HeaderMap {
    let mut parsed = HeaderMap::new();
    for line in raw.split('\n') {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }
        parsed.insert(name, value.trim());
    }
    parsed
}

//! HTTP vocabulary shared by every layer of the dispatch pipeline.
//!
//! # Design
//! Headers are kept as an ordered list of owned `(name, value)` pairs rather
//! than a hash map: the order the caller supplied them in is the order the
//! transport sees them, and lookups compare names ASCII-case-insensitively.
//! Header counts per request are small, so linear scans are fine.

use std::fmt;
use std::str::FromStr;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Patch,
        Method::Delete,
        Method::Head,
        Method::Options,
    ];

    /// Wire form, as handed to the transport primitive.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    /// Name of the per-method header bucket (`get`, `post`, ...).
    pub fn bucket_name(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Patch => "patch",
            Method::Delete => "delete",
            Method::Head => "head",
            Method::Options => "options",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown HTTP method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}

/// Hint telling the transport how to surface the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    /// No hint; the body is read as text.
    #[default]
    Default,
    Text,
    Json,
    Blob,
    ArrayBuffer,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Default => "",
            ResponseType::Text => "text",
            ResponseType::Json => "json",
            ResponseType::Blob => "blob",
            ResponseType::ArrayBuffer => "arraybuffer",
        }
    }
}

/// Ordered header map with case-insensitive name semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Insert or replace. A replaced entry keeps its slot but takes the new
    /// spelling of the name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.entries[i] = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    /// Overlay `other` onto `self`; entries of `other` win on name collision.
    pub fn extend_from(&mut self, other: &HeaderMap) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_wire_and_bucket_names() {
        assert_eq!(Method::Patch.as_str(), "PATCH");
        assert_eq!(Method::Options.bucket_name(), "options");
        assert_eq!(Method::default(), Method::Get);
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("delete".parse::<Method>().unwrap(), Method::Delete);
        assert_eq!("Head".parse::<Method>().unwrap(), Method::Head);
        assert!("BREW".parse::<Method>().is_err());
    }

    #[test]
    fn header_lookup_ignores_case() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn header_insert_replaces_in_place() {
        let mut headers: HeaderMap = [("A", "1"), ("B", "2"), ("C", "3")].into_iter().collect();
        headers.insert("b", "two");
        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(pairs, vec![("A", "1"), ("b", "two"), ("C", "3")]);
    }

    #[test]
    fn header_remove_returns_value() {
        let mut headers: HeaderMap = [("X-Token", "abc")].into_iter().collect();
        assert_eq!(headers.remove("x-token").as_deref(), Some("abc"));
        assert!(headers.is_empty());
        assert!(headers.remove("x-token").is_none());
    }
}

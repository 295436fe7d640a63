//! Request and response bodies.
//!
//! `Payload::Null` is the "no body" sentinel. It is distinct from an empty
//! string and from a JSON `null`: the transport sends nothing for it and a
//! caller-set `Content-Type` is withheld.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    Null,
    Text(String),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
    Form(FormData),
}

impl Payload {
    /// Serialize any value into a `Json` payload.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Payload::Json)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Payload::Null)
    }

    pub fn is_form(&self) -> bool {
        matches!(self, Payload::Form(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<FormData> for Payload {
    fn from(form: FormData) -> Self {
        Payload::Form(form)
    }
}

/// A multipart form container. The transport picks the boundary and sets
/// the matching `Content-Type` itself.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormData {
    parts: Vec<(String, FormPart)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text(String),
    File {
        file_name: String,
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push((name.into(), FormPart::Text(value.into())));
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Self {
        self.parts.push((
            name.into(),
            FormPart::File {
                file_name: file_name.into(),
                content_type: content_type.map(str::to_string),
                bytes,
            },
        ));
        self
    }

    pub fn parts(&self) -> impl Iterator<Item = (&str, &FormPart)> {
        self.parts.iter().map(|(name, part)| (name.as_str(), part))
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Encode as a `multipart/form-data` body delimited by `boundary`.
    pub fn encode(&self, boundary: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        for (name, part) in &self.parts {
            buf.extend_from_slice(b"--");
            buf.extend_from_slice(boundary.as_bytes());
            buf.extend_from_slice(b"\r\nContent-Disposition: form-data; name=\"");
            buf.extend_from_slice(escape_quoted(name).as_bytes());
            buf.push(b'"');
            match part {
                FormPart::Text(value) => {
                    buf.extend_from_slice(b"\r\n\r\n");
                    buf.extend_from_slice(value.as_bytes());
                }
                FormPart::File {
                    file_name,
                    content_type,
                    bytes,
                } => {
                    buf.extend_from_slice(b"; filename=\"");
                    buf.extend_from_slice(escape_quoted(file_name).as_bytes());
                    buf.push(b'"');
                    buf.extend_from_slice(b"\r\nContent-Type: ");
                    buf.extend_from_slice(
                        content_type
                            .as_deref()
                            .unwrap_or("application/octet-stream")
                            .as_bytes(),
                    );
                    buf.extend_from_slice(b"\r\n\r\n");
                    buf.extend_from_slice(bytes);
                }
            }
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(b"--");
        buf.extend_from_slice(boundary.as_bytes());
        buf.extend_from_slice(b"--\r\n");
        buf
    }
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

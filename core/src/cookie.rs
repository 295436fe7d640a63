//! Read-only cookie access for XSRF header injection.

use percent_encoding::percent_decode_str;

/// Anything that can look up a cookie value by name.
pub trait CookieStore: Send + Sync {
    fn read(&self, name: &str) -> Option<String>;
}

/// Cookies parsed from a `name=value; name2=value2` string, the shape a
/// page's cookie string has. Values are percent-decoded on read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(cookie_string: &str) -> Self {
        let cookies = cookie_string
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .filter(|(name, _)| !name.is_empty())
            .collect();
        CookieJar { cookies }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.cookies.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.cookies.push((name, value)),
        }
    }
}

impl CookieStore for CookieJar {
    fn read(&self, name: &str) -> Option<String> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| percent_decode_str(value).decode_utf8_lossy().into_owned())
    }
}

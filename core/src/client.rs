//! Method shorthands over a dispatcher with client-wide defaults.
//!
//! # Design
//! `Client` holds a default `RequestConfig` and a `Dispatcher`. Every call
//! layers its own config over the defaults with `merge_config`, fills in
//! the method and URL (and payload where the method carries one) and
//! dispatches. The client itself keeps no per-request state.

use crate::config::{merge_config, RequestConfig};
use crate::dispatch::Dispatcher;
use crate::error::DispatchError;
use crate::http::Method;
use crate::payload::Payload;
use crate::response::Response;
use crate::ureq_transport::UreqTransport;

#[derive(Clone)]
pub struct Client {
    defaults: RequestConfig,
    dispatcher: Dispatcher,
}

impl Default for Client {
    fn default() -> Self {
        Client::new(Dispatcher::new(UreqTransport::factory()))
    }
}

impl Client {
    /// A client with the standard defaults (`RequestConfig::defaults`).
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self::with_defaults(dispatcher, RequestConfig::defaults())
    }

    pub fn with_defaults(dispatcher: Dispatcher, defaults: RequestConfig) -> Self {
        Client {
            defaults,
            dispatcher,
        }
    }

    pub fn defaults(&self) -> &RequestConfig {
        &self.defaults
    }

    /// Change the defaults for every later call.
    pub fn defaults_mut(&mut self) -> &mut RequestConfig {
        &mut self.defaults
    }

    pub async fn request(&self, config: RequestConfig) -> Result<Response, DispatchError> {
        self.dispatcher
            .dispatch(merge_config(&self.defaults, config))
            .await
    }

    pub async fn get(&self, url: &str, config: Option<RequestConfig>) -> Result<Response, DispatchError> {
        self.without_data(Method::Get, url, config).await
    }

    pub async fn delete(&self, url: &str, config: Option<RequestConfig>) -> Result<Response, DispatchError> {
        self.without_data(Method::Delete, url, config).await
    }

    pub async fn head(&self, url: &str, config: Option<RequestConfig>) -> Result<Response, DispatchError> {
        self.without_data(Method::Head, url, config).await
    }

    pub async fn options(&self, url: &str, config: Option<RequestConfig>) -> Result<Response, DispatchError> {
        self.without_data(Method::Options, url, config).await
    }

    pub async fn post(
        &self,
        url: &str,
        data: impl Into<Payload>,
        config: Option<RequestConfig>,
    ) -> Result<Response, DispatchError> {
        self.with_data(Method::Post, url, data.into(), config).await
    }

    pub async fn put(
        &self,
        url: &str,
        data: impl Into<Payload>,
        config: Option<RequestConfig>,
    ) -> Result<Response, DispatchError> {
        self.with_data(Method::Put, url, data.into(), config).await
    }

    pub async fn patch(
        &self,
        url: &str,
        data: impl Into<Payload>,
        config: Option<RequestConfig>,
    ) -> Result<Response, DispatchError> {
        self.with_data(Method::Patch, url, data.into(), config).await
    }

    async fn without_data(
        &self,
        method: Method,
        url: &str,
        config: Option<RequestConfig>,
    ) -> Result<Response, DispatchError> {
        let mut config = config.unwrap_or_default();
        config.method = Some(method);
        config.url = url.to_string();
        self.request(config).await
    }

    async fn with_data(
        &self,
        method: Method,
        url: &str,
        data: Payload,
        config: Option<RequestConfig>,
    ) -> Result<Response, DispatchError> {
        let mut config = config.unwrap_or_default();
        config.method = Some(method);
        config.url = url.to_string();
        config.data = data;
        self.request(config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::testing::{Fake, Script};

    fn client(fake: &Fake) -> Client {
        let mut client = Client::new(Dispatcher::new(fake.factory()));
        client.defaults_mut().base_url = Some("http://api.test".to_string());
        client
    }

    #[tokio::test]
    async fn get_uses_defaults() {
        let fake = Fake::new(Script::reply(200, r#"[1,2]"#));
        let response = client(&fake).get("/items", None).await.unwrap();

        assert_eq!(response.data, Payload::Json(serde_json::json!([1, 2])));
        let calls = fake.calls();
        assert_eq!(calls.opened, Some((Method::Get, "http://api.test/items".to_string())));
        assert!(calls.headers.iter().any(|(n, _)| n == "Accept"));
    }

    #[tokio::test]
    async fn post_carries_data_and_config() {
        let fake = Fake::new(Script::reply(201, "{}"));
        let config = RequestConfig::new("ignored").timeout(Duration::from_secs(2));
        client(&fake)
            .post("/items", serde_json::json!({"n": 1}), Some(config))
            .await
            .unwrap();

        let calls = fake.calls();
        assert_eq!(calls.opened, Some((Method::Post, "http://api.test/items".to_string())));
        assert_eq!(calls.timeout, Some(Duration::from_secs(2)));
        assert_eq!(calls.sent, Some(Payload::Text(r#"{"n":1}"#.into())));
    }

    #[tokio::test]
    async fn shorthands_set_their_method() {
        let fake = Fake::new(Script::reply(204, ""));
        let client = client(&fake);

        client.delete("/d", None).await.unwrap();
        assert_eq!(fake.calls().opened.as_ref().map(|o| o.0), Some(Method::Delete));
        client.head("/h", None).await.unwrap();
        assert_eq!(fake.calls().opened.as_ref().map(|o| o.0), Some(Method::Head));
        client.options("/o", None).await.unwrap();
        assert_eq!(fake.calls().opened.as_ref().map(|o| o.0), Some(Method::Options));
        client.put("/p", "x", None).await.unwrap();
        assert_eq!(fake.calls().opened.as_ref().map(|o| o.0), Some(Method::Put));
        client.patch("/p", "y", None).await.unwrap();
        assert_eq!(fake.calls().opened.as_ref().map(|o| o.0), Some(Method::Patch));
        assert_eq!(fake.calls().created, 5);
    }

    #[tokio::test]
    async fn form_bucket_applies_to_post_text() {
        let fake = Fake::new(Script::reply(200, ""));
        client(&fake).post("/form", "a=1&b=2", None).await.unwrap();
        let calls = fake.calls();
        let content_type = calls
            .headers
            .iter()
            .find(|(n, _)| n == "Content-Type")
            .map(|(_, v)| v.as_str());
        assert_eq!(content_type, Some(crate::config::DEFAULT_FORM_CONTENT_TYPE));
    }
}

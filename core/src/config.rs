//! The request descriptor and its defaults.
//!
//! # Design
//! `RequestConfig` is plain data plus a few shared callbacks (`Arc<dyn Fn>`),
//! so it is cheap to clone. Most fields are optional: `None` means "not
//! set here", which is what lets `merge_config` layer a request over client
//! defaults. Whatever is still unset when a dispatch runs falls back to the
//! `effective_*` accessors below.
//!
//! A dispatch takes its config by value and normalizes that owned copy, so
//! one config can never be shared by two in-flight dispatches. Clone it to
//! reuse it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::headers::Headers;
use crate::http::{Method, ResponseType};
use crate::payload::Payload;
use crate::transform::{self, Transform};
use crate::transport::ProgressEvent;
use crate::url::{ParamValue, Params, ParamsSerializer};

pub const DEFAULT_ACCEPT: &str = "application/json, text/plain, */*";
pub const DEFAULT_FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const DEFAULT_XSRF_COOKIE_NAME: &str = "XSRF-TOKEN";
pub const DEFAULT_XSRF_HEADER_NAME: &str = "X-XSRF-TOKEN";

pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;
pub type StatusValidator = Arc<dyn Fn(u16) -> bool + Send + Sync>;

/// Credentials sent as `Authorization: Basic ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// Success means 2xx.
pub fn default_validate_status(status: u16) -> bool {
    (200..300).contains(&status)
}

#[derive(Clone, Default)]
pub struct RequestConfig {
    pub url: String,
    pub base_url: Option<String>,
    pub method: Option<Method>,
    pub headers: Headers,
    pub data: Payload,
    pub params: Option<Params>,
    pub params_serializer: Option<ParamsSerializer>,
    pub transform_request: Option<Vec<Transform>>,
    pub transform_response: Option<Vec<Transform>>,
    /// Zero disables the timer.
    pub timeout: Option<Duration>,
    pub response_type: Option<ResponseType>,
    pub with_credentials: Option<bool>,
    pub xsrf_cookie_name: Option<String>,
    pub xsrf_header_name: Option<String>,
    pub auth: Option<BasicAuth>,
    pub on_upload_progress: Option<ProgressCallback>,
    pub on_download_progress: Option<ProgressCallback>,
    pub validate_status: Option<StatusValidator>,
    pub cancel_token: Option<CancelToken>,
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("url", &self.url)
            .field("base_url", &self.base_url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("data", &self.data)
            .field("params", &self.params)
            .field("timeout", &self.timeout)
            .field("response_type", &self.response_type)
            .field("with_credentials", &self.with_credentials)
            .field("xsrf_cookie_name", &self.xsrf_cookie_name)
            .field("xsrf_header_name", &self.xsrf_header_name)
            .field("auth", &self.auth.as_ref().map(|a| &a.username))
            .field("cancel_token", &self.cancel_token)
            .finish_non_exhaustive()
    }
}

impl RequestConfig {
    pub fn new(url: impl Into<String>) -> Self {
        RequestConfig {
            url: url.into(),
            ..RequestConfig::default()
        }
    }

    /// Client-wide defaults: standard `Accept`, form content type for
    /// body-carrying methods, JSON transforms both ways, the usual XSRF
    /// names and 2xx success.
    pub fn defaults() -> Self {
        let mut headers = Headers::new();
        headers.common.insert("Accept", DEFAULT_ACCEPT);
        for method in [Method::Post, Method::Put, Method::Patch] {
            headers
                .method_mut(method)
                .insert("Content-Type", DEFAULT_FORM_CONTENT_TYPE);
        }
        RequestConfig {
            headers,
            transform_request: Some(vec![transform::json_request()]),
            transform_response: Some(vec![transform::json_response()]),
            timeout: Some(Duration::ZERO),
            xsrf_cookie_name: Some(DEFAULT_XSRF_COOKIE_NAME.to_string()),
            xsrf_header_name: Some(DEFAULT_XSRF_HEADER_NAME.to_string()),
            validate_status: Some(Arc::new(default_validate_status)),
            ..RequestConfig::default()
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.own.insert(name, value);
        self
    }

    pub fn data(mut self, data: impl Into<Payload>) -> Self {
        self.data = data.into();
        self
    }

    /// Add one query parameter. A pre-serialized query is replaced.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.get_or_insert_with(Params::new).push(key, value);
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    pub fn params_serializer(mut self, serializer: impl Fn(&Params) -> String + Send + Sync + 'static) -> Self {
        self.params_serializer = Some(Arc::new(serializer));
        self
    }

    pub fn transform_request(mut self, transforms: Vec<Transform>) -> Self {
        self.transform_request = Some(transforms);
        self
    }

    pub fn transform_response(mut self, transforms: Vec<Transform>) -> Self {
        self.transform_response = Some(transforms);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    pub fn with_credentials(mut self, enabled: bool) -> Self {
        self.with_credentials = Some(enabled);
        self
    }

    pub fn xsrf(mut self, cookie_name: impl Into<String>, header_name: impl Into<String>) -> Self {
        self.xsrf_cookie_name = Some(cookie_name.into());
        self.xsrf_header_name = Some(header_name.into());
        self
    }

    pub fn auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(BasicAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn on_upload_progress(mut self, callback: impl Fn(&ProgressEvent) + Send + Sync + 'static) -> Self {
        self.on_upload_progress = Some(Arc::new(callback));
        self
    }

    pub fn on_download_progress(mut self, callback: impl Fn(&ProgressEvent) + Send + Sync + 'static) -> Self {
        self.on_download_progress = Some(Arc::new(callback));
        self
    }

    pub fn validate_status(mut self, validator: impl Fn(u16) -> bool + Send + Sync + 'static) -> Self {
        self.validate_status = Some(Arc::new(validator));
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn effective_method(&self) -> Method {
        self.method.unwrap_or_default()
    }

    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(Duration::ZERO)
    }

    pub fn effective_response_type(&self) -> ResponseType {
        self.response_type.unwrap_or_default()
    }

    pub fn is_status_valid(&self, status: u16) -> bool {
        match &self.validate_status {
            Some(validator) => validator(status),
            None => default_validate_status(status),
        }
    }
}

/// Layer `config` over `defaults`. A field set on `config` wins; header
/// buckets merge entry by entry with `config` winning on collision.
pub fn merge_config(defaults: &RequestConfig, config: RequestConfig) -> RequestConfig {
    let mut headers = defaults.headers.clone();
    headers.merge(&config.headers);

    RequestConfig {
        url: config.url,
        base_url: config.base_url.or_else(|| defaults.base_url.clone()),
        method: config.method.or(defaults.method),
        headers,
        data: match config.data {
            Payload::Null => defaults.data.clone(),
            data => data,
        },
        params: config.params.or_else(|| defaults.params.clone()),
        params_serializer: config
            .params_serializer
            .or_else(|| defaults.params_serializer.clone()),
        transform_request: config
            .transform_request
            .or_else(|| defaults.transform_request.clone()),
        transform_response: config
            .transform_response
            .or_else(|| defaults.transform_response.clone()),
        timeout: config.timeout.or(defaults.timeout),
        response_type: config.response_type.or(defaults.response_type),
        with_credentials: config.with_credentials.or(defaults.with_credentials),
        xsrf_cookie_name: config
            .xsrf_cookie_name
            .or_else(|| defaults.xsrf_cookie_name.clone()),
        xsrf_header_name: config
            .xsrf_header_name
            .or_else(|| defaults.xsrf_header_name.clone()),
        auth: config.auth.or_else(|| defaults.auth.clone()),
        on_upload_progress: config
            .on_upload_progress
            .or_else(|| defaults.on_upload_progress.clone()),
        on_download_progress: config
            .on_download_progress
            .or_else(|| defaults.on_download_progress.clone()),
        validate_status: config
            .validate_status
            .or_else(|| defaults.validate_status.clone()),
        cancel_token: config.cancel_token.or_else(|| defaults.cancel_token.clone()),
    }
}

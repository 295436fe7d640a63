//! The dispatch pipeline.
//!
//! # Design
//! `dispatch` owns its config. It normalizes that value (absolute URL with
//! query, transformed payload, flattened headers), hands it to the adapter
//! for one exchange, then runs the response transforms. The resolved
//! config travels with the `Response` or `DispatchError` so callers can see
//! exactly what was sent.

use std::sync::Arc;

use uuid::Uuid;

use crate::adapter::{self, Environment};
use crate::config::RequestConfig;
use crate::cookie::CookieStore;
use crate::error::DispatchError;
use crate::headers::Headers;
use crate::response::Response;
use crate::transform::{self, TransformError};
use crate::transport::TransportFactory;
use crate::url;

#[derive(Clone)]
pub struct Dispatcher {
    factory: Arc<dyn TransportFactory>,
    env: Environment,
}

impl Dispatcher {
    pub fn new(factory: impl TransportFactory + 'static) -> Self {
        Dispatcher {
            factory: Arc::new(factory),
            env: Environment::default(),
        }
    }

    /// Origin of the calling page. Targets with the same scheme, host and
    /// port are same-origin and get the XSRF header.
    pub fn with_origin(mut self, origin: ::url::Url) -> Self {
        self.env.origin = Some(origin);
        self
    }

    pub fn with_cookies(mut self, cookies: impl CookieStore + 'static) -> Self {
        self.env.cookies = Some(Arc::new(cookies));
        self
    }

    /// Perform one request. Settles exactly once.
    pub async fn dispatch(&self, config: RequestConfig) -> Result<Response, DispatchError> {
        let id = Uuid::new_v4();

        if let Some(reason) = config.cancel_token.as_ref().and_then(|t| t.reason()) {
            log::debug!("dispatch {id}: cancelled before start: {reason}");
            return Err(DispatchError::cancelled(Arc::new(config), reason, None));
        }

        let mut config = config;
        if let Err(err) = normalize(&mut config) {
            log::debug!("dispatch {id}: request transform failed: {err}");
            return Err(DispatchError::transform(Arc::new(config), &err, None));
        }
        log::debug!("dispatch {id}: {} {}", config.effective_method(), config.url);

        let transport = self.factory.create();
        let result = match adapter::exchange(id, config, transport, &self.env).await {
            Ok(mut response) => match transform_response(&mut response) {
                Ok(()) => Ok(response),
                Err(err) => Err(DispatchError::transform(
                    response.config.clone(),
                    &err,
                    Some(response.request.clone()),
                )),
            },
            Err(mut err) => {
                if let Some(response) = err.response.as_deref_mut() {
                    if let Err(transform_err) = transform_response(response) {
                        log::debug!("dispatch {id}: error body left untransformed: {transform_err}");
                    }
                }
                Err(err)
            }
        };

        match &result {
            Ok(response) => log::debug!("dispatch {id}: {} {}", response.status, response.status_text),
            Err(err) => log::debug!("dispatch {id}: failed: {err}"),
        }
        result
    }
}

/// Resolve the URL, run the request transforms over the payload and the
/// request's own headers, then flatten the header buckets for the method.
fn normalize(config: &mut RequestConfig) -> Result<(), TransformError> {
    let resolved = url::resolve(config.base_url.as_deref(), &config.url);
    config.url = url::build_url(
        &resolved,
        config.params.as_ref(),
        config.params_serializer.as_ref(),
    );

    let data = std::mem::take(&mut config.data);
    let transforms = config.transform_request.as_deref().unwrap_or_default();
    config.data = transform::apply(data, &mut config.headers.own, transforms)?;

    let method = config.effective_method();
    config.headers = Headers::from(config.headers.flatten(method));
    Ok(())
}

/// Run the response transforms. On failure `response` is left untouched.
fn transform_response(response: &mut Response) -> Result<(), TransformError> {
    let config = response.config.clone();
    let transforms = config.transform_response.as_deref().unwrap_or_default();
    let mut headers = response.headers.clone();
    response.data = transform::apply(response.data.clone(), &mut headers, transforms)?;
    response.headers = headers;
    Ok(())
}

//! REST transport seam and the typed API client
//!
//! The backend wraps every payload as `{ "data": ... }`. `Transport` hands the
//! raw envelope back; `ApiClient` decodes `data` into the caller's type.

use crate::errors::TransportError;
use futures::future::LocalBoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::Envelope;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            params: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            params: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_params(mut self, params: impl IntoIterator<Item = (String, String)>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Sends requests to the backend. Implemented by the HTTP layer of the host
/// application; the view-state layer only depends on this trait.
pub trait Transport {
    fn request(&self, request: Request)
    -> LocalBoxFuture<'static, Result<Envelope<Value>, TransportError>>;
}

#[derive(Clone)]
pub struct ApiClient {
    transport: Rc<dyn Transport>,
}

impl ApiClient {
    pub fn new(transport: Rc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Sends `request` and decodes the envelope's `data` as `T`.
    ///
    /// The returned future owns everything it needs, so it can outlive the
    /// client and be handed to a reconciler.
    pub fn send<T: DeserializeOwned + 'static>(
        &self,
        request: Request,
    ) -> LocalBoxFuture<'static, Result<T, TransportError>> {
        let response = self.transport.request(request);
        Box::pin(async move {
            let envelope = response.await?;
            serde_json::from_value(envelope.into_data())
                .map_err(|error| TransportError::invalid_payload(&error))
        })
    }

    pub fn get<T: DeserializeOwned + 'static>(
        &self,
        path: &str,
        params: Vec<(String, String)>,
    ) -> LocalBoxFuture<'static, Result<T, TransportError>> {
        self.send(Request::get(path).with_params(params))
    }

    pub fn post<B: Serialize, T: DeserializeOwned + 'static>(
        &self,
        path: &str,
        body: &B,
    ) -> LocalBoxFuture<'static, Result<T, TransportError>> {
        match serde_json::to_value(body) {
            Ok(body) => self.send(Request::post(path, body)),
            Err(error) => {
                let error = TransportError::invalid_payload(&error);
                Box::pin(async move { Err(error) })
            }
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").finish_non_exhaustive()
    }
}

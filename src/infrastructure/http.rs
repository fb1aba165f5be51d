use crate::infrastructure::error::ApiError;
use async_trait::async_trait;
use reqwest::{Client, Method};
use url::Url;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(url: Url, body: &serde_json::Value) -> Result<Self, ApiError> {
        let encoded = serde_json::to_vec(body)
            .map_err(|error| ApiError::Decoding(format!("failed to encode request body: {error}")))?;
        Ok(Self {
            method: Method::POST,
            url,
            headers: vec![(CONTENT_TYPE_HEADER.to_string(), JSON_CONTENT_TYPE.to_string())],
            body: Some(encoded),
        })
    }

    pub fn with_bearer(mut self, token: &str) -> Self {
        self.headers
            .push((AUTHORIZATION_HEADER.to_string(), format!("Bearer {token}")));
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Classifies the HTTP result: 2xx yields the body, 401 is the retryable
    /// authorisation failure, everything else is a plain HTTP error.
    pub fn into_body(self) -> Result<Vec<u8>, ApiError> {
        match self.status {
            200..=299 => Ok(self.body),
            401 => Err(ApiError::HttpUnauthorised),
            code => Err(ApiError::HttpError(code)),
        }
    }
}

/// The single seam to the network. Production uses [`ReqwestTransport`];
/// tests substitute a scripted in-memory double at construction.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut builder = self.client.request(request.method, request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                ApiError::Timeout
            } else {
                ApiError::Network(error.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|_| ApiError::InvalidResponse)?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    /// Scripted transport double: responses are served in FIFO order and
    /// every request is recorded. When gated, a request is recorded
    /// immediately but its response is held until the gate is released.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<HttpResponse, ApiError>>>,
        requests: Mutex<Vec<HttpRequest>>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::default()
            }
        }

        pub(crate) fn push_response(&self, response: Result<HttpResponse, ApiError>) {
            self.responses
                .lock()
                .expect("responses mutex poisoned")
                .push_back(response);
        }

        pub(crate) fn push_json(&self, status: u16, body: serde_json::Value) {
            self.push_response(Ok(HttpResponse {
                status,
                body: serde_json::to_vec(&body).expect("encode scripted body"),
            }));
        }

        pub(crate) fn requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("requests mutex poisoned")
                .clone()
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests
                .lock()
                .expect("requests mutex poisoned")
                .len()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.requests
                .lock()
                .expect("requests mutex poisoned")
                .push(request);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.responses
                .lock()
                .expect("responses mutex poisoned")
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Network("no scripted response".to_string())))
        }
    }
}

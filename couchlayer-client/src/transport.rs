//! The injected transport seam.
//!
//! Every remote call goes through the [`Transport`] trait, so the request
//! executor can be exercised against a scripted transport in tests and the
//! HTTP specifics stay in one place. The default implementation is
//! [`HttpTransport`] over reqwest.

use std::fmt::Debug;

use async_trait::async_trait;
use couchlayer_core::error::{Error, Result};
use reqwest::Method;

use crate::config::ClientConfig;

/// One fully-built database request, ready to be sent.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// The raw outcome of a request: status code and the complete body.
///
/// The body is always read to completion by the transport, so the
/// underlying connection is released regardless of the outcome.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Abstract synchronous request/response transport to the document store.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Sends one request and returns the raw response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when the server cannot be reached and
    /// [`Error::Io`] when the response body cannot be read. Non-2xx
    /// statuses are not errors at this level; classification happens in
    /// the request executor.
    async fn send(&self, req: TransportRequest) -> Result<TransportResponse>;
}

/// The default transport: reqwest with basic-auth credentials from the
/// client configuration.
#[derive(Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    username: Option<String>,
    password: Option<String>,
}

impl HttpTransport {
    /// Builds the HTTP transport from the client configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the reqwest client cannot be initialized.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| Error::Connection(err.to_string()))?;
        Ok(Self {
            http,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, req: TransportRequest) -> Result<TransportResponse> {
        let mut builder = self.http.request(req.method, &req.url);
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_deref());
        }
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = req.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| Error::Connection(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| Error::Io(err.to_string()))?
            .to_vec();
        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde_json::Value;

    use super::*;

    /// A scripted transport: responses are popped in order, every request
    /// is recorded for call-sequence assertions.
    #[derive(Debug, Default)]
    pub(crate) struct MockTransport {
        replies: Mutex<VecDeque<Result<TransportResponse>>>,
        calls: Mutex<Vec<TransportRequest>>,
    }

    impl MockTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn push_json(&self, status: u16, body: Value) {
            self.replies
                .lock()
                .unwrap()
                .push_back(Ok(TransportResponse {
                    status,
                    body: body.to_string().into_bytes(),
                }));
        }

        pub(crate) fn push_error(&self, err: Error) {
            self.replies.lock().unwrap().push_back(Err(err));
        }

        pub(crate) fn calls(&self) -> Vec<TransportRequest> {
            self.calls.lock().unwrap().clone()
        }

        /// The recorded sequence as `(method, path-and-query)` pairs, with
        /// the base URL stripped.
        pub(crate) fn call_summary(&self) -> Vec<(String, String)> {
            self.calls()
                .iter()
                .map(|req| {
                    let path = req
                        .url
                        .split_once(":5984/")
                        .map(|(_, path)| path)
                        .unwrap_or(&req.url);
                    (req.method.to_string(), path.to_string())
                })
                .collect()
        }

        pub(crate) fn body_of(&self, index: usize) -> Option<Value> {
            self.calls()
                .get(index)
                .and_then(|req| req.body.as_deref().map(|b| serde_json::from_slice(b).unwrap()))
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, req: TransportRequest) -> Result<TransportResponse> {
            self.calls.lock().unwrap().push(req);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("mock transport ran out of scripted responses")
        }
    }
}

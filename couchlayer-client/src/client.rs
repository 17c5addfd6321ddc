//! The request executor: builds and issues one database operation.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use couchlayer_core::error::{Error, Result};
use couchlayer_core::event::Notifier;
use couchlayer_core::naming::{DatabaseRef, make_db_name};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::{ClientBuilder, ClientConfig};
use crate::transport::{Transport, TransportRequest};

/// Requests slower than this are logged as a warning.
const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(10);

/// A CouchDB client: the request executor plus every document, view and
/// query operation built on top of it.
///
/// The client is constructed once through [`ClientBuilder`], is immutable,
/// and is shared freely across tasks.
pub struct Client {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    notifier: Notifier,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("couch_url", &self.config.couch_url)
            .field("transport", &self.transport)
            .finish()
    }
}

impl Client {
    /// Starts building a client for the given CouchDB base URL.
    pub fn builder(couch_url: &str) -> ClientBuilder {
        ClientBuilder::new(couch_url)
    }

    pub(crate) fn new(config: ClientConfig, transport: Arc<dyn Transport>, notifier: Notifier) -> Self {
        Self { config, transport, notifier }
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    fn build_url(&self, db: &DatabaseRef, doctype: &str, path: &str) -> String {
        if doctype.is_empty() {
            format!("{}{path}", self.config.couch_url)
        } else {
            format!("{}{}/{path}", self.config.couch_url, make_db_name(db, doctype))
        }
    }

    /// Issues one request and returns the raw response body.
    ///
    /// The body, when present, is serialized to JSON; non-2xx responses are
    /// classified through the error taxonomy. One structured log line is
    /// emitted per request, with the body redacted for sensitive doctypes.
    pub(crate) async fn execute(
        &self,
        db: &DatabaseRef,
        doctype: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: &[(&str, &str)],
    ) -> Result<Vec<u8>> {
        let payload = match &body {
            Some(body) => Some(serde_json::to_vec(body)?),
            None => None,
        };

        let redacted = self
            .config
            .redact_doctypes
            .iter()
            .any(|sensitive| sensitive == doctype);
        if redacted {
            debug!(
                domain = %db.domain_name(),
                nspace = "couchdb",
                "request: {method} {path} [redacted]",
            );
        } else {
            debug!(
                domain = %db.domain_name(),
                nspace = "couchdb",
                "request: {method} {path} {}",
                body.as_ref().map(|body| body.to_string()).unwrap_or_default(),
            );
        }

        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        if payload.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        for (name, value) in extra_headers {
            headers.push((name.to_string(), value.to_string()));
        }

        let request = TransportRequest {
            method: method.clone(),
            url: self.build_url(db, doctype, path),
            headers,
            body: payload,
        };

        let start = Instant::now();
        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => {
                error!(domain = %db.domain_name(), nspace = "couchdb", "{err}");
                return Err(err);
            }
        };
        let elapsed = start.elapsed();
        if elapsed >= SLOW_REQUEST_THRESHOLD {
            warn!(
                domain = %db.domain_name(),
                nspace = "couchdb",
                "slow request on {method} {path} ({elapsed:?})",
            );
        }

        if !(200..300).contains(&response.status) {
            let err = Error::from_response(response.status, &response.body);
            debug!(domain = %db.domain_name(), nspace = "couchdb", "{err}");
            return Err(err);
        }
        Ok(response.body)
    }

    /// Issues one request and decodes the response body.
    pub(crate) async fn request<R: DeserializeOwned>(
        &self,
        db: &DatabaseRef,
        doctype: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<R> {
        let bytes = self.execute(db, doctype, method, path, body, &[]).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Issues one request, ignoring the response body.
    pub(crate) async fn request_unit(
        &self,
        db: &DatabaseRef,
        doctype: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<()> {
        self.execute(db, doctype, method, path, body, &[]).await?;
        Ok(())
    }
}

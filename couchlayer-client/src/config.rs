//! Client configuration.
//!
//! The configuration is built once through [`ClientBuilder`] and owned by
//! the [`Client`](crate::client::Client); it is immutable afterwards. There
//! is no process-global state.

use std::sync::Arc;
use std::time::Duration;

use couchlayer_core::error::Result;
use couchlayer_core::event::{ChangeEvent, ChangeHook, Notifier};
use tokio::sync::mpsc;

use crate::client::Client;
use crate::transport::{HttpTransport, Transport};

/// Configuration of a CouchDB client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the CouchDB server, with a trailing slash.
    pub couch_url: String,
    /// Optional basic-auth username.
    pub username: Option<String>,
    /// Optional basic-auth password.
    pub password: Option<String>,
    /// Per-request transport deadline.
    pub timeout: Duration,
    /// Doctypes whose request bodies are never written to the logs.
    pub redact_doctypes: Vec<String>,
    /// Create databases with a single shard and a single replica
    /// (`?q=1&n=1`). Useful for development setups, never for production.
    pub small_shards: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            couch_url: "http://localhost:5984/".to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(60),
            redact_doctypes: Vec::new(),
            small_shards: false,
        }
    }
}

/// Builder for [`Client`] instances.
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    notifier: Notifier,
}

impl ClientBuilder {
    /// Creates a builder targeting the given CouchDB base URL.
    pub fn new(couch_url: &str) -> Self {
        let mut config = ClientConfig::default();
        config.couch_url = if couch_url.ends_with('/') {
            couch_url.to_string()
        } else {
            format!("{couch_url}/")
        };
        Self {
            config,
            transport: None,
            notifier: Notifier::new(),
        }
    }

    /// Sets basic-auth credentials attached to every request.
    pub fn basic_auth(mut self, username: &str, password: &str) -> Self {
        self.config.username = Some(username.to_string());
        self.config.password = Some(password.to_string());
        self
    }

    /// Sets the per-request transport deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Marks a doctype as sensitive: its request bodies are redacted from
    /// the logs.
    pub fn redact_doctype(mut self, doctype: &str) -> Self {
        self.config.redact_doctypes.push(doctype.to_string());
        self
    }

    /// Creates databases with single-shard parameters (`?q=1&n=1`).
    pub fn small_shards(mut self, small_shards: bool) -> Self {
        self.config.small_shards = small_shards;
        self
    }

    /// Injects a custom transport instead of the default HTTP one.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Registers a change hook, run synchronously on every mutation.
    pub fn hook(mut self, hook: Box<dyn ChangeHook>) -> Self {
        self.notifier.register_hook(hook);
        self
    }

    /// Sets the channel on which change events are published. The sending
    /// side never blocks; the mutation path does not wait on the receiver.
    pub fn event_sink(mut self, sink: mpsc::UnboundedSender<ChangeEvent>) -> Self {
        self.notifier.set_sink(sink);
        self
    }

    /// Builds the client, constructing the default [`HttpTransport`] when
    /// none was injected.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be initialized.
    pub fn build(self) -> Result<Client> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config)?),
        };
        Ok(Client::new(self.config, transport, self.notifier))
    }
}

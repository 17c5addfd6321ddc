//! HTTP client for the couchlayer project.
//!
//! This crate implements the [`Client`]: the request executor plus the
//! document lifecycle, database provisioning, view and index definition and
//! the query surface, over an injectable [`Transport`].
//!
//! # Example
//!
//! ```ignore
//! use couchlayer_client::Client;
//! use couchlayer_core::document::JsonDoc;
//! use couchlayer_core::naming::DatabaseRef;
//!
//! let client = Client::builder("http://localhost:5984")
//!     .basic_auth("admin", "password")
//!     .build()?;
//!
//! let db = DatabaseRef::new("alice.example.com", "cozyb1e91f91");
//! let mut doc = JsonDoc::new("io.cozy.events");
//! client.create_doc(&db, &mut doc).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as couchlayer_client;

pub mod client;
pub mod config;
pub mod transport;

mod design;
mod lifecycle;
mod query;

pub use client::Client;
pub use config::{ClientBuilder, ClientConfig};
pub use transport::{HttpTransport, Transport, TransportRequest, TransportResponse};

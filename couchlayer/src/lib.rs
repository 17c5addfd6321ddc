//! Main couchlayer crate: a typed CouchDB client layer with a revision-safe
//! document lifecycle.
//!
//! This crate is the primary entry point for users of the couchlayer project.
//! It re-exports the core types and the HTTP client from the sub-crates.
//!
//! # Features
//!
//! - **Revision-safe document lifecycle** - Create, update, delete and upsert
//!   documents with explicit revision tokens, never silently overwriting
//! - **Per-tenant databases** - Every doctype lives in its own database,
//!   provisioned lazily on first write
//! - **Idempotent views and indexes** - Declarative definitions that are safe
//!   to replay at every startup
//! - **Closed error taxonomy** - Every remote failure resolves to one
//!   classified error, and all recovery logic works on predicates
//! - **Change events** - Every mutation publishes a before/after pair on a
//!   non-blocking channel
//!
//! # Quick Start
//!
//! ```ignore
//! use couchlayer::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Event {
//!     #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
//!     pub id: String,
//!     #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
//!     pub rev: String,
//!     pub title: String,
//! }
//!
//! impl Document for Event {
//!     fn id(&self) -> &str { &self.id }
//!     fn rev(&self) -> &str { &self.rev }
//!     fn doctype(&self) -> &str { "io.cozy.events" }
//!     fn set_id(&mut self, id: &str) { self.id = id.to_string(); }
//!     fn set_rev(&mut self, rev: &str) { self.rev = rev.to_string(); }
//! }
//!
//! #[tokio::main]
//! async fn main() -> couchlayer::error::Result<()> {
//!     let client = Client::builder("http://localhost:5984")
//!         .basic_auth("admin", "password")
//!         .build()?;
//!
//!     let db = DatabaseRef::new("alice.example.com", "cozyb1e91f91");
//!     let mut event = Event {
//!         id: String::new(),
//!         rev: String::new(),
//!         title: "meeting".to_string(),
//!     };
//!
//!     // The database is created on the fly if it does not exist yet.
//!     client.create_doc(&db, &mut event).await?;
//!
//!     event.title = "meeting (moved)".to_string();
//!     client.update_doc(&db, &mut event).await?;
//!
//!     client.delete_doc(&db, &mut event).await?;
//!     Ok(())
//! }
//! ```

pub mod prelude;

pub use couchlayer_core::{document, error, event, naming, request, view};

pub use couchlayer_client::{Client, ClientBuilder, ClientConfig, HttpTransport, Transport};

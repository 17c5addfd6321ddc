//! Convenient re-exports of commonly used types from couchlayer.
//!
//! Import this prelude module to quickly access the most frequently used
//! types and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use couchlayer::prelude::*;
//! ```

pub use couchlayer_core::{
    document::{Document, DocumentExt, JsonDoc},
    error::{Error, Result},
    event::{ChangeEvent, ChangeHook, EventVerb, Notifier},
    naming::DatabaseRef,
    request::{FindRequest, FindResponse, ViewRequest, ViewResponse},
    view::{DesignDoc, Index, View},
};

pub use couchlayer_client::{Client, ClientBuilder, ClientConfig, Transport};

//! Core traits and types for document representation and serialization.
//!
//! This module provides the fundamental contract that all stored documents must
//! implement, plus [`JsonDoc`], a map-backed document for working with untyped
//! JSON objects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, from_value, to_value};

use crate::error::{Error, Result};

/// Core trait that every document stored in CouchDB must implement.
///
/// A document exposes its identifier, its revision token and its doctype, and
/// lets the lifecycle layer write the store-assigned identifier and revision
/// back after a successful remote operation. The `Clone` bound supplies the
/// deep-clone capability used to capture before-images for change events.
///
/// # Example
///
/// ```ignore
/// use couchlayer::document::Document;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Event {
///     #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
///     pub id: String,
///     #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
///     pub rev: String,
///     pub title: String,
/// }
///
/// impl Document for Event {
///     fn id(&self) -> &str {
///         &self.id
///     }
///
///     fn rev(&self) -> &str {
///         &self.rev
///     }
///
///     fn doctype(&self) -> &str {
///         "io.cozy.events"
///     }
///
///     fn set_id(&mut self, id: &str) {
///         self.id = id.to_string();
///     }
///
///     fn set_rev(&mut self, rev: &str) {
///         self.rev = rev.to_string();
///     }
/// }
/// ```
pub trait Document: Serialize + for<'de> Deserialize<'de> + Send + Sync + Clone + 'static {
    /// Returns the identifier of the document, or `""` when it has none yet.
    fn id(&self) -> &str;

    /// Returns the current revision token, or `""` before the first write.
    fn rev(&self) -> &str;

    /// Returns the doctype of the document (e.g. `"io.cozy.events"`).
    fn doctype(&self) -> &str;

    /// Sets the identifier. An empty string clears it.
    fn set_id(&mut self, id: &str);

    /// Sets the revision token. An empty string clears it.
    fn set_rev(&mut self, rev: &str);
}

/// Extension trait providing JSON conversion utilities for documents.
///
/// Automatically implemented for all types that implement [`Document`].
pub trait DocumentExt: Document {
    /// Converts this document to a JSON value for the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn to_json(&self) -> Result<Value>;

    /// Creates a document from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails or the structure is invalid.
    fn from_json(value: Value) -> Result<Self>;
}

impl<D: Document> DocumentExt for D {
    fn to_json(&self) -> Result<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> Result<Self> {
        Ok(from_value(value)?)
    }
}

/// Checks that an identifier is acceptable for a caller-initiated operation.
///
/// Identifiers starting with `_` are reserved for CouchDB internals
/// (`_design/…`, `_local/…`) and are rejected before any network call.
///
/// # Errors
///
/// Returns [`Error::BadId`] for a reserved identifier.
pub fn validate_doc_id(id: &str) -> Result<()> {
    if id.starts_with('_') {
        return Err(Error::BadId(id.to_string()));
    }
    Ok(())
}

/// A document backed by a plain JSON map.
///
/// `JsonDoc` implements [`Document`] over a `serde_json` object, reading and
/// writing the `_id` and `_rev` entries of the map. The doctype is carried
/// out-of-band: it is never serialized into the stored object, and on
/// deserialization a `_type` entry, when present, is extracted into it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonDoc {
    /// The underlying JSON object.
    pub m: Map<String, Value>,
    /// The doctype, kept outside of the stored fields.
    pub doctype: String,
}

impl JsonDoc {
    /// Creates an empty document with the given doctype.
    pub fn new(doctype: &str) -> Self {
        Self {
            m: Map::new(),
            doctype: doctype.to_string(),
        }
    }

    /// Returns the value of one of the document fields, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.m.get(key)
    }

    /// Returns the internal map including the doctype under `_type`.
    ///
    /// Used when a document crosses an API boundary where the doctype must
    /// travel with the payload.
    pub fn to_map_with_type(&self) -> Map<String, Value> {
        let mut m = self.m.clone();
        m.insert("_type".to_string(), Value::String(self.doctype.clone()));
        m
    }
}

impl Document for JsonDoc {
    fn id(&self) -> &str {
        self.m
            .get("_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    fn rev(&self) -> &str {
        self.m
            .get("_rev")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    fn doctype(&self) -> &str {
        &self.doctype
    }

    fn set_id(&mut self, id: &str) {
        if id.is_empty() {
            self.m.remove("_id");
        } else {
            self.m
                .insert("_id".to_string(), Value::String(id.to_string()));
        }
    }

    fn set_rev(&mut self, rev: &str) {
        if rev.is_empty() {
            self.m.remove("_rev");
        } else {
            self.m
                .insert("_rev".to_string(), Value::String(rev.to_string()));
        }
    }
}

impl Serialize for JsonDoc {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.m.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for JsonDoc {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let mut m = Map::<String, Value>::deserialize(deserializer)?;
        let doctype = match m.remove("_type") {
            Some(Value::String(doctype)) => doctype,
            _ => String::new(),
        };
        Ok(JsonDoc { m, doctype })
    }
}

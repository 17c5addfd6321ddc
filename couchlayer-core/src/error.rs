//! Error taxonomy for CouchDB operations.
//!
//! Every remote outcome resolves to exactly one variant of [`Error`] before
//! any business logic inspects it, and all retry/recovery decisions elsewhere
//! in the crate are expressed through the `is_*` predicates, never through
//! raw status codes.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// A specialized `Result` type for CouchDB operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The payload of a classified remote failure: the HTTP status, the `error`
/// and `reason` fields of the CouchDB error body, and, for find-index
/// failures, the serialized request that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCause {
    /// HTTP status code of the response.
    pub status: u16,
    /// The `error` field of the CouchDB error body.
    pub error: String,
    /// The `reason` field of the CouchDB error body.
    pub reason: String,
    /// The serialized original request, attached for index errors so callers
    /// can diagnose without a second round trip.
    pub original_request: Option<String>,
}

impl fmt::Display for RemoteCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CouchDB({}): {} {}", self.status, self.error, self.reason)
    }
}

/// All possible errors of a CouchDB operation.
///
/// Remote variants carry a [`RemoteCause`]; local validation variants are
/// returned before any network call is issued.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The document or the database does not exist (404). The missing
    /// database sub-case is distinguished by [`Error::is_no_database_error`].
    #[error("not found: {0}")]
    NotFound(RemoteCause),
    /// The write conflicts with the current revision of the document (409).
    #[error("conflict: {0}")]
    Conflict(RemoteCause),
    /// The target already exists, e.g. a database created twice (412).
    #[error("file exists: {0}")]
    FileExists(RemoteCause),
    /// The server failed (5xx). View reads retry this exactly once.
    #[error("internal server error: {0}")]
    InternalServerError(RemoteCause),
    /// Any other non-2xx response.
    #[error("couchdb error: {0}")]
    Remote(RemoteCause),
    /// The identifier starts with the reserved `_` character.
    #[error("invalid document id: {0}")]
    BadId(String),
    /// The caller supplied an identifier where none is allowed.
    #[error("the document id should be empty")]
    DefinedId,
    /// The document is missing fields required by the operation.
    #[error("invalid document: {0}")]
    InvalidDoc(String),
    /// A database-scoped operation was given an empty prefix.
    #[error("invalid database: {0}")]
    InvalidDatabase(String),
    /// The query went through but relies on an index that does not exist.
    #[error("the query is not optimized and requires an index")]
    Unoptimized,
    /// The request could not reach the server.
    #[error("connection error: {0}")]
    Connection(String),
    /// The response body could not be read.
    #[error("io error: {0}")]
    Io(String),
    /// A value could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Default, Deserialize)]
struct CouchPayload {
    #[serde(default)]
    error: String,
    #[serde(default)]
    reason: String,
}

impl Error {
    /// Classifies a non-2xx response from its status code and body.
    ///
    /// The body is expected to be a CouchDB `{error, reason}` object; any
    /// other payload is kept verbatim as the reason.
    pub fn from_response(status: u16, body: &[u8]) -> Error {
        let payload = serde_json::from_slice::<CouchPayload>(body).unwrap_or_else(|_| CouchPayload {
            error: "unknown".to_string(),
            reason: String::from_utf8_lossy(body).trim().to_string(),
        });
        let cause = RemoteCause {
            status,
            error: payload.error,
            reason: payload.reason,
            original_request: None,
        };
        match status {
            404 => Error::NotFound(cause),
            409 => Error::Conflict(cause),
            412 => Error::FileExists(cause),
            500..=599 => Error::InternalServerError(cause),
            _ if cause.error == "file_exists" => Error::FileExists(cause),
            _ => Error::Remote(cause),
        }
    }

    /// Returns the remote cause of this error, if it came from the server.
    pub fn remote_cause(&self) -> Option<&RemoteCause> {
        match self {
            Error::NotFound(cause)
            | Error::Conflict(cause)
            | Error::FileExists(cause)
            | Error::InternalServerError(cause)
            | Error::Remote(cause) => Some(cause),
            _ => None,
        }
    }

    /// Attaches the serialized original request to a remote error, appending
    /// it to the reason for display.
    pub fn with_original_request(mut self, request: String) -> Error {
        if let Some(cause) = self.remote_cause_mut() {
            cause.reason = format!("{} (original req: {request})", cause.reason);
            cause.original_request = Some(request);
        }
        self
    }

    fn remote_cause_mut(&mut self) -> Option<&mut RemoteCause> {
        match self {
            Error::NotFound(cause)
            | Error::Conflict(cause)
            | Error::FileExists(cause)
            | Error::InternalServerError(cause)
            | Error::Remote(cause) => Some(cause),
            _ => None,
        }
    }

    /// True for any 404, whether the document or the database is missing.
    pub fn is_not_found_error(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// True when the database itself does not exist, the recoverable
    /// sub-case of 404 that triggers lazy provisioning.
    pub fn is_no_database_error(&self) -> bool {
        match self {
            Error::NotFound(cause) => {
                cause.reason == "Database does not exist."
                    || cause.reason == "database_does_not_exist"
            }
            _ => false,
        }
    }

    /// True for a revision conflict (409).
    pub fn is_conflict_error(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// True when the target already exists (412 or a `file_exists` body).
    pub fn is_file_exists_error(&self) -> bool {
        matches!(self, Error::FileExists(_))
    }

    /// True when the query references a missing or invalid index.
    pub fn is_index_error(&self) -> bool {
        match self.remote_cause() {
            Some(cause) => cause.error == "no_usable_index" || cause.reason.contains("mango_idx"),
            None => false,
        }
    }

    /// True for a 5xx response.
    pub fn is_internal_server_error(&self) -> bool {
        matches!(self, Error::InternalServerError(_))
    }

    /// True for a locally detected reserved identifier.
    pub fn is_bad_id_error(&self) -> bool {
        matches!(self, Error::BadId(_))
    }

    /// True when an identifier was supplied where none is allowed.
    pub fn is_defined_id_error(&self) -> bool {
        matches!(self, Error::DefinedId)
    }

    /// True when the request never reached the server.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

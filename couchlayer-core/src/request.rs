//! Request and response envelopes of the CouchDB wire protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::naming::query_escape;

/// A selector-based `_find` request.
///
/// The selector is an opaque mango expression; building it is the concern of
/// the query-filter layer, not of this crate.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FindRequest {
    pub selector: Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub use_index: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bookmark: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub conflicts: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub execution_stats: bool,
}

/// The response of a `_find` request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FindResponse {
    #[serde(default)]
    pub warning: String,
    #[serde(default)]
    pub bookmark: String,
    #[serde(default)]
    pub docs: Vec<Value>,
    #[serde(default)]
    pub execution_stats: Option<ExecutionStats>,
}

/// Execution statistics returned by CouchDB on `_find` queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    #[serde(default)]
    pub total_keys_examined: u64,
    #[serde(default)]
    pub total_docs_examined: u64,
    #[serde(default)]
    pub total_quorum_docs_examined: u64,
    #[serde(default)]
    pub results_returned: u64,
    #[serde(default)]
    pub execution_time_ms: f64,
}

/// Normalizes the store's sentinel bookmark: CouchDB returns the literal
/// string `"nil"` when there is no document, which callers must see as the
/// empty bookmark.
pub fn normalize_bookmark(bookmark: &mut String) {
    if bookmark == "nil" {
        bookmark.clear();
    }
}

/// All parameters that can be passed to a view.
///
/// A request can be encoded either as URL query parameters (GET) or as a
/// JSON body (POST); an explicit `keys` list cannot be URL-encoded and
/// forces the POST form.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ViewRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_key: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_key: Option<Value>,
    #[serde(rename = "startkey_docid", skip_serializing_if = "Option::is_none")]
    pub start_key_doc_id: Option<String>,
    #[serde(rename = "endkey_docid", skip_serializing_if = "Option::is_none")]
    pub end_key_doc_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub descending: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_docs: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub inclusive_end: bool,
    pub reduce: bool,
    pub group: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_level: Option<u32>,
}

impl ViewRequest {
    /// Encodes the request as URL query parameters. Key values are
    /// JSON-encoded before percent-escaping, per the store's query syntax.
    /// The `keys` field is intentionally absent: it only travels in a body.
    pub fn query_string(&self) -> Result<String> {
        let mut pairs: Vec<(&str, String)> = Vec::new();
        if let Some(key) = &self.key {
            pairs.push(("key", serde_json::to_string(key)?));
        }
        if let Some(start_key) = &self.start_key {
            pairs.push(("start_key", serde_json::to_string(start_key)?));
        }
        if let Some(end_key) = &self.end_key {
            pairs.push(("end_key", serde_json::to_string(end_key)?));
        }
        if let Some(doc_id) = &self.start_key_doc_id {
            pairs.push(("startkey_docid", doc_id.clone()));
        }
        if let Some(doc_id) = &self.end_key_doc_id {
            pairs.push(("endkey_docid", doc_id.clone()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(skip) = self.skip {
            pairs.push(("skip", skip.to_string()));
        }
        if self.descending {
            pairs.push(("descending", "true".to_string()));
        }
        if self.include_docs {
            pairs.push(("include_docs", "true".to_string()));
        }
        if self.inclusive_end {
            pairs.push(("inclusive_end", "true".to_string()));
        }
        pairs.push(("reduce", self.reduce.to_string()));
        pairs.push(("group", self.group.to_string()));
        if let Some(level) = self.group_level.filter(|level| *level > 0) {
            pairs.push(("group_level", level.to_string()));
        }
        Ok(pairs
            .into_iter()
            .map(|(name, value)| format!("{name}={}", query_escape(&value)))
            .collect::<Vec<_>>()
            .join("&"))
    }
}

/// A single row of a view response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewResponseRow {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// The response received when executing a view.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewResponse {
    #[serde(rename = "total_rows", default)]
    pub total: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub rows: Vec<ViewResponseRow>,
}

/// The generic write result `{id, rev, ok}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub rev: String,
    #[serde(default)]
    pub ok: bool,
}

/// The response of the `_uuids` endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UuidsResponse {
    #[serde(default)]
    pub uuids: Vec<String>,
}

/// The purge sequence of a database: an integer before CouchDB 2.3 and an
/// opaque string since.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PurgeSeq {
    Number(u64),
    Sequence(String),
}

/// Database status: size, number of documents, sequence numbers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DbStatusResponse {
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub update_seq: String,
    #[serde(default)]
    pub sizes: DbSizes,
    #[serde(default)]
    pub purge_seq: Option<PurgeSeq>,
    #[serde(default)]
    pub doc_del_count: u64,
    #[serde(default)]
    pub doc_count: u64,
    #[serde(default)]
    pub disk_size: u64,
    #[serde(default)]
    pub disk_format_version: u32,
    #[serde(default)]
    pub data_size: u64,
    #[serde(default)]
    pub compact_running: bool,
    #[serde(default)]
    pub instance_start_time: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DbSizes {
    #[serde(default)]
    pub file: u64,
    #[serde(default)]
    pub external: u64,
    #[serde(default)]
    pub active: u64,
}

/// The response from CouchDB when creating an index.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexCreationResponse {
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A page of normal documents: every document of a database except the
/// internal design documents.
#[derive(Debug, Clone, Default)]
pub struct NormalDocsResponse {
    /// Exact number of normal documents in the database.
    pub total: usize,
    /// The documents of this page.
    pub rows: Vec<Value>,
    /// Cursor for the next page, empty on the last page.
    pub bookmark: String,
    /// Execution statistics, when requested.
    pub execution_stats: Option<ExecutionStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn view_request_always_carries_reduce_and_group() {
        let req = ViewRequest::default();
        assert_eq!(req.query_string().unwrap(), "reduce=false&group=false");
    }

    #[test]
    fn view_request_json_encodes_keys_in_the_url() {
        let req = ViewRequest {
            start_key: Some(json!(["io.cozy.events", "2016"])),
            limit: Some(10),
            include_docs: true,
            ..ViewRequest::default()
        };
        assert_eq!(
            req.query_string().unwrap(),
            "start_key=%5B%22io.cozy.events%22%2C%222016%22%5D&limit=10&include_docs=true&reduce=false&group=false"
        );
    }

    #[test]
    fn explicit_keys_never_appear_in_the_url() {
        let req = ViewRequest {
            keys: Some(vec![json!("a"), json!("b")]),
            ..ViewRequest::default()
        };
        assert!(!req.query_string().unwrap().contains("keys"));
    }

    #[test]
    fn nil_bookmark_is_normalized() {
        let mut bookmark = "nil".to_string();
        normalize_bookmark(&mut bookmark);
        assert_eq!(bookmark, "");

        let mut bookmark = "g1AAAA".to_string();
        normalize_bookmark(&mut bookmark);
        assert_eq!(bookmark, "g1AAAA");
    }

    #[test]
    fn purge_seq_parses_both_store_generations() {
        let old: DbStatusResponse =
            serde_json::from_value(json!({"db_name": "d", "purge_seq": 0})).unwrap();
        assert_eq!(old.purge_seq, Some(PurgeSeq::Number(0)));

        let new: DbStatusResponse =
            serde_json::from_value(json!({"db_name": "d", "purge_seq": "0-g1AAAA"})).unwrap();
        assert_eq!(new.purge_seq, Some(PurgeSeq::Sequence("0-g1AAAA".to_string())));
    }

    #[test]
    fn find_request_omits_unset_fields() {
        let req = FindRequest {
            selector: json!({"_id": {"$gte": null}}),
            limit: Some(100),
            ..FindRequest::default()
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"selector": {"_id": {"$gte": null}}, "limit": 100})
        );
    }
}

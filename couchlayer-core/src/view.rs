//! Map/reduce views, design documents and secondary index definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named map/reduce definition bound to a doctype.
///
/// The name and doctype are used for addressing only; the persisted body is
/// the map function and the optional reduce function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    /// Name of the view, also used as the design document name.
    #[serde(skip)]
    pub name: String,
    /// Doctype whose database holds the view.
    #[serde(skip)]
    pub doctype: String,
    /// The map function body.
    pub map: String,
    /// The optional reduce function body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
}

/// The `_design` container document persisting one or more views.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesignDoc {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
    pub rev: String,
    #[serde(rename = "language", default)]
    pub lang: String,
    #[serde(default)]
    pub views: BTreeMap<String, View>,
}

/// Compares two design documents field by field: language, view set, and
/// each view's map and reduce bodies. Used to decide whether a conflicting
/// design document write is a no-op.
pub fn equal_views(left: &DesignDoc, right: &DesignDoc) -> bool {
    if left.lang != right.lang || left.views.len() != right.views.len() {
        return false;
    }
    left.views.iter().all(|(name, view)| {
        right
            .views
            .get(name)
            .is_some_and(|other| view.map == other.map && view.reduce == other.reduce)
    })
}

/// A secondary-index definition bound to a doctype.
///
/// The request body is opaque to the client: it is submitted to `_index`
/// as-is and never compared or reconciled.
#[derive(Debug, Clone)]
pub struct Index {
    /// Doctype whose database holds the index.
    pub doctype: String,
    /// The raw `_index` request body.
    pub request: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn design(map: &str, reduce: Option<&str>) -> DesignDoc {
        let view = View {
            name: "by-date".to_string(),
            doctype: "io.cozy.events".to_string(),
            map: map.to_string(),
            reduce: reduce.map(str::to_string),
        };
        DesignDoc {
            id: "_design/by-date".to_string(),
            rev: String::new(),
            lang: "javascript".to_string(),
            views: BTreeMap::from([("by-date".to_string(), view)]),
        }
    }

    #[test]
    fn identical_views_are_equal_regardless_of_rev() {
        let mut old = design("function (doc) { emit(doc.date); }", None);
        old.rev = "2-abc".to_string();
        let new = design("function (doc) { emit(doc.date); }", None);
        assert!(equal_views(&old, &new));
    }

    #[test]
    fn changed_map_or_reduce_is_not_equal() {
        let old = design("function (doc) { emit(doc.date); }", None);
        assert!(!equal_views(&old, &design("function (doc) { emit(doc.id); }", None)));
        assert!(!equal_views(
            &old,
            &design("function (doc) { emit(doc.date); }", Some("_count"))
        ));
    }

    #[test]
    fn changed_language_or_view_set_is_not_equal() {
        let old = design("function (doc) { emit(doc.date); }", None);
        let mut other = design("function (doc) { emit(doc.date); }", None);
        other.lang = "erlang".to_string();
        assert!(!equal_views(&old, &other));

        let mut extra = design("function (doc) { emit(doc.date); }", None);
        let second = View {
            name: "other".to_string(),
            doctype: "io.cozy.events".to_string(),
            map: "function (doc) {}".to_string(),
            reduce: None,
        };
        extra.views.insert("other".to_string(), second);
        assert!(!equal_views(&old, &extra));
    }

    #[test]
    fn view_serializes_only_its_body() {
        let view = View {
            name: "by-date".to_string(),
            doctype: "io.cozy.events".to_string(),
            map: "function (doc) { emit(doc.date); }".to_string(),
            reduce: None,
        };
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            serde_json::json!({"map": "function (doc) { emit(doc.date); }"})
        );
    }
}

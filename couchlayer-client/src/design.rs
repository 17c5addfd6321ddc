//! Idempotent definition of views and secondary indexes.
//!
//! Definitions are declarative and safe to replay at every startup: an
//! unchanged view resolves a write conflict by comparison, a changed one is
//! overwritten with the stored revision.

use std::collections::BTreeMap;

use couchlayer_core::error::Result;
use couchlayer_core::naming::DatabaseRef;
use couchlayer_core::request::IndexCreationResponse;
use couchlayer_core::view::{DesignDoc, Index, View, equal_views};
use futures::future::join_all;
use reqwest::Method;
use serde_json::Value;
use tracing::{error, warn};

use crate::client::Client;

impl Client {
    /// Defines one view, provisioning its database when missing.
    ///
    /// The write is idempotent: a conflict against an identical stored view
    /// succeeds without a write, a changed view overwrites the stored one at
    /// its current revision.
    pub async fn define_view(&self, db: &DatabaseRef, view: &View) -> Result<()> {
        let id = format!("_design/{}", view.name);
        let design = DesignDoc {
            id: id.clone(),
            rev: String::new(),
            lang: "javascript".to_string(),
            views: BTreeMap::from([(view.name.clone(), view.clone())]),
        };
        let path = format!("_design/{}", view.name);
        let body = serde_json::to_value(&design)?;

        let mut outcome = self
            .request_unit(db, &view.doctype, Method::PUT, &path, Some(body.clone()))
            .await;
        if let Err(err) = &outcome {
            if err.is_no_database_error() {
                match self.create_db(db, &view.doctype).await {
                    Ok(()) => {}
                    Err(err) if err.is_file_exists_error() => {}
                    Err(err) => return Err(err),
                }
                outcome = self
                    .request_unit(db, &view.doctype, Method::PUT, &path, Some(body))
                    .await;
            }
        }
        if let Err(err) = &outcome {
            if err.is_conflict_error() {
                let stored: DesignDoc = self.request(db, &view.doctype, Method::GET, &path, None).await?;
                if equal_views(&stored, &design) {
                    return Ok(());
                }
                let mut design = design;
                design.rev = stored.rev;
                let body = serde_json::to_value(&design)?;
                return self
                    .request_unit(db, &view.doctype, Method::PUT, &path, Some(body))
                    .await;
            }
        }
        outcome
    }

    /// Defines a batch of views concurrently.
    ///
    /// Every view is attempted regardless of the others; the first failure
    /// is returned after the whole batch has settled, and each failure is
    /// logged on its own.
    pub async fn define_views(&self, db: &DatabaseRef, views: &[View]) -> Result<()> {
        let outcomes = join_all(views.iter().map(|view| async move {
            if let Err(err) = self.define_view(db, view).await {
                error!(
                    domain = %db.domain_name(),
                    nspace = "couchdb",
                    "cannot create view {} {}: {err}",
                    db.db_prefix(),
                    view.doctype,
                );
                return Err(err);
            }
            Ok(())
        }))
        .await;
        outcomes.into_iter().collect()
    }

    /// Submits a raw `_index` request, provisioning the database when
    /// missing.
    pub async fn define_index_raw(
        &self,
        db: &DatabaseRef,
        doctype: &str,
        request: &Value,
    ) -> Result<IndexCreationResponse> {
        let outcome = self
            .request::<IndexCreationResponse>(db, doctype, Method::POST, "_index", Some(request.clone()))
            .await;
        match outcome {
            Err(err) if err.is_no_database_error() => {
                match self.create_db(db, doctype).await {
                    Ok(()) => {}
                    Err(err) if err.is_file_exists_error() => {}
                    Err(err) => return Err(err),
                }
                self.request(db, doctype, Method::POST, "_index", Some(request.clone()))
                    .await
            }
            outcome => outcome,
        }
    }

    /// Defines one secondary index. Re-submitting an existing definition is
    /// a no-op on the store side.
    pub async fn define_index(&self, db: &DatabaseRef, index: &Index) -> Result<()> {
        self.define_index_raw(db, &index.doctype, &index.request)
            .await?;
        Ok(())
    }

    /// Defines a batch of indexes concurrently. Every index is attempted
    /// regardless of the others; failures are logged and the first one is
    /// returned once the whole batch has settled.
    pub async fn define_indexes(&self, db: &DatabaseRef, indexes: &[Index]) -> Result<()> {
        let outcomes = join_all(indexes.iter().map(|index| async move {
            if let Err(err) = self.define_index(db, index).await {
                warn!(
                    domain = %db.domain_name(),
                    nspace = "couchdb",
                    "cannot create index on {}: {err}",
                    index.doctype,
                );
                return Err(err);
            }
            Ok(())
        }))
        .await;
        outcomes.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::transport::testing::MockTransport;

    fn client_with(transport: Arc<MockTransport>) -> Client {
        Client::builder("http://couch.local:5984")
            .transport(transport)
            .build()
            .unwrap()
    }

    fn scope() -> DatabaseRef {
        DatabaseRef::new("alice.example.com", "cozyb1e91f91")
    }

    fn by_date(map: &str) -> View {
        View {
            name: "by-date".to_string(),
            doctype: "io.cozy.events".to_string(),
            map: map.to_string(),
            reduce: None,
        }
    }

    #[tokio::test]
    async fn define_view_writes_a_fresh_design_document() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(201, json!({"ok": true, "id": "_design/by-date", "rev": "1-a"}));
        let client = client_with(transport.clone());

        client
            .define_view(&scope(), &by_date("function (doc) { emit(doc.date); }"))
            .await
            .unwrap();

        assert_eq!(
            transport.call_summary(),
            vec![(
                "PUT".to_string(),
                "cozyb1e91f91%2Fio-cozy-events/_design/by-date".to_string()
            )]
        );
        let body = transport.body_of(0).unwrap();
        assert_eq!(body["language"], json!("javascript"));
        assert_eq!(
            body["views"]["by-date"]["map"],
            json!("function (doc) { emit(doc.date); }")
        );
        assert!(body.get("_rev").is_none());
    }

    #[tokio::test]
    async fn define_view_is_idempotent_on_an_identical_stored_view() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(409, json!({"error": "conflict", "reason": "Document update conflict."}));
        transport.push_json(
            200,
            json!({
                "_id": "_design/by-date",
                "_rev": "3-abc",
                "language": "javascript",
                "views": {"by-date": {"map": "function (doc) { emit(doc.date); }"}}
            }),
        );
        let client = client_with(transport.clone());

        client
            .define_view(&scope(), &by_date("function (doc) { emit(doc.date); }"))
            .await
            .unwrap();

        let methods: Vec<String> = transport
            .call_summary()
            .into_iter()
            .map(|(method, _)| method)
            .collect();
        assert_eq!(methods, vec!["PUT", "GET"]);
    }

    #[tokio::test]
    async fn define_view_overwrites_a_changed_stored_view() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(409, json!({"error": "conflict", "reason": "Document update conflict."}));
        transport.push_json(
            200,
            json!({
                "_id": "_design/by-date",
                "_rev": "3-abc",
                "language": "javascript",
                "views": {"by-date": {"map": "function (doc) { emit(doc.id); }"}}
            }),
        );
        transport.push_json(201, json!({"ok": true, "id": "_design/by-date", "rev": "4-def"}));
        let client = client_with(transport.clone());

        client
            .define_view(&scope(), &by_date("function (doc) { emit(doc.date); }"))
            .await
            .unwrap();

        let methods: Vec<String> = transport
            .call_summary()
            .into_iter()
            .map(|(method, _)| method)
            .collect();
        assert_eq!(methods, vec!["PUT", "GET", "PUT"]);
        assert_eq!(transport.body_of(2).unwrap()["_rev"], json!("3-abc"));
    }

    #[tokio::test]
    async fn define_view_provisions_a_missing_database() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(
            404,
            json!({"error": "not_found", "reason": "Database does not exist."}),
        );
        transport.push_json(201, json!({"ok": true}));
        transport.push_json(201, json!({"ok": true, "id": "_design/by-date", "rev": "1-a"}));
        let client = client_with(transport.clone());

        client
            .define_view(&scope(), &by_date("function (doc) { emit(doc.date); }"))
            .await
            .unwrap();

        let methods: Vec<String> = transport
            .call_summary()
            .into_iter()
            .map(|(method, _)| method)
            .collect();
        assert_eq!(methods, vec!["PUT", "PUT", "PUT"]);
    }

    #[tokio::test]
    async fn define_views_attempts_the_whole_batch_and_reports_the_first_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(400, json!({"error": "bad_request", "reason": "invalid view"}));
        transport.push_json(201, json!({"ok": true, "id": "_design/by-id", "rev": "1-a"}));
        let client = client_with(transport.clone());

        let views = [
            by_date("function (doc) { emit(doc.date); }"),
            View {
                name: "by-id".to_string(),
                doctype: "io.cozy.events".to_string(),
                map: "function (doc) { emit(doc._id); }".to_string(),
                reduce: None,
            },
        ];
        let err = client.define_views(&scope(), &views).await.unwrap_err();

        assert!(err.remote_cause().is_some());
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn define_indexes_attempts_the_whole_batch_and_reports_the_first_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(400, json!({"error": "bad_request", "reason": "invalid index"}));
        transport.push_json(200, json!({"result": "created", "id": "_design/idx", "name": "by-id"}));
        let client = client_with(transport.clone());

        let indexes = [
            Index {
                doctype: "io.cozy.events".to_string(),
                request: json!({"index": {"fields": []}}),
            },
            Index {
                doctype: "io.cozy.events".to_string(),
                request: json!({"index": {"fields": ["_id"]}, "ddoc": "idx", "name": "by-id"}),
            },
        ];
        let err = client.define_indexes(&scope(), &indexes).await.unwrap_err();

        assert!(err.remote_cause().is_some());
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn define_index_provisions_a_missing_database() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(
            404,
            json!({"error": "not_found", "reason": "Database does not exist."}),
        );
        transport.push_json(201, json!({"ok": true}));
        transport.push_json(200, json!({"result": "created", "id": "_design/idx", "name": "by-date"}));
        let client = client_with(transport.clone());

        let index = Index {
            doctype: "io.cozy.events".to_string(),
            request: json!({"index": {"fields": ["date"]}, "ddoc": "idx", "name": "by-date"}),
        };
        client.define_index(&scope(), &index).await.unwrap();

        assert_eq!(
            transport.call_summary().last().unwrap().1,
            "cozyb1e91f91%2Fio-cozy-events/_index"
        );
        let methods: Vec<String> = transport
            .call_summary()
            .into_iter()
            .map(|(method, _)| method)
            .collect();
        assert_eq!(methods, vec!["POST", "PUT", "POST"]);
    }
}

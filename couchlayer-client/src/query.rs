//! Mango queries, pagination and view execution.

use std::time::Duration;

use couchlayer_core::document::{Document, DocumentExt};
use couchlayer_core::error::{Error, Result};
use couchlayer_core::naming::DatabaseRef;
use couchlayer_core::request::{
    FindRequest, FindResponse, NormalDocsResponse, ViewRequest, ViewResponse, normalize_bookmark,
};
use couchlayer_core::view::View;
use reqwest::Method;
use serde_json::json;
use tracing::error;

use crate::client::Client;

/// Grace period before retrying a view read that failed server-side, giving
/// the store time to finish building the view.
const VIEW_RETRY_DELAY: Duration = Duration::from_secs(1);

impl Client {
    /// Runs a `_find` query and decodes the matching documents.
    ///
    /// A response carrying an optimization warning is rejected with
    /// [`Error::Unoptimized`]: in production every query must be backed by
    /// an index.
    pub async fn find_docs<D: Document>(
        &self,
        db: &DatabaseRef,
        doctype: &str,
        request: &FindRequest,
    ) -> Result<Vec<D>> {
        let res = self.find_docs_raw(db, doctype, request, false).await?;
        res.docs.into_iter().map(D::from_json).collect()
    }

    /// Same as [`Client::find_docs`] but tolerating an unindexed query.
    /// Reserved for occasional administrative queries.
    pub async fn find_docs_unoptimized<D: Document>(
        &self,
        db: &DatabaseRef,
        doctype: &str,
        request: &FindRequest,
    ) -> Result<Vec<D>> {
        let res = self.find_docs_raw(db, doctype, request, true).await?;
        res.docs.into_iter().map(D::from_json).collect()
    }

    /// Runs a `_find` query and returns the full response envelope, with
    /// the sentinel bookmark normalized away.
    ///
    /// Index errors are enriched with the serialized request so the caller
    /// can diagnose which selector had no index.
    pub async fn find_docs_raw(
        &self,
        db: &DatabaseRef,
        doctype: &str,
        request: &FindRequest,
        ignore_unoptimized: bool,
    ) -> Result<FindResponse> {
        let body = serde_json::to_value(request)?;
        let outcome = self
            .request::<FindResponse>(db, doctype, Method::POST, "_find", Some(body.clone()))
            .await;
        let mut res = match outcome {
            Err(err) if err.is_index_error() => {
                return Err(err.with_original_request(body.to_string()));
            }
            outcome => outcome?,
        };
        if !ignore_unoptimized && !res.warning.is_empty() {
            return Err(Error::Unoptimized);
        }
        normalize_bookmark(&mut res.bookmark);
        Ok(res)
    }

    /// Returns a page of normal documents: every document of the database
    /// except the design documents.
    ///
    /// Pagination works with either a bookmark or a skip; the bookmark is
    /// preferred when both are given. The exact total is derived from the
    /// page itself when this page is the last one, and counted otherwise.
    pub async fn normal_docs(
        &self,
        db: &DatabaseRef,
        doctype: &str,
        skip: usize,
        limit: usize,
        bookmark: &str,
        execution_stats: bool,
    ) -> Result<NormalDocsResponse> {
        let request = FindRequest {
            selector: json!({"_id": {"$gte": null}}),
            bookmark: bookmark.to_string(),
            limit: Some(limit),
            skip: if bookmark.is_empty() { Some(skip) } else { None },
            execution_stats,
            ..FindRequest::default()
        };
        let find = self.find_docs_raw(db, doctype, &request, true).await?;

        let mut res = NormalDocsResponse {
            total: 0,
            rows: find.docs,
            bookmark: find.bookmark,
            execution_stats: find.execution_stats,
        };
        if bookmark.is_empty() && res.rows.len() < limit {
            res.total = skip + res.rows.len();
        } else {
            res.total = self.count_normal_docs(db, doctype).await?;
        }
        Ok(res)
    }

    /// Counts the normal documents of a database, subtracting the design
    /// documents from the raw total.
    pub async fn count_normal_docs(&self, db: &DatabaseRef, doctype: &str) -> Result<usize> {
        let design: ViewResponse = self
            .request(db, doctype, Method::GET, "_design_docs", None)
            .await?;
        let all: ViewResponse = self
            .request(db, doctype, Method::GET, "_all_docs?limit=0", None)
            .await?;
        Ok(all.total.saturating_sub(design.rows.len()))
    }

    /// Executes a view and returns its rows.
    ///
    /// A server-side failure is retried exactly once after a short delay,
    /// covering the window where the store is still building the view; a
    /// second failure is logged as critical and returned.
    pub async fn exec_view(
        &self,
        db: &DatabaseRef,
        view: &View,
        request: &ViewRequest,
    ) -> Result<ViewResponse> {
        let mut request = request.clone();
        if request.group_level.is_some_and(|level| level > 0) {
            request.group = true;
        }
        match self.send_view_request(db, view, &request).await {
            Err(err) if err.is_internal_server_error() => {
                tokio::time::sleep(VIEW_RETRY_DELAY).await;
                match self.send_view_request(db, view, &request).await {
                    Err(err) if err.is_internal_server_error() => {
                        error!(
                            domain = %db.domain_name(),
                            nspace = "couchdb",
                            critical = "true",
                            "500 on requesting view: {err}",
                        );
                        Err(err)
                    }
                    outcome => outcome,
                }
            }
            outcome => outcome,
        }
    }

    async fn send_view_request(
        &self,
        db: &DatabaseRef,
        view: &View,
        request: &ViewRequest,
    ) -> Result<ViewResponse> {
        let path = format!(
            "_design/{name}/_view/{name}?{query}",
            name = view.name,
            query = request.query_string()?,
        );
        // An explicit keys list cannot travel in the URL and forces the
        // POST form of the view request.
        match &request.keys {
            Some(keys) => {
                let body = json!({"keys": keys});
                self.request(db, &view.doctype, Method::POST, &path, Some(body))
                    .await
            }
            None => self.request(db, &view.doctype, Method::GET, &path, None).await,
        }
    }
}

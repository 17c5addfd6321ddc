//! Database provisioning and the document lifecycle.
//!
//! Databases are provisioned lazily: a write hitting a missing database
//! creates it and retries the write exactly once. Every successful mutation
//! publishes a change event through the client's notifier.

use couchlayer_core::document::{Document, DocumentExt, JsonDoc, validate_doc_id};
use couchlayer_core::error::{Error, RemoteCause, Result};
use couchlayer_core::event::EventVerb;
use couchlayer_core::naming::{
    DatabaseRef, db_name_has_prefix, escape_couchdb_name, path_escape, query_escape,
    unescape_couchdb_name,
};
use couchlayer_core::request::{DbStatusResponse, UpdateResponse, UuidsResponse};
use reqwest::Method;
use serde_json::{Map, Value};

use crate::client::Client;

impl Client {
    /// Asks the store to generate one fresh identifier.
    pub async fn uuid(&self) -> Result<String> {
        let res: UuidsResponse = self
            .request(&DatabaseRef::global(), "", Method::GET, "_uuids", None)
            .await?;
        res.uuids
            .into_iter()
            .next()
            .ok_or_else(|| Error::Serialization("empty _uuids response".to_string()))
    }

    /// Returns the status of the database holding a doctype.
    pub async fn db_status(&self, db: &DatabaseRef, doctype: &str) -> Result<DbStatusResponse> {
        self.request(db, doctype, Method::GET, "", None).await
    }

    /// Lists the physical database names under the scope's prefix.
    pub async fn all_dbs(&self, db: &DatabaseRef) -> Result<Vec<String>> {
        let prefix = escape_couchdb_name(db.db_prefix());
        let path = format!(
            "_all_dbs?start_key={}&end_key={}",
            query_escape(&format!("\"{prefix}/\"")),
            query_escape(&format!("\"{prefix}0\"")),
        );
        self.request(db, "", Method::GET, &path, None).await
    }

    /// Lists the doctypes that have a database in this scope, with the
    /// physical names mapped back to logical doctypes.
    pub async fn all_doctypes(&self, db: &DatabaseRef) -> Result<Vec<String>> {
        let dbnames = self.all_dbs(db).await?;
        Ok(dbnames
            .iter()
            .filter_map(|dbname| db_name_has_prefix(dbname, db.db_prefix()))
            .map(|escaped| unescape_couchdb_name(&escaped))
            .collect())
    }

    /// Makes sure the database for a doctype exists.
    ///
    /// A missing database is created; losing the creation race to another
    /// writer is fine. Status errors other than a missing database are
    /// ignored.
    pub async fn ensure_db_exist(&self, db: &DatabaseRef, doctype: &str) -> Result<()> {
        match self.db_status(db, doctype).await {
            Err(err) if err.is_no_database_error() => {
                if let Err(err) = self.create_db(db, doctype).await {
                    if !err.is_file_exists_error() {
                        // The creation failed for its own reasons; only the
                        // database still being absent is fatal.
                        self.db_status(db, doctype).await?;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Creates the database for a doctype.
    pub async fn create_db(&self, db: &DatabaseRef, doctype: &str) -> Result<()> {
        let path = if self.config().small_shards {
            "?q=1&n=1"
        } else {
            ""
        };
        self.request_unit(db, doctype, Method::PUT, path, None).await
    }

    /// Deletes the database for a doctype, with all its documents.
    pub async fn delete_db(&self, db: &DatabaseRef, doctype: &str) -> Result<()> {
        self.request_unit(db, doctype, Method::DELETE, "", None).await
    }

    /// Deletes every database of the scope. Refused for an empty prefix, as
    /// that would match every database of the store.
    pub async fn delete_all_dbs(&self, db: &DatabaseRef) -> Result<()> {
        if db.db_prefix().is_empty() {
            return Err(Error::InvalidDatabase(
                "cannot delete all dbs without a prefix".to_string(),
            ));
        }
        for doctype in self.all_doctypes(db).await? {
            self.delete_db(db, &doctype).await?;
        }
        Ok(())
    }

    /// Recreates an empty database for a doctype. A database that does not
    /// exist yet is not an error.
    pub async fn reset_db(&self, db: &DatabaseRef, doctype: &str) -> Result<()> {
        if let Err(err) = self.delete_db(db, doctype).await {
            if !err.is_no_database_error() {
                return Err(err);
            }
        }
        self.create_db(db, doctype).await
    }

    /// Fetches the current revision of a document.
    pub async fn get_doc<D: Document>(&self, db: &DatabaseRef, doctype: &str, id: &str) -> Result<D> {
        let path = doc_path(id)?;
        let value: Value = self.request(db, doctype, Method::GET, &path, None).await?;
        D::from_json(value)
    }

    /// Fetches a specific revision of a document.
    pub async fn get_doc_rev<D: Document>(
        &self,
        db: &DatabaseRef,
        doctype: &str,
        id: &str,
        rev: &str,
    ) -> Result<D> {
        let path = format!("{}?rev={}", doc_path(id)?, query_escape(rev));
        let value: Value = self.request(db, doctype, Method::GET, &path, None).await?;
        D::from_json(value)
    }

    /// Fetches a document with its revisions history (`_revisions`).
    pub async fn get_doc_with_revs<D: Document>(
        &self,
        db: &DatabaseRef,
        doctype: &str,
        id: &str,
    ) -> Result<D> {
        let path = format!("{}?revs=true", doc_path(id)?);
        let value: Value = self.request(db, doctype, Method::GET, &path, None).await?;
        D::from_json(value)
    }

    /// Creates a document with a store-assigned identifier.
    ///
    /// The document must have no identifier yet; the store-assigned `id` and
    /// `rev` are written back on success. A missing database is provisioned
    /// and the creation retried once.
    pub async fn create_doc<D: Document>(&self, db: &DatabaseRef, doc: &mut D) -> Result<()> {
        if !doc.id().is_empty() {
            return Err(Error::DefinedId);
        }
        let doctype = doc.doctype().to_string();
        let body = doc.to_json()?;

        let mut outcome = self
            .request::<UpdateResponse>(db, &doctype, Method::POST, "", Some(body.clone()))
            .await;
        if let Err(err) = &outcome {
            if err.is_no_database_error() {
                match self.create_db(db, &doctype).await {
                    Ok(()) => {}
                    Err(err) if err.is_file_exists_error() => {}
                    Err(err) => return Err(err),
                }
                outcome = self
                    .request::<UpdateResponse>(db, &doctype, Method::POST, "", Some(body))
                    .await;
            }
        }
        let res = outcome?;
        if !res.ok {
            return Err(Error::Remote(RemoteCause {
                status: 200,
                error: "unexpected".to_string(),
                reason: "the store replied with 2xx but ok is false".to_string(),
                original_request: None,
            }));
        }
        doc.set_id(&res.id);
        doc.set_rev(&res.rev);
        self.notifier().publish(db, EventVerb::Create, doc, None);
        Ok(())
    }

    /// Creates a document whose identifier is chosen by the caller.
    pub async fn create_named_doc<D: Document>(&self, db: &DatabaseRef, doc: &mut D) -> Result<()> {
        if doc.doctype().is_empty() {
            return Err(Error::InvalidDoc(
                "the document has no doctype".to_string(),
            ));
        }
        if !doc.rev().is_empty() {
            return Err(Error::InvalidDoc(
                "creating a named document expects no revision".to_string(),
            ));
        }
        let path = doc_path(doc.id())?;
        let body = doc.to_json()?;
        let res: UpdateResponse = self
            .request(db, doc.doctype(), Method::PUT, &path, Some(body))
            .await?;
        doc.set_rev(&res.rev);
        self.notifier().publish(db, EventVerb::Create, doc, None);
        Ok(())
    }

    /// Same as [`Client::create_named_doc`], but a missing database is
    /// provisioned and the creation retried once.
    pub async fn create_named_doc_with_db<D: Document>(
        &self,
        db: &DatabaseRef,
        doc: &mut D,
    ) -> Result<()> {
        match self.create_named_doc(db, doc).await {
            Err(err) if err.is_no_database_error() => {
                match self.create_db(db, doc.doctype()).await {
                    Ok(()) => {}
                    Err(err) if err.is_file_exists_error() => {}
                    Err(err) => return Err(err),
                }
                self.create_named_doc(db, doc).await
            }
            outcome => outcome,
        }
    }

    /// Updates a document in place: the caller-supplied revision must match
    /// the stored one, and the new revision is written back on success.
    ///
    /// The prior image is fetched for the change event; a failed read
    /// aborts the update before anything is written.
    pub async fn update_doc<D: Document>(&self, db: &DatabaseRef, doc: &mut D) -> Result<()> {
        if doc.doctype().is_empty() {
            return Err(Error::InvalidDoc(
                "the document has no doctype".to_string(),
            ));
        }
        if doc.rev().is_empty() {
            return Err(Error::InvalidDoc(
                "updating a document expects a revision".to_string(),
            ));
        }
        let old = self.get_doc::<D>(db, doc.doctype(), doc.id()).await?;
        self.put_doc(db, doc, Some(old)).await
    }

    /// Same as [`Client::update_doc`] but with the prior image supplied by
    /// the caller, sparing the extra read.
    pub async fn update_doc_with_old<D: Document>(
        &self,
        db: &DatabaseRef,
        doc: &mut D,
        old: &D,
    ) -> Result<()> {
        if doc.doctype().is_empty() {
            return Err(Error::InvalidDoc(
                "the document has no doctype".to_string(),
            ));
        }
        if doc.rev().is_empty() {
            return Err(Error::InvalidDoc(
                "updating a document expects a revision".to_string(),
            ));
        }
        self.put_doc(db, doc, Some(old.clone())).await
    }

    async fn put_doc<D: Document>(&self, db: &DatabaseRef, doc: &mut D, old: Option<D>) -> Result<()> {
        let path = doc_path(doc.id())?;
        let body = doc.to_json()?;
        let res: UpdateResponse = self
            .request(db, doc.doctype(), Method::PUT, &path, Some(body))
            .await?;
        doc.set_rev(&res.rev);
        self.notifier()
            .publish(db, EventVerb::Update, doc, old.as_ref());
        Ok(())
    }

    /// Deletes a document. The caller-supplied revision must match the
    /// stored one; the tombstone revision is written back on success.
    pub async fn delete_doc<D: Document>(&self, db: &DatabaseRef, doc: &mut D) -> Result<()> {
        if doc.rev().is_empty() {
            return Err(Error::InvalidDoc(
                "deleting a document expects a revision".to_string(),
            ));
        }
        let path = format!("{}?rev={}", doc_path(doc.id())?, query_escape(doc.rev()));
        let old = doc.clone();
        let res: UpdateResponse = self
            .request(db, doc.doctype(), Method::DELETE, &path, None)
            .await?;
        doc.set_rev(&res.rev);
        self.notifier()
            .publish(db, EventVerb::Delete, doc, Some(&old));
        Ok(())
    }

    /// Creates or updates a document by identifier, regardless of whether
    /// the document or even its database exists yet.
    pub async fn upsert<D: Document>(&self, db: &DatabaseRef, doc: &mut D) -> Result<()> {
        let id = doc.id().to_string();
        if id.is_empty() {
            return Err(Error::InvalidDoc(
                "upserting a document expects an id".to_string(),
            ));
        }
        validate_doc_id(&id)?;

        match self.get_doc::<JsonDoc>(db, doc.doctype(), &id).await {
            Err(err) if err.is_no_database_error() => {
                match self.create_db(db, doc.doctype()).await {
                    Ok(()) => {}
                    Err(err) if err.is_file_exists_error() => {}
                    Err(err) => return Err(err),
                }
                self.create_named_doc_with_db(db, doc).await
            }
            Err(err) if err.is_not_found_error() => self.create_named_doc_with_db(db, doc).await,
            Err(err) => Err(err),
            Ok(old) => {
                doc.set_rev(old.rev());
                self.update_doc(db, doc).await
            }
        }
    }

    /// Copies a document to a new identifier within the same database.
    pub async fn copy_doc(
        &self,
        db: &DatabaseRef,
        doctype: &str,
        id: &str,
        target_id: &str,
    ) -> Result<Map<String, Value>> {
        if target_id.is_empty() {
            return Err(Error::InvalidDoc(
                "copying a document expects a target id".to_string(),
            ));
        }
        validate_doc_id(target_id)?;
        let path = doc_path(id)?;
        let copy = Method::from_bytes(b"COPY").expect("COPY is a valid method token");
        let bytes = self
            .execute(db, doctype, copy, &path, None, &[("Destination", target_id)])
            .await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn doc_path(id: &str) -> Result<String> {
    if id.is_empty() {
        return Err(Error::InvalidDoc("the document has no id".to_string()));
    }
    validate_doc_id(id)?;
    Ok(path_escape(id))
}

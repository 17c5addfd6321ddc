//! Change notification for document mutations.
//!
//! Every successful mutation publishes a [`ChangeEvent`] carrying the verb,
//! a clone of the current document and the prior image. Events are handed
//! off on an unbounded channel: the send never blocks and never fails the
//! mutation, and delivery ordering across concurrent mutations is
//! best-effort. Registered [`ChangeHook`]s run synchronously before the
//! hand-off; a failing hook is logged, never raised.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::error;

use crate::document::Document;
use crate::naming::DatabaseRef;

/// The verb of a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventVerb {
    Create,
    Update,
    Delete,
}

impl fmt::Display for EventVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventVerb::Create => f.write_str("CREATED"),
            EventVerb::Update => f.write_str("UPDATED"),
            EventVerb::Delete => f.write_str("DELETED"),
        }
    }
}

/// A change event published after a successful mutation, keyed by the
/// tenant scope it happened in.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Domain of the tenant scope.
    pub domain: String,
    /// Database prefix of the tenant scope.
    pub prefix: String,
    /// What happened.
    pub verb: EventVerb,
    /// Doctype of the mutated document.
    pub doctype: String,
    /// Clone of the document after the mutation.
    pub doc: Value,
    /// Image of the document before the mutation, absent on create.
    pub old: Option<Value>,
}

/// The error type returned by change hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// A synchronous side-effect run on every mutation before the event is
/// published. Hook failures are logged and never propagate to the caller.
pub trait ChangeHook: Send + Sync {
    fn on_change(
        &self,
        db: &DatabaseRef,
        verb: EventVerb,
        doctype: &str,
        doc: &Value,
        old: Option<&Value>,
    ) -> std::result::Result<(), HookError>;
}

/// Runs hooks and publishes change events for every mutation.
///
/// Without a sink the notifier still runs hooks; events are simply dropped.
#[derive(Default)]
pub struct Notifier {
    hooks: Vec<Box<dyn ChangeHook>>,
    sink: Option<mpsc::UnboundedSender<ChangeEvent>>,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("hooks", &self.hooks.len())
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl Notifier {
    /// Creates a notifier with no hooks and no sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the channel receiving published events.
    pub fn set_sink(&mut self, sink: mpsc::UnboundedSender<ChangeEvent>) {
        self.sink = Some(sink);
    }

    /// Registers a hook, run synchronously on every mutation.
    pub fn register_hook(&mut self, hook: Box<dyn ChangeHook>) {
        self.hooks.push(hook);
    }

    /// Publishes a change event for a mutated document.
    ///
    /// Runs the hooks first, logging any failure, then hands the event off
    /// to the sink. Neither step can block or fail the calling mutation.
    pub fn publish<D: Document>(&self, db: &DatabaseRef, verb: EventVerb, doc: &D, old: Option<&D>) {
        let doc_value = match serde_json::to_value(doc) {
            Ok(value) => value,
            Err(err) => {
                error!(
                    domain = %db.domain_name(),
                    nspace = "couchdb",
                    "cannot serialize {} document for {} event: {err}",
                    doc.doctype(),
                    verb,
                );
                return;
            }
        };
        let old_value = old.and_then(|old| serde_json::to_value(old).ok());

        for hook in &self.hooks {
            if let Err(err) =
                hook.on_change(db, verb, doc.doctype(), &doc_value, old_value.as_ref())
            {
                error!(
                    domain = %db.domain_name(),
                    nspace = "couchdb",
                    "error in hooks on {} {}: {err}",
                    verb,
                    doc.doctype(),
                );
            }
        }

        if let Some(sink) = &self.sink {
            let event = ChangeEvent {
                domain: db.domain_name().to_string(),
                prefix: db.db_prefix().to_string(),
                verb,
                doctype: doc.doctype().to_string(),
                doc: doc_value,
                old: old_value,
            };
            // The receiver may be gone; a mutation never fails on this.
            let _ = sink.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::JsonDoc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingHook {
        calls: AtomicUsize,
    }

    impl ChangeHook for FailingHook {
        fn on_change(
            &self,
            _db: &DatabaseRef,
            _verb: EventVerb,
            _doctype: &str,
            _doc: &Value,
            _old: Option<&Value>,
        ) -> std::result::Result<(), HookError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err("hook failed".into())
        }
    }

    fn sample_doc() -> JsonDoc {
        let mut doc = JsonDoc::new("io.cozy.events");
        doc.set_id("123");
        doc.set_rev("1-abc");
        doc
    }

    #[test]
    fn publishes_a_clone_with_the_prior_image() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut notifier = Notifier::new();
        notifier.set_sink(tx);

        let db = DatabaseRef::new("alice.example.com", "cozyb1e91f91");
        let doc = sample_doc();
        let mut old = sample_doc();
        old.set_rev("0-old");

        notifier.publish(&db, EventVerb::Update, &doc, Some(&old));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.verb, EventVerb::Update);
        assert_eq!(event.domain, "alice.example.com");
        assert_eq!(event.doctype, "io.cozy.events");
        assert_eq!(event.doc, serde_json::to_value(&doc).unwrap());
        assert_eq!(event.old, Some(serde_json::to_value(&old).unwrap()));
    }

    #[test]
    fn hook_failure_does_not_stop_publication() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut notifier = Notifier::new();
        notifier.set_sink(tx);
        notifier.register_hook(Box::new(FailingHook { calls: AtomicUsize::new(0) }));

        let db = DatabaseRef::global();
        notifier.publish(&db, EventVerb::Create, &sample_doc(), None);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.verb, EventVerb::Create);
        assert!(event.old.is_none());
    }

    #[test]
    fn missing_or_closed_sink_is_ignored() {
        let notifier = Notifier::new();
        notifier.publish(&DatabaseRef::global(), EventVerb::Delete, &sample_doc(), None);

        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut notifier = Notifier::new();
        notifier.set_sink(tx);
        notifier.publish(&DatabaseRef::global(), EventVerb::Delete, &sample_doc(), None);
    }
}

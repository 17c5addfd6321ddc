//! Core contracts of the couchlayer project: a typed client layer for
//! CouchDB-style document stores.
//!
//! This crate is transport-agnostic and provides:
//!
//! - **Document traits** ([`document`]) - The contract every stored entity
//!   implements, plus the map-backed [`document::JsonDoc`]
//! - **Database naming** ([`naming`]) - Per-tenant physical database names
//!   with deterministic escaping
//! - **Error taxonomy** ([`error`]) - The closed classification of remote
//!   failures that drives every retry and recovery decision
//! - **Views and indexes** ([`view`]) - Map/reduce definitions, design
//!   documents and their reconciliation comparison
//! - **Wire envelopes** ([`request`]) - Request/response value objects of
//!   the store's REST protocol
//! - **Change events** ([`event`]) - Hooks and non-blocking publication of
//!   before/after document pairs
//!
//! The concrete HTTP client lives in `couchlayer-client`.

#[allow(unused_extern_crates)]
extern crate self as couchlayer_core;

pub mod document;
pub mod error;
pub mod event;
pub mod naming;
pub mod request;
pub mod view;

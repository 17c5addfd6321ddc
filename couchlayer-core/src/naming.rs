//! Per-tenant database naming.
//!
//! Every doctype lives in its own physical database, named from a tenant
//! prefix and the doctype: `<prefix>/<doctype>`, with the structural
//! separators of the doctype (`.`, `:`) replaced by `-` and the whole name
//! lowercased, then percent-escaped for use as a single URL path segment.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters escaped in path segments and query values. Everything outside
/// the RFC 3986 unreserved set is encoded, which is stricter than CouchDB
/// requires but always safe.
const ESCAPED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A per-tenant naming scope: a database prefix plus the domain it serves.
///
/// Immutable for the duration of an operation and shared read-only by all
/// components. The domain is only used for logging and event routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRef {
    prefix: String,
    domain: String,
}

impl DatabaseRef {
    /// Creates a naming scope from a domain and a database prefix.
    pub fn new(domain: &str, prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            domain: domain.to_string(),
        }
    }

    /// The scope used for stack-global databases.
    pub fn global() -> Self {
        Self::new("", "global")
    }

    /// The scope used for databases holding stack secrets.
    pub fn secrets() -> Self {
        Self::new("", "secrets")
    }

    /// Returns the database prefix of this scope.
    pub fn db_prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the domain name of this scope, or `""` for stack-scoped
    /// databases.
    pub fn domain_name(&self) -> &str {
        &self.domain
    }
}

/// Escapes a name for use in a CouchDB database name: `.` and `:` become
/// `-`, and the result is lowercased.
pub fn escape_couchdb_name(name: &str) -> String {
    name.replace(['.', ':'], "-").to_lowercase()
}

/// Reverses [`escape_couchdb_name`] by mapping every `-` back to `.`.
///
/// The pair is not bijective for doctypes that themselves contain `-` or
/// `:`: those characters all collapse to `-` on escape and come back as `.`.
/// Doctype conventions (`io.cozy.*`) avoid both characters, so in practice
/// the transform round-trips, but callers minting doctypes must not rely on
/// it for names outside that convention.
pub fn unescape_couchdb_name(name: &str) -> String {
    name.replace('-', ".")
}

/// Builds the physical database name for a doctype within a scope,
/// percent-escaped as a single URL path segment.
pub fn make_db_name(db: &DatabaseRef, doctype: &str) -> String {
    let dbname = escape_couchdb_name(&format!("{}/{}", db.db_prefix(), doctype));
    path_escape(&dbname)
}

/// Strips an escaped prefix from a physical database name, returning the
/// escaped doctype part, or `None` when the name is outside the prefix.
pub fn db_name_has_prefix(dbname: &str, dbprefix: &str) -> Option<String> {
    let dbprefix = escape_couchdb_name(&format!("{dbprefix}/"));
    dbname
        .strip_prefix(&dbprefix)
        .map(str::to_string)
}

/// Percent-escapes a string for use as a single URL path segment.
pub fn path_escape(segment: &str) -> String {
    utf8_percent_encode(segment, ESCAPED).to_string()
}

/// Percent-escapes a string for use as a query parameter value.
pub fn query_escape(value: &str) -> String {
    utf8_percent_encode(value, ESCAPED).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_replaces_separators_and_lowercases() {
        assert_eq!(escape_couchdb_name("io.cozy.Events"), "io-cozy-events");
        assert_eq!(escape_couchdb_name("user:123/io.cozy.files"), "user-123/io-cozy-files");
    }

    #[test]
    fn unescape_restores_dots() {
        assert_eq!(unescape_couchdb_name("io-cozy-events"), "io.cozy.events");
    }

    #[test]
    fn make_db_name_escapes_the_separator_slash() {
        let db = DatabaseRef::new("alice.example.com", "cozyb1e91f91");
        assert_eq!(
            make_db_name(&db, "io.cozy.events"),
            "cozyb1e91f91%2Fio-cozy-events"
        );
    }

    #[test]
    fn db_name_prefix_stripping() {
        assert_eq!(
            db_name_has_prefix("cozyb1e91f91/io-cozy-events", "cozyb1e91f91"),
            Some("io-cozy-events".to_string())
        );
        assert_eq!(db_name_has_prefix("other/io-cozy-events", "cozyb1e91f91"), None);
    }

    #[test]
    fn stack_scopes() {
        assert_eq!(DatabaseRef::global().db_prefix(), "global");
        assert_eq!(DatabaseRef::secrets().db_prefix(), "secrets");
        assert_eq!(DatabaseRef::global().domain_name(), "");
    }
}

//! Directory Backends
//!
//! A [`Backend`] answers the data-bearing operations routed to it. Every
//! outcome is a protocol [`ResultCode`]; backend failures are logged and
//! mapped to the nearest code, never surfaced as Rust errors.
//!
//! [`LdifStore`] is the reference implementation: all entries are loaded
//! from a data directory at startup and kept in memory behind one `RwLock`.
//! The set is append-only; `add` takes the write lock, searches and binds
//! on other connections take the read lock.

use crate::directory::entry::{Entry, USER_PASSWORD};
use crate::directory::filter::Filter;
use crate::directory::ldif;
use crate::protocol::{ModifyRequest, ResultCode};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

/// Failures reading or writing persisted entries.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("entry already exists: {0}")]
    AlreadyExists(String),
}

/// Capability interface of a directory store.
///
/// `bind`, `search` and `add` are required. The remaining operations
/// default to `unwillingToPerform`.
pub trait Backend: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn bind(&self, name: &str, mechanism: &str, credentials: &[u8]) -> ResultCode;

    /// Entries at or below `base` matching `filter`, projected to
    /// `attributes`. Any non-success code aborts the whole search.
    fn search(
        &self,
        base: &str,
        filter: &Filter,
        attributes: &[String],
    ) -> Result<Vec<Entry>, ResultCode>;

    fn add(&self, entry: Entry) -> ResultCode;

    /// `compareTrue`/`compareFalse`, or an error code.
    fn compare(&self, _name: &str, _attribute: &str, _value: &str) -> ResultCode {
        ResultCode::UnwillingToPerform
    }

    fn modify(&self, _request: &ModifyRequest) -> ResultCode {
        ResultCode::UnwillingToPerform
    }

    fn delete(&self, _name: &str) -> ResultCode {
        ResultCode::UnwillingToPerform
    }
}

/// Backend for routes that never touch stored data (root DSE, extended
/// operations).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl Backend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn bind(&self, _name: &str, _mechanism: &str, _credentials: &[u8]) -> ResultCode {
        ResultCode::UnwillingToPerform
    }

    fn search(&self, _: &str, _: &Filter, _: &[String]) -> Result<Vec<Entry>, ResultCode> {
        Ok(Vec::new())
    }

    fn add(&self, _entry: Entry) -> ResultCode {
        ResultCode::UnwillingToPerform
    }
}

/// File-backed reference store.
#[derive(Debug)]
pub struct LdifStore {
    dir: PathBuf,
    entries: RwLock<Vec<Entry>>,
}

impl LdifStore {
    /// Loads every entry file under `dir`. Any load failure is returned.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        let entries = ldif::load_dir(&dir)?;
        Ok(Self::with_entries(dir, entries))
    }

    /// Store over already-loaded entries; new entries are persisted to `dir`.
    pub fn with_entries(dir: impl Into<PathBuf>, entries: Vec<Entry>) -> Self {
        Self {
            dir: dir.into(),
            entries: RwLock::new(entries),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the stored entry named `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<Entry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().find(|e| e.has_name(name)).cloned()
    }
}

impl Backend for LdifStore {
    fn name(&self) -> &str {
        "ldif"
    }

    fn bind(&self, name: &str, mechanism: &str, credentials: &[u8]) -> ResultCode {
        if !mechanism.eq_ignore_ascii_case("simple") {
            debug!(mechanism, "Unsupported bind mechanism");
            return ResultCode::UnwillingToPerform;
        }

        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let matched = entries
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.first(USER_PASSWORD))
            .is_some_and(|password| password.value.as_ref() == credentials);

        if matched {
            ResultCode::Success
        } else {
            ResultCode::InvalidCredentials
        }
    }

    fn search(
        &self,
        base: &str,
        filter: &Filter,
        attributes: &[String],
    ) -> Result<Vec<Entry>, ResultCode> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut results = Vec::new();

        for entry in entries.iter().filter(|e| e.is_within(base)) {
            if filter.evaluate(entry)? {
                results.push(entry.project(attributes));
            }
        }

        debug!(base, filter = %filter, results = results.len(), "Search evaluated");
        Ok(results)
    }

    fn add(&self, entry: Entry) -> ResultCode {
        // The empty name belongs to the root DSE.
        if entry.name.is_empty() {
            debug!("Add rejected, empty name");
            return ResultCode::UnwillingToPerform;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if entries.iter().any(|e| e.has_name(&entry.name)) {
            debug!(name = %entry.name, "Add rejected, entry exists");
            return ResultCode::OperationsError;
        }

        match ldif::persist(&self.dir, &entry) {
            Ok(_) => {
                entries.push(entry);
                ResultCode::Success
            }
            Err(StoreError::AlreadyExists(name)) => {
                debug!(%name, "Add rejected, entry file exists");
                ResultCode::OperationsError
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist entry");
                ResultCode::OperationsError
            }
        }
    }

    fn compare(&self, name: &str, attribute: &str, value: &str) -> ResultCode {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = entries.iter().find(|e| e.has_name(name)) else {
            return ResultCode::NoSuchObject;
        };

        if entry.values(attribute).any(|a| a.value_equals(value)) {
            ResultCode::CompareTrue
        } else {
            ResultCode::CompareFalse
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    const ALICE: &str = "cn=alice,dc=enterprise,dc=org";

    fn alice() -> Entry {
        Entry::new(ALICE)
            .with("cn", "alice")
            .with("objectClass", "person")
            .with("userPassword", "secret")
    }

    fn store() -> (tempfile::TempDir, LdifStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LdifStore::with_entries(dir.path(), vec![alice()]);
        (dir, store)
    }

    #[test]
    fn test_bind_simple() {
        let (_dir, store) = store();
        assert_eq!(store.bind(ALICE, "simple", b"secret"), ResultCode::Success);
        assert_eq!(
            store.bind(ALICE, "simple", b"wrong"),
            ResultCode::InvalidCredentials
        );
        assert_eq!(
            store.bind("cn=nobody,dc=enterprise,dc=org", "simple", b"secret"),
            ResultCode::InvalidCredentials
        );
    }

    #[test]
    fn test_bind_other_mechanism() {
        let (_dir, store) = store();
        assert_eq!(
            store.bind(ALICE, "sasl", b"secret"),
            ResultCode::UnwillingToPerform
        );
    }

    #[test]
    fn test_bind_without_password_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let store = LdifStore::with_entries(dir.path(), vec![Entry::new(ALICE).with("cn", "alice")]);
        assert_eq!(
            store.bind(ALICE, "simple", b""),
            ResultCode::InvalidCredentials
        );
    }

    #[test]
    fn test_search_hides_password() {
        let (_dir, store) = store();
        let results = store
            .search("dc=enterprise,dc=org", &Filter::equality("cn", "alice"), &[])
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, ALICE);
        assert!(results[0].first("userPassword").is_none());
    }

    #[test]
    fn test_search_outside_base() {
        let (_dir, store) = store();
        let results = store
            .search("dc=other,dc=org", &Filter::present("cn"), &[])
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_search_aborts_on_filter_error() {
        let (_dir, store) = store();
        let filter: Filter = "(|(cn=alice)(cn>=a))".parse().unwrap();
        assert_eq!(
            store.search("dc=enterprise,dc=org", &filter, &[]),
            Err(ResultCode::OperationsError)
        );
    }

    #[test]
    fn test_add_persists_and_is_searchable() {
        let (dir, store) = store();
        let bob = Entry::new("cn=bob,dc=enterprise,dc=org")
            .with("cn", "bob")
            .with("jpegPhoto", Bytes::from_static(b"\x00\x01"));
        assert_eq!(store.add(bob), ResultCode::Success);
        assert_eq!(store.len(), 2);

        let reopened = LdifStore::open(dir.path()).unwrap();
        assert!(reopened.get("CN=BOB,DC=ENTERPRISE,DC=ORG").is_some());
    }

    #[test]
    fn test_add_existing_name_is_rejected() {
        let (_dir, store) = store();
        let duplicate = Entry::new(ALICE).with("cn", "impostor");
        assert_eq!(store.add(duplicate), ResultCode::OperationsError);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(ALICE).unwrap().first("cn").unwrap().text(),
            Some("alice")
        );
    }

    #[test]
    fn test_add_rejected_when_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let carol = Entry::new("cn=carol,dc=enterprise,dc=org").with("cn", "carol");
        ldif::persist(dir.path(), &carol).unwrap();

        // File on disk, but not loaded into this store.
        let store = LdifStore::with_entries(dir.path(), Vec::new());
        assert_eq!(store.add(carol), ResultCode::OperationsError);
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_empty_name_is_refused() {
        let (dir, store) = store();
        let root = Entry::new("").with("objectClass", "top");
        assert_eq!(store.add(root), ResultCode::UnwillingToPerform);
        assert_eq!(store.len(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_padded_password_binds_after_restart() {
        let (dir, store) = store();
        let dave = Entry::new("cn=dave,dc=enterprise,dc=org")
            .with("cn", "dave")
            .with("userPassword", " secret");
        assert_eq!(store.add(dave), ResultCode::Success);
        assert_eq!(
            store.bind("cn=dave,dc=enterprise,dc=org", "simple", b" secret"),
            ResultCode::Success
        );

        let reopened = LdifStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.bind("cn=dave,dc=enterprise,dc=org", "simple", b" secret"),
            ResultCode::Success
        );
        assert_eq!(
            reopened.bind("cn=dave,dc=enterprise,dc=org", "simple", b"secret"),
            ResultCode::InvalidCredentials
        );
    }

    #[test]
    fn test_open_rejects_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ldif"), format!("dn: {}\ncn: alice\n", ALICE)).unwrap();
        std::fs::write(
            dir.path().join("b.ldif"),
            "dn: CN=Alice,dc=enterprise,dc=org\ncn: alice\n",
        )
        .unwrap();

        assert!(matches!(
            LdifStore::open(dir.path()),
            Err(StoreError::Malformed { .. })
        ));
    }

    #[test]
    fn test_compare() {
        let (_dir, store) = store();
        assert_eq!(store.compare(ALICE, "cn", "ALICE"), ResultCode::CompareTrue);
        assert_eq!(store.compare(ALICE, "cn", "bob"), ResultCode::CompareFalse);
        assert_eq!(
            store.compare("cn=nobody", "cn", "x"),
            ResultCode::NoSuchObject
        );
    }

    #[test]
    fn test_null_backend() {
        let backend = NullBackend;
        assert_eq!(backend.bind("", "simple", b""), ResultCode::UnwillingToPerform);
        assert_eq!(backend.delete("cn=x"), ResultCode::UnwillingToPerform);
        assert!(backend
            .search("", &Filter::present("objectClass"), &[])
            .unwrap()
            .is_empty());
    }
}

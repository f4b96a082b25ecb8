//! LDIF Text Format
//!
//! Entries are stored one file per entry (`<name>.ldif`) in a data directory.
//!
//! ```text
//! # comment
//! dn: cn=alice,dc=enterprise,dc=org
//! cn: alice
//! userPassword: secret
//! jpegPhoto:: AP8Q
//! ```
//!
//! `attr: value` holds text, `attr:: base64` holds binary. A line starting
//! with a single space continues the previous line. A file may hold several
//! entries, each introduced by its own `dn:` line.

use crate::directory::entry::{Attribute, Entry};
use crate::directory::store::StoreError;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File extension of entry files.
pub const EXTENSION: &str = "ldif";

/// Parses every entry in `text`. `source` names the input in errors.
///
/// Two entries with the same name (case-insensitive) are rejected.
pub fn parse(text: &str, source: &Path) -> Result<Vec<Entry>, StoreError> {
    let mut entries = Vec::new();
    collect_unique(text, source, &mut HashSet::new(), &mut entries)?;
    Ok(entries)
}

/// Parses `text` into `entries`, failing on a name already in `seen`.
fn collect_unique(
    text: &str,
    source: &Path,
    seen: &mut HashSet<String>,
    entries: &mut Vec<Entry>,
) -> Result<(), StoreError> {
    for (line, entry) in parse_records(text, source)? {
        if !seen.insert(entry.name.to_lowercase()) {
            return Err(StoreError::Malformed {
                path: source.to_path_buf(),
                line,
                reason: format!("duplicate entry '{}'", entry.name),
            });
        }
        entries.push(entry);
    }
    Ok(())
}

/// Parses every entry along with the line number of its `dn:` line.
fn parse_records(text: &str, source: &Path) -> Result<Vec<(usize, Entry)>, StoreError> {
    let malformed = |line: usize, reason: &str| StoreError::Malformed {
        path: source.to_path_buf(),
        line,
        reason: reason.to_string(),
    };

    let mut entries = Vec::new();
    let mut current: Option<(usize, Entry)> = None;

    for (line_no, line) in unfold(text) {
        let (attr, value) = line
            .split_once(':')
            .ok_or_else(|| malformed(line_no, "expected 'attribute: value'"))?;
        let attr = attr.trim();
        if attr.is_empty() {
            return Err(malformed(line_no, "empty attribute name"));
        }

        if attr.eq_ignore_ascii_case("dn") {
            let name = match value.strip_prefix(':') {
                Some(encoded) => Attribute::from_base64(attr, encoded)
                    .ok()
                    .and_then(|dn| dn.text().map(str::to_string))
                    .ok_or_else(|| malformed(line_no, "bad base64 name"))?,
                None => value.trim().to_string(),
            };
            entries.extend(current.take());
            current = Some((line_no, Entry::new(name)));
            continue;
        }

        let (_, entry) = current
            .as_mut()
            .ok_or_else(|| malformed(line_no, "attribute before first 'dn:' line"))?;
        let attribute = match value.strip_prefix(':') {
            Some(encoded) => Attribute::from_base64(attr, encoded)
                .map_err(|e| malformed(line_no, &format!("bad base64 value: {}", e)))?,
            None => Attribute::new(attr.to_string(), value.trim_start().to_string()),
        };
        entry.push(attribute);
    }

    entries.extend(current);
    Ok(entries)
}

/// Joins folded lines and drops blanks and comments, keeping the 1-based
/// number of each logical line's first physical line.
fn unfold(text: &str) -> Vec<(usize, String)> {
    let mut lines: Vec<(usize, String)> = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(rest) = raw.strip_prefix(' ') {
            if let Some((_, last)) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        if raw.trim().is_empty() || raw.starts_with('#') {
            continue;
        }
        lines.push((i + 1, raw.to_string()));
    }
    lines
}

/// Loads every `*.ldif` file under `dir`, in file-name order.
pub fn load_dir(dir: &Path) -> Result<Vec<Entry>, StoreError> {
    let io_err = |source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_err)?
        .filter_map(|item| item.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == EXTENSION))
        .collect();
    paths.sort();

    let mut entries = Vec::new();
    let mut seen = HashSet::new();
    for path in paths {
        let text = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let before = entries.len();
        collect_unique(&text, &path, &mut seen, &mut entries)?;
        debug!(file = %path.display(), entries = entries.len() - before, "Loaded entry file");
    }

    info!(dir = %dir.display(), entries = entries.len(), "Loaded directory entries");
    Ok(entries)
}

/// File path holding the entry named `name`.
pub fn entry_path(dir: &Path, name: &str) -> PathBuf {
    let file: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c })
        .collect();
    dir.join(format!("{}.{}", file, EXTENSION))
}

/// Writes `entry` to a new file, failing with [`StoreError::AlreadyExists`]
/// if the file is already there.
pub fn persist(dir: &Path, entry: &Entry) -> Result<PathBuf, StoreError> {
    let path = entry_path(dir, &entry.name);
    if entry.name.is_empty() {
        return Err(StoreError::Malformed {
            path,
            line: 1,
            reason: "entry has an empty name".to_string(),
        });
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|source| match source.kind() {
            std::io::ErrorKind::AlreadyExists => StoreError::AlreadyExists(entry.name.clone()),
            _ => StoreError::Io {
                path: path.clone(),
                source,
            },
        })?;

    file.write_all(entry.to_string().as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

    debug!(file = %path.display(), "Persisted entry");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::entry::AttributeKind;
    use bytes::Bytes;

    const ALICE: &str = "\
# test entry
dn: cn=alice,dc=enterprise,dc=org
cn: alice
objectClass: person
userPassword: secret
jpegPhoto:: AP8Q
";

    #[test]
    fn test_parse_entry() {
        let entries = parse(ALICE, Path::new("alice.ldif")).unwrap();
        assert_eq!(entries.len(), 1);

        let alice = &entries[0];
        assert_eq!(alice.name, "cn=alice,dc=enterprise,dc=org");
        assert_eq!(alice.attributes.len(), 4);
        assert_eq!(alice.first("cn").unwrap().text(), Some("alice"));

        let photo = alice.first("jpegPhoto").unwrap();
        assert_eq!(photo.kind, AttributeKind::Binary);
        assert_eq!(photo.value, Bytes::from_static(b"\x00\xff\x10"));
    }

    #[test]
    fn test_parse_several_entries_and_folded_lines() {
        let text = "dn: cn=a,dc=x\ndescription: first\n  half\n\ndn: cn=b,dc=x\ncn: b\n";
        let entries = parse(text, Path::new("many.ldif")).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].first("description").unwrap().text(),
            Some("first half")
        );
        assert_eq!(entries[1].name, "cn=b,dc=x");
    }

    #[test]
    fn test_parse_rejects_attribute_before_dn() {
        let err = parse("cn: orphan\n", Path::new("bad.ldif")).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_parse_rejects_bad_base64() {
        let err = parse("dn: cn=a\nblob:: !!!\n", Path::new("bad.ldif")).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { line: 2, .. }));
    }

    #[test]
    fn test_persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let entry = Entry::new("cn=bob,dc=enterprise,dc=org")
            .with("cn", "bob")
            .with("objectGUID", Bytes::from_static(b"\x00\x01\x02"));

        let path = persist(dir.path(), &entry).unwrap();
        assert_eq!(path, entry_path(dir.path(), "cn=bob,dc=enterprise,dc=org"));

        let loaded = load_dir(dir.path()).unwrap();
        assert_eq!(loaded, vec![entry]);
    }

    #[test]
    fn test_persist_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let entry = Entry::new("cn=bob,dc=enterprise,dc=org").with("cn", "bob");
        persist(dir.path(), &entry).unwrap();

        let replacement = Entry::new("cn=bob,dc=enterprise,dc=org").with("cn", "other");
        assert!(matches!(
            persist(dir.path(), &replacement),
            Err(StoreError::AlreadyExists(_))
        ));

        let loaded = load_dir(dir.path()).unwrap();
        assert_eq!(loaded[0].first("cn").unwrap().text(), Some("bob"));
    }

    #[test]
    fn test_load_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "not an entry").unwrap();
        fs::write(dir.path().join("a.ldif"), ALICE).unwrap();
        assert_eq!(load_dir(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_load_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(load_dir(&missing), Err(StoreError::Io { .. })));
    }

    #[test]
    fn test_load_rejects_same_name_in_two_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.ldif"), "dn: cn=alice,dc=enterprise,dc=org\ncn: alice\n").unwrap();
        fs::write(dir.path().join("b.ldif"), "# copy\ndn: CN=Alice,dc=enterprise,dc=org\ncn: alice\n").unwrap();

        let err = load_dir(dir.path()).unwrap_err();
        match err {
            StoreError::Malformed { path, line, .. } => {
                assert_eq!(path, dir.path().join("b.ldif"));
                assert_eq!(line, 2);
            }
            other => panic!("expected a malformed store, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_same_name_twice_in_one_file() {
        let text = "dn: cn=a,dc=x\ncn: a\n\ndn: cn=A,dc=x\ncn: a\n";
        let err = parse(text, Path::new("dup.ldif")).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { line: 4, .. }));
    }

    #[test]
    fn test_padded_values_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let entry = Entry::new(" cn=padded,dc=enterprise,dc=org")
            .with("userPassword", " secret")
            .with("description", "trailing ")
            .with("note", ":colon");

        persist(dir.path(), &entry).unwrap();
        let loaded = load_dir(dir.path()).unwrap();
        assert_eq!(loaded, vec![entry]);
        assert_eq!(loaded[0].first("userPassword").unwrap().kind, AttributeKind::Text);
    }

    #[test]
    fn test_persist_refuses_empty_name() {
        let dir = tempfile::tempdir().unwrap();
        let entry = Entry::new("").with("cn", "nobody");
        assert!(matches!(
            persist(dir.path(), &entry),
            Err(StoreError::Malformed { .. })
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}

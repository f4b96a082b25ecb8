//! Directory Entry Model
//!
//! An [`Entry`] is one directory record: a distinguished name plus an
//! ordered list of typed attribute values. Names and attribute names compare
//! case-insensitively; attribute order is insertion order and carries no
//! meaning.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use std::fmt;

/// Attribute that is never returned by a search.
pub const USER_PASSWORD: &str = "userPassword";

/// How an attribute value is stored and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// Printable text; compares case-insensitively as a string.
    Text,
    /// Raw bytes; compares by its base64 encoding.
    Binary,
}

impl AttributeKind {
    /// Classifies raw bytes: anything that is not valid UTF-8 or contains a
    /// control character (NUL, tab, newline, ...) is binary.
    pub fn classify(value: &[u8]) -> Self {
        match std::str::from_utf8(value) {
            Ok(s) if !s.chars().any(char::is_control) => AttributeKind::Text,
            _ => AttributeKind::Binary,
        }
    }
}

/// One attribute value of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: Bytes,
    pub kind: AttributeKind,
}

impl Attribute {
    /// Builds an attribute, classifying `value` as text or binary.
    pub fn new(name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        let value = value.into();
        let kind = AttributeKind::classify(&value);
        Self {
            name: name.into(),
            value,
            kind,
        }
    }

    /// Builds an attribute from its base64 encoding. The decoded bytes are
    /// classified like any other value.
    pub fn from_base64(name: impl Into<String>, encoded: &str) -> Result<Self, base64::DecodeError> {
        let value = STANDARD.decode(encoded.trim())?;
        Ok(Self::new(name, value))
    }

    #[inline]
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Value as text. Only meaningful for [`AttributeKind::Text`].
    pub fn text(&self) -> Option<&str> {
        match self.kind {
            AttributeKind::Text => std::str::from_utf8(&self.value).ok(),
            AttributeKind::Binary => None,
        }
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.value)
    }

    /// Whether an assertion value equals this attribute's value: text
    /// compares case-insensitively, binary compares its base64 form exactly.
    pub fn value_equals(&self, assertion: &str) -> bool {
        match self.kind {
            AttributeKind::Text => self
                .text()
                .is_some_and(|v| v.to_lowercase() == assertion.to_lowercase()),
            AttributeKind::Binary => self.to_base64() == assertion,
        }
    }
}

impl fmt::Display for Attribute {
    /// Renders the attribute as an LDIF line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.text() {
            Some(text) if is_safe_text(text) => write!(f, "{}: {}", self.name, text),
            _ => write!(f, "{}:: {}", self.name, self.to_base64()),
        }
    }
}

/// Whether `text` survives an `attr: value` line unchanged. Leading or
/// trailing spaces would be trimmed on load, and a leading `:` or `<`
/// changes how the line is read.
fn is_safe_text(text: &str) -> bool {
    !text.starts_with(&[' ', ':', '<'][..]) && !text.ends_with(' ')
}

/// A directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub attributes: Vec<Attribute>,
}

impl Entry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// Appends an attribute value (builder style).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.attributes.push(Attribute::new(name, value));
        self
    }

    pub fn push(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// Case-insensitive name comparison.
    pub fn has_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }

    /// Whether this entry sits at or below `base` (case-insensitive).
    pub fn is_within(&self, base: &str) -> bool {
        let name = self.name.to_lowercase();
        let base = base.to_lowercase();
        name == base || name.ends_with(&base)
    }

    /// All values of the named attribute.
    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Attribute> + 'a {
        self.attributes.iter().filter(move |a| a.is_named(name))
    }

    /// First value of the named attribute.
    pub fn first(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.is_named(name))
    }

    /// Copy of the entry as returned to a client: `userPassword` removed and,
    /// when `requested` is non-empty, only the requested attributes kept.
    pub fn project(&self, requested: &[String]) -> Entry {
        let attributes = self
            .attributes
            .iter()
            .filter(|a| !a.is_named(USER_PASSWORD))
            .filter(|a| requested.is_empty() || requested.iter().any(|r| a.is_named(r)))
            .cloned()
            .collect();
        Entry {
            name: self.name.clone(),
            attributes,
        }
    }
}

impl fmt::Display for Entry {
    /// Renders the entry in the on-disk text format.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if is_safe_text(&self.name) {
            writeln!(f, "dn: {}", self.name)?;
        } else {
            writeln!(f, "dn:: {}", STANDARD.encode(&self.name))?;
        }
        for attribute in &self.attributes {
            writeln!(f, "{}", attribute)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Entry {
        Entry::new("cn=alice,dc=enterprise,dc=org")
            .with("cn", "alice")
            .with("objectClass", "person")
            .with("userPassword", "secret")
            .with("jpegPhoto", Bytes::from_static(b"\x00\xff\x10"))
    }

    #[test]
    fn test_printable_value_is_text() {
        assert_eq!(AttributeKind::classify(b"alice"), AttributeKind::Text);
        assert_eq!(AttributeKind::classify("Zoë".as_bytes()), AttributeKind::Text);
    }

    #[test]
    fn test_null_byte_is_binary() {
        assert_eq!(AttributeKind::classify(b"al\x00ice"), AttributeKind::Binary);
        assert_eq!(AttributeKind::classify(&[0xff, 0xfe]), AttributeKind::Binary);
    }

    #[test]
    fn test_binary_base64_recovers_original_bytes() {
        let original = Attribute::new("objectGUID", Bytes::from_static(b"\x00\x01\xfe\r\n"));
        assert_eq!(original.kind, AttributeKind::Binary);

        let decoded = Attribute::from_base64("objectGUID", &original.to_base64()).unwrap();
        assert_eq!(decoded.value, original.value);
        assert_eq!(decoded.kind, AttributeKind::Binary);
    }

    #[test]
    fn test_base64_of_printable_text_is_text() {
        let decoded = Attribute::from_base64("userPassword", &STANDARD.encode(" secret")).unwrap();
        assert_eq!(decoded.kind, AttributeKind::Text);
        assert_eq!(decoded.text(), Some(" secret"));
    }

    #[test]
    fn test_value_equals() {
        let entry = alice();
        assert!(entry.first("CN").unwrap().value_equals("ALICE"));

        let photo = entry.first("jpegPhoto").unwrap();
        assert!(photo.value_equals(&STANDARD.encode(b"\x00\xff\x10")));
        assert!(!photo.value_equals("\u{0}\u{ff}\u{10}"));
    }

    #[test]
    fn test_is_within_base() {
        let entry = alice();
        assert!(entry.is_within("dc=enterprise,dc=org"));
        assert!(entry.is_within("DC=Enterprise,DC=Org"));
        assert!(entry.is_within("cn=alice,dc=enterprise,dc=org"));
        assert!(!entry.is_within("dc=other,dc=org"));
    }

    #[test]
    fn test_project_drops_password() {
        let projected = alice().project(&[]);
        assert!(projected.first("userPassword").is_none());
        assert_eq!(projected.attributes.len(), 3);

        let explicit = alice().project(&["userpassword".to_string(), "cn".to_string()]);
        assert_eq!(explicit.attributes.len(), 1);
        assert_eq!(explicit.attributes[0].name, "cn");
    }

    #[test]
    fn test_display_as_ldif() {
        let entry = Entry::new("cn=bob,dc=enterprise,dc=org")
            .with("cn", "bob")
            .with("blob", Bytes::from_static(b"\x00"));
        assert_eq!(
            entry.to_string(),
            "dn: cn=bob,dc=enterprise,dc=org\ncn: bob\nblob:: AA==\n"
        );
    }

    #[test]
    fn test_display_encodes_unsafe_text() {
        let entry = Entry::new(" cn=pad")
            .with("userPassword", " secret")
            .with("note", ":colon")
            .with("url", "<file")
            .with("tail", "x ");
        let text = entry.to_string();
        assert!(text.starts_with(&format!("dn:: {}\n", STANDARD.encode(" cn=pad"))));
        assert!(text.contains(&format!("userPassword:: {}\n", STANDARD.encode(" secret"))));
        assert!(text.contains(&format!("note:: {}\n", STANDARD.encode(":colon"))));
        assert!(text.contains(&format!("url:: {}\n", STANDARD.encode("<file"))));
        assert!(text.contains(&format!("tail:: {}\n", STANDARD.encode("x "))));
    }
}

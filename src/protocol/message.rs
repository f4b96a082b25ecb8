//! Typed Protocol Messages
//!
//! Requests and responses are closed enums with one variant per operation
//! kind, so route matching and handlers are checked exhaustively by the
//! compiler.

use crate::directory::{Attribute, Entry, Filter};
use bytes::Bytes;
use std::fmt;

/// Identifier a client assigns to each request on a connection.
pub type MessageId = u32;

/// Extended operation name of StartTLS.
pub const START_TLS_OID: &str = "1.3.6.1.4.1.1466.20037";

/// Extended operation name of "Who am I?".
pub const WHO_AM_I_OID: &str = "1.3.6.1.4.1.4203.1.11.3";

/// The subset of directory-protocol result codes this server produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    OperationsError,
    ProtocolError,
    CompareFalse,
    CompareTrue,
    NoSuchObject,
    InvalidCredentials,
    Busy,
    UnwillingToPerform,
}

impl ResultCode {
    pub fn code(self) -> i64 {
        match self {
            ResultCode::Success => 0,
            ResultCode::OperationsError => 1,
            ResultCode::ProtocolError => 2,
            ResultCode::CompareFalse => 5,
            ResultCode::CompareTrue => 6,
            ResultCode::NoSuchObject => 32,
            ResultCode::InvalidCredentials => 49,
            ResultCode::Busy => 51,
            ResultCode::UnwillingToPerform => 53,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => ResultCode::Success,
            1 => ResultCode::OperationsError,
            2 => ResultCode::ProtocolError,
            5 => ResultCode::CompareFalse,
            6 => ResultCode::CompareTrue,
            32 => ResultCode::NoSuchObject,
            49 => ResultCode::InvalidCredentials,
            51 => ResultCode::Busy,
            53 => ResultCode::UnwillingToPerform,
            _ => return None,
        })
    }

    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultCode::Success => "success",
            ResultCode::OperationsError => "operationsError",
            ResultCode::ProtocolError => "protocolError",
            ResultCode::CompareFalse => "compareFalse",
            ResultCode::CompareTrue => "compareTrue",
            ResultCode::NoSuchObject => "noSuchObject",
            ResultCode::InvalidCredentials => "invalidCredentials",
            ResultCode::Busy => "busy",
            ResultCode::UnwillingToPerform => "unwillingToPerform",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchScope {
    BaseObject,
    SingleLevel,
    WholeSubtree,
}

impl SearchScope {
    pub fn code(self) -> i64 {
        match self {
            SearchScope::BaseObject => 0,
            SearchScope::SingleLevel => 1,
            SearchScope::WholeSubtree => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(SearchScope::BaseObject),
            1 => Some(SearchScope::SingleLevel),
            2 => Some(SearchScope::WholeSubtree),
            _ => None,
        }
    }
}

/// Discriminant of a [`Request`], used as the first route predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Bind,
    Search,
    Add,
    Modify,
    Delete,
    Compare,
    Extended,
    Abandon,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Bind => "bind",
            OperationKind::Search => "search",
            OperationKind::Add => "add",
            OperationKind::Modify => "modify",
            OperationKind::Delete => "delete",
            OperationKind::Compare => "compare",
            OperationKind::Extended => "extended",
            OperationKind::Abandon => "abandon",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "bind" => OperationKind::Bind,
            "search" => OperationKind::Search,
            "add" => OperationKind::Add,
            "modify" => OperationKind::Modify,
            "delete" => OperationKind::Delete,
            "compare" => OperationKind::Compare,
            "extended" => OperationKind::Extended,
            "abandon" => OperationKind::Abandon,
            _ => return None,
        })
    }

    /// The final response carrying `result` for an operation of this kind.
    /// Abandon has no response.
    pub fn result_response(self, result: LdapResult) -> Option<Response> {
        Some(match self {
            OperationKind::Bind => Response::Bind(result),
            OperationKind::Search => Response::SearchDone(result),
            OperationKind::Add => Response::Add(result),
            OperationKind::Modify => Response::Modify(result),
            OperationKind::Delete => Response::Delete(result),
            OperationKind::Compare => Response::Compare(result),
            OperationKind::Extended => Response::Extended {
                result,
                name: None,
                value: None,
            },
            OperationKind::Abandon => return None,
        })
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub name: String,
    /// `simple`, or a SASL mechanism name
    pub mechanism: String,
    pub credentials: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base: String,
    pub scope: SearchScope,
    pub filter: Filter,
    pub attributes: Vec<String>,
}

impl SearchRequest {
    /// Canonical textual form of the filter.
    pub fn filter_text(&self) -> String {
        self.filter.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    pub entry: Entry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOperation {
    Add,
    Delete,
    Replace,
}

impl ChangeOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeOperation::Add => "add",
            ChangeOperation::Delete => "delete",
            ChangeOperation::Replace => "replace",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "add" => Some(ChangeOperation::Add),
            "delete" => Some(ChangeOperation::Delete),
            "replace" => Some(ChangeOperation::Replace),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub operation: ChangeOperation,
    pub attribute: String,
    pub values: Vec<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyRequest {
    pub name: String,
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareRequest {
    pub name: String,
    pub attribute: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedRequest {
    pub name: String,
    pub value: Option<Bytes>,
}

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Bind(BindRequest),
    Search(SearchRequest),
    Add(AddRequest),
    Modify(ModifyRequest),
    Delete { name: String },
    Compare(CompareRequest),
    Extended(ExtendedRequest),
    /// Abandon the request carrying this message ID.
    Abandon(MessageId),
}

impl Request {
    pub fn kind(&self) -> OperationKind {
        match self {
            Request::Bind(_) => OperationKind::Bind,
            Request::Search(_) => OperationKind::Search,
            Request::Add(_) => OperationKind::Add,
            Request::Modify(_) => OperationKind::Modify,
            Request::Delete { .. } => OperationKind::Delete,
            Request::Compare(_) => OperationKind::Compare,
            Request::Extended(_) => OperationKind::Extended,
            Request::Abandon(_) => OperationKind::Abandon,
        }
    }

    /// The entry name the request targets, if any.
    pub fn target_name(&self) -> Option<&str> {
        match self {
            Request::Bind(r) => Some(&r.name),
            Request::Search(r) => Some(&r.base),
            Request::Add(r) => Some(&r.entry.name),
            Request::Modify(r) => Some(&r.name),
            Request::Delete { name } => Some(name),
            Request::Compare(r) => Some(&r.name),
            Request::Extended(_) | Request::Abandon(_) => None,
        }
    }
}

/// A request together with its message ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub request: Request,
}

/// Result code plus optional diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapResult {
    pub code: ResultCode,
    pub diagnostic: String,
}

impl LdapResult {
    pub fn new(code: ResultCode) -> Self {
        Self {
            code,
            diagnostic: String::new(),
        }
    }

    pub fn success() -> Self {
        Self::new(ResultCode::Success)
    }

    pub fn with_diagnostic(code: ResultCode, diagnostic: impl Into<String>) -> Self {
        Self {
            code,
            diagnostic: diagnostic.into(),
        }
    }
}

impl From<ResultCode> for LdapResult {
    fn from(code: ResultCode) -> Self {
        LdapResult::new(code)
    }
}

/// A response sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Bind(LdapResult),
    /// One result entry of a search; always followed by `SearchDone`
    /// unless the search is abandoned.
    SearchEntry(Entry),
    SearchDone(LdapResult),
    Add(LdapResult),
    Modify(LdapResult),
    Delete(LdapResult),
    Compare(LdapResult),
    Extended {
        result: LdapResult,
        name: Option<String>,
        value: Option<Bytes>,
    },
}

impl Response {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Response::Bind(_) => "bind",
            Response::SearchEntry(_) => "entry",
            Response::SearchDone(_) => "search",
            Response::Add(_) => "add",
            Response::Modify(_) => "modify",
            Response::Delete(_) => "delete",
            Response::Compare(_) => "compare",
            Response::Extended { .. } => "extended",
        }
    }

    /// The result carried by a final response (`None` for search entries).
    pub fn result(&self) -> Option<&LdapResult> {
        match self {
            Response::Bind(r)
            | Response::SearchDone(r)
            | Response::Add(r)
            | Response::Modify(r)
            | Response::Delete(r)
            | Response::Compare(r) => Some(r),
            Response::Extended { result, .. } => Some(result),
            Response::SearchEntry(_) => None,
        }
    }
}

/// Builds an entry from raw `(attribute, values)` pairs, classifying each
/// value as text or binary.
pub fn entry_from_values(name: impl Into<String>, values: Vec<(String, Vec<Bytes>)>) -> Entry {
    let mut entry = Entry::new(name);
    for (attribute, vals) in values {
        for value in vals {
            entry.push(Attribute::new(attribute.clone(), value));
        }
    }
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::AttributeKind;

    #[test]
    fn test_result_code_numbers_round_trip() {
        for code in [
            ResultCode::Success,
            ResultCode::OperationsError,
            ResultCode::InvalidCredentials,
            ResultCode::Busy,
            ResultCode::UnwillingToPerform,
        ] {
            assert_eq!(ResultCode::from_code(code.code()), Some(code));
        }
        assert_eq!(ResultCode::from_code(999), None);
    }

    #[test]
    fn test_abandon_has_no_response() {
        assert!(OperationKind::Abandon
            .result_response(LdapResult::success())
            .is_none());
        assert!(matches!(
            OperationKind::Search.result_response(LdapResult::success()),
            Some(Response::SearchDone(_))
        ));
    }

    #[test]
    fn test_entry_from_values_classifies() {
        let entry = entry_from_values(
            "cn=x",
            vec![
                ("cn".to_string(), vec![Bytes::from("x")]),
                ("blob".to_string(), vec![Bytes::from_static(b"\x00\x01")]),
            ],
        );
        assert_eq!(entry.attributes[0].kind, AttributeKind::Text);
        assert_eq!(entry.attributes[1].kind, AttributeKind::Binary);
    }
}

//! Debug Backend
//!
//! A store with no data that logs every request it is handed. Useful for
//! watching what a client sends before a real store is wired in.

use crate::directory::entry::Entry;
use crate::directory::filter::Filter;
use crate::directory::store::Backend;
use crate::protocol::{ModifyRequest, ResultCode};
use tracing::info;

/// Logs each operation at info level and answers with a fixed outcome:
/// binds are refused, searches find nothing, adds fail, compares hold,
/// modifies and deletes succeed.
#[derive(Debug, Default, Clone, Copy)]
pub struct DebugBackend;

impl Backend for DebugBackend {
    fn name(&self) -> &str {
        "debug"
    }

    fn bind(&self, name: &str, mechanism: &str, credentials: &[u8]) -> ResultCode {
        info!(backend = "debug", name, mechanism, credentials = credentials.len(), "BIND");
        ResultCode::UnwillingToPerform
    }

    fn search(
        &self,
        base: &str,
        filter: &Filter,
        attributes: &[String],
    ) -> Result<Vec<Entry>, ResultCode> {
        info!(backend = "debug", base, filter = %filter, ?attributes, "SEARCH");
        Ok(Vec::new())
    }

    fn add(&self, entry: Entry) -> ResultCode {
        info!(backend = "debug", name = %entry.name, attributes = entry.attributes.len(), "ADD");
        ResultCode::OperationsError
    }

    fn compare(&self, name: &str, attribute: &str, value: &str) -> ResultCode {
        info!(backend = "debug", name, attribute, value, "COMPARE");
        ResultCode::CompareTrue
    }

    fn modify(&self, request: &ModifyRequest) -> ResultCode {
        for change in &request.changes {
            info!(
                backend = "debug",
                name = %request.name,
                operation = change.operation.as_str(),
                attribute = %change.attribute,
                values = change.values.len(),
                "MODIFY"
            );
        }
        ResultCode::Success
    }

    fn delete(&self, name: &str) -> ResultCode {
        info!(backend = "debug", name, "DELETE");
        ResultCode::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Change, ChangeOperation};
    use bytes::Bytes;

    #[test]
    fn test_fixed_outcomes() {
        let backend = DebugBackend;
        assert_eq!(backend.name(), "debug");
        assert_eq!(
            backend.bind("cn=alice", "simple", b"secret"),
            ResultCode::UnwillingToPerform
        );
        assert_eq!(
            backend.search("dc=x", &Filter::present("objectClass"), &[]),
            Ok(Vec::new())
        );
        assert_eq!(
            backend.add(Entry::new("cn=bob,dc=x").with("cn", "bob")),
            ResultCode::OperationsError
        );
        assert_eq!(backend.compare("cn=bob,dc=x", "cn", "anything"), ResultCode::CompareTrue);
        assert_eq!(backend.delete("cn=bob,dc=x"), ResultCode::Success);
    }

    #[test]
    fn test_modify_succeeds_for_every_change() {
        let request = ModifyRequest {
            name: "cn=bob,dc=x".to_string(),
            changes: vec![
                Change {
                    operation: ChangeOperation::Add,
                    attribute: "mail".to_string(),
                    values: vec![Bytes::from_static(b"bob@x")],
                },
                Change {
                    operation: ChangeOperation::Delete,
                    attribute: "sn".to_string(),
                    values: Vec::new(),
                },
            ],
        };
        assert_eq!(DebugBackend.modify(&request), ResultCode::Success);
    }
}

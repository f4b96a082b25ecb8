//! Routes
//!
//! A [`Route`] pairs a handler and a backend with the predicates a request
//! must satisfy to reach them. Routes are built once at startup with a
//! small builder API:
//!
//! ```
//! use flashdir::directory::NullBackend;
//! use flashdir::protocol::SearchScope;
//! use flashdir::router::{handlers, Route};
//! use std::sync::Arc;
//!
//! let route = Route::search(handlers::search, Arc::new(NullBackend))
//!     .name_suffix("")
//!     .scope(SearchScope::BaseObject)
//!     .filter("(objectclass=*)")
//!     .label("root DSE");
//! assert_eq!(route.label_str(), "root DSE");
//! ```

use crate::connection::RequestContext;
use crate::directory::{Backend, Filter};
use crate::protocol::{OperationKind, Request, SearchScope};
use std::fmt;
use std::sync::Arc;

/// Serves one request. Responses go through `ctx`.
///
/// Handlers run on a blocking thread and may take as long as they need;
/// long-running ones should poll [`RequestContext::is_cancelled`].
pub trait Handler: Send + Sync {
    fn handle(&self, request: &Request, backend: &dyn Backend, ctx: &RequestContext);
}

impl<F> Handler for F
where
    F: Fn(&Request, &dyn Backend, &RequestContext) + Send + Sync,
{
    fn handle(&self, request: &Request, backend: &dyn Backend, ctx: &RequestContext) {
        self(request, backend, ctx)
    }
}

/// One entry of the route table.
#[derive(Clone)]
pub struct Route {
    operation: OperationKind,
    name_suffix: Option<String>,
    /// Canonical, lowercased filter text
    filter_text: Option<String>,
    scope: Option<SearchScope>,
    /// Lowercased bind mechanism
    auth_mechanism: Option<String>,
    extended_name: Option<String>,
    handler: Arc<dyn Handler>,
    backend: Arc<dyn Backend>,
    label: String,
}

impl Route {
    pub fn new(
        operation: OperationKind,
        handler: impl Handler + 'static,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self {
            operation,
            name_suffix: None,
            filter_text: None,
            scope: None,
            auth_mechanism: None,
            extended_name: None,
            handler: Arc::new(handler),
            backend,
            label: operation.as_str().to_string(),
        }
    }

    pub fn bind(handler: impl Handler + 'static, backend: Arc<dyn Backend>) -> Self {
        Self::new(OperationKind::Bind, handler, backend)
    }

    pub fn search(handler: impl Handler + 'static, backend: Arc<dyn Backend>) -> Self {
        Self::new(OperationKind::Search, handler, backend)
    }

    pub fn add(handler: impl Handler + 'static, backend: Arc<dyn Backend>) -> Self {
        Self::new(OperationKind::Add, handler, backend)
    }

    pub fn modify(handler: impl Handler + 'static, backend: Arc<dyn Backend>) -> Self {
        Self::new(OperationKind::Modify, handler, backend)
    }

    pub fn delete(handler: impl Handler + 'static, backend: Arc<dyn Backend>) -> Self {
        Self::new(OperationKind::Delete, handler, backend)
    }

    pub fn compare(handler: impl Handler + 'static, backend: Arc<dyn Backend>) -> Self {
        Self::new(OperationKind::Compare, handler, backend)
    }

    pub fn extended(handler: impl Handler + 'static, backend: Arc<dyn Backend>) -> Self {
        Self::new(OperationKind::Extended, handler, backend)
    }

    pub fn abandon(handler: impl Handler + 'static, backend: Arc<dyn Backend>) -> Self {
        Self::new(OperationKind::Abandon, handler, backend)
    }

    /// Bind: target name must end with `suffix` (case-sensitive).
    /// Search: base name must equal `suffix` (case-insensitive).
    /// Add, modify, delete, compare: target name must end with `suffix`
    /// (case-insensitive).
    pub fn name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.name_suffix = Some(suffix.into());
        self
    }

    /// Search filter whose canonical text must equal `text`
    /// (case-insensitive).
    pub fn filter(mut self, text: &str) -> Self {
        let canonical = text
            .parse::<Filter>()
            .map(|f| f.to_string())
            .unwrap_or_else(|_| text.to_string());
        self.filter_text = Some(canonical.to_lowercase());
        self
    }

    pub fn scope(mut self, scope: SearchScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Bind mechanism (case-insensitive).
    pub fn mechanism(mut self, mechanism: &str) -> Self {
        self.auth_mechanism = Some(mechanism.to_lowercase());
        self
    }

    /// Extended operation name (exact).
    pub fn extended_name(mut self, name: impl Into<String>) -> Self {
        self.extended_name = Some(name.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn label_str(&self) -> &str {
        &self.label
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Length of the name predicate in characters, the ordering key.
    pub(crate) fn suffix_len(&self) -> Option<usize> {
        self.name_suffix.as_ref().map(|s| s.chars().count())
    }

    /// Whether `request` satisfies every predicate of this route.
    pub fn matches(&self, request: &Request) -> bool {
        if request.kind() != self.operation {
            return false;
        }

        match request {
            Request::Bind(bind) => {
                if let Some(mechanism) = &self.auth_mechanism {
                    if !bind.mechanism.eq_ignore_ascii_case(mechanism) {
                        return false;
                    }
                }
                match &self.name_suffix {
                    Some(suffix) => bind.name.ends_with(suffix.as_str()),
                    None => true,
                }
            }
            Request::Search(search) => {
                if let Some(base) = &self.name_suffix {
                    if search.base.to_lowercase() != base.to_lowercase() {
                        return false;
                    }
                }
                if let Some(text) = &self.filter_text {
                    if search.filter_text().to_lowercase() != *text {
                        return false;
                    }
                }
                match self.scope {
                    Some(scope) => search.scope == scope,
                    None => true,
                }
            }
            Request::Extended(extended) => self
                .extended_name
                .as_ref()
                .is_some_and(|name| *name == extended.name),
            Request::Add(_)
            | Request::Modify(_)
            | Request::Delete { .. }
            | Request::Compare(_) => match (&self.name_suffix, request.target_name()) {
                (Some(suffix), Some(name)) => {
                    name.to_lowercase().ends_with(&suffix.to_lowercase())
                }
                _ => true,
            },
            Request::Abandon(_) => true,
        }
    }

    pub(crate) fn invoke(&self, request: &Request, ctx: &RequestContext) {
        self.handler.handle(request, self.backend.as_ref(), ctx);
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("operation", &self.operation)
            .field("name_suffix", &self.name_suffix)
            .field("filter_text", &self.filter_text)
            .field("scope", &self.scope)
            .field("auth_mechanism", &self.auth_mechanism)
            .field("extended_name", &self.extended_name)
            .field("backend", &self.backend.name())
            .field("label", &self.label)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::NullBackend;
    use crate::protocol::{BindRequest, CompareRequest, ExtendedRequest, SearchRequest};
    use bytes::Bytes;

    fn noop(_: &Request, _: &dyn Backend, _: &RequestContext) {}

    fn null() -> Arc<dyn Backend> {
        Arc::new(NullBackend)
    }

    fn bind(name: &str, mechanism: &str) -> Request {
        Request::Bind(BindRequest {
            name: name.to_string(),
            mechanism: mechanism.to_string(),
            credentials: Bytes::new(),
        })
    }

    fn search(base: &str, scope: SearchScope, filter: &str) -> Request {
        Request::Search(SearchRequest {
            base: base.to_string(),
            scope,
            filter: filter.parse().unwrap(),
            attributes: Vec::new(),
        })
    }

    fn extended(name: &str) -> Request {
        Request::Extended(ExtendedRequest {
            name: name.to_string(),
            value: None,
        })
    }

    #[test]
    fn test_operation_must_match() {
        let route = Route::search(noop, null());
        assert!(!route.matches(&bind("cn=a", "simple")));
        assert!(route.matches(&search("dc=x", SearchScope::WholeSubtree, "(cn=*)")));
    }

    #[test]
    fn test_bind_mechanism_is_case_insensitive() {
        let route = Route::bind(noop, null()).mechanism("SIMPLE");
        assert!(route.matches(&bind("cn=a", "simple")));
        assert!(!route.matches(&bind("cn=a", "sasl")));
    }

    #[test]
    fn test_bind_suffix_is_case_sensitive() {
        let route = Route::bind(noop, null()).name_suffix("dc=enterprise,dc=org");
        assert!(route.matches(&bind("cn=alice,dc=enterprise,dc=org", "simple")));
        assert!(!route.matches(&bind("cn=alice,DC=Enterprise,DC=Org", "simple")));
    }

    #[test]
    fn test_search_base_is_equality_not_suffix() {
        let route = Route::search(noop, null()).name_suffix("dc=enterprise,dc=org");
        assert!(route.matches(&search(
            "DC=Enterprise,DC=Org",
            SearchScope::WholeSubtree,
            "(cn=*)"
        )));
        assert!(!route.matches(&search(
            "ou=people,dc=enterprise,dc=org",
            SearchScope::WholeSubtree,
            "(cn=*)"
        )));
    }

    #[test]
    fn test_search_filter_and_scope() {
        let route = Route::search(noop, null())
            .name_suffix("")
            .scope(SearchScope::BaseObject)
            .filter("(objectClass=*)");
        assert!(route.matches(&search("", SearchScope::BaseObject, "(objectclass=*)")));
        assert!(route.matches(&search("", SearchScope::BaseObject, "(OBJECTCLASS=*)")));
        assert!(!route.matches(&search("", SearchScope::SingleLevel, "(objectclass=*)")));
        assert!(!route.matches(&search("", SearchScope::BaseObject, "(cn=*)")));
    }

    #[test]
    fn test_extended_requires_name() {
        let unnamed = Route::extended(noop, null());
        assert!(!unnamed.matches(&extended("1.2.3")));

        let named = Route::extended(noop, null()).extended_name("1.2.3");
        assert!(named.matches(&extended("1.2.3")));
        assert!(!named.matches(&extended("1.2.3.4")));
    }

    #[test]
    fn test_compare_suffix() {
        let route = Route::compare(noop, null()).name_suffix("dc=org");
        let request = |name: &str| {
            Request::Compare(CompareRequest {
                name: name.to_string(),
                attribute: "cn".to_string(),
                value: "x".to_string(),
            })
        };
        assert!(route.matches(&request("cn=x,DC=ORG")));
        assert!(!route.matches(&request("cn=x,dc=net")));
    }

    #[test]
    fn test_debug_shows_label_and_backend() {
        let route = Route::abandon(noop, null()).label("abandon");
        let text = format!("{:?}", route);
        assert!(text.contains("abandon"));
        assert!(text.contains("null"));
    }
}

//! Request Handlers
//!
//! Store-backed handlers for every operation, the built-in handlers (root
//! DSE, naming context root, StartTLS, "Who am I?") and the default route
//! table wiring them together.

use crate::connection::RequestContext;
use crate::directory::{Backend, Entry, NullBackend};
use crate::protocol::{
    LdapResult, Request, Response, ResultCode, SearchScope, START_TLS_OID, WHO_AM_I_OID,
};
use crate::router::route::{Handler, Route};
use crate::router::table::{RouteTable, NOT_IMPLEMENTED};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Answers a request that reached a handler for another operation kind.
fn mismatched(request: &Request, ctx: &RequestContext) {
    warn!(
        message_id = ctx.message_id(),
        operation = %request.kind(),
        "Handler received a request of the wrong kind"
    );
    ctx.write_result(LdapResult::new(ResultCode::ProtocolError));
}

pub fn bind(request: &Request, backend: &dyn Backend, ctx: &RequestContext) {
    let Request::Bind(bind) = request else {
        return mismatched(request, ctx);
    };

    let code = backend.bind(&bind.name, &bind.mechanism, &bind.credentials);
    let diagnostic = match code {
        ResultCode::Success => {
            ctx.session().set_bound(Some(bind.name.clone()));
            info!(client = %ctx.session().peer(), user = %bind.name, "Bind succeeded");
            ""
        }
        ResultCode::InvalidCredentials => "invalid credentials",
        ResultCode::UnwillingToPerform => "Authentication choice not supported",
        _ => "",
    };
    if !code.is_success() {
        ctx.session().set_bound(None);
        info!(client = %ctx.session().peer(), user = %bind.name, code = %code, "Bind failed");
    }

    ctx.write_result(LdapResult::with_diagnostic(code, diagnostic));
}

/// Streams matching entries, then the final result. Stops silently once
/// the request is abandoned.
pub fn search(request: &Request, backend: &dyn Backend, ctx: &RequestContext) {
    let Request::Search(search) = request else {
        return mismatched(request, ctx);
    };

    if ctx.is_cancelled() {
        trace!(message_id = ctx.message_id(), "Search abandoned before start");
        return;
    }

    let result = match backend.search(&search.base, &search.filter, &search.attributes) {
        Ok(entries) => {
            for entry in entries {
                if ctx.is_cancelled() {
                    trace!(message_id = ctx.message_id(), "Search abandoned mid-stream");
                    return;
                }
                ctx.write(Response::SearchEntry(entry));
            }
            LdapResult::success()
        }
        Err(code) => {
            debug!(message_id = ctx.message_id(), code = %code, "Search aborted");
            LdapResult::new(code)
        }
    };

    if ctx.is_cancelled() {
        trace!(message_id = ctx.message_id(), "Search abandoned before completion");
        return;
    }
    ctx.write_result(result);
}

pub fn add(request: &Request, backend: &dyn Backend, ctx: &RequestContext) {
    let Request::Add(add) = request else {
        return mismatched(request, ctx);
    };
    let code = backend.add(add.entry.clone());
    debug!(name = %add.entry.name, code = %code, "Add");
    ctx.write_result(code);
}

pub fn modify(request: &Request, backend: &dyn Backend, ctx: &RequestContext) {
    let Request::Modify(modify) = request else {
        return mismatched(request, ctx);
    };
    ctx.write_result(backend.modify(modify));
}

pub fn delete(request: &Request, backend: &dyn Backend, ctx: &RequestContext) {
    let Request::Delete { name } = request else {
        return mismatched(request, ctx);
    };
    ctx.write_result(backend.delete(name));
}

pub fn compare(request: &Request, backend: &dyn Backend, ctx: &RequestContext) {
    let Request::Compare(compare) = request else {
        return mismatched(request, ctx);
    };
    let code = backend.compare(&compare.name, &compare.attribute, &compare.value);
    ctx.write_result(code);
}

/// Cancels the target request. Never answers.
pub fn abandon(request: &Request, _backend: &dyn Backend, ctx: &RequestContext) {
    if let Request::Abandon(target) = request {
        ctx.session().abandon(*target);
    }
}

/// Fallback for requests no route claims.
pub fn not_found(request: &Request, _backend: &dyn Backend, ctx: &RequestContext) {
    if matches!(request, Request::Abandon(_)) {
        return;
    }
    ctx.write_result(LdapResult::with_diagnostic(
        ResultCode::UnwillingToPerform,
        NOT_IMPLEMENTED,
    ));
}

/// Replies, then has the connection swap its transport for a secured one.
pub fn start_tls(_request: &Request, _backend: &dyn Backend, ctx: &RequestContext) {
    let session = ctx.session();
    let (result, upgrade) = if session.is_secured() {
        let result =
            LdapResult::with_diagnostic(ResultCode::OperationsError, "TLS already established");
        (result, false)
    } else if !session.tls_available() {
        let result =
            LdapResult::with_diagnostic(ResultCode::UnwillingToPerform, "TLS is not configured");
        (result, false)
    } else {
        (LdapResult::success(), true)
    };

    let response = Response::Extended {
        result,
        name: Some(START_TLS_OID.to_string()),
        value: None,
    };
    if upgrade {
        ctx.write_then_upgrade(response);
    } else {
        ctx.write(response);
    }
}

/// Replies with the bound identity as `dn:<name>`, or empty when anonymous.
pub fn who_am_i(_request: &Request, _backend: &dyn Backend, ctx: &RequestContext) {
    let identity = ctx
        .session()
        .bound_name()
        .map(|name| format!("dn:{}", name))
        .unwrap_or_default();
    ctx.write(Response::Extended {
        result: LdapResult::success(),
        name: None,
        value: Some(Bytes::from(identity)),
    });
}

/// Writes one synthetic entry if it passes the request's filter.
fn write_synthetic(entry: Entry, request: &Request, ctx: &RequestContext) {
    let Request::Search(search) = request else {
        return mismatched(request, ctx);
    };
    let result = match search.filter.evaluate(&entry) {
        Ok(true) => {
            ctx.write(Response::SearchEntry(entry.project(&search.attributes)));
            LdapResult::success()
        }
        Ok(false) => LdapResult::success(),
        Err(code) => LdapResult::new(code),
    };
    ctx.write_result(result);
}

/// Server metadata published through the root DSE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootDse {
    pub vendor_name: String,
    pub vendor_version: String,
    pub naming_context: String,
}

impl RootDse {
    pub fn new(naming_context: impl Into<String>) -> Self {
        Self {
            vendor_name: crate::VENDOR.to_string(),
            vendor_version: crate::VERSION.to_string(),
            naming_context: naming_context.into(),
        }
    }

    pub fn entry(&self) -> Entry {
        Entry::new("")
            .with("vendorName", self.vendor_name.clone())
            .with("vendorVersion", self.vendor_version.clone())
            .with("objectClass", "top")
            .with("objectClass", "extensibleObject")
            .with("supportedLDAPVersion", "3")
            .with("namingContexts", self.naming_context.clone())
            .with("supportedExtension", START_TLS_OID)
            .with("supportedExtension", WHO_AM_I_OID)
    }
}

impl Handler for RootDse {
    fn handle(&self, request: &Request, _backend: &dyn Backend, ctx: &RequestContext) {
        write_synthetic(self.entry(), request, ctx);
    }
}

/// Answers a base-scope search of the naming context itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingContextRoot {
    pub name: String,
}

impl NamingContextRoot {
    pub fn entry(&self) -> Entry {
        Entry::new(self.name.clone())
            .with("objectClass", "top")
            .with("objectClass", "organizationalUnit")
    }
}

impl Handler for NamingContextRoot {
    fn handle(&self, request: &Request, _backend: &dyn Backend, ctx: &RequestContext) {
        write_synthetic(self.entry(), request, ctx);
    }
}

/// The standard route table: built-ins, then every operation bound to
/// `store`, with [`not_found`] as the fallback.
pub fn default_routes(store: Arc<dyn Backend>, root: RootDse) -> RouteTable {
    let null: Arc<dyn Backend> = Arc::new(NullBackend);
    let naming_context = root.naming_context.clone();
    let mut routes = RouteTable::new();

    routes
        .register(
            Route::search(root, Arc::clone(&null))
                .name_suffix("")
                .scope(SearchScope::BaseObject)
                .filter("(objectclass=*)")
                .label("Search - root DSE"),
        )
        .register(
            Route::search(
                NamingContextRoot {
                    name: naming_context.clone(),
                },
                Arc::clone(&null),
            )
            .name_suffix(naming_context)
            .scope(SearchScope::BaseObject)
            .label("Search - naming context root"),
        )
        .register(
            Route::extended(start_tls, Arc::clone(&null))
                .extended_name(START_TLS_OID)
                .label("Extended - StartTLS"),
        )
        .register(
            Route::extended(who_am_i, Arc::clone(&null))
                .extended_name(WHO_AM_I_OID)
                .label("Extended - WhoAmI"),
        )
        .register(Route::abandon(abandon, Arc::clone(&null)).label("Abandon"))
        .register(Route::bind(bind, Arc::clone(&store)).label("Bind"))
        .register(Route::search(search, Arc::clone(&store)).label("Search"))
        .register(Route::add(add, Arc::clone(&store)).label("Add"))
        .register(Route::compare(compare, Arc::clone(&store)).label("Compare"))
        .register(Route::modify(modify, Arc::clone(&store)).label("Modify"))
        .register(Route::delete(delete, Arc::clone(&store)).label("Delete"))
        .set_not_found(Route::extended(not_found, null).label("Not found"));

    routes
}

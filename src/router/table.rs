//! Route Table
//!
//! Holds the routes in matching order plus an optional not-found route.
//!
//! ## Ordering
//!
//! ```text
//! name predicate, longest first   ┐
//! name predicate, shorter         ├─ stable: equal keys keep registration order
//! name predicate ""               │
//! no name predicate               ┘
//! ```
//!
//! The order is restored after every registration, so a route pinned to a
//! more specific name always shadows a broader one whatever order the two
//! were registered in. The table is built before the server starts and is
//! only read afterwards, so matching takes no lock.

use crate::connection::RequestContext;
use crate::protocol::{LdapResult, Request, ResultCode};
use crate::router::route::Route;
use tracing::debug;

/// Diagnostic of the built-in answer to an unroutable request.
pub const NOT_IMPLEMENTED: &str = "Operation not implemented by server";

#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
    not_found: Option<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `route` and restores most-specific-first order.
    pub fn register(&mut self, route: Route) -> &mut Self {
        self.routes.push(route);
        // `sort_by` is stable; `None` sorts below every `Some`.
        self.routes
            .sort_by(|a, b| b.suffix_len().cmp(&a.suffix_len()));
        self
    }

    /// Route answering requests no other route matches.
    pub fn set_not_found(&mut self, route: Route) -> &mut Self {
        self.not_found = Some(route);
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First route matching `request`.
    pub fn find(&self, request: &Request) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(request))
    }

    /// Runs `request` through the first matching route.
    ///
    /// Returns `false` when no explicit route matched. In that case an
    /// abandon still cancels its target, then the not-found route (or the
    /// built-in "not implemented" answer) handles the request.
    pub fn dispatch(&self, request: &Request, ctx: &RequestContext) -> bool {
        if let Some(route) = self.find(request) {
            debug!(
                message_id = ctx.message_id(),
                operation = %request.kind(),
                route = route.label_str(),
                backend = route.backend().name(),
                "Route matched"
            );
            route.invoke(request, ctx);
            return true;
        }

        debug!(
            message_id = ctx.message_id(),
            operation = %request.kind(),
            "No route matched"
        );

        if let Request::Abandon(target) = request {
            ctx.session().abandon(*target);
        }

        match &self.not_found {
            Some(route) => route.invoke(request, ctx),
            None => {
                ctx.write_result(LdapResult::with_diagnostic(
                    ResultCode::UnwillingToPerform,
                    NOT_IMPLEMENTED,
                ));
            }
        }
        false
    }
}

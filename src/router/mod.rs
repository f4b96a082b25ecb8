//! Route Dispatch
//!
//! Every decoded request is matched against an ordered table of routes;
//! the first route whose predicates all hold gets the request, together
//! with the backend it was registered with.
//!
//! ## Architecture
//!
//! ```text
//!   Request ──> RouteTable::dispatch
//!                    │
//!                    │ first match, most specific name first
//!                    ▼
//!        ┌────────────────────────┐
//!        │ Route                  │
//!        │  operation kind        │
//!        │  name / filter / scope │──> Handler::handle(request, backend, ctx)
//!        │  mechanism / ext. name │                         │
//!        └────────────────────────┘                         ▼
//!                    │ no match                     responses via ctx
//!                    ▼
//!        abandon: cancel target
//!        then not-found route or "not implemented"
//! ```

pub mod handlers;
pub mod route;
pub mod table;

pub use handlers::{default_routes, NamingContextRoot, RootDse};
pub use route::{Handler, Route};
pub use table::{RouteTable, NOT_IMPLEMENTED};

//! Connection Handling
//!
//! Each accepted socket is served by its own task. The task owns the read
//! side and the write side of the socket; request handlers never touch the
//! socket directly and instead queue responses through their
//! [`RequestContext`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept(), spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────┐     │
//! │  │ Read bytes  │───>│ Parse frame │───>│ Decode and   │     │
//! │  └─────────────┘    └─────────────┘    │ queue/abandon│     │
//! │        ▲                               └──────┬───────┘     │
//! │        │                                      │             │
//! │  ┌─────┴───────┐   responses   ┌──────────────▼───────┐     │
//! │  │ Write resp  │<──────────────│ Worker: RouteTable   │     │
//! │  └─────────────┘   (channel)   └──────────────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Pipelining**: several requests may arrive in one read
//! - **Abandon**: in-flight requests carry a cancellation token keyed by
//!   message ID
//! - **StartTLS**: the transport is swapped right after the success
//!   response is written
//! - **Statistics**: connection and request counters

pub mod handler;
pub mod registry;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
pub use registry::InFlightRegistry;
pub use session::{Outgoing, RequestContext, ResponseWriter, Session};
pub use transport::{BoxedTransport, TlsUpgrader, Transport, UpgradeFuture};

//! # FlashDir - A Lightweight Directory-Access Server
//!
//! FlashDir is an LDAP-style directory server written in Rust. Requests are
//! matched against a table of routes and handed to pluggable backends; the
//! bundled backend keeps entries in memory and persists them as LDIF files.
//!
//! ## Features
//!
//! - **Route Dispatch**: routes select on operation, name suffix, filter,
//!   scope, bind mechanism and extended operation name
//! - **Pluggable Backends**: any [`directory::Backend`] can serve a route
//! - **Abandon**: in-flight requests can be cancelled by message ID
//! - **StartTLS**: the transport can be secured mid-session
//! - **Async I/O**: built on Tokio, one task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FlashDir                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│ RouteTable  │                  │
//! │  │ (Listener)  │    │  Handler    │    │  dispatch   │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │  ┌──────────────────────────────┐  ┌──────────────────────────────────┐ │
//! │  │ Protocol                     │  │ Directory                        │ │
//! │  │  frame parser ─> codec       │  │  Backend trait                   │ │
//! │  │  typed requests / responses  │  │  Filter evaluation               │ │
//! │  └──────────────────────────────┘  │  LdifStore (memory + .ldif files)│ │
//! │                                    └──────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use flashdir::directory::{Backend, LdifStore};
//! use flashdir::router::{default_routes, RootDse};
//! use flashdir::server::{Server, ServerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store: Arc<dyn Backend> = Arc::new(LdifStore::open("./ldif")?);
//!     let routes = default_routes(store, RootDse::new(flashdir::DEFAULT_NAMING_CONTEXT));
//!
//!     let server = Server::new(ServerConfig::new("127.0.0.1:3389", routes));
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod directory;
pub mod protocol;
pub mod router;
pub mod server;

// Re-export commonly used types at the crate root
pub use connection::{ConnectionStats, RequestContext};
pub use directory::{Backend, Entry, Filter, LdifStore};
pub use protocol::{LdapResult, Message, Request, Response, ResultCode};
pub use router::{Route, RouteTable};
pub use server::{Server, ServerConfig, ServerError};

/// The default port FlashDir listens on
pub const DEFAULT_PORT: u16 = 3389;

/// The default host FlashDir binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Naming context served when none is configured
pub const DEFAULT_NAMING_CONTEXT: &str = "dc=enterprise,dc=org";

/// Vendor name advertised by the root DSE
pub const VENDOR: &str = "FlashDir";

/// Version of FlashDir
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

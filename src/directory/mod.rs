//! Directory Data Model and Stores
//!
//! - `entry`: Entries and typed attribute values
//! - `filter`: Search filter trees, their text form and evaluation
//! - `store`: The `Backend` contract and the reference `LdifStore`
//! - `ldif`: Load/persist of the on-disk text format
//! - `debug`: A backend that only logs what it is asked

pub mod debug;
pub mod entry;
pub mod filter;
pub mod ldif;
pub mod store;

pub use debug::DebugBackend;
pub use entry::{Attribute, AttributeKind, Entry, USER_PASSWORD};
pub use filter::{Filter, FilterParseError, Substrings, UnsupportedKind};
pub use store::{Backend, LdifStore, NullBackend, StoreError};

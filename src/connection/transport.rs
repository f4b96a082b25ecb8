//! Connection Transports
//!
//! A connection talks through a boxed byte stream so that StartTLS can swap
//! the plain TCP socket for a secured one mid-session. The TLS handshake
//! itself lives behind [`TlsUpgrader`]; this crate never sees certificates.

use std::future::Future;
use std::io;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream a connection can run on.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type BoxedTransport = Box<dyn Transport>;

pub type UpgradeFuture = Pin<Box<dyn Future<Output = io::Result<BoxedTransport>> + Send>>;

/// Performs the server side of a TLS handshake over an established stream.
pub trait TlsUpgrader: Send + Sync {
    /// Consumes the plain stream and resolves to the secured one.
    fn upgrade(&self, transport: BoxedTransport) -> UpgradeFuture;
}

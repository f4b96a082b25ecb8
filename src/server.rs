//! Listener and Server Lifecycle
//!
//! The server accepts connections and spawns one worker task per socket.
//! Shutdown is a single process-wide [`CancellationToken`]:
//!
//! 1. the accept loop stops and the listening socket is released
//! 2. every worker sees the token, finishes its current request and exits
//! 3. [`Server::serve`] returns once the [`TaskTracker`] reports all
//!    workers done

use crate::connection::{handle_connection, ConnectionStats, TlsUpgrader};
use crate::router::RouteTable;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the server needs, assembled once at startup.
pub struct ServerConfig {
    /// `host:port` to listen on
    pub addr: String,
    pub routes: RouteTable,
    /// Idle deadline for reading the next request
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub tls: Option<Arc<dyn TlsUpgrader>>,
}

impl ServerConfig {
    pub fn new(addr: impl Into<String>, routes: RouteTable) -> Self {
        Self {
            addr: addr.into(),
            routes,
            read_timeout: None,
            write_timeout: None,
            tls: None,
        }
    }

    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn tls_upgrader(mut self, upgrader: Arc<dyn TlsUpgrader>) -> Self {
        self.tls = Some(upgrader);
        self
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("addr", &self.addr)
            .field("routes", &self.routes.len())
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

pub struct Server {
    config: Arc<ServerConfig>,
    stats: Arc<ConnectionStats>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            stats: Arc::new(ConnectionStats::new()),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        TcpListener::bind(&self.config.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.config.addr.clone(),
                source,
            })
    }

    /// Binds and serves until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        info!(addr = %listener.local_addr()?, "Listening");
        self.serve(listener).await
    }

    /// Accepts connections on `listener` until shutdown, then waits for
    /// every connection worker to finish.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        self.tracker.spawn(handle_connection(
                            Box::new(stream),
                            addr,
                            Arc::clone(&self.config),
                            Arc::clone(&self.stats),
                            self.shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        drop(listener);
        info!(
            connections = self.tracker.len(),
            "Stopped accepting, waiting for connections to finish"
        );
        self.tracker.close();
        self.tracker.wait().await;
        info!("All connections closed");
        Ok(())
    }
}

//! Per-Connection Session State
//!
//! What a handler sees of the connection it is serving: the session
//! (peer, bound identity, TLS state, in-flight registry) and a writer that
//! queues responses for the connection loop to send.

use crate::connection::handler::ConnectionStats;
use crate::connection::registry::InFlightRegistry;
use crate::protocol::{LdapResult, MessageId, OperationKind, Response};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// State shared by everything running on behalf of one connection.
#[derive(Debug)]
pub struct Session {
    peer: SocketAddr,
    in_flight: InFlightRegistry,
    bound: Mutex<Option<String>>,
    secured: AtomicBool,
    tls_available: bool,
    stats: Arc<ConnectionStats>,
}

impl Session {
    pub fn new(peer: SocketAddr, tls_available: bool, stats: Arc<ConnectionStats>) -> Self {
        Self {
            peer,
            in_flight: InFlightRegistry::new(),
            bound: Mutex::new(None),
            secured: AtomicBool::new(false),
            tls_available,
            stats,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn in_flight(&self) -> &InFlightRegistry {
        &self.in_flight
    }

    /// Cancels the in-flight request `target`. Unknown or finished IDs are
    /// ignored.
    pub fn abandon(&self, target: MessageId) -> bool {
        let cancelled = self.in_flight.cancel(target);
        if cancelled {
            self.stats.request_abandoned();
            debug!(client = %self.peer, abandoned_id = target, "Request abandoned");
        } else {
            trace!(client = %self.peer, abandoned_id = target, "Abandon target not in flight");
        }
        cancelled
    }

    /// Name of the identity bound on this connection; `None` when anonymous.
    pub fn bound_name(&self) -> Option<String> {
        self.bound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_bound(&self, name: Option<String>) {
        *self.bound.lock().unwrap_or_else(PoisonError::into_inner) = name;
    }

    pub fn is_secured(&self) -> bool {
        self.secured.load(Ordering::Acquire)
    }

    pub fn mark_secured(&self) {
        self.secured.store(true, Ordering::Release);
    }

    /// Whether the server can upgrade this connection to TLS.
    pub fn tls_available(&self) -> bool {
        self.tls_available
    }
}

/// A response queued for the connection loop.
#[derive(Debug)]
pub struct Outgoing {
    pub id: MessageId,
    pub response: Response,
    /// Swap the transport for a secured one once this response is written.
    pub upgrade: bool,
}

/// Sending half of a connection's response queue.
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl ResponseWriter {
    pub fn new(tx: mpsc::UnboundedSender<Outgoing>) -> Self {
        Self { tx }
    }

    /// Queues `response`. Returns `false` if the connection is gone.
    pub fn send(&self, id: MessageId, response: Response) -> bool {
        self.push(Outgoing {
            id,
            response,
            upgrade: false,
        })
    }

    pub fn send_then_upgrade(&self, id: MessageId, response: Response) -> bool {
        self.push(Outgoing {
            id,
            response,
            upgrade: true,
        })
    }

    fn push(&self, outgoing: Outgoing) -> bool {
        self.tx.send(outgoing).is_ok()
    }
}

/// Everything a handler needs to serve one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    message_id: MessageId,
    kind: OperationKind,
    token: CancellationToken,
    session: Arc<Session>,
    writer: ResponseWriter,
}

impl RequestContext {
    pub fn new(
        message_id: MessageId,
        kind: OperationKind,
        token: CancellationToken,
        session: Arc<Session>,
        writer: ResponseWriter,
    ) -> Self {
        Self {
            message_id,
            kind,
            token,
            session,
            writer,
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Whether an abandon has targeted this request.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn write(&self, response: Response) -> bool {
        self.writer.send(self.message_id, response)
    }

    /// Writes the final response of this request's own kind.
    pub fn write_result(&self, result: impl Into<LdapResult>) -> bool {
        match self.kind.result_response(result.into()) {
            Some(response) => self.write(response),
            None => false,
        }
    }

    /// Writes `response`, after which the connection upgrades to TLS.
    pub fn write_then_upgrade(&self, response: Response) -> bool {
        self.writer.send_then_upgrade(self.message_id, response)
    }
}

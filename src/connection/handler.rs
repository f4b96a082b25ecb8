//! Connection Handler Module
//!
//! This module handles individual client connections. Each client gets its
//! own task that reads requests, hands them to the route table one at a
//! time and writes the responses back.
//!
//! ## Connection Lifecycle
//!
//! ```text
//!  Accepted ──> Serving ──────────────> Draining ──> Closed
//!                 │   shutdown signal or    │
//!                 │   peer closed           │ current request done
//!                 │                         │
//!                 └─── I/O error, deadline, protocol violation ──> Closed
//! ```
//!
//! ## Main Loop
//!
//! ```text
//!   ┌───────────────────────────────────────────────────────────┐
//!   │ select! (biased)                                          │
//!   │                                                           │
//!   │  1. queued response  ──> write to socket (maybe StartTLS) │
//!   │  2. worker finished  ──> start next queued request        │
//!   │  3. shutdown signal  ──> Draining                         │
//!   │  4. socket readable  ──> parse frames                     │
//!   │                          ├─ abandon: dispatch right away  │
//!   │                          └─ other:   register + queue     │
//!   └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Requests other than abandon run strictly one after another on a blocking
//! worker, so an abandon read while a search is running can cancel it.
//!
//! ## Buffer Management
//!
//! A BytesMut buffer accumulates incoming data; one read may hold a partial
//! request or several complete ones.

use crate::connection::session::{Outgoing, RequestContext, ResponseWriter, Session};
use crate::connection::transport::BoxedTransport;
use crate::protocol::parser::MAX_BULK_SIZE;
use crate::protocol::{
    decode_request, encode_response, CodecError, DecodeFailure, Frame, FrameParser, LdapResult,
    Message, ParseError, Request, Response, ResultCode,
};
use crate::router::NOT_IMPLEMENTED;
use crate::server::ServerConfig;
use bytes::BytesMut;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Maximum size for the read buffer: one maximal value plus framing
const MAX_BUFFER_SIZE: usize = MAX_BULK_SIZE + 64 * 1024;

/// Requests a connection may have waiting behind the running one. Beyond
/// this, new requests are answered `busy` instead of being queued.
const MAX_PENDING_REQUESTS: usize = 32;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total requests decoded
    pub requests_processed: AtomicU64,
    /// Requests cancelled by an abandon
    pub requests_abandoned: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_processed(&self) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_abandoned(&self) {
        self.requests_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Accepted,
    Serving,
    Draining,
    Closed,
}

/// Handles a single client connection.
pub struct ConnectionHandler {
    /// The transport for this connection (plain TCP until StartTLS)
    stream: BufWriter<BoxedTransport>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    parser: FrameParser,

    /// Routes, deadlines and TLS (shared)
    config: Arc<ServerConfig>,

    session: Arc<Session>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    /// Process-wide stop signal
    shutdown: CancellationToken,

    state: ConnectionState,

    /// Responses queued by handlers, in the order they were written
    responses: mpsc::UnboundedReceiver<Outgoing>,
    writer: ResponseWriter,

    /// Registered requests waiting for the worker
    pending: VecDeque<(Message, CancellationToken)>,

    /// The request currently executing
    running: Option<JoinHandle<()>>,
}

impl ConnectionHandler {
    pub fn new(
        transport: BoxedTransport,
        addr: SocketAddr,
        config: Arc<ServerConfig>,
        stats: Arc<ConnectionStats>,
        shutdown: CancellationToken,
    ) -> Self {
        stats.connection_opened();

        let (tx, responses) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new(
            addr,
            config.tls.is_some(),
            Arc::clone(&stats),
        ));

        Self {
            stream: BufWriter::new(transport),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: FrameParser::new(),
            config,
            session,
            stats,
            shutdown,
            state: ConnectionState::Accepted,
            responses,
            writer: ResponseWriter::new(tx),
            pending: VecDeque::new(),
            running: None,
        }
    }

    /// Runs the connection until the client leaves, the server shuts down
    /// or an error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;
        trace!(client = %self.addr, state = ?self.state, queued = self.pending.len(), "Connection loop exited");
        self.state = ConnectionState::Closed;

        // An abrupt close leaves work behind; stop it at its next safe point.
        let abandoned = self.session.in_flight().cancel_all();
        if abandoned > 0 {
            debug!(client = %self.addr, requests = abandoned, "Cancelled unfinished requests");
        }

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        self.state = ConnectionState::Serving;

        loop {
            if self.running.is_none() {
                self.start_next();
            }

            if self.state == ConnectionState::Draining && self.running.is_none() {
                while let Ok(outgoing) = self.responses.try_recv() {
                    self.send(outgoing).await?;
                }
                return Ok(());
            }

            let serving = self.state == ConnectionState::Serving;
            let idle = self.running.is_none() && self.pending.is_empty();
            let read_deadline = if idle { self.config.read_timeout } else { None };

            tokio::select! {
                biased;

                Some(outgoing) = self.responses.recv() => {
                    self.send(outgoing).await?;
                }

                _ = finished(&mut self.running) => {
                    self.running = None;
                }

                _ = self.shutdown.cancelled(), if serving => {
                    debug!(client = %self.addr, queued = self.pending.len(), "Shutdown signal, draining");
                    self.state = ConnectionState::Draining;
                    for (message, _) in self.pending.drain(..) {
                        self.session.in_flight().complete(message.id);
                    }
                }

                read = read_some(&mut self.stream, &mut self.buffer, read_deadline), if serving => {
                    let n = read?;
                    if n == 0 {
                        if !self.buffer.is_empty() {
                            return Err(ConnectionError::UnexpectedEof);
                        }
                        trace!(client = %self.addr, "Peer closed, draining");
                        self.state = ConnectionState::Draining;
                        continue;
                    }
                    self.stats.bytes_read(n);
                    trace!(client = %self.addr, bytes = n, "Read data");
                    self.process_buffer()?;
                }
            }
        }
    }

    /// Parses and routes every complete request in the buffer.
    fn process_buffer(&mut self) -> Result<(), ConnectionError> {
        while let Some(frame) = self.try_parse_frame()? {
            self.stats.request_processed();
            match decode_request(frame) {
                Ok(message) => self.accept(message),
                Err(failure) => self.reject(failure)?,
            }
        }
        Ok(())
    }

    /// Attempts to parse a frame from the buffer.
    fn try_parse_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((frame, consumed))) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed frame"
                );
                Ok(Some(frame))
            }
            Ok(None) => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete frame, need more data"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Parse error");
                Err(ConnectionError::ParseError(e))
            }
        }
    }

    fn accept(&mut self, message: Message) {
        let kind = message.request.kind();
        debug!(client = %self.addr, message_id = message.id, operation = %kind, "Request");

        if let Request::Abandon(_) = message.request {
            // Never queued: it has to reach the registry while its target runs.
            let ctx = RequestContext::new(
                message.id,
                kind,
                CancellationToken::new(),
                Arc::clone(&self.session),
                self.writer.clone(),
            );
            self.config.routes.dispatch(&message.request, &ctx);
            return;
        }

        if self.pending.len() >= MAX_PENDING_REQUESTS {
            warn!(
                client = %self.addr,
                message_id = message.id,
                queued = self.pending.len(),
                "Request queue full"
            );
            self.answer(
                &message,
                ResultCode::Busy,
                "too many outstanding requests on this connection",
            );
            return;
        }

        match self.session.in_flight().register(message.id) {
            Some(token) => self.pending.push_back((message, token)),
            None => {
                warn!(client = %self.addr, message_id = message.id, "Message ID already in flight");
                self.answer(&message, ResultCode::ProtocolError, "message ID already in use");
            }
        }
    }

    /// Answers `message` without running it.
    fn answer(&self, message: &Message, code: ResultCode, diagnostic: &str) {
        let result = LdapResult::with_diagnostic(code, diagnostic);
        if let Some(response) = message.request.kind().result_response(result) {
            self.writer.send(message.id, response);
        }
    }

    /// Answers a request that could not be decoded. Without a message ID
    /// there is nobody to answer, so the connection is dropped.
    fn reject(&mut self, failure: DecodeFailure) -> Result<(), ConnectionError> {
        let DecodeFailure { id, kind, error } = failure;
        let Some(id) = id else {
            warn!(client = %self.addr, error = %error, "Undecodable request");
            return Err(ConnectionError::CodecError(error));
        };
        debug!(client = %self.addr, message_id = id, error = %error, "Rejected request");

        let response = match (kind, &error) {
            (None, CodecError::UnknownOperation(_)) => Some(extended_result(LdapResult::with_diagnostic(
                ResultCode::UnwillingToPerform,
                NOT_IMPLEMENTED,
            ))),
            (Some(kind), _) => kind.result_response(LdapResult::with_diagnostic(
                ResultCode::ProtocolError,
                error.to_string(),
            )),
            (None, _) => Some(extended_result(LdapResult::with_diagnostic(
                ResultCode::ProtocolError,
                error.to_string(),
            ))),
        };
        if let Some(response) = response {
            self.writer.send(id, response);
        }
        Ok(())
    }

    /// Starts the next queued request on a blocking worker.
    fn start_next(&mut self) {
        let Some((message, token)) = self.pending.pop_front() else {
            return;
        };

        let ctx = RequestContext::new(
            message.id,
            message.request.kind(),
            token,
            Arc::clone(&self.session),
            self.writer.clone(),
        );
        let config = Arc::clone(&self.config);

        self.running = Some(tokio::task::spawn_blocking(move || {
            if ctx.is_cancelled() {
                trace!(message_id = message.id, "Request abandoned while queued");
            } else {
                config.routes.dispatch(&message.request, &ctx);
            }
            ctx.session().in_flight().complete(message.id);
        }));
    }

    /// Writes a response to the client.
    async fn send(&mut self, outgoing: Outgoing) -> Result<(), ConnectionError> {
        let bytes = encode_response(outgoing.id, &outgoing.response).serialize();

        let stream = &mut self.stream;
        let write = async {
            stream.write_all(&bytes).await?;
            stream.flush().await
        };
        match self.config.write_timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .map_err(|_| ConnectionError::Timeout)??,
            None => write.await?,
        }

        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            message_id = outgoing.id,
            kind = outgoing.response.kind_str(),
            bytes = bytes.len(),
            "Sent response"
        );

        if outgoing.upgrade {
            self.upgrade_tls().await?;
        }
        Ok(())
    }

    /// Swaps the plain transport for a secured one.
    async fn upgrade_tls(&mut self) -> Result<(), ConnectionError> {
        let Some(upgrader) = self.config.tls.clone() else {
            return Err(ConnectionError::TlsUnavailable);
        };

        if !self.buffer.is_empty() {
            warn!(
                client = %self.addr,
                buffered = self.buffer.len(),
                "Discarding plaintext received before the TLS handshake"
            );
            self.buffer.clear();
        }

        // The handshake owns the socket; leave an inert stream in its place.
        let (placeholder, _) = tokio::io::duplex(1);
        let plain = std::mem::replace(
            &mut self.stream,
            BufWriter::new(Box::new(placeholder) as BoxedTransport),
        );

        let secured = upgrader
            .upgrade(plain.into_inner())
            .await
            .map_err(ConnectionError::TlsHandshake)?;
        self.stream = BufWriter::new(secured);
        self.session.mark_secured();

        info!(client = %self.addr, "Connection upgraded to TLS");
        Ok(())
    }
}

fn extended_result(result: LdapResult) -> Response {
    Response::Extended {
        result,
        name: None,
        value: None,
    }
}

/// Resolves when the running worker finishes; never, when there is none.
async fn finished(running: &mut Option<JoinHandle<()>>) {
    match running {
        Some(handle) => {
            if let Err(e) = handle.await {
                error!(error = %e, "Request worker failed");
            }
        }
        None => std::future::pending().await,
    }
}

/// Reads more data from the socket into the buffer.
async fn read_some(
    stream: &mut BufWriter<BoxedTransport>,
    buffer: &mut BytesMut,
    deadline: Option<Duration>,
) -> Result<usize, ConnectionError> {
    if buffer.len() >= MAX_BUFFER_SIZE {
        error!(size = buffer.len(), "Buffer size limit exceeded");
        return Err(ConnectionError::BufferFull);
    }

    // Ensure we have some capacity
    if buffer.capacity() - buffer.len() < 1024 {
        buffer.reserve(4096);
    }

    let read = stream.get_mut().read_buf(buffer);
    let n = match deadline {
        Some(limit) => tokio::time::timeout(limit, read)
            .await
            .map_err(|_| ConnectionError::Timeout)??,
        None => read.await?,
    };
    Ok(n)
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Framing error
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// A frame without a usable message ID
    #[error("Codec error: {0}")]
    CodecError(#[from] CodecError),

    /// Unexpected end of stream (partial request)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,

    /// A read or write deadline expired
    #[error("Deadline exceeded")]
    Timeout,

    #[error("TLS upgrade requested without an upgrader")]
    TlsUnavailable,

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(#[source] std::io::Error),
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
pub async fn handle_connection(
    transport: BoxedTransport,
    addr: SocketAddr,
    config: Arc<ServerConfig>,
    stats: Arc<ConnectionStats>,
    shutdown: CancellationToken,
) {
    let handler = ConnectionHandler::new(transport, addr, config, stats, shutdown);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

//! In-Flight Request Registry
//!
//! Each connection tracks the requests it has accepted but not finished,
//! keyed by message ID. An abandon looks its target up here and raises the
//! target's cancellation token; handlers poll the token at safe points.
//!
//! The map is the only state shared between the connection loop (which
//! registers and abandons) and the worker running the current request
//! (which completes).

use crate::protocol::MessageId;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct InFlightRegistry {
    requests: Mutex<HashMap<MessageId, CancellationToken>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` and returns its cancellation token, or `None` if a
    /// request with the same ID is still in flight.
    pub fn register(&self, id: MessageId) -> Option<CancellationToken> {
        let mut requests = self.lock();
        if requests.contains_key(&id) {
            return None;
        }
        let token = CancellationToken::new();
        requests.insert(id, token.clone());
        Some(token)
    }

    /// Raises the cancellation signal of `id`. Returns `false` if no such
    /// request is in flight.
    pub fn cancel(&self, id: MessageId) -> bool {
        match self.lock().get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Removes `id` once its processing is over.
    pub fn complete(&self, id: MessageId) {
        self.lock().remove(&id);
    }

    /// Cancels and forgets every in-flight request. Returns how many there were.
    pub fn cancel_all(&self) -> usize {
        let mut requests = self.lock();
        for token in requests.values() {
            token.cancel();
        }
        let count = requests.len();
        requests.clear();
        count
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<MessageId, CancellationToken>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

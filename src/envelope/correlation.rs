//! # Pending Calls
//!
//! Correlates replies with the callers waiting for them.
//!
//! ```text
//! Request flow:
//!   1. register()     -> fresh CorrelationId + PendingCall (owns the oneshot receiver)
//!   2. send invocation envelope
//!   3. PendingCall::wait()
//!
//! Terminal states (exactly one fires):
//!   Completed / Failed  reply arrives        -> complete() removes the entry, sends the body
//!   TimedOut            wait() deadline hits -> PendingCall drop removes the entry
//!   ChannelClosed       transport goes away  -> fail_all() drains every entry
//!   (cancelled)         caller drops future  -> PendingCall drop removes the entry
//! ```
//!
//! An entry leaves the table exactly once, and only the path that removes it may fire the
//! caller's oneshot. A reply that arrives after its entry left is discarded.

use super::{CorrelationId, ReplyBody, ReplyEnvelope};
use crate::error::ActorSystemError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

type Completion = oneshot::Sender<Result<ReplyBody, ActorSystemError>>;

#[derive(Default)]
struct PendingState {
    calls: HashMap<CorrelationId, Completion>,
    /// Set once the channel is gone; later registrations fail with this error.
    closed: Option<ActorSystemError>,
}

/// Table of outstanding calls on one channel.
pub struct PendingCalls {
    next_id: AtomicU64,
    state: Mutex<PendingState>,
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingCalls {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            state: Mutex::new(PendingState::default()),
        }
    }

    /// Allocates a correlation id and records a pending completion for it.
    pub fn register(self: &Arc<Self>) -> Result<PendingCall, ActorSystemError> {
        let (sender, receiver) = oneshot::channel();
        let mut state = self.state.lock();
        if let Some(reason) = &state.closed {
            return Err(reason.clone());
        }
        let id = loop {
            let candidate = CorrelationId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
            if !state.calls.contains_key(&candidate) {
                break candidate;
            }
        };
        state.calls.insert(id, sender);
        Ok(PendingCall {
            id,
            receiver,
            table: Arc::clone(self),
        })
    }

    /// Completes the call the reply belongs to.
    ///
    /// Returns `false` when no call is waiting (late reply after a timeout or cancellation,
    /// or a reply we never asked for); the reply is dropped.
    pub fn complete(&self, reply: ReplyEnvelope) -> bool {
        let sender = self.state.lock().calls.remove(&reply.correlation_id);
        match sender {
            Some(sender) => {
                // The receiver may be mid-drop; the entry is gone either way.
                let _ = sender.send(Ok(reply.body));
                true
            }
            None => {
                debug!(
                    correlation_id = %reply.correlation_id,
                    "Discarding reply with no pending call"
                );
                false
            }
        }
    }

    /// Fails every outstanding call with `reason` and refuses new ones.
    ///
    /// Returns how many calls were failed. Only the first close reason is kept.
    pub fn fail_all(&self, reason: ActorSystemError) -> usize {
        let drained: Vec<_> = {
            let mut state = self.state.lock();
            if state.closed.is_none() {
                state.closed = Some(reason.clone());
            }
            state.calls.drain().collect()
        };
        let count = drained.len();
        for (_, sender) in drained {
            let _ = sender.send(Err(reason.clone()));
        }
        count
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }

    pub fn len(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn forget(&self, id: CorrelationId) -> bool {
        self.state.lock().calls.remove(&id).is_some()
    }
}

/// The caller's side of one pending call.
///
/// Dropping it (timeout, cancellation) removes the entry from the table.
pub struct PendingCall {
    id: CorrelationId,
    receiver: oneshot::Receiver<Result<ReplyBody, ActorSystemError>>,
    table: Arc<PendingCalls>,
}

impl PendingCall {
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// Waits for the reply, at most `timeout` when given.
    pub async fn wait(mut self, timeout: Option<Duration>) -> Result<ReplyBody, ActorSystemError> {
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut self.receiver).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    debug!(correlation_id = %self.id, ?limit, "Call timed out");
                    return Err(ActorSystemError::TimedOut(limit));
                }
            },
            None => (&mut self.receiver).await,
        };
        // A dropped sender without a message only happens if the table itself went away.
        outcome.unwrap_or(Err(ActorSystemError::ChannelClosed))
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if self.table.forget(self.id) {
            debug!(correlation_id = %self.id, "Pending call abandoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashSet;

    fn reply(id: CorrelationId, body: &'static [u8]) -> ReplyEnvelope {
        ReplyEnvelope::success(id, Bytes::from_static(body))
    }

    #[tokio::test]
    async fn reply_completes_matching_call_only() {
        let table = Arc::new(PendingCalls::new());
        let first = table.register().unwrap();
        let second = table.register().unwrap();
        assert_ne!(first.id(), second.id());

        // Replies arrive out of order.
        assert!(table.complete(reply(second.id(), b"2")));
        assert!(table.complete(reply(first.id(), b"1")));

        assert_eq!(
            first.wait(None).await.unwrap(),
            ReplyBody::Success(Bytes::from_static(b"1"))
        );
        assert_eq!(
            second.wait(None).await.unwrap(),
            ReplyBody::Success(Bytes::from_static(b"2"))
        );
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn timeout_removes_entry_and_late_reply_is_dropped() {
        let table = Arc::new(PendingCalls::new());
        let call = table.register().unwrap();
        let id = call.id();

        let err = call.wait(Some(Duration::from_millis(10))).await.unwrap_err();
        assert_eq!(err, ActorSystemError::TimedOut(Duration::from_millis(10)));
        assert!(table.is_empty());
        assert!(!table.complete(reply(id, b"late")));
    }

    #[tokio::test]
    async fn cancelled_caller_leaves_no_entry() {
        let table = Arc::new(PendingCalls::new());
        let call = table.register().unwrap();
        let id = call.id();
        let waiter = tokio::spawn(call.wait(None));
        tokio::task::yield_now().await;
        waiter.abort();
        let _ = waiter.await;

        assert!(table.is_empty());
        assert!(!table.complete(reply(id, b"late")));
    }

    #[tokio::test]
    async fn fail_all_reaches_every_caller_and_blocks_new_calls() {
        let table = Arc::new(PendingCalls::new());
        let calls: Vec<_> = (0..5).map(|_| table.register().unwrap()).collect();

        assert_eq!(table.fail_all(ActorSystemError::ChannelClosed), 5);
        for call in calls {
            assert_eq!(call.wait(None).await.unwrap_err(), ActorSystemError::ChannelClosed);
        }

        assert!(table.is_closed());
        assert_eq!(table.register().err(), Some(ActorSystemError::ChannelClosed));
        // The first reason sticks.
        table.fail_all(ActorSystemError::ShuttingDown);
        assert_eq!(table.register().err(), Some(ActorSystemError::ChannelClosed));
    }

    #[test]
    fn correlation_ids_are_distinct_while_outstanding() {
        let table = Arc::new(PendingCalls::new());
        let calls: Vec<_> = (0..100).map(|_| table.register().unwrap()).collect();
        let ids: HashSet<_> = calls.iter().map(PendingCall::id).collect();
        assert_eq!(ids.len(), 100);
        assert_eq!(table.len(), 100);
        drop(calls);
        assert!(table.is_empty());
    }
}

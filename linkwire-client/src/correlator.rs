//! Request correlation
//!
//! Bridges the connection-scoped stream of text frames to per-call results.
//!
//! # Request Lifecycle
//!
//! 1. **Register**: the facade allocates an id, the supervisor records a
//!    pending operation holding a oneshot sender
//! 2. **Send**: the encoded frame goes out on the socket
//! 3. **Dispatch**: an inbound frame is classified by the codec
//! 4. **Resolve**: the matching pending operation is removed and its sender
//!    fired, exactly once
//!
//! # Matching
//!
//! The wire carries no request id, so replies are matched by operation
//! name. Concurrent calls to the same operation are served oldest first.
//! Error envelopes go to the oldest pending call of their `op` when they
//! name one, otherwise to the oldest pending call overall.
//!
//! Success envelopes with no pending call are server pushes; they are
//! published on a broadcast channel instead.
//!
//! The correlator lives inside the supervisor task, so it needs no locking.

use linkwire_core::{codec, Envelope, Error, Inbound, Operation, Result};
use std::collections::{HashMap, VecDeque};
use std::time::Instant;
use tokio::sync::{broadcast, oneshot};

/// Reply channel of one in-flight request
pub(crate) type ReplySender = oneshot::Sender<Result<serde_json::Value>>;

/// One in-flight request awaiting its reply
pub(crate) struct PendingOperation {
    pub(crate) id: u64,
    pub(crate) op: Operation,
    tx: ReplySender,
    pub(crate) created_at: Instant,
}

impl PendingOperation {
    fn resolve(self, result: Result<serde_json::Value>) {
        // the caller may have timed out and dropped its receiver
        let _ = self.tx.send(result);
    }
}

/// What happened to an inbound frame
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Dispatch {
    /// A pending call received its reply
    Resolved { op: Operation, id: u64 },
    /// A pending call received a server error
    Rejected { id: u64, message: String },
    /// No pending call for this operation; published as a push
    Unsolicited(Operation),
    /// An error envelope arrived while nothing was pending
    Unclaimed(Error),
    /// The frame matched neither envelope shape
    Dropped(Error),
}

pub(crate) struct Correlator {
    pending: HashMap<Operation, VecDeque<PendingOperation>>,
    unsolicited: broadcast::Sender<Envelope>,
}

impl Correlator {
    pub(crate) fn new(unsolicited: broadcast::Sender<Envelope>) -> Self {
        Self {
            pending: HashMap::new(),
            unsolicited,
        }
    }

    /// Record a pending operation
    pub(crate) fn register(&mut self, id: u64, op: Operation, tx: ReplySender) {
        let pending = PendingOperation {
            id,
            op: op.clone(),
            tx,
            created_at: Instant::now(),
        };
        self.pending.entry(op).or_default().push_back(pending);
    }

    /// Route one inbound text frame
    pub(crate) fn dispatch(&mut self, text: &str) -> Dispatch {
        match codec::decode(text) {
            Ok(Inbound::Reply(envelope)) => match self.take_oldest(&envelope.op) {
                Some(pending) => {
                    let op = envelope.op;
                    let id = pending.id;
                    tracing::debug!(
                        op = %op,
                        id,
                        waited_ms = pending.created_at.elapsed().as_millis() as u64,
                        "Reply correlated"
                    );
                    pending.resolve(Ok(envelope.data));
                    Dispatch::Resolved { op, id }
                }
                None => {
                    let op = envelope.op.clone();
                    tracing::debug!(op = %op, "Unsolicited frame received");
                    // no subscribers is not an error
                    let _ = self.unsolicited.send(envelope);
                    Dispatch::Unsolicited(op)
                }
            },
            Ok(Inbound::Failure(failure)) => {
                let target = match failure.op.as_ref() {
                    Some(op) => self.take_oldest(op).or_else(|| self.take_oldest_overall()),
                    None => self.take_oldest_overall(),
                };
                let error = Error::server(failure.error.clone());

                match target {
                    Some(pending) => {
                        let id = pending.id;
                        tracing::warn!(op = %pending.op, id, error = %failure.error, "Server rejected operation");
                        pending.resolve(Err(error));
                        Dispatch::Rejected {
                            id,
                            message: failure.error,
                        }
                    }
                    None => {
                        tracing::warn!(error = %failure.error, "Server error with no pending operation");
                        Dispatch::Unclaimed(error)
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable frame");
                Dispatch::Dropped(e)
            }
        }
    }

    /// Remove a pending operation without resolving it
    pub(crate) fn cancel(&mut self, id: u64) -> bool {
        let mut found = false;
        self.pending.retain(|_, queue| {
            let before = queue.len();
            queue.retain(|pending| pending.id != id);
            found |= queue.len() != before;
            !queue.is_empty()
        });
        found
    }

    /// Resolve one pending operation with an error
    pub(crate) fn fail(&mut self, id: u64, error: Error) -> bool {
        for queue in self.pending.values_mut() {
            if let Some(index) = queue.iter().position(|pending| pending.id == id) {
                if let Some(pending) = queue.remove(index) {
                    pending.resolve(Err(error));
                    self.pending.retain(|_, queue| !queue.is_empty());
                    return true;
                }
            }
        }
        false
    }

    /// Resolve every pending operation with the same error
    pub(crate) fn fail_all(&mut self, error: Error) -> usize {
        let mut failed = 0;
        for (_, queue) in self.pending.drain() {
            for pending in queue {
                pending.resolve(Err(error.clone()));
                failed += 1;
            }
        }
        failed
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    fn take_oldest(&mut self, op: &Operation) -> Option<PendingOperation> {
        let queue = self.pending.get_mut(op)?;
        let pending = queue.pop_front();
        if queue.is_empty() {
            self.pending.remove(op);
        }
        pending
    }

    fn take_oldest_overall(&mut self) -> Option<PendingOperation> {
        // ids are allocated monotonically, so the smallest id is the oldest
        let op = self
            .pending
            .iter()
            .filter_map(|(op, queue)| queue.front().map(|pending| (pending.id, op)))
            .min_by_key(|(id, _)| *id)
            .map(|(_, op)| op.clone())?;
        self.take_oldest(&op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn correlator() -> (Correlator, broadcast::Receiver<Envelope>) {
        let (tx, rx) = broadcast::channel(16);
        (Correlator::new(tx), rx)
    }

    #[tokio::test]
    async fn test_reply_resolves_matching_operation() {
        let (mut correlator, _pushes) = correlator();
        let (tx, rx) = oneshot::channel();
        correlator.register(1, Operation::Login, tx);
        assert_eq!(correlator.len(), 1);

        let outcome = correlator.dispatch(r#"{"op":"Login","data":{"jwt":"xyz"}}"#);

        assert_eq!(
            outcome,
            Dispatch::Resolved {
                op: Operation::Login,
                id: 1
            }
        );
        assert_eq!(correlator.len(), 0);
        assert_eq!(rx.await.unwrap().unwrap(), json!({"jwt": "xyz"}));
    }

    #[tokio::test]
    async fn test_no_cross_talk_between_operations() {
        let (mut correlator, _pushes) = correlator();
        let (login_tx, mut login_rx) = oneshot::channel();
        let (site_tx, site_rx) = oneshot::channel();
        correlator.register(1, Operation::Login, login_tx);
        correlator.register(2, Operation::GetSite, site_tx);

        correlator.dispatch(r#"{"op":"GetSite","data":{"name":"lemmy"}}"#);

        assert_eq!(site_rx.await.unwrap().unwrap(), json!({"name": "lemmy"}));
        assert!(login_rx.try_recv().is_err());
        assert_eq!(correlator.len(), 1);
    }

    #[tokio::test]
    async fn test_same_operation_resolves_oldest_first() {
        let (mut correlator, _pushes) = correlator();
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        correlator.register(1, Operation::GetPosts, first_tx);
        correlator.register(2, Operation::GetPosts, second_tx);

        correlator.dispatch(r#"{"op":"GetPosts","data":{"page":1}}"#);
        correlator.dispatch(r#"{"op":"GetPosts","data":{"page":2}}"#);

        assert_eq!(first_rx.await.unwrap().unwrap(), json!({"page": 1}));
        assert_eq!(second_rx.await.unwrap().unwrap(), json!({"page": 2}));
    }

    #[tokio::test]
    async fn test_error_envelope_rejects_pending_call() {
        let (mut correlator, _pushes) = correlator();
        let (tx, rx) = oneshot::channel();
        correlator.register(7, Operation::Login, tx);

        let outcome = correlator.dispatch(r#"{"error":"bad auth"}"#);

        assert_eq!(
            outcome,
            Dispatch::Rejected {
                id: 7,
                message: "bad auth".into()
            }
        );
        assert_eq!(rx.await.unwrap(), Err(Error::server("bad auth")));
    }

    #[tokio::test]
    async fn test_error_envelope_with_op_prefers_that_operation() {
        let (mut correlator, _pushes) = correlator();
        let (site_tx, mut site_rx) = oneshot::channel();
        let (login_tx, login_rx) = oneshot::channel();
        correlator.register(1, Operation::GetSite, site_tx);
        correlator.register(2, Operation::Login, login_tx);

        correlator.dispatch(r#"{"op":"Login","error":"incorrect_login"}"#);

        assert_eq!(login_rx.await.unwrap(), Err(Error::server("incorrect_login")));
        assert!(site_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_error_envelope_without_op_goes_to_oldest() {
        let (mut correlator, _pushes) = correlator();
        let (old_tx, old_rx) = oneshot::channel();
        let (new_tx, mut new_rx) = oneshot::channel();
        correlator.register(3, Operation::GetPosts, old_tx);
        correlator.register(4, Operation::GetSite, new_tx);

        correlator.dispatch(r#"{"error":"rate_limit_error"}"#);

        assert!(old_rx.await.unwrap().is_err());
        assert!(new_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unmatched_reply_is_broadcast() {
        let (mut correlator, mut pushes) = correlator();

        let outcome = correlator.dispatch(r#"{"op":"CreateComment","data":{"id":5}}"#);

        assert_eq!(outcome, Dispatch::Unsolicited(Operation::CreateComment));
        let push = pushes.recv().await.unwrap();
        assert_eq!(push.op, Operation::CreateComment);
        assert_eq!(push.data, json!({"id": 5}));
    }

    #[tokio::test]
    async fn test_unclaimed_error_envelope() {
        let (mut correlator, _pushes) = correlator();
        let outcome = correlator.dispatch(r#"{"error":"not_logged_in"}"#);
        assert_eq!(outcome, Dispatch::Unclaimed(Error::server("not_logged_in")));
    }

    #[tokio::test]
    async fn test_malformed_frame_resolves_nothing() {
        let (mut correlator, _pushes) = correlator();
        let (tx, mut rx) = oneshot::channel();
        correlator.register(1, Operation::Login, tx);

        let outcome = correlator.dispatch("not json");

        assert!(matches!(outcome, Dispatch::Dropped(Error::Decode(_))));
        assert_eq!(correlator.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancel_and_fail() {
        let (mut correlator, _pushes) = correlator();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        correlator.register(1, Operation::Search, tx1);
        correlator.register(2, Operation::Search, tx2);

        assert!(correlator.cancel(1));
        assert!(!correlator.cancel(1));
        assert_eq!(correlator.len(), 1);

        assert!(correlator.fail(2, Error::Timeout));
        assert_eq!(rx2.await.unwrap(), Err(Error::Timeout));
        assert_eq!(correlator.len(), 0);
    }

    #[tokio::test]
    async fn test_fail_all_resolves_each_once() {
        let (mut correlator, _pushes) = correlator();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        correlator.register(1, Operation::Login, tx1);
        correlator.register(2, Operation::GetSite, tx2);

        assert_eq!(correlator.fail_all(Error::ConnectionClosed), 2);
        assert_eq!(correlator.fail_all(Error::ConnectionClosed), 0);

        assert_eq!(rx1.await.unwrap(), Err(Error::ConnectionClosed));
        assert_eq!(rx2.await.unwrap(), Err(Error::ConnectionClosed));
    }
}

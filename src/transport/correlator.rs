//! Request/response correlation.
//!
//! Every outbound command registers its id here before dispatch; the receive
//! path completes the matching waiter when a reply tagged with that id comes
//! back. Replies that carry no id (some transports and firmware paths do not
//! echo the request id) land in a single correlator-wide fallback slot that
//! the next waiter claims.
//!
//! Invariants:
//! - at most one waiter record per command id at any time
//! - one reply fulfills at most one waiter
//! - a reply for an unknown or already-fulfilled id is dropped, never an error
//!
//! The table is shared between the transport receive task and any number of
//! concurrently waiting commands (the job worker plus interactive callers),
//! so everything is guarded by a plain mutex held only for map operations.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use log::debug;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;

use super::Reply;

enum PendingState {
    /// Registered at send time; nobody awaiting yet.
    Registered,
    /// A task is parked on the oneshot receiver.
    Awaiting(oneshot::Sender<Reply>),
    /// Reply arrived before anyone awaited it.
    Arrived(Reply),
}

#[derive(Default)]
pub struct ResponseCorrelator {
    pending: Mutex<HashMap<u32, PendingState>>,
    generic: Mutex<Option<Reply>>,
    generic_notify: Notify,
}

impl ResponseCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an outstanding command id. Called by the publisher at send
    /// time so a fast reply cannot race the caller's `await_response`.
    pub fn register(&self, command_id: u32) {
        let mut pending = self.pending.lock().unwrap();
        pending.entry(command_id).or_insert(PendingState::Registered);
    }

    /// Drop any waiter record for `command_id` (timeout / abandoned send).
    pub fn unregister(&self, command_id: u32) {
        self.pending.lock().unwrap().remove(&command_id);
    }

    /// Deliver a reply correlated to a specific command id.
    pub fn complete(&self, command_id: u32, reply: Reply) {
        let mut pending = self.pending.lock().unwrap();
        match pending.remove(&command_id) {
            Some(PendingState::Awaiting(tx)) => {
                // Receiver may have just timed out; a dropped send is fine.
                let _ = tx.send(reply);
            }
            Some(PendingState::Registered) => {
                pending.insert(command_id, PendingState::Arrived(reply));
            }
            Some(PendingState::Arrived(first)) => {
                // Keep the first reply; duplicates are dropped.
                pending.insert(command_id, PendingState::Arrived(first));
                debug!("duplicate reply for command {:08x} dropped", command_id);
            }
            None => {
                debug!("reply for unknown command {:08x} dropped", command_id);
            }
        }
    }

    /// Deliver a reply that carried no correlation id. The latest such reply
    /// is kept; the next waiter to observe the slot consumes it.
    pub fn complete_generic(&self, reply: Reply) {
        *self.generic.lock().unwrap() = Some(reply);
        self.generic_notify.notify_waiters();
    }

    fn take_generic(&self) -> Option<Reply> {
        self.generic.lock().unwrap().take()
    }

    /// Number of currently outstanding command ids (diagnostics).
    pub fn outstanding(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Wait up to `timeout` for a reply to `command_id`. Resolution order on
    /// each wakeup: specific reply, then the generic fallback slot. Returns
    /// `None` on timeout, after removing the waiter record.
    pub async fn await_response(&self, command_id: u32, timeout: Duration) -> Option<Reply> {
        let (tx, mut rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap();
            match pending.remove(&command_id) {
                Some(PendingState::Arrived(reply)) => return Some(reply),
                _ => {
                    pending.insert(command_id, PendingState::Awaiting(tx));
                }
            }
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(reply) = self.take_generic() {
                self.unregister(command_id);
                return Some(reply);
            }
            let notified = self.generic_notify.notified();
            tokio::select! {
                res = &mut rx => {
                    // Sender dropped without a reply should not happen, but
                    // treat it as "no response" rather than hanging.
                    return res.ok();
                }
                _ = notified => {
                    // Loop re-checks the generic slot; another waiter may
                    // have claimed it first.
                }
                _ = tokio::time::sleep_until(deadline) => {
                    self.unregister(command_id);
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{AdminReply, RouteAck};

    fn admin_reply(from: u32) -> Reply {
        Reply::Admin {
            from,
            message: AdminReply::default(),
        }
    }

    #[tokio::test]
    async fn reply_after_await_fulfills() {
        let corr = std::sync::Arc::new(ResponseCorrelator::new());
        corr.register(7);
        let c2 = corr.clone();
        let waiter = tokio::spawn(async move { c2.await_response(7, Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        corr.complete(7, admin_reply(0x42));
        let got = waiter.await.unwrap();
        assert!(matches!(got, Some(Reply::Admin { from: 0x42, .. })));
        assert_eq!(corr.outstanding(), 0);
    }

    #[tokio::test]
    async fn reply_before_await_is_buffered() {
        let corr = ResponseCorrelator::new();
        corr.register(9);
        corr.complete(9, admin_reply(1));
        let got = corr.await_response(9, Duration::from_millis(50)).await;
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn unknown_id_is_noop() {
        let corr = ResponseCorrelator::new();
        corr.complete(12345, admin_reply(1));
        assert_eq!(corr.outstanding(), 0);
        // And a later waiter on that id does not see the dropped reply.
        let got = corr.await_response(12345, Duration::from_millis(30)).await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn timeout_cleans_up() {
        let corr = ResponseCorrelator::new();
        corr.register(5);
        let got = corr.await_response(5, Duration::from_millis(30)).await;
        assert!(got.is_none());
        assert_eq!(corr.outstanding(), 0);
    }

    #[tokio::test]
    async fn generic_reply_unblocks_waiter() {
        let corr = std::sync::Arc::new(ResponseCorrelator::new());
        corr.register(77);
        let c2 = corr.clone();
        let waiter =
            tokio::spawn(async move { c2.await_response(77, Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        corr.complete_generic(Reply::Route {
            from: 3,
            ack: RouteAck {
                request_id: 0,
                error: 0,
            },
        });
        let got = waiter.await.unwrap();
        assert!(matches!(got, Some(Reply::Route { from: 3, .. })));
    }

    #[tokio::test]
    async fn one_reply_one_waiter() {
        let corr = std::sync::Arc::new(ResponseCorrelator::new());
        corr.register(1);
        corr.register(2);
        corr.complete(1, admin_reply(10));
        let first = corr.await_response(1, Duration::from_millis(50)).await;
        assert!(first.is_some());
        // The same reply must not satisfy a different waiter.
        let second = corr.await_response(2, Duration::from_millis(50)).await;
        assert!(second.is_none());
    }
}

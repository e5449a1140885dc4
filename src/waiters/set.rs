//! Set of waiters suspended on one channel.

use crate::types::Event;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

use super::types::{Waiter, WaiterToken};

/// Waiters joined to one channel.
///
/// Not synchronized on its own: the owning channel calls `join` and
/// `flush` under the same lock as log appends, which is what keeps a
/// joining subscriber from missing a concurrent publish.
pub struct WaiterSet {
    /// Resumption handles by token.
    waiters: HashMap<WaiterToken, oneshot::Sender<Vec<Arc<Event>>>>,
    /// Counter for generating tokens.
    next_token: u64,
}

impl WaiterSet {
    pub fn new() -> Self {
        Self {
            waiters: HashMap::new(),
            next_token: 1,
        }
    }

    /// Register a new waiter.
    pub fn join(&mut self) -> Waiter {
        let token = WaiterToken(self.next_token);
        self.next_token += 1;

        let (sender, receiver) = oneshot::channel();
        self.waiters.insert(token, sender);

        Waiter { token, receiver }
    }

    /// Resume every joined waiter with `events` and clear the set.
    ///
    /// Returns how many waiters took the batch. A waiter whose receiver is
    /// gone is skipped without affecting the rest.
    pub fn flush(&mut self, events: &[Arc<Event>]) -> usize {
        let mut delivered = 0;
        for (_, sender) in self.waiters.drain() {
            if sender.send(events.to_vec()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Remove a waiter without resuming it.
    ///
    /// Returns false if the token was already resumed or cancelled.
    pub fn cancel(&mut self, token: WaiterToken) -> bool {
        self.waiters.remove(&token).is_some()
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

impl Default for WaiterSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClientId, EventId, Sequence, SessionId, Timestamp};
    use crate::waiters::WaitOutcome;
    use serde_json::json;
    use std::time::Duration;

    fn make_event(sequence: u64) -> Arc<Event> {
        Arc::new(Event {
            id: EventId::new(),
            sequence: Sequence(sequence),
            session: SessionId::from("TEST01"),
            origin: ClientId(2),
            kind: "edit".to_string(),
            payload: json!("A1=5"),
            timestamp: Timestamp(0),
        })
    }

    #[tokio::test]
    async fn test_flush_resumes_every_waiter() {
        let mut set = WaiterSet::new();
        let mut w1 = set.join();
        let mut w2 = set.join();
        assert_eq!(set.len(), 2);

        let delivered = set.flush(&[make_event(1)]);
        assert_eq!(delivered, 2);
        assert!(set.is_empty());

        for waiter in [&mut w1, &mut w2] {
            match waiter.wait(Duration::from_millis(100)).await {
                WaitOutcome::Delivered(batch) => assert_eq!(batch[0].sequence, Sequence(1)),
                other => panic!("Expected delivery, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_waiter_joined_after_flush_waits_for_next() {
        let mut set = WaiterSet::new();
        set.flush(&[make_event(1)]);

        let mut late = set.join();
        assert_eq!(set.len(), 1);
        assert!(late.try_take().is_none());

        set.flush(&[make_event(2)]);
        let batch = late.try_take().unwrap();
        assert_eq!(batch[0].sequence, Sequence(2));
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_block_others() {
        let mut set = WaiterSet::new();
        let gone = set.join();
        let mut alive = set.join();
        drop(gone);

        assert_eq!(set.flush(&[make_event(1)]), 1);
        assert!(alive.try_take().is_some());
    }

    #[tokio::test]
    async fn test_cancel_removes_without_delivery() {
        let mut set = WaiterSet::new();
        let mut waiter = set.join();

        assert!(set.cancel(waiter.token()));
        assert!(!set.cancel(waiter.token()));
        assert_eq!(set.flush(&[make_event(1)]), 0);

        assert!(matches!(
            waiter.wait(Duration::from_millis(10)).await,
            WaitOutcome::Abandoned
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let mut set = WaiterSet::new();
        let mut waiter = set.join();

        assert!(matches!(
            waiter.wait(Duration::from_secs(30)).await,
            WaitOutcome::TimedOut
        ));
        // Still registered until the owner cancels it.
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_tokens_are_unique() {
        let mut set = WaiterSet::new();
        let a = set.join();
        let b = set.join();
        assert_ne!(a.token(), b.token());
    }
}

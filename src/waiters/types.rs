//! Waiter handle and outcomes.

use crate::types::Event;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Identifier of a joined waiter, unique within its set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WaiterToken(pub u64);

/// How a wait ended.
#[derive(Clone, Debug)]
pub enum WaitOutcome {
    /// A publish resumed the waiter.
    Delivered(Vec<Arc<Event>>),
    /// The wait window elapsed first.
    TimedOut,
    /// The waiter was cancelled before anything was delivered.
    Abandoned,
}

/// Receiving side of a joined waiter.
pub struct Waiter {
    pub(crate) token: WaiterToken,
    pub(crate) receiver: oneshot::Receiver<Vec<Arc<Event>>>,
}

impl Waiter {
    pub fn token(&self) -> WaiterToken {
        self.token
    }

    /// Wait for a delivery for at most `window`.
    pub async fn wait(&mut self, window: Duration) -> WaitOutcome {
        match tokio::time::timeout(window, &mut self.receiver).await {
            Ok(Ok(batch)) => WaitOutcome::Delivered(batch),
            Ok(Err(_)) => WaitOutcome::Abandoned,
            Err(_) => WaitOutcome::TimedOut,
        }
    }

    /// Take a delivery that already arrived, without waiting.
    ///
    /// Used after a timeout to pick up a batch that was flushed while the
    /// timer was firing.
    pub fn try_take(&mut self) -> Option<Vec<Arc<Event>>> {
        self.receiver.try_recv().ok()
    }
}

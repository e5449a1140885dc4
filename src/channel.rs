//! Channel tying one session's log and waiters together.

use crate::error::{ChannelError, Result};
use crate::log::{ChannelLog, LogSlice};
use crate::types::{
    ClientId, Event, EventId, EventInput, Sequence, SessionId, SessionInfo, Timestamp,
};
use crate::waiters::{WaitOutcome, Waiter, WaiterSet, WaiterToken};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use crate::log::DEFAULT_CAPACITY;

/// Default long-poll wait window.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Channel configuration.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Events retained for catch-up.
    /// Default: 1000
    pub capacity: usize,

    /// How long a subscriber with nothing to read stays suspended.
    /// Default: 30s
    pub poll_timeout: Duration,

    /// Number of recent event ids remembered to absorb retried publishes
    /// (0 disables deduplication).
    /// Default: 1000
    pub dedup_window: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            dedup_window: DEFAULT_CAPACITY,
        }
    }
}

/// Result of one subscribe call. Exactly one is produced per call.
#[derive(Clone, Debug)]
pub enum PollOutcome {
    /// New events, in sequence order.
    Delivered(Vec<Arc<Event>>),
    /// Nothing was published within the wait window; poll again.
    TimedOut,
    /// The cursor is outside retained history; the client must reload the
    /// document and continue from `head`.
    Truncated { head: Sequence },
}

/// State guarded by the channel lock.
struct ChannelState {
    log: ChannelLog,
    waiters: WaiterSet,
    /// Recently published events by id.
    recent: Option<LruCache<EventId, Arc<Event>>>,
}

/// Broadcast channel for one collaboration session.
///
/// Appends, deduplication, waiter joins and waiter flushes all happen under
/// one lock, so a subscriber either sees a publish in the log or is
/// registered in time to be resumed by it.
pub struct Channel {
    session: SessionId,
    info: SessionInfo,
    config: ChannelConfig,
    state: Mutex<ChannelState>,
    /// Next collaborator id to hand out.
    next_client_id: AtomicU64,
    /// Microseconds since epoch of the last publish or subscribe.
    last_activity: AtomicI64,
}

impl Channel {
    /// Create a channel with default configuration.
    pub fn new(session: SessionId) -> Self {
        Self::with_config(session, SessionInfo::default(), ChannelConfig::default())
    }

    /// Create a channel with session metadata and configuration.
    pub fn with_config(session: SessionId, info: SessionInfo, config: ChannelConfig) -> Self {
        let recent = NonZeroUsize::new(config.dedup_window).map(LruCache::new);
        Self {
            session,
            info,
            state: Mutex::new(ChannelState {
                log: ChannelLog::new(config.capacity),
                waiters: WaiterSet::new(),
                recent,
            }),
            config,
            next_client_id: AtomicU64::new(2),
            last_activity: AtomicI64::new(Timestamp::now().0),
        }
    }

    // --- Publishing ---

    /// Append an event and resume every waiting subscriber with it.
    ///
    /// Invalid input is rejected before the log is touched. Retrying a
    /// publish whose id is still in the dedup window returns the event
    /// stored the first time and broadcasts nothing; a different publish
    /// reusing that id is rejected.
    pub fn publish(&self, input: EventInput) -> Result<Arc<Event>> {
        input.validate()?;
        self.touch();

        let mut state = self.state.lock();

        if let Some(id) = input.id {
            let existing = state.recent.as_mut().and_then(|recent| recent.get(&id).cloned());
            if let Some(existing) = existing {
                if !is_retry_of(&existing, &input) {
                    warn!(session = %self.session, id = %id, origin = %input.origin, "Event id reused by a different publish");
                    return Err(ChannelError::InvalidEvent("event id already used".into()));
                }
                debug!(session = %self.session, id = %id, sequence = %existing.sequence, "Duplicate publish absorbed");
                return Ok(existing);
            }
        }

        let event = state.log.append(Event {
            id: input.id.unwrap_or_default(),
            sequence: Sequence::ZERO,
            session: self.session.clone(),
            origin: input.origin,
            kind: input.kind,
            payload: input.payload,
            timestamp: Timestamp(0),
        });

        if let Some(recent) = state.recent.as_mut() {
            recent.put(event.id, Arc::clone(&event));
        }

        let waiting = state.waiters.len();
        let delivered = state.waiters.flush(std::slice::from_ref(&event));
        drop(state);

        info!(
            session = %self.session,
            sequence = %event.sequence,
            kind = %event.kind,
            waiting,
            delivered,
            "Sending new event to listeners"
        );

        Ok(event)
    }

    // --- Subscribing ---

    /// Long-poll for events after `cursor` using the configured timeout.
    pub async fn subscribe(&self, cursor: Option<Sequence>) -> PollOutcome {
        self.subscribe_with_timeout(cursor, self.config.poll_timeout)
            .await
    }

    /// Long-poll for events after `cursor`, waiting at most `window`.
    ///
    /// With a cursor that has unread events this returns immediately. With
    /// no cursor, or a cursor at the head, the call suspends until the next
    /// publish or the end of the window. Dropping the returned future
    /// withdraws the subscriber.
    pub async fn subscribe_with_timeout(
        &self,
        cursor: Option<Sequence>,
        window: Duration,
    ) -> PollOutcome {
        self.touch();

        let waiter = {
            let mut state = self.state.lock();

            if let Some(cursor) = cursor {
                let slice = state.log.since(cursor);
                if slice.truncated {
                    let head = state.log.head();
                    debug!(session = %self.session, cursor = %cursor, head = %head, "Cursor outside retained history");
                    return PollOutcome::Truncated { head };
                }
                if !slice.is_empty() {
                    return PollOutcome::Delivered(slice.events);
                }
            }

            state.waiters.join()
        };

        let mut guard = WaitGuard {
            channel: self,
            waiter,
            armed: true,
        };

        let outcome = match guard.waiter.wait(window).await {
            WaitOutcome::Delivered(batch) => PollOutcome::Delivered(batch),
            WaitOutcome::TimedOut | WaitOutcome::Abandoned => self.withdraw(&mut guard.waiter),
        };

        guard.armed = false;
        outcome
    }

    /// Remove a waiter whose window ran out and settle its outcome.
    ///
    /// A flush that won the race against this cancel has already sent its
    /// batch, so it is delivered instead of being dropped.
    fn withdraw(&self, waiter: &mut Waiter) -> PollOutcome {
        self.cancel_waiter(waiter.token());
        match waiter.try_take() {
            Some(batch) => PollOutcome::Delivered(batch),
            None => PollOutcome::TimedOut,
        }
    }

    /// Retained events after `cursor`, without suspending.
    pub fn since(&self, cursor: Sequence) -> LogSlice {
        self.state.lock().log.since(cursor)
    }

    fn cancel_waiter(&self, token: WaiterToken) -> bool {
        self.state.lock().waiters.cancel(token)
    }

    // --- Collaborators ---

    /// Hand out the next in-session collaborator id (2, 3, ...).
    pub fn next_client_id(&self) -> ClientId {
        ClientId(self.next_client_id.fetch_add(1, Ordering::SeqCst))
    }

    // --- Introspection ---

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Last assigned sequence.
    pub fn head(&self) -> Sequence {
        self.state.lock().log.head()
    }

    /// Number of events currently retained.
    pub fn retained(&self) -> usize {
        self.state.lock().log.len()
    }

    /// Number of suspended subscribers.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Time of the last publish or subscribe.
    pub fn last_activity(&self) -> Timestamp {
        Timestamp(self.last_activity.load(Ordering::Relaxed))
    }

    /// How long the channel has gone without a publish or subscribe.
    pub fn idle_for(&self, now: Timestamp) -> Duration {
        let micros = now.0.saturating_sub(self.last_activity().0).max(0);
        Duration::from_micros(micros as u64)
    }

    fn touch(&self) {
        self.last_activity.store(Timestamp::now().0, Ordering::Relaxed);
    }
}

/// A publish reusing a stored id is only a retry if it carries the same
/// origin, kind and payload.
fn is_retry_of(existing: &Event, input: &EventInput) -> bool {
    existing.origin == input.origin
        && existing.kind == input.kind
        && existing.payload == input.payload
}

/// Withdraws a waiter if the subscribe future is dropped mid-wait.
struct WaitGuard<'a> {
    channel: &'a Channel,
    waiter: Waiter,
    armed: bool,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.channel.cancel_waiter(self.waiter.token());
        }
    }
}

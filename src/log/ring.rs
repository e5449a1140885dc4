//! Bounded, sequence-indexed event buffer.

use crate::types::{Event, Sequence, Timestamp};
use std::collections::VecDeque;
use std::sync::Arc;

/// Default number of events retained per session.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Events newer than a cursor.
#[derive(Clone, Debug, Default)]
pub struct LogSlice {
    /// Retained events with `sequence > cursor`, ascending.
    pub events: Vec<Arc<Event>>,

    /// True if events the cursor had not seen were evicted (or the cursor
    /// points past the head). The caller must resynchronize from the
    /// document store instead of trusting `events` alone.
    pub truncated: bool,
}

impl LogSlice {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Bounded ring buffer of events for one session.
///
/// Entries are always sorted by sequence and contiguous: the entry at
/// index `i` has sequence `oldest + i`.
pub struct ChannelLog {
    /// Retained events, oldest first.
    entries: VecDeque<Arc<Event>>,

    /// Maximum number of retained events.
    capacity: usize,

    /// Last assigned sequence (`Sequence(0)` before the first append).
    head: Sequence,

    /// Number of events evicted from the front.
    evicted: u64,
}

impl ChannelLog {
    /// Create an empty log retaining at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
            head: Sequence::ZERO,
            evicted: 0,
        }
    }

    /// Append an event, assigning it the next sequence number.
    ///
    /// The sequence and timestamp of `event` are overwritten. Returns the
    /// stored event. Evicts from the front once `capacity` is exceeded.
    pub fn append(&mut self, mut event: Event) -> Arc<Event> {
        let sequence = self.head.next();
        event.sequence = sequence;
        event.timestamp = Timestamp::now();

        let event = Arc::new(event);
        self.entries.push_back(Arc::clone(&event));
        self.head = sequence;

        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }

        event
    }

    /// All retained events newer than `cursor`.
    pub fn since(&self, cursor: Sequence) -> LogSlice {
        if cursor >= self.head {
            return LogSlice {
                events: Vec::new(),
                truncated: cursor > self.head,
            };
        }

        let oldest = self.oldest().unwrap_or(self.head);
        let truncated = cursor.next() < oldest;
        let start = if truncated {
            0
        } else {
            (cursor.0 + 1 - oldest.0) as usize
        };

        LogSlice {
            events: self.entries.range(start..).cloned().collect(),
            truncated,
        }
    }

    /// Look up a retained event by sequence.
    pub fn get(&self, sequence: Sequence) -> Option<&Arc<Event>> {
        let oldest = self.oldest()?;
        if sequence < oldest || sequence > self.head {
            return None;
        }
        self.entries.get((sequence.0 - oldest.0) as usize)
    }

    /// Last assigned sequence.
    pub fn head(&self) -> Sequence {
        self.head
    }

    /// Sequence of the oldest retained event.
    pub fn oldest(&self) -> Option<Sequence> {
        self.entries.front().map(|e| e.sequence)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events dropped from the front so far.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

impl Default for ChannelLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

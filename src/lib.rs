//! # Session Broadcast Channels
//!
//! In-process publish/subscribe for collaborative spreadsheet sessions,
//! delivered to browsers over HTTP long-polling.
//!
//! ## Core Concepts
//!
//! - **Events**: Immutable edit actions with an opaque id and a per-session
//!   sequence number
//! - **Channel log**: Bounded, sequence-indexed history used for catch-up
//! - **Waiters**: Suspended long-poll requests resumed by the next publish
//! - **Registry**: One channel per session, created on first use
//!
//! ## Example
//!
//! ```ignore
//! use sheetcast::{ChannelRegistry, ClientId, EventInput, PollOutcome, Sequence, SessionId};
//!
//! let registry = ChannelRegistry::new();
//! let channel = registry.get_or_create(&SessionId::from("AB12CD"));
//!
//! // Publish an edit
//! let event = channel.publish(EventInput::new("edit", ClientId(2), json!("A1=5")))?;
//! assert_eq!(event.sequence, Sequence(1));
//!
//! // Catch up from the beginning
//! match channel.subscribe(Some(Sequence(0))).await {
//!     PollOutcome::Delivered(events) => println!("{} events", events.len()),
//!     PollOutcome::TimedOut => println!("poll again"),
//!     PollOutcome::Truncated { head } => println!("reload, then poll from {}", head),
//! }
//! ```

pub mod channel;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod log;
pub mod protocol;
pub mod registry;
pub mod types;
pub mod waiters;

// Re-exports
pub use channel::{Channel, ChannelConfig, PollOutcome, DEFAULT_CAPACITY, DEFAULT_POLL_TIMEOUT};
pub use error::{ChannelError, Result};
pub use log::{ChannelLog, LogSlice};
pub use protocol::{
    EventView, JoinResponse, LongPoll, PollResponse, PublishRequest, SubscribeRequest,
};
pub use registry::{ChannelRegistry, RegistryConfig};
pub use types::*;
pub use waiters::{WaitOutcome, Waiter, WaiterSet, WaiterToken};

//! Core types for the broadcast channel.

use crate::error::{ChannelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Identifier of one collaboration session.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        SessionId(s.to_string())
    }
}

/// In-session identifier of a collaborator.
///
/// The client that opened the session is [`ClientId::CREATOR`]; everyone who
/// joins later gets the next number handed out by the channel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl ClientId {
    pub const CREATOR: ClientId = ClientId(1);
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self.0)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque unique identity of an event. Compared for equality only.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Mint a fresh random id.
    pub fn new() -> Self {
        EventId(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position in a session's event log.
///
/// `Sequence(0)` is never assigned; it is the cursor of a client that has
/// seen nothing yet.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Sequence(pub u64);

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Sequence {
    pub const ZERO: Sequence = Sequence(0);

    pub fn next(self) -> Self {
        Sequence(self.0 + 1)
    }

    pub fn prev(self) -> Option<Self> {
        if self.0 > 0 {
            Some(Sequence(self.0 - 1))
        } else {
            None
        }
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// One collaboration action, as stored in a channel log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identity (client-supplied or minted on publish).
    pub id: EventId,

    /// Position in the session log (assigned on append).
    pub sequence: Sequence,

    /// Session the event was published to.
    pub session: SessionId,

    /// Collaborator that published the event.
    pub origin: ClientId,

    /// Application-defined kind (e.g. "edit", "cursor", "chat").
    pub kind: String,

    /// Opaque payload, interpreted by the spreadsheet model.
    pub payload: serde_json::Value,

    /// When the event was appended.
    pub timestamp: Timestamp,
}

/// Input for publishing an event (before id and sequence are assigned).
#[derive(Clone, Debug)]
pub struct EventInput {
    pub kind: String,
    pub origin: ClientId,
    pub payload: serde_json::Value,
    /// Client-chosen id, used to recognise retried publishes.
    pub id: Option<EventId>,
}

impl EventInput {
    /// Create an input with an already-built JSON payload.
    pub fn new(kind: impl Into<String>, origin: ClientId, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            origin,
            payload,
            id: None,
        }
    }

    /// Create an input by serializing `payload` to JSON.
    pub fn json(kind: impl Into<String>, origin: ClientId, payload: &impl Serialize) -> Result<Self> {
        Ok(Self::new(kind, origin, serde_json::to_value(payload)?))
    }

    /// Attach a client-chosen id.
    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }

    /// Reject inputs that must never reach a log.
    pub fn validate(&self) -> Result<()> {
        if self.kind.trim().is_empty() {
            return Err(ChannelError::InvalidEvent("event kind is empty".into()));
        }
        if self.payload.is_null() {
            return Err(ChannelError::InvalidEvent("event payload is missing".into()));
        }
        Ok(())
    }
}

/// Metadata recorded when a session is opened and handed to joiners.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Ticker symbol the sheet was seeded from, if any.
    pub ticker: Option<String>,

    /// Name of the sheet being edited, if any.
    pub sheet_name: Option<String>,
}

impl SessionInfo {
    pub fn new(ticker: impl Into<String>, sheet_name: impl Into<String>) -> Self {
        Self {
            ticker: Some(ticker.into()),
            sheet_name: Some(sheet_name.into()),
        }
    }
}

//! Long-poll wire protocol.
//!
//! Maps publish and subscribe requests onto channel calls and channel
//! outcomes onto the JSON shapes browser clients expect:
//!
//! | Outcome | Response body |
//! |---------|---------------|
//! | published event | `{"id", "sequence", "kind", "originClientId", "payload"}` |
//! | delivered batch | `{"events": [...]}` |
//! | timeout | `{"events": []}` |
//! | truncated cursor | `{"resyncRequired": true, "cursor": <head>}` |

use crate::channel::PollOutcome;
use crate::error::{ChannelError, Result};
use crate::registry::ChannelRegistry;
use crate::types::{ClientId, Event, EventId, EventInput, Sequence, SessionId, SessionInfo};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// An event as sent to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: EventId,
    pub sequence: Sequence,
    pub kind: String,
    pub origin_client_id: ClientId,
    pub payload: serde_json::Value,
}

impl From<&Event> for EventView {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            sequence: event.sequence,
            kind: event.kind.clone(),
            origin_client_id: event.origin,
            payload: event.payload.clone(),
        }
    }
}

/// Body of a publish request.
///
/// The origin client is not part of the body; it comes from the caller's
/// session identity.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub payload: Option<serde_json::Value>,

    /// Client-chosen id for safe retries.
    #[serde(default)]
    pub id: Option<EventId>,
}

impl PublishRequest {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: Some(kind.into()),
            payload: Some(payload),
            id: None,
        }
    }

    /// Turn the request into a validated channel input.
    pub fn into_input(self, origin: ClientId) -> Result<EventInput> {
        let kind = self
            .kind
            .ok_or_else(|| ChannelError::InvalidEvent("missing kind".into()))?;
        let payload = self
            .payload
            .ok_or_else(|| ChannelError::InvalidEvent("missing payload".into()))?;

        let mut input = EventInput::new(kind, origin, payload);
        input.id = self.id;
        input.validate()?;
        Ok(input)
    }
}

/// Query of a subscribe request.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Sequence of the last event the client has seen.
    #[serde(default)]
    pub cursor: Option<Sequence>,
}

impl SubscribeRequest {
    pub fn from_cursor(cursor: u64) -> Self {
        Self {
            cursor: Some(Sequence(cursor)),
        }
    }
}

/// Body of a subscribe response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PollResponse {
    /// History the client needs is gone; reload the document, then poll
    /// from `cursor`.
    Resync {
        #[serde(rename = "resyncRequired")]
        resync_required: bool,
        cursor: Sequence,
    },
    /// New events, possibly none.
    Events { events: Vec<EventView> },
}

impl PollResponse {
    pub fn events(&self) -> &[EventView] {
        match self {
            PollResponse::Events { events } => events,
            PollResponse::Resync { .. } => &[],
        }
    }

    pub fn is_resync(&self) -> bool {
        matches!(self, PollResponse::Resync { .. })
    }
}

impl From<PollOutcome> for PollResponse {
    fn from(outcome: PollOutcome) -> Self {
        match outcome {
            PollOutcome::Delivered(events) => PollResponse::Events {
                events: events.iter().map(|e| EventView::from(e.as_ref())).collect(),
            },
            PollOutcome::TimedOut => PollResponse::Events { events: Vec::new() },
            PollOutcome::Truncated { head } => PollResponse::Resync {
                resync_required: true,
                cursor: head,
            },
        }
    }
}

/// What a client needs to take part in a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub session_id: SessionId,
    pub client_id: ClientId,
    /// Head of the log at join time; the first poll should use it as cursor.
    pub cursor: Sequence,
    #[serde(flatten)]
    pub info: SessionInfo,
}

/// Long-poll adapter over a channel registry.
#[derive(Clone)]
pub struct LongPoll {
    registry: Arc<ChannelRegistry>,
}

impl LongPoll {
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Open a new session; the caller becomes its creator.
    pub fn open(&self, info: SessionInfo) -> JoinResponse {
        let (session, channel) = self.registry.open_session(info);
        JoinResponse {
            session_id: session,
            client_id: ClientId::CREATOR,
            cursor: channel.head(),
            info: channel.info().clone(),
        }
    }

    /// Join an existing session as the next collaborator.
    pub fn join(&self, session: &SessionId) -> Result<JoinResponse> {
        let channel = self.registry.require(session)?;
        let client_id = channel.next_client_id();
        debug!(session = %session, client = %client_id, "Collaborator joined");

        Ok(JoinResponse {
            session_id: session.clone(),
            client_id,
            cursor: channel.head(),
            info: channel.info().clone(),
        })
    }

    /// Publish an event and echo it back in wire form.
    pub fn publish(
        &self,
        session: &SessionId,
        origin: ClientId,
        request: PublishRequest,
    ) -> Result<EventView> {
        let input = request.into_input(origin)?;
        let channel = self.registry.require(session)?;
        let event = channel.publish(input)?;
        Ok(EventView::from(event.as_ref()))
    }

    /// Long-poll a session for events after the request's cursor.
    pub async fn subscribe(
        &self,
        session: &SessionId,
        request: SubscribeRequest,
    ) -> Result<PollResponse> {
        let channel = self.registry.require(session)?;
        let outcome = channel.subscribe(request.cursor).await;
        Ok(PollResponse::from(outcome))
    }
}

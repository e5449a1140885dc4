//! HTTP surface for the long-poll protocol (feature `http`).
//!
//! Routes keep the names browser clients already use:
//!
//! - `POST /session`: open a session, become client 1
//! - `POST /sharedsession`: join a session by id
//! - `POST /broadcast`: publish an event
//! - `POST /updates?cursor=N`: long-poll for events
//!
//! The session id and in-session client id travel in the `session` and
//! `idinsession` cookies set by the first two routes.

use crate::error::ChannelError;
use crate::protocol::{
    EventView, JoinResponse, LongPoll, PollResponse, PublishRequest, SubscribeRequest,
};
use crate::types::{ClientId, SessionId, SessionInfo};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use tracing::warn;

/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session";

/// Cookie carrying the caller's in-session client id.
pub const CLIENT_COOKIE: &str = "idinsession";

/// Build the router serving the long-poll endpoints.
pub fn router(long_poll: LongPoll) -> Router {
    Router::new()
        .route("/session", post(open_session))
        .route("/sharedsession", post(join_session))
        .route("/broadcast", post(broadcast))
        .route("/updates", post(updates))
        .with_state(long_poll)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRequest {
    session_id: SessionId,
}

async fn open_session(
    State(long_poll): State<LongPoll>,
    jar: CookieJar,
    Json(info): Json<SessionInfo>,
) -> (CookieJar, Json<JoinResponse>) {
    let joined = long_poll.open(info);
    (with_identity(jar, &joined), Json(joined))
}

async fn join_session(
    State(long_poll): State<LongPoll>,
    jar: CookieJar,
    Json(request): Json<JoinRequest>,
) -> Result<(CookieJar, Json<JoinResponse>), ChannelError> {
    let joined = long_poll.join(&request.session_id)?;
    Ok((with_identity(jar, &joined), Json(joined)))
}

async fn broadcast(
    State(long_poll): State<LongPoll>,
    jar: CookieJar,
    Json(request): Json<PublishRequest>,
) -> Result<Json<EventView>, ChannelError> {
    let session = session_from(&jar)?;
    let origin = client_from(&jar)?;
    let view = long_poll.publish(&session, origin, request)?;
    Ok(Json(view))
}

async fn updates(
    State(long_poll): State<LongPoll>,
    jar: CookieJar,
    Query(request): Query<SubscribeRequest>,
) -> Result<Json<PollResponse>, ChannelError> {
    let session = session_from(&jar)?;
    let response = long_poll.subscribe(&session, request).await?;
    Ok(Json(response))
}

fn with_identity(jar: CookieJar, joined: &JoinResponse) -> CookieJar {
    jar.add(Cookie::build((SESSION_COOKIE, joined.session_id.0.clone())).path("/"))
        .add(Cookie::build((CLIENT_COOKIE, joined.client_id.to_string())).path("/"))
}

fn session_from(jar: &CookieJar) -> Result<SessionId, ChannelError> {
    jar.get(SESSION_COOKIE)
        .map(|c| SessionId::new(c.value()))
        .ok_or(ChannelError::MissingIdentity(SESSION_COOKIE))
}

fn client_from(jar: &CookieJar) -> Result<ClientId, ChannelError> {
    jar.get(CLIENT_COOKIE)
        .and_then(|c| c.value().parse::<u64>().ok())
        .map(ClientId)
        .ok_or(ChannelError::MissingIdentity(CLIENT_COOKIE))
}

impl IntoResponse for ChannelError {
    fn into_response(self) -> Response {
        let status = match &self {
            ChannelError::UnknownSession(_) => StatusCode::NOT_FOUND,
            ChannelError::InvalidEvent(_) | ChannelError::MissingIdentity(_) => {
                StatusCode::BAD_REQUEST
            }
            ChannelError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self, "Request failed");
        }
        (status, self.to_string()).into_response()
    }
}

//! Process-wide map from session id to channel.

use crate::channel::{Channel, ChannelConfig};
use crate::error::{ChannelError, Result};
use crate::types::{SessionId, SessionInfo, Timestamp};
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Characters used in minted session ids.
const SESSION_ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of minted session ids.
const SESSION_ID_LEN: usize = 6;

/// Registry configuration.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Configuration applied to every channel the registry creates.
    pub channel: ChannelConfig,

    /// Evict channels with no waiters after this much inactivity.
    /// Default: None (channels live for the whole process)
    pub idle_ttl: Option<Duration>,

    /// How often the reaper checks for idle channels.
    /// Default: 60s
    pub reap_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            idle_ttl: None,
            reap_interval: Duration::from_secs(60),
        }
    }
}

/// Maps session ids to their broadcast channels.
///
/// Lookups take a read lock; only creation and removal take the write lock.
/// Channels are independent of each other once handed out.
pub struct ChannelRegistry {
    channels: RwLock<HashMap<SessionId, Arc<Channel>>>,
    config: RegistryConfig,
}

impl ChannelRegistry {
    /// Create an empty registry with default configuration.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // --- Lookup and creation ---

    /// Get the channel for `session`, creating it on first use.
    pub fn get_or_create(&self, session: &SessionId) -> Arc<Channel> {
        self.get_or_create_with(session, SessionInfo::default())
    }

    /// Like [`get_or_create`](Self::get_or_create), recording `info` if the
    /// channel is created by this call.
    pub fn get_or_create_with(&self, session: &SessionId, info: SessionInfo) -> Arc<Channel> {
        if let Some(channel) = self.get(session) {
            return channel;
        }

        let mut channels = self.channels.write();
        // Another caller may have created it between the two locks.
        if let Some(channel) = channels.get(session) {
            return Arc::clone(channel);
        }

        let channel = Arc::new(Channel::with_config(
            session.clone(),
            info,
            self.config.channel.clone(),
        ));
        channels.insert(session.clone(), Arc::clone(&channel));
        info!(session = %session, channels = channels.len(), "Channel created");
        channel
    }

    /// Get the channel for `session` without creating it.
    pub fn get(&self, session: &SessionId) -> Option<Arc<Channel>> {
        self.channels.read().get(session).cloned()
    }

    /// Get the channel for `session`, or fail with `UnknownSession`.
    pub fn require(&self, session: &SessionId) -> Result<Arc<Channel>> {
        self.get(session)
            .ok_or_else(|| ChannelError::UnknownSession(session.clone()))
    }

    /// Open a new session under a freshly minted id.
    pub fn open_session(&self, info: SessionInfo) -> (SessionId, Arc<Channel>) {
        let mut channels = self.channels.write();

        let session = loop {
            let candidate = mint_session_id();
            if !channels.contains_key(&candidate) {
                break candidate;
            }
        };

        let channel = Arc::new(Channel::with_config(
            session.clone(),
            info,
            self.config.channel.clone(),
        ));
        channels.insert(session.clone(), Arc::clone(&channel));
        info!(session = %session, channels = channels.len(), "Session opened");

        (session, channel)
    }

    // --- Lifecycle ---

    /// Drop a session's channel from the registry.
    ///
    /// Subscribers already holding the channel keep working until they
    /// finish; new lookups report the session as unknown.
    pub fn remove(&self, session: &SessionId) -> Option<Arc<Channel>> {
        let removed = self.channels.write().remove(session);
        if removed.is_some() {
            info!(session = %session, "Channel removed");
        }
        removed
    }

    /// Evict channels with no waiters that have been idle for `max_idle`.
    ///
    /// Returns the evicted session ids.
    pub fn evict_idle(&self, max_idle: Duration) -> Vec<SessionId> {
        let now = Timestamp::now();
        let mut evicted = Vec::new();

        let mut channels = self.channels.write();
        channels.retain(|session, channel| {
            let keep = channel.waiting() > 0 || channel.idle_for(now) < max_idle;
            if !keep {
                evicted.push(session.clone());
            }
            keep
        });

        if !evicted.is_empty() {
            info!(evicted = evicted.len(), remaining = channels.len(), "Evicted idle channels");
        }
        evicted
    }

    /// Start a background task that evicts idle channels every
    /// `reap_interval`, if `idle_ttl` is configured.
    ///
    /// The task stops once the registry is dropped. Must be called from
    /// within a tokio runtime.
    pub fn spawn_reaper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let ttl = self.config.idle_ttl?;
        let period = self.config.reap_interval;
        let registry: Weak<Self> = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    debug!("Registry dropped, reaper exiting");
                    break;
                };
                registry.evict_idle(ttl);
            }
        }))
    }

    // --- Introspection ---

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }

    /// All registered session ids.
    pub fn sessions(&self) -> Vec<SessionId> {
        self.channels.read().keys().cloned().collect()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Six distinct characters from `A-Z0-9`.
fn mint_session_id() -> SessionId {
    let mut rng = rand::thread_rng();
    let id: String = SESSION_ID_CHARSET
        .choose_multiple(&mut rng, SESSION_ID_LEN)
        .map(|&b| b as char)
        .collect();
    SessionId(id)
}

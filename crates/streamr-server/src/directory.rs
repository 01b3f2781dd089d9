//! Named channels and the archive of closed-session histories.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use streamr_core::{ChannelId, SessionId};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::sse::{ChannelRegistry, EventHistory, Session};

/// Histories of closed sessions, kept so a client reconnecting with the same
/// session id can resume. Holds at most `capacity` entries; the oldest entry
/// is dropped first.
pub struct HistoryArchive {
    capacity: usize,
    entries: Mutex<ArchiveEntries>,
}

#[derive(Default)]
struct ArchiveEntries {
    histories: HashMap<SessionId, EventHistory>,
    order: VecDeque<SessionId>,
}

impl HistoryArchive {
    /// Empty archive.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(ArchiveEntries::default()),
        }
    }

    /// Store a history, replacing any earlier one for the same session.
    pub fn store(&self, session_id: SessionId, history: EventHistory) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.histories.insert(session_id.clone(), history).is_some() {
            entries.order.retain(|id| *id != session_id);
        }
        entries.order.push_back(session_id);
        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                let _ = entries.histories.remove(&oldest);
            }
        }
    }

    /// Remove and return a session's history.
    pub fn take(&self, session_id: &SessionId) -> Option<EventHistory> {
        let mut entries = self.entries.lock();
        let history = entries.histories.remove(session_id)?;
        entries.order.retain(|id| id != session_id);
        Some(history)
    }

    /// Number of archived histories.
    pub fn len(&self) -> usize {
        self.entries.lock().histories.len()
    }

    /// Whether nothing is archived.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All channels served by one server, created on first use.
pub struct ChannelDirectory {
    channels: RwLock<HashMap<ChannelId, Arc<ChannelRegistry>>>,
    archive: Arc<HistoryArchive>,
}

impl ChannelDirectory {
    /// Empty directory archiving up to `archive_capacity` histories.
    pub fn new(archive_capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            archive: Arc::new(HistoryArchive::new(archive_capacity)),
        }
    }

    /// Existing channel, if any.
    pub async fn get(&self, channel_id: &ChannelId) -> Option<Arc<ChannelRegistry>> {
        self.channels.read().await.get(channel_id).cloned()
    }

    /// Existing channel or a new empty one.
    pub async fn get_or_create(&self, channel_id: &ChannelId) -> Arc<ChannelRegistry> {
        if let Some(channel) = self.get(channel_id).await {
            return channel;
        }
        let mut channels = self.channels.write().await;
        Arc::clone(channels.entry(channel_id.clone()).or_insert_with(|| {
            info!(channel_id = %channel_id, "channel created");
            Arc::new(ChannelRegistry::with_id(channel_id.clone()))
        }))
    }

    /// The history archive.
    pub fn archive(&self) -> &Arc<HistoryArchive> {
        &self.archive
    }

    /// Archive `session`'s history when it closes. The store happens inside
    /// [`Session::close`], so the history is available as soon as it returns.
    pub fn archive_on_close(&self, session: &Arc<Session>) {
        let archive = Arc::clone(&self.archive);
        session.on_close(move |closed| {
            debug!(session_id = %closed.session_id(), "archiving session history");
            archive.store(closed.session_id().clone(), closed.history_snapshot());
        });
    }

    /// History to resume `session_id` from on `channel`.
    ///
    /// A live member with that id is closed first; the reconnecting client
    /// takes over its stream and its history.
    pub async fn reclaim_history(
        &self,
        channel: &ChannelRegistry,
        session_id: &SessionId,
    ) -> Option<EventHistory> {
        let live = channel.sessions(std::slice::from_ref(session_id)).await;
        if let Some(previous) = live.first() {
            info!(
                channel_id = %channel.channel_id(),
                session_id = %session_id,
                "closing previous stream for reconnecting session"
            );
            previous.close();
            if let Some(history) = self.archive.take(session_id) {
                return Some(history);
            }
            return Some(previous.history_snapshot());
        }
        self.archive.take(session_id)
    }

    /// Number of channels.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Registered sessions across all channels.
    pub async fn connection_count(&self) -> usize {
        let channels: Vec<_> = self.channels.read().await.values().cloned().collect();
        let mut total = 0;
        for channel in channels {
            total += channel.active_connections().await;
        }
        total
    }

    /// Close every registered session. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let channels: Vec<_> = self.channels.read().await.values().cloned().collect();
        let mut closed = 0;
        for channel in channels {
            for session in channel.all_sessions().await {
                session.close();
                closed += 1;
            }
        }
        info!(closed, "closed all sessions");
        closed
    }
}

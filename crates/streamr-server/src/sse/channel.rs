//! Fan-out of one message to many sessions.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use metrics::counter;
use streamr_core::{ChannelId, Result, SessionId, StreamError};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use super::notifications::ChannelEvent;
use super::session::{ConnectionState, Session};
use crate::telemetry::SSE_BROADCASTS_TOTAL;

type Members = Arc<RwLock<HashMap<SessionId, Arc<Session>>>>;

const NOTIFICATION_CAPACITY: usize = 64;

/// A named set of connected sessions.
///
/// Sessions leave automatically when they close.
pub struct ChannelRegistry {
    channel_id: ChannelId,
    members: Members,
    notifications: broadcast::Sender<ChannelEvent>,
}

impl ChannelRegistry {
    /// Empty channel with a generated id.
    pub fn new() -> Self {
        Self::with_id(ChannelId::new())
    }

    /// Empty channel with a fixed id.
    pub fn with_id(channel_id: impl Into<ChannelId>) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            channel_id: channel_id.into(),
            members: Arc::new(RwLock::new(HashMap::new())),
            notifications,
        }
    }

    /// Channel id.
    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// Subscribe to [`ChannelEvent`]s.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.notifications.subscribe()
    }

    /// Add a connected session. Registering the same id again replaces the
    /// previous member.
    pub async fn register(&self, session: Arc<Session>) -> Result<()> {
        let session_id = session.session_id().clone();
        if session.connection_state() != ConnectionState::Connected {
            return Err(StreamError::InactiveSession {
                session_id,
                channel_id: self.channel_id.clone(),
            });
        }

        {
            let mut members = self.members.write().await;
            let _ = members.insert(session_id.clone(), Arc::clone(&session));
        }
        info!(channel_id = %self.channel_id, session_id = %session_id, "session registered");
        let _ = self.notifications.send(ChannelEvent::SessionRegistered {
            channel_id: self.channel_id.clone(),
            session_id: session_id.clone(),
        });

        let signal = session.close_signal();
        let member: Weak<Session> = Arc::downgrade(&session);
        drop(session);
        let members = Arc::clone(&self.members);
        let notifications = self.notifications.clone();
        let channel_id = self.channel_id.clone();
        let _ = tokio::spawn(async move {
            signal.cancelled().await;
            let still_member = members
                .read()
                .await
                .get(&session_id)
                .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), member.as_ptr()));
            if still_member {
                let _ = remove_member(&members, &notifications, &channel_id, &session_id).await;
            }
        });
        Ok(())
    }

    /// Remove a session. Returns whether it was a member.
    pub async fn deregister(&self, session_id: &SessionId) -> bool {
        remove_member(
            &self.members,
            &self.notifications,
            &self.channel_id,
            session_id,
        )
        .await
    }

    /// Send `message` to every member, returning how many accepted it.
    pub async fn broadcast_all(&self, message: &str) -> usize {
        self.broadcast_all_as(message, None).await
    }

    /// Send `message` as a named event to every member.
    pub async fn broadcast_all_as(&self, message: &str, event_name: Option<&str>) -> usize {
        let members = self.members.read().await;
        let recipients = deliver_each(members.values(), message, event_name, &self.channel_id);
        drop(members);
        self.finish_broadcast(recipients);
        recipients
    }

    /// Send `message` to the listed sessions that are members of this
    /// channel. Sessions that are not members are skipped.
    pub async fn broadcast_some(&self, message: &str, sessions: &[Arc<Session>]) -> Result<usize> {
        self.broadcast_some_as(message, None, sessions).await
    }

    /// Send `message` as a named event to the listed member sessions.
    pub async fn broadcast_some_as(
        &self,
        message: &str,
        event_name: Option<&str>,
        sessions: &[Arc<Session>],
    ) -> Result<usize> {
        if sessions.is_empty() {
            return Err(StreamError::EmptySessionList {
                channel_id: self.channel_id.clone(),
            });
        }

        let members = self.members.read().await;
        let targets = sessions
            .iter()
            .filter(|s| members.contains_key(s.session_id()));
        let recipients = deliver_each(targets, message, event_name, &self.channel_id);
        drop(members);
        self.finish_broadcast(recipients);
        Ok(recipients)
    }

    fn finish_broadcast(&self, recipients: usize) {
        counter!(SSE_BROADCASTS_TOTAL).increment(1);
        debug!(channel_id = %self.channel_id, recipients, "broadcast complete");
        let _ = self.notifications.send(ChannelEvent::BroadcastSuccess {
            channel_id: self.channel_id.clone(),
            recipients,
        });
    }

    /// Member sessions with the given ids, skipping unknown ids.
    pub async fn sessions(&self, ids: &[SessionId]) -> Vec<Arc<Session>> {
        let members = self.members.read().await;
        ids.iter().filter_map(|id| members.get(id).cloned()).collect()
    }

    /// Every member session.
    pub async fn all_sessions(&self) -> Vec<Arc<Session>> {
        self.members.read().await.values().cloned().collect()
    }

    /// Number of member sessions.
    pub async fn active_connections(&self) -> usize {
        self.members.read().await.len()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn deliver_each<'a>(
    sessions: impl Iterator<Item = &'a Arc<Session>>,
    message: &str,
    event_name: Option<&str>,
    channel_id: &ChannelId,
) -> usize {
    let mut recipients = 0;
    for session in sessions {
        match session.send_message(message, event_name) {
            Ok(_) => recipients += 1,
            Err(e) => {
                warn!(channel_id = %channel_id, session_id = %session.session_id(), error = %e, "failed to send to member");
            }
        }
    }
    recipients
}

async fn remove_member(
    members: &Members,
    notifications: &broadcast::Sender<ChannelEvent>,
    channel_id: &ChannelId,
    session_id: &SessionId,
) -> bool {
    let removed = members.write().await.remove(session_id).is_some();
    if removed {
        info!(channel_id = %channel_id, session_id = %session_id, "session deregistered");
        let _ = notifications.send(ChannelEvent::SessionDeregistered {
            channel_id: channel_id.clone(),
            session_id: session_id.clone(),
        });
    }
    removed
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::sse::transport::{ChannelTransport, FrameStream};
    use assert_matches::assert_matches;
    use streamr_core::{ErrorKind, SessionConfig};
    use tokio_stream::StreamExt;

    fn session(id: &str) -> (Arc<Session>, FrameStream) {
        let (transport, frames) = ChannelTransport::new("0", 32);
        let config = SessionConfig {
            heartbeat_interval_ms: 3_600_000,
            ..SessionConfig::default()
        }
        .with_session_id(id);
        (Session::connect(Arc::new(transport), config).unwrap(), frames)
    }

    async fn next_frame(frames: &mut FrameStream) -> String {
        let frame = tokio::time::timeout(Duration::from_secs(5), frames.next())
            .await
            .expect("frame within timeout")
            .expect("stream open");
        String::from_utf8(frame.to_vec()).unwrap()
    }

    async fn wait_for_members(channel: &ChannelRegistry, expected: usize) {
        for _ in 0..200 {
            if channel.active_connections().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("channel never reached {expected} members");
    }

    #[tokio::test]
    async fn new_channel_is_empty() {
        let channel = ChannelRegistry::new();
        assert_eq!(channel.active_connections().await, 0);
        assert!(!channel.channel_id().is_empty());
    }

    #[tokio::test]
    async fn fixed_channel_id() {
        let channel = ChannelRegistry::with_id("news");
        assert_eq!(channel.channel_id().as_str(), "news");
    }

    #[tokio::test]
    async fn register_counts_members() {
        let channel = ChannelRegistry::with_id("c");
        let (a, _fa) = session("a");
        let (b, _fb) = session("b");
        channel.register(a).await.unwrap();
        channel.register(b).await.unwrap();
        assert_eq!(channel.active_connections().await, 2);
    }

    #[tokio::test]
    async fn register_same_id_replaces() {
        let channel = ChannelRegistry::with_id("c");
        let (a1, _f1) = session("a");
        let (a2, _f2) = session("a");
        channel.register(a1).await.unwrap();
        channel.register(a2).await.unwrap();
        assert_eq!(channel.active_connections().await, 1);
    }

    #[tokio::test]
    async fn closed_session_cannot_register() {
        let channel = ChannelRegistry::with_id("c");
        let (a, _fa) = session("a");
        a.close();
        let err = channel.register(a).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert_matches!(err, StreamError::InactiveSession { .. });
        assert_eq!(channel.active_connections().await, 0);
    }

    #[tokio::test]
    async fn deregister_reports_membership() {
        let channel = ChannelRegistry::with_id("c");
        let (a, _fa) = session("a");
        channel.register(a.clone()).await.unwrap();
        assert!(channel.deregister(a.session_id()).await);
        assert!(!channel.deregister(a.session_id()).await);
        assert_eq!(channel.active_connections().await, 0);
    }

    #[tokio::test]
    async fn close_deregisters_automatically() {
        let channel = ChannelRegistry::with_id("c");
        let mut events = channel.subscribe();
        let (a, _fa) = session("a");
        channel.register(a.clone()).await.unwrap();
        a.close();
        wait_for_members(&channel, 0).await;

        assert_matches!(events.recv().await, Ok(ChannelEvent::SessionRegistered { .. }));
        assert_matches!(
            events.recv().await,
            Ok(ChannelEvent::SessionDeregistered { session_id, .. }) if session_id.as_str() == "a"
        );
    }

    #[tokio::test]
    async fn stale_close_keeps_replacement() {
        let channel = ChannelRegistry::with_id("c");
        let (old, _fo) = session("a");
        let (new, _fn) = session("a");
        channel.register(old.clone()).await.unwrap();
        channel.register(new).await.unwrap();
        old.close();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(channel.active_connections().await, 1);
    }

    #[tokio::test]
    async fn broadcast_all_reaches_every_member() {
        let channel = ChannelRegistry::with_id("c");
        let (a, mut fa) = session("a");
        let (b, mut fb) = session("b");
        channel.register(a).await.unwrap();
        channel.register(b).await.unwrap();

        assert_eq!(channel.broadcast_all("hello").await, 2);
        assert_eq!(next_frame(&mut fa).await, "id:0\ndata:hello\nretry:1000\n\n");
        assert_eq!(next_frame(&mut fb).await, "id:0\ndata:hello\nretry:1000\n\n");
    }

    #[tokio::test]
    async fn broadcast_after_deregister_skips_removed() {
        let channel = ChannelRegistry::with_id("c");
        let (a, mut fa) = session("a");
        let (b, mut fb) = session("b");
        channel.register(a.clone()).await.unwrap();
        channel.register(b).await.unwrap();
        assert!(channel.deregister(a.session_id()).await);

        assert_eq!(channel.broadcast_all("only b").await, 1);
        assert_eq!(next_frame(&mut fb).await, "id:0\ndata:only b\nretry:1000\n\n");
        let _ = a.send_message("direct", None).unwrap();
        assert_eq!(next_frame(&mut fa).await, "id:0\ndata:direct\nretry:1000\n\n");
    }

    #[tokio::test]
    async fn broadcast_all_as_names_event() {
        let channel = ChannelRegistry::with_id("c");
        let (a, mut fa) = session("a");
        channel.register(a).await.unwrap();
        let _ = channel.broadcast_all_as("up", Some("status")).await;
        assert_eq!(
            next_frame(&mut fa).await,
            "id:0\nevent:status\ndata:up\nretry:1000\n\n"
        );
    }

    #[tokio::test]
    async fn broadcast_on_empty_channel_succeeds() {
        let channel = ChannelRegistry::with_id("c");
        let mut events = channel.subscribe();
        assert_eq!(channel.broadcast_all("nobody").await, 0);
        assert_matches!(
            events.recv().await,
            Ok(ChannelEvent::BroadcastSuccess { recipients: 0, .. })
        );
    }

    #[tokio::test]
    async fn broadcast_continues_past_failed_member() {
        let channel = ChannelRegistry::with_id("c");
        let (a, _fa) = session("a");
        let (b, mut fb) = session("b");
        channel.register(b).await.unwrap();

        // A member that closed before its removal landed.
        a.close();
        let _ = channel
            .members
            .write()
            .await
            .insert(a.session_id().clone(), a);

        assert_eq!(channel.broadcast_all("still").await, 1);
        assert_eq!(next_frame(&mut fb).await, "id:0\ndata:still\nretry:1000\n\n");
    }

    #[tokio::test]
    async fn broadcast_some_targets_members_only() {
        let channel = ChannelRegistry::with_id("c");
        let (a, mut fa) = session("a");
        let (b, mut fb) = session("b");
        let (outsider, mut fo) = session("x");
        channel.register(a.clone()).await.unwrap();
        channel.register(b).await.unwrap();

        let sent = channel
            .broadcast_some("direct", &[a, outsider.clone()])
            .await
            .unwrap();
        assert_eq!(sent, 1);
        assert_eq!(next_frame(&mut fa).await, "id:0\ndata:direct\nretry:1000\n\n");

        let _ = outsider.send_message("own", None).unwrap();
        assert_eq!(next_frame(&mut fo).await, "id:0\ndata:own\nretry:1000\n\n");

        let _ = channel.broadcast_all("all").await;
        assert_eq!(next_frame(&mut fb).await, "id:0\ndata:all\nretry:1000\n\n");
    }

    #[tokio::test]
    async fn broadcast_some_unregistered_only_succeeds() {
        let channel = ChannelRegistry::with_id("c");
        let (outsider, _fo) = session("x");
        assert_eq!(channel.broadcast_some("m", &[outsider]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn broadcast_some_empty_list_rejected() {
        let channel = ChannelRegistry::with_id("c");
        let err = channel.broadcast_some("m", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
        assert!(err.to_string().contains("use broadcast_all"));
        assert!(err.to_string().ends_with("on channel c"));
    }

    #[tokio::test]
    async fn sessions_lookup_skips_unknown() {
        let channel = ChannelRegistry::with_id("c");
        let (a, _fa) = session("a");
        channel.register(a).await.unwrap();
        let found = channel
            .sessions(&[SessionId::from("a"), SessionId::from("missing")])
            .await;
        assert_eq!(found.len(), 1);
        assert_eq!(channel.all_sessions().await.len(), 1);
    }
}

//! One client's event stream.
//!
//! A [`Session`] owns the id sequence, the replay history, the heartbeat, and
//! the delivery pipe for a single connection. Events are accepted
//! synchronously by [`Session::send_message`] and written to the transport by
//! a background task in acceptance order. When the transport is saturated the
//! task waits for it to drain; later events queue behind it, never ahead.

use std::sync::{Arc, Weak};

use bytes::Bytes;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use streamr_core::{Result, SessionConfig, SessionId, StreamError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::encoder::encode_event;
use super::event::Event;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::history::EventHistory;
use super::notifications::SessionEvent;
use super::resume::parse_resume_id;
use super::transport::{FrameRejected, Transport};
use crate::telemetry::{
    SSE_MESSAGES_SENT_TOTAL, SSE_REPLAYED_EVENTS_TOTAL, SSE_SESSIONS_ACTIVE, SSE_SESSIONS_TOTAL,
};

/// Response headers written when a session opens.
pub const EVENT_STREAM_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", "text/event-stream"),
    ("Connection", "keep-alive"),
    (
        "Cache-Control",
        "private, no-cache, no-store, no-transform, must-revalidate, max-age=0",
    ),
    ("X-Accel-Buffering", "no"),
];

const NOTIFICATION_CAPACITY: usize = 64;

type CloseHook = Box<dyn FnOnce(&Session) + Send>;

/// Connection state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepting events.
    Connected,
    /// Closed; sends fail.
    Disconnected,
}

struct SessionInner {
    state: ConnectionState,
    next_event_id: u64,
    history: EventHistory,
    pipe: Option<mpsc::UnboundedSender<Event>>,
}

/// A single client's event stream.
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    inner: Mutex<SessionInner>,
    heartbeat: Mutex<Option<JoinHandle<HeartbeatResult>>>,
    cancel: CancellationToken,
    close_hooks: Mutex<Vec<CloseHook>>,
    notifications: broadcast::Sender<SessionEvent>,
}

impl Session {
    /// Open a session with an empty history.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(transport: Arc<dyn Transport>, config: SessionConfig) -> Result<Arc<Self>> {
        Self::open(transport, config, None)
    }

    /// Open a session continuing a previous one's history.
    ///
    /// Ids continue after the newest retained event, and a resume hint from
    /// the transport replays every retained event at or after it.
    pub fn resume(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        history: EventHistory,
    ) -> Result<Arc<Self>> {
        Self::open(transport, config, Some(history))
    }

    fn open(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        prior: Option<EventHistory>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let id = config.session_id.clone().unwrap_or_default();
        let resume_id = parse_resume_id(&transport.resume_hint());
        let history = match prior {
            Some(history) => history.with_capacity(config.history_size),
            None => EventHistory::new(config.history_size),
        };
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        let session = Arc::new(Self {
            id,
            transport,
            inner: Mutex::new(SessionInner {
                state: ConnectionState::Disconnected,
                next_event_id: history.next_id(),
                history,
                pipe: None,
            }),
            heartbeat: Mutex::new(None),
            cancel: CancellationToken::new(),
            close_hooks: Mutex::new(Vec::new()),
            notifications,
            config,
        });

        session.transport.write_headers(&EVENT_STREAM_HEADERS);
        let replayed = if resume_id == 0 {
            0
        } else {
            session.replay(resume_id)
        };
        session.inner.lock().state = ConnectionState::Connected;
        session.start_heartbeat();
        session.watch_transport();

        counter!(SSE_SESSIONS_TOTAL).increment(1);
        gauge!(SSE_SESSIONS_ACTIVE).increment(1.0);
        info!(session_id = %session.id, resume_id, replayed, "session connected");
        Ok(session)
    }

    /// Re-enqueue retained events at or after `resume_id`. They keep their
    /// ids and names and are not appended to the history again.
    fn replay(&self, resume_id: u64) -> usize {
        let mut inner = self.inner.lock();
        if inner.history.has_gap(resume_id) {
            warn!(
                session_id = %self.id,
                resume_id,
                oldest = ?inner.history.iter().next().map(|e| e.id),
                "resume point evicted from history, replaying what is retained"
            );
        }
        let events: Vec<Event> = inner.history.replay_from(resume_id).cloned().collect();
        let count = events.len();
        for event in events {
            self.enqueue(&mut inner, event);
        }
        drop(inner);

        if count > 0 {
            counter!(SSE_REPLAYED_EVENTS_TOTAL).increment(count as u64);
        }
        debug!(session_id = %self.id, resume_id, count, "replayed history");
        count
    }

    /// Send an event, returning the id assigned to it.
    ///
    /// The event is recorded in the history and queued for delivery; this
    /// never waits on the transport.
    pub fn send_message(&self, payload: &str, event_name: Option<&str>) -> Result<u64> {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Connected {
            return Err(StreamError::ConnectionClosed {
                session_id: self.id.clone(),
            });
        }

        let event_id = inner.next_event_id;
        inner.next_event_id += 1;
        let event = Event::new(event_id, payload, event_name);
        inner.history.push(event.clone());
        self.enqueue(&mut inner, event);
        drop(inner);

        counter!(SSE_MESSAGES_SENT_TOTAL).increment(1);
        debug!(session_id = %self.id, event_id, "event queued");
        let _ = self.notifications.send(SessionEvent::MessageSent {
            session_id: self.id.clone(),
            event_id,
        });
        Ok(event_id)
    }

    fn enqueue(&self, inner: &mut SessionInner, event: Event) {
        let pipe = inner.pipe.get_or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let _ = tokio::spawn(deliver(
                self.id.clone(),
                Arc::clone(&self.transport),
                rx,
                self.config.retry_interval_ms,
                self.cancel.clone(),
            ));
            tx
        });
        if pipe.send(event).is_err() {
            debug!(session_id = %self.id, "delivery pipe gone, dropping event");
        }
    }

    fn start_heartbeat(&self) {
        let mut heartbeat = self.heartbeat.lock();
        if heartbeat.is_some() {
            return;
        }
        *heartbeat = Some(tokio::spawn(run_heartbeat(
            Arc::clone(&self.transport),
            self.config.heartbeat_interval(),
            self.cancel.clone(),
        )));
    }

    fn watch_transport(self: &Arc<Self>) {
        let session: Weak<Self> = Arc::downgrade(self);
        let transport = Arc::clone(&self.transport);
        let cancel = self.cancel.clone();
        let _ = tokio::spawn(async move {
            tokio::select! {
                () = transport.closed() => {
                    if let Some(session) = session.upgrade() {
                        debug!(session_id = %session.id, "transport closed by peer");
                        session.close();
                    }
                }
                () = cancel.cancelled() => {}
            }
        });
    }

    /// Close the session. Idempotent.
    ///
    /// Resets the id sequence, runs the [`on_close`](Self::on_close) hooks,
    /// stops the heartbeat and delivery, ends the transport, and publishes
    /// [`SessionEvent::Closed`]. The history is kept so it can seed a resumed
    /// session.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Disconnected {
                return;
            }
            inner.state = ConnectionState::Disconnected;
            inner.next_event_id = 0;
            inner.pipe = None;
        }

        let hooks = std::mem::take(&mut *self.close_hooks.lock());
        for hook in hooks {
            hook(self);
        }

        self.cancel.cancel();
        if let Some(handle) = self.heartbeat.lock().take() {
            handle.abort();
        }
        self.transport.end();

        gauge!(SSE_SESSIONS_ACTIVE).decrement(1.0);
        info!(session_id = %self.id, "session closed");
        let _ = self.notifications.send(SessionEvent::Closed {
            session_id: self.id.clone(),
        });
    }

    /// Run `hook` inside [`close`](Self::close), before `closed` resolves
    /// for any waiter. Runs at once if the session is already closed.
    pub fn on_close(&self, hook: impl FnOnce(&Session) + Send + 'static) {
        {
            let mut hooks = self.close_hooks.lock();
            if self.inner.lock().state == ConnectionState::Connected {
                hooks.push(Box::new(hook));
                return;
            }
        }
        hook(self);
    }

    /// Resolves once the session has closed.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Token cancelled when the session closes. Cancelling it does not close
    /// the session.
    pub fn close_signal(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Subscribe to [`SessionEvent`]s.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.notifications.subscribe()
    }

    /// Session id.
    pub fn session_id(&self) -> &SessionId {
        &self.id
    }

    /// Configuration the session was opened with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Id the next sent event will carry.
    pub fn next_event_id(&self) -> u64 {
        self.inner.lock().next_event_id
    }

    /// Copy of the retained history.
    pub fn history_snapshot(&self) -> EventHistory {
        self.inner.lock().history.clone()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.connection_state())
            .finish_non_exhaustive()
    }
}

/// Drain queued events into the transport in order.
async fn deliver(
    session_id: SessionId,
    transport: Arc<dyn Transport>,
    mut events: mpsc::UnboundedReceiver<Event>,
    retry_ms: u64,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = events.recv() => match next {
                Some(event) => event,
                None => break,
            },
        };

        let frame = Bytes::from(encode_event(&event, Some(retry_ms)));
        let frame = match transport.try_write_frame(frame) {
            Ok(()) => continue,
            Err(FrameRejected::Closed) => break,
            Err(FrameRejected::Full(frame)) => frame,
        };

        debug!(session_id = %session_id, event_id = event.id, "transport saturated, waiting for drain");
        let written = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            written = transport.write_frame(frame) => written,
        };
        if written.is_err() {
            break;
        }
    }
    debug!(session_id = %session_id, "delivery stopped");
}

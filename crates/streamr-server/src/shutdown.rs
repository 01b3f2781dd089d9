//! Server shutdown: close every open session, then let the listener drain.
//!
//! SSE responses never finish on their own, so the listener cannot drain
//! until each session's stream has been ended. [`ShutdownCoordinator::signal`]
//! is handed to Axum as the graceful-shutdown future and does that closing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::directory::ChannelDirectory;

/// Ends every session in a [`ChannelDirectory`] when shutdown is requested.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    directory: Arc<ChannelDirectory>,
}

/// How a [`ShutdownCoordinator::drain`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The serve task finished.
    Drained,
    /// The timeout elapsed first; `remaining` sessions were still registered.
    TimedOut {
        /// Registered sessions when the wait gave up.
        remaining: usize,
    },
}

impl ShutdownCoordinator {
    /// Coordinator for the sessions in `directory`.
    pub fn new(directory: Arc<ChannelDirectory>) -> Self {
        Self {
            token: CancellationToken::new(),
            directory,
        }
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown was requested.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves after shutdown is requested and every registered session has
    /// been closed.
    pub fn signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let token = self.token.clone();
        let directory = Arc::clone(&self.directory);
        async move {
            token.cancelled().await;
            info!("shutdown requested, closing sessions");
            let closed = directory.close_all().await;
            info!(closed, "sessions closed for shutdown");
        }
    }

    /// Request shutdown and wait up to `timeout` for `server` to finish.
    pub async fn drain(&self, server: JoinHandle<()>, timeout: Duration) -> DrainOutcome {
        self.shutdown();
        if tokio::time::timeout(timeout, server).await.is_ok() {
            info!("server drained");
            return DrainOutcome::Drained;
        }
        let remaining = self.directory.connection_count().await;
        warn!(remaining, ?timeout, "shutdown timed out");
        DrainOutcome::TimedOut { remaining }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::{ChannelTransport, ConnectionState, Session};
    use streamr_core::{ChannelId, SessionConfig};

    async fn directory_with_session() -> (Arc<ChannelDirectory>, Arc<Session>) {
        let directory = Arc::new(ChannelDirectory::new(8));
        let channel = directory.get_or_create(&ChannelId::from("news")).await;
        let (transport, _frames) = ChannelTransport::new("0", 8);
        let session = Session::connect(Arc::new(transport), SessionConfig::default()).unwrap();
        channel.register(session.clone()).await.unwrap();
        (directory, session)
    }

    #[tokio::test]
    async fn signal_waits_for_shutdown_then_closes_sessions() {
        let (directory, session) = directory_with_session().await;
        let coord = ShutdownCoordinator::new(directory);
        let signal = tokio::spawn(coord.signal());

        tokio::task::yield_now().await;
        assert!(!signal.is_finished());
        assert_eq!(session.connection_state(), ConnectionState::Connected);

        coord.shutdown();
        signal.await.unwrap();
        assert!(coord.is_shutting_down());
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn drain_returns_once_server_task_ends() {
        let (directory, session) = directory_with_session().await;
        let coord = ShutdownCoordinator::new(directory);
        let signal = coord.signal();
        let server = tokio::spawn(signal);

        let outcome = coord.drain(server, Duration::from_secs(1)).await;
        assert_eq!(outcome, DrainOutcome::Drained);
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_reports_sessions_left_on_timeout() {
        let (directory, _session) = directory_with_session().await;
        let coord = ShutdownCoordinator::new(directory);
        let stuck = tokio::spawn(std::future::pending::<()>());

        let outcome = coord.drain(stuck, Duration::from_millis(50)).await;
        assert_eq!(outcome, DrainOutcome::TimedOut { remaining: 1 });
    }
}

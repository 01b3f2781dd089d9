//! Keep-alive comment frames.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::encoder::HEARTBEAT_FRAME;
use super::transport::Transport;
use crate::telemetry::SSE_HEARTBEAT_FAILURES_TOTAL;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The owning session stopped the heartbeat.
    Cancelled,
    /// A keep-alive frame could not be written.
    TransportClosed,
}

/// Write a keep-alive frame every `interval` until cancelled.
///
/// The first frame goes out one full interval after start. Writes share the
/// transport with event delivery and wait like any other frame when the
/// client is slow to drain.
pub async fn run_heartbeat(
    transport: Arc<dyn Transport>,
    interval: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let frame = Bytes::from_static(HEARTBEAT_FRAME.as_bytes());

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            written = transport.write_frame(frame.clone()) => {
                if written.is_err() {
                    debug!("heartbeat write failed, transport closed");
                    counter!(SSE_HEARTBEAT_FAILURES_TOTAL).increment(1);
                    return HeartbeatResult::TransportClosed;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::transport::ChannelTransport;
    use tokio_stream::StreamExt;

    fn transport(capacity: usize) -> (Arc<dyn Transport>, crate::sse::transport::FrameStream) {
        let (transport, frames) = ChannelTransport::new("0", capacity);
        (Arc::new(transport), frames)
    }

    #[tokio::test(start_paused = true)]
    async fn first_frame_after_one_interval() {
        let (transport, mut frames) = transport(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            transport,
            Duration::from_millis(100),
            cancel.clone(),
        ));

        let start = Instant::now();
        let frame = frames.next().await.unwrap();
        assert_eq!(frame, ":\n\n");
        assert!(start.elapsed() >= Duration::from_millis(100));

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn repeats_every_interval() {
        let (transport, mut frames) = transport(8);
        let cancel = CancellationToken::new();
        let _handle = tokio::spawn(run_heartbeat(
            transport,
            Duration::from_millis(50),
            cancel.clone(),
        ));

        for _ in 0..3 {
            assert_eq!(frames.next().await.unwrap(), ":\n\n");
        }
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_first_tick() {
        let (transport, _frames) = transport(8);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_heartbeat(transport, Duration::from_secs(45), cancel).await;
        assert_eq!(result, HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_transport_closed() {
        let (transport, frames) = transport(8);
        drop(frames);
        let result =
            run_heartbeat(transport, Duration::from_millis(10), CancellationToken::new()).await;
        assert_eq!(result, HeartbeatResult::TransportClosed);
    }
}

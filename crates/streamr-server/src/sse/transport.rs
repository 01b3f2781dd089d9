//! The transport seam between a session and the underlying connection.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// The connection has gone away; no further frames can be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("transport closed")]
pub struct TransportClosed;

/// Why a non-blocking write did not go through.
#[derive(Debug)]
pub enum FrameRejected {
    /// The sink is saturated; the frame is handed back to be retried once
    /// the client drains.
    Full(Bytes),
    /// The connection has gone away.
    Closed,
}

/// Write side of one client connection.
///
/// Implementations must keep frames in the order they were accepted.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Raw last-event-id hint the client connected with (`"0"` if none).
    fn resume_hint(&self) -> String;

    /// Record the response headers. Called once, before any frame.
    fn write_headers(&self, headers: &[(&'static str, &'static str)]);

    /// Write a frame if the sink has room right now.
    fn try_write_frame(&self, frame: Bytes) -> Result<(), FrameRejected>;

    /// Write a frame, waiting for the sink to drain if it is saturated.
    async fn write_frame(&self, frame: Bytes) -> Result<(), TransportClosed>;

    /// Resolves once the peer has disconnected.
    async fn closed(&self);

    /// End the response. Later writes fail with [`TransportClosed`].
    fn end(&self);
}

/// Frames produced for one connection, consumed as the response body.
pub type FrameStream = ReceiverStream<Bytes>;

/// [`Transport`] backed by a bounded channel.
///
/// The channel capacity is the outbound buffer: when the consumer of the
/// [`FrameStream`] stops reading, writes wait until it catches up. Dropping
/// the stream is how the peer signals disconnect.
pub struct ChannelTransport {
    resume_hint: String,
    headers: Mutex<Vec<(&'static str, &'static str)>>,
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
}

impl ChannelTransport {
    /// Create a transport buffering up to `capacity` frames.
    pub fn new(resume_hint: impl Into<String>, capacity: usize) -> (Self, FrameStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let transport = Self {
            resume_hint: resume_hint.into(),
            headers: Mutex::new(Vec::new()),
            tx: Mutex::new(Some(tx)),
        };
        (transport, ReceiverStream::new(rx))
    }

    /// Headers recorded by the session.
    pub fn headers(&self) -> Vec<(&'static str, &'static str)> {
        self.headers.lock().clone()
    }

    /// Whether [`Transport::end`] has been called.
    pub fn is_ended(&self) -> bool {
        self.tx.lock().is_none()
    }

    fn sender(&self) -> Option<mpsc::Sender<Bytes>> {
        self.tx.lock().clone()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn resume_hint(&self) -> String {
        self.resume_hint.clone()
    }

    fn write_headers(&self, headers: &[(&'static str, &'static str)]) {
        self.headers.lock().extend_from_slice(headers);
    }

    fn try_write_frame(&self, frame: Bytes) -> Result<(), FrameRejected> {
        let Some(tx) = self.sender() else {
            return Err(FrameRejected::Closed);
        };
        tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(frame) => FrameRejected::Full(frame),
            mpsc::error::TrySendError::Closed(_) => FrameRejected::Closed,
        })
    }

    async fn write_frame(&self, frame: Bytes) -> Result<(), TransportClosed> {
        let tx = self.sender().ok_or(TransportClosed)?;
        tx.send(frame).await.map_err(|_| TransportClosed)
    }

    async fn closed(&self) {
        if let Some(tx) = self.sender() {
            tx.closed().await;
        }
    }

    fn end(&self) {
        drop(self.tx.lock().take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn frames_arrive_in_order() {
        let (transport, mut frames) = ChannelTransport::new("0", 8);
        transport.write_frame(Bytes::from_static(b"a")).await.unwrap();
        transport.write_frame(Bytes::from_static(b"b")).await.unwrap();
        assert_eq!(frames.next().await.unwrap(), "a");
        assert_eq!(frames.next().await.unwrap(), "b");
    }

    #[tokio::test]
    async fn try_write_reports_full() {
        let (transport, _frames) = ChannelTransport::new("0", 1);
        transport.try_write_frame(Bytes::from_static(b"a")).unwrap();
        let rejected = transport.try_write_frame(Bytes::from_static(b"b"));
        assert_matches!(rejected, Err(FrameRejected::Full(frame)) if frame == "b");
    }

    #[tokio::test]
    async fn write_waits_for_drain() {
        let (transport, mut frames) = ChannelTransport::new("0", 1);
        transport.write_frame(Bytes::from_static(b"a")).await.unwrap();

        let transport = std::sync::Arc::new(transport);
        let writer = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.write_frame(Bytes::from_static(b"b")).await })
        };
        tokio::task::yield_now().await;
        assert!(!writer.is_finished());

        assert_eq!(frames.next().await.unwrap(), "a");
        writer.await.unwrap().unwrap();
        assert_eq!(frames.next().await.unwrap(), "b");
    }

    #[tokio::test]
    async fn end_terminates_stream() {
        let (transport, mut frames) = ChannelTransport::new("0", 4);
        transport.end();
        assert!(transport.is_ended());
        assert!(frames.next().await.is_none());
        assert_eq!(
            transport.write_frame(Bytes::from_static(b"x")).await,
            Err(TransportClosed)
        );
        assert_matches!(
            transport.try_write_frame(Bytes::from_static(b"x")),
            Err(FrameRejected::Closed)
        );
    }

    #[tokio::test]
    async fn closed_resolves_when_stream_dropped() {
        let (transport, frames) = ChannelTransport::new("0", 4);
        drop(frames);
        tokio::time::timeout(std::time::Duration::from_secs(1), transport.closed())
            .await
            .unwrap();
    }

    #[test]
    fn records_headers_and_hint() {
        let (transport, _frames) = ChannelTransport::new("17", 4);
        transport.write_headers(&[("Content-Type", "text/event-stream")]);
        assert_eq!(transport.resume_hint(), "17");
        assert_eq!(transport.headers(), vec![("Content-Type", "text/event-stream")]);
    }
}

//! Raw frame forwarding over a local socket.
//!
//! Each packed frame is written as-is to a filesystem-namespaced Unix socket,
//! back to back, with no header or length prefix. The consumer learns the
//! geometry out of band and reads `width * height * 3 / 2` bytes per frame.
//!
//! The channel connects lazily on the first frame, and after any I/O error
//! the socket is torn down and a fresh one is created on the next frame.
//! Frames that cannot be delivered are dropped.

use std::io::Write;
use std::net::Shutdown;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use socket2::{Domain, SockAddr, Socket, Type};

use crate::video::{PackedFrame, VideoGeometry};

/// Default endpoint of the frame consumer
pub const DEFAULT_ENDPOINT: &str = "/dev/socket/video0";

/// Socket type used for the forward channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SocketKind {
    /// Byte stream (frames are unframed)
    #[default]
    Stream,
    /// Sequenced packets
    SeqPacket,
}

impl SocketKind {
    fn socket_type(self) -> Type {
        match self {
            SocketKind::Stream => Type::STREAM,
            SocketKind::SeqPacket => Type::SEQPACKET,
        }
    }
}

/// Where and how frames are forwarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardConfig {
    pub endpoint: PathBuf,
    pub kind: SocketKind,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            endpoint: PathBuf::from(DEFAULT_ENDPOINT),
            kind: SocketKind::Stream,
        }
    }
}

/// Forwarding errors. All of them are local to the channel.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },
    #[error("Failed to write frame: {0}")]
    Write(std::io::Error),
    #[error("Forward channel closed")]
    Closed,
}

/// Handle that shuts the forward channel down from another thread
///
/// Shutting down the shared socket makes a blocked connect or write on the
/// decode thread return immediately. Once closed the channel stays closed.
#[derive(Clone, Default)]
pub struct ForwardCloser {
    inner: Arc<CloserState>,
}

#[derive(Default)]
struct CloserState {
    closed: AtomicBool,
    socket: Mutex<Option<Socket>>,
}

impl ForwardCloser {
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        if let Ok(mut socket) = self.inner.socket.lock() {
            if let Some(socket) = socket.take() {
                let _ = socket.shutdown(Shutdown::Both);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn track(&self, socket: &Socket) {
        let clone = match socket.try_clone() {
            Ok(clone) => clone,
            Err(e) => {
                tracing::debug!("Could not clone forward socket handle: {}", e);
                return;
            }
        };
        if let Ok(mut slot) = self.inner.socket.lock() {
            *slot = Some(clone);
        }
        // close() may have run between connect and registration
        if self.is_closed() {
            let _ = socket.shutdown(Shutdown::Both);
        }
    }

    fn untrack(&self) {
        if let Ok(mut slot) = self.inner.socket.lock() {
            slot.take();
        }
    }
}

enum ChannelState {
    Disconnected,
    Connected(Socket),
}

/// Forwards packed frames to a local socket consumer
pub struct FrameForwarder {
    config: ForwardConfig,
    geometry: Option<VideoGeometry>,
    state: ChannelState,
    closer: ForwardCloser,
    send_buffer_size: Option<usize>,
    connect_attempts: u64,
    /// Connect failures are logged once until the next successful connect
    connect_failing: bool,
}

impl FrameForwarder {
    pub fn new(config: ForwardConfig) -> Self {
        Self {
            config,
            geometry: None,
            state: ChannelState::Disconnected,
            closer: ForwardCloser::default(),
            send_buffer_size: None,
            connect_attempts: 0,
            connect_failing: false,
        }
    }

    /// Set the stream geometry used to size the send buffer on connect
    pub fn set_geometry(&mut self, geometry: VideoGeometry) {
        self.geometry = Some(geometry);
    }

    pub fn endpoint(&self) -> &Path {
        &self.config.endpoint
    }

    pub fn closer(&self) -> ForwardCloser {
        self.closer.clone()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ChannelState::Connected(_))
    }

    /// Send buffer size requested on the current connection
    pub fn send_buffer_size(&self) -> Option<usize> {
        self.send_buffer_size
    }

    /// Number of connection attempts made so far
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts
    }

    /// Write one frame, connecting first if needed
    ///
    /// On failure the channel is reset and the frame is dropped; the next
    /// call starts over with a new socket.
    pub fn forward(&mut self, frame: &PackedFrame) -> Result<(), ForwardError> {
        if self.closer.is_closed() {
            self.teardown();
            return Err(ForwardError::Closed);
        }

        if !self.is_connected() {
            let geometry = self.geometry.unwrap_or(frame.geometry);
            match self.connect(geometry) {
                Ok(socket) => {
                    self.closer.track(&socket);
                    self.state = ChannelState::Connected(socket);
                    self.connect_failing = false;
                }
                Err(e) => {
                    if !self.connect_failing {
                        tracing::warn!("{}; dropping frames until the consumer is reachable", e);
                        self.connect_failing = true;
                    }
                    self.teardown();
                    return Err(e);
                }
            }
        }

        let ChannelState::Connected(socket) = &mut self.state else {
            return Err(ForwardError::Closed);
        };
        if let Err(e) = socket.write_all(&frame.data) {
            tracing::warn!("Forward write to {} failed: {}", self.config.endpoint.display(), e);
            self.teardown();
            return Err(if self.closer.is_closed() {
                ForwardError::Closed
            } else {
                ForwardError::Write(e)
            });
        }
        Ok(())
    }

    /// Close the channel from the owning thread
    pub fn close(&mut self) {
        self.closer.close();
        self.teardown();
    }

    fn connect(&mut self, geometry: VideoGeometry) -> Result<Socket, ForwardError> {
        self.connect_attempts += 1;
        let endpoint = self.config.endpoint.display().to_string();
        let connect_error = |source: std::io::Error| ForwardError::Connect {
            endpoint: endpoint.clone(),
            source,
        };

        let socket = Socket::new(Domain::UNIX, self.config.kind.socket_type(), None).map_err(connect_error)?;
        let address = SockAddr::unix(&self.config.endpoint).map_err(connect_error)?;
        socket.connect(&address).map_err(connect_error)?;

        let size = geometry.send_buffer_len();
        if size > 0 {
            socket.set_send_buffer_size(size).map_err(connect_error)?;
            self.send_buffer_size = Some(size);
        }

        tracing::info!(
            "Forward channel connected to {} (send buffer {} bytes for {})",
            endpoint,
            size,
            geometry
        );
        Ok(socket)
    }

    fn teardown(&mut self) {
        if let ChannelState::Connected(socket) = std::mem::replace(&mut self.state, ChannelState::Disconnected) {
            let _ = socket.shutdown(Shutdown::Both);
            tracing::debug!("Forward channel to {} torn down", self.config.endpoint.display());
        }
        self.closer.untrack();
        self.send_buffer_size = None;
    }
}

impl Drop for FrameForwarder {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixListener;

    fn frame(width: u32, height: u32, value: u8) -> PackedFrame {
        let geometry = VideoGeometry::new(width, height);
        PackedFrame::new(vec![value; geometry.packed_len()], geometry, 0)
    }

    fn config(dir: &tempfile::TempDir) -> ForwardConfig {
        ForwardConfig {
            endpoint: dir.path().join("video0"),
            kind: SocketKind::Stream,
        }
    }

    #[test]
    fn test_failures_reconnect_with_fresh_socket() {
        let dir = tempfile::tempdir().unwrap();
        let mut forwarder = FrameForwarder::new(config(&dir));
        let frame = frame(16, 16, 1);

        for attempt in 1..=3 {
            assert!(matches!(forwarder.forward(&frame), Err(ForwardError::Connect { .. })));
            assert_eq!(forwarder.connect_attempts(), attempt);
            assert!(!forwarder.is_connected());
        }

        let listener = UnixListener::bind(forwarder.endpoint()).unwrap();
        forwarder.forward(&frame).unwrap();
        assert_eq!(forwarder.connect_attempts(), 4);
        assert!(forwarder.is_connected());

        let (mut peer, _) = listener.accept().unwrap();
        let mut received = vec![0u8; frame.data.len()];
        peer.read_exact(&mut received).unwrap();
        assert_eq!(received, frame.data);
    }

    #[test]
    fn test_send_buffer_sized_from_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let mut forwarder = FrameForwarder::new(config(&dir));
        forwarder.set_geometry(VideoGeometry::new(64, 48));
        let _listener = UnixListener::bind(forwarder.endpoint()).unwrap();

        forwarder.forward(&frame(64, 48, 7)).unwrap();
        assert_eq!(forwarder.send_buffer_size(), Some(64 * 48 * 3 / 2));
    }

    #[test]
    fn test_frames_written_back_to_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut forwarder = FrameForwarder::new(config(&dir));
        let listener = UnixListener::bind(forwarder.endpoint()).unwrap();

        forwarder.forward(&frame(8, 8, 1)).unwrap();
        forwarder.forward(&frame(8, 8, 2)).unwrap();
        assert_eq!(forwarder.connect_attempts(), 1);

        let (mut peer, _) = listener.accept().unwrap();
        let mut received = vec![0u8; 2 * 96];
        peer.read_exact(&mut received).unwrap();
        assert!(received[..96].iter().all(|&b| b == 1));
        assert!(received[96..].iter().all(|&b| b == 2));
    }

    #[test]
    fn test_write_failure_tears_down_channel() {
        let dir = tempfile::tempdir().unwrap();
        let mut forwarder = FrameForwarder::new(config(&dir));
        let listener = UnixListener::bind(forwarder.endpoint()).unwrap();
        let frame = frame(8, 8, 3);

        forwarder.forward(&frame).unwrap();
        let (peer, _) = listener.accept().unwrap();
        drop(peer);

        assert!(matches!(forwarder.forward(&frame), Err(ForwardError::Write(_))));
        assert!(!forwarder.is_connected());
        assert_eq!(forwarder.send_buffer_size(), None);

        // The next frame starts a brand new connection
        forwarder.forward(&frame).unwrap();
        assert_eq!(forwarder.connect_attempts(), 2);
        assert!(forwarder.is_connected());
    }

    #[test]
    fn test_closed_channel_stays_closed() {
        let dir = tempfile::tempdir().unwrap();
        let mut forwarder = FrameForwarder::new(config(&dir));
        let _listener = UnixListener::bind(forwarder.endpoint()).unwrap();
        let frame = frame(8, 8, 4);

        forwarder.forward(&frame).unwrap();
        forwarder.closer().close();

        assert!(matches!(forwarder.forward(&frame), Err(ForwardError::Closed)));
        assert!(matches!(forwarder.forward(&frame), Err(ForwardError::Closed)));
        assert_eq!(forwarder.connect_attempts(), 1);
        assert!(!forwarder.is_connected());
    }
}

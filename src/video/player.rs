//! Background-threaded video player
//!
//! Wires a `DecodeLoop` to the renderer's staging slot and exposes
//! start/stop. The decode thread stages every packed frame in a `FrameSlot`;
//! the render callback picks up whatever is newest at its own cadence.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::network::{ForwardConfig, FrameForwarder};
use crate::telemetry::PipelineStats;

use super::decode_loop::{DecodeConfig, DecodeLoop, FrameSink, LoopState};
use super::frame::{PackedFrame, VideoGeometry};
use super::source::{MediaBackend, OutputFormat, SourceError};

/// Errors raised by the player coordinator
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("Playback already running for {0}")]
    AlreadyRunning(String),
}

/// Latest-frame-wins handoff between the decode thread and the renderer
///
/// `update` overwrites the staged frame; the lock is only held for the swap.
#[derive(Default)]
pub struct FrameSlot {
    /// The latest staged frame (if any)
    current_frame: Mutex<Option<PackedFrame>>,
    /// Whether a frame was staged since the last pickup
    new_frame_available: AtomicBool,
    /// Number of frames staged so far
    staged: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a frame for the next draw, replacing any frame not yet drawn
    pub fn update(&self, frame: PackedFrame) {
        if let Ok(mut current) = self.current_frame.lock() {
            *current = Some(frame);
            self.new_frame_available.store(true, Ordering::Release);
            self.staged.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take the staged frame if one arrived since the last call (non-blocking)
    pub fn take_frame(&self) -> Option<PackedFrame> {
        if self.new_frame_available.swap(false, Ordering::AcqRel) {
            if let Ok(mut current) = self.current_frame.lock() {
                return current.take();
            }
        }
        None
    }

    /// Check if a new frame is available (without taking it)
    pub fn has_new_frame(&self) -> bool {
        self.new_frame_available.load(Ordering::Acquire)
    }

    pub fn staged_count(&self) -> u64 {
        self.staged.load(Ordering::Relaxed)
    }
}

/// Records the "playback finished" notification
#[derive(Default)]
struct FinishState {
    finished: AtomicBool,
    count: AtomicU64,
}

/// Sink installed by the player: stages frames for the renderer
struct PlayerSink {
    slot: Arc<FrameSlot>,
    finish: Arc<FinishState>,
}

impl FrameSink for PlayerSink {
    fn on_frame(&self, frame: &PackedFrame) {
        self.slot.update(frame.clone());
    }

    fn on_finished(&self) {
        self.finish.count.fetch_add(1, Ordering::AcqRel);
        self.finish.finished.store(true, Ordering::Release);
    }
}

/// Player configuration
#[derive(Debug, Clone, Default)]
pub struct PlayerConfig {
    pub decode: DecodeConfig,
    pub forward: ForwardConfig,
}

/// Coordinates one decode loop with the renderer's frame slot
pub struct VideoPlayer<B: MediaBackend> {
    backend: B,
    config: PlayerConfig,
    slot: Arc<FrameSlot>,
    stats: Arc<PipelineStats>,
    finish: Arc<FinishState>,
    decode_loop: Option<DecodeLoop>,
    path: Option<PathBuf>,
}

impl<B: MediaBackend> VideoPlayer<B> {
    pub fn new(backend: B, config: PlayerConfig) -> Self {
        Self {
            backend,
            config,
            slot: Arc::new(FrameSlot::new()),
            stats: Arc::new(PipelineStats::new()),
            finish: Arc::new(FinishState::default()),
            decode_loop: None,
            path: None,
        }
    }

    /// Open `path` and start decoding on a background thread
    pub fn start(&mut self, path: &Path) -> Result<(), PlayerError> {
        if let Some(decode_loop) = &self.decode_loop {
            if decode_loop.state() != LoopState::Finished {
                return Err(PlayerError::AlreadyRunning(
                    self.path.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
                ));
            }
        }
        self.stop();

        let sink = Arc::new(PlayerSink {
            slot: Arc::clone(&self.slot),
            finish: Arc::clone(&self.finish),
        });
        self.finish.finished.store(false, Ordering::Release);

        let decode_loop = DecodeLoop::start(
            &self.backend,
            path,
            self.config.decode,
            FrameForwarder::new(self.config.forward.clone()),
            sink,
            Arc::clone(&self.stats),
        )?;

        tracing::info!(
            "VideoPlayer: {} {} forwarding to {}",
            path.display(),
            decode_loop.geometry(),
            self.config.forward.endpoint.display()
        );

        self.decode_loop = Some(decode_loop);
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Stop decoding and wait for the decode thread to exit
    pub fn stop(&mut self) {
        if let Some(mut decode_loop) = self.decode_loop.take() {
            decode_loop.request_stop();
            decode_loop.join();
            tracing::info!("VideoPlayer: stopped after {} frame(s)", self.slot.staged_count());
        }
    }

    pub fn is_running(&self) -> bool {
        self.decode_loop
            .as_ref()
            .is_some_and(|decode_loop| decode_loop.state() == LoopState::Running)
    }

    /// Whether the last decode loop signalled "playback finished"
    pub fn is_finished(&self) -> bool {
        self.finish.finished.load(Ordering::Acquire)
    }

    /// Total number of "playback finished" notifications received
    pub fn finish_count(&self) -> u64 {
        self.finish.count.load(Ordering::Acquire)
    }

    pub fn geometry(&self) -> Option<VideoGeometry> {
        self.decode_loop.as_ref().map(DecodeLoop::geometry)
    }

    pub fn output_format(&self) -> Option<OutputFormat> {
        self.decode_loop.as_ref().and_then(DecodeLoop::output_format)
    }

    pub fn frame_slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.slot)
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl<B: MediaBackend> Drop for VideoPlayer<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::SocketKind;
    use crate::video::testing::ScriptedBackend;
    use std::io::Read;
    use std::os::unix::net::UnixListener;
    use std::time::{Duration, Instant};

    fn config(dir: &tempfile::TempDir, loop_playback: bool) -> PlayerConfig {
        PlayerConfig {
            decode: DecodeConfig {
                loop_playback,
                ..DecodeConfig::default()
            },
            forward: ForwardConfig {
                endpoint: dir.path().join("video0"),
                kind: SocketKind::Stream,
            },
        }
    }

    fn frame(value: u8, pts_us: i64) -> PackedFrame {
        let geometry = VideoGeometry::new(4, 2);
        PackedFrame::new(vec![value; geometry.packed_len()], geometry, pts_us)
    }

    #[test]
    fn test_frame_slot_latest_wins() {
        let slot = FrameSlot::new();
        assert!(slot.take_frame().is_none());

        slot.update(frame(1, 0));
        slot.update(frame(2, 40));
        assert!(slot.has_new_frame());

        let taken = slot.take_frame().unwrap();
        assert_eq!(taken.pts_us, 40);
        assert!(slot.take_frame().is_none());
        assert_eq!(slot.staged_count(), 2);
    }

    #[test]
    fn test_plays_to_end_without_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut player = VideoPlayer::new(ScriptedBackend::new(3), config(&dir, false));
        player.start(Path::new("clip.mp4")).unwrap();
        assert_eq!(player.geometry(), Some(VideoGeometry::new(16, 8)));

        let deadline = Instant::now() + Duration::from_secs(5);
        while !player.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }

        assert!(player.is_finished());
        assert_eq!(player.finish_count(), 1);
        assert_eq!(player.frame_slot().staged_count(), 3);
        assert_eq!(player.frame_slot().take_frame().map(|f| f.pts_us), Some(66_666));

        player.stop();
        assert_eq!(player.finish_count(), 1);
    }

    #[test]
    fn test_stop_reports_finished_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut player = VideoPlayer::new(ScriptedBackend::new(2), config(&dir, true));
        player.start(Path::new("clip.mp4")).unwrap();

        let slot = player.frame_slot();
        let deadline = Instant::now() + Duration::from_secs(5);
        while slot.staged_count() < 5 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }

        player.stop();
        let staged = slot.staged_count();
        let rendered = player.stats().snapshot().frames_rendered;
        assert_eq!(player.finish_count(), 1);
        assert!(!player.is_running());

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(slot.staged_count(), staged);
        assert_eq!(player.stats().snapshot().frames_rendered, rendered);
    }

    #[test]
    fn test_frames_reach_forward_consumer() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, false);
        let listener = UnixListener::bind(&config.forward.endpoint).unwrap();

        let mut player = VideoPlayer::new(ScriptedBackend::new(2), config);
        player.start(Path::new("clip.mp4")).unwrap();

        let (mut peer, _) = listener.accept().unwrap();
        let frame_len = VideoGeometry::new(16, 8).packed_len();
        let mut received = vec![0u8; 2 * frame_len];
        peer.read_exact(&mut received).unwrap();

        // Y plane of the scripted image is mid-gray
        assert!(received[..16 * 8].iter().all(|&b| b == 128));
        assert!(received[frame_len..frame_len + 16 * 8].iter().all(|&b| b == 128));
        player.stop();
        assert_eq!(player.stats().snapshot().frames_forwarded, 2);
    }

    #[test]
    fn test_open_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let mut player = VideoPlayer::new(ScriptedBackend::new(2).audio_only(), config(&dir, true));
        let result = player.start(Path::new("song.m4a"));

        assert!(matches!(result, Err(PlayerError::Source(SourceError::NoVideoTrack(_)))));
        assert!(!player.is_running());
        assert_eq!(player.finish_count(), 0);
    }
}

//! The extract → decode → drain loop
//!
//! Runs on a dedicated thread. Each iteration feeds at most one access unit
//! to the decoder and drains at most one output buffer. A decoded image is
//! repacked, its buffer is released, and the packed frame is handed first to
//! the forwarder and then to the frame sink. At end of stream the source is
//! rewound and the decoder flushed, unless looping is disabled.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::network::{ForwardCloser, ForwardError, FrameForwarder};
use crate::telemetry::PipelineStats;

use super::frame::{PackedFrame, VideoGeometry};
use super::repack::repack;
use super::source::{
    select_video_track, BufferFlags, HardwareDecoder, MediaBackend, MediaSource, OutputBuffer, OutputEvent,
    OutputFormat, SeekMode, SourceError,
};

/// Default bounded wait for decoder queue operations
pub const DEFAULT_QUEUE_TIMEOUT: Duration = Duration::from_millis(10);

/// Receives every packed frame the loop produces
///
/// Called on the decode thread. Implementations must return quickly; the
/// loop does not start its next iteration until `on_frame` returns.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: &PackedFrame);

    /// Called exactly once when the loop exits
    fn on_finished(&self);
}

/// Decode loop settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeConfig {
    /// Restart from the beginning at end of stream
    pub loop_playback: bool,
    pub input_timeout: Duration,
    pub output_timeout: Duration,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            loop_playback: true,
            input_timeout: DEFAULT_QUEUE_TIMEOUT,
            output_timeout: DEFAULT_QUEUE_TIMEOUT,
        }
    }
}

/// Lifecycle of a decode loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Finished = 3,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LoopState::Running,
            2 => LoopState::Stopping,
            3 => LoopState::Finished,
            _ => LoopState::Idle,
        }
    }
}

/// State shared between the loop thread and its controllers
struct LoopShared {
    state: AtomicU8,
    stop: AtomicBool,
    output_format: Mutex<Option<OutputFormat>>,
}

impl LoopShared {
    fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: LoopState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Requests a cooperative stop from any thread
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<LoopShared>,
    closer: ForwardCloser,
}

impl StopHandle {
    /// Set the stop flag and shut the forward channel
    ///
    /// The loop exits at its next iteration boundary.
    pub fn request_stop(&self) {
        if !self.shared.stop.swap(true, Ordering::AcqRel) {
            let _ = self.shared.state.compare_exchange(
                LoopState::Running as u8,
                LoopState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            tracing::debug!("Decode loop stop requested");
        }
        self.closer.close();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.shared.stop_requested()
    }
}

/// Handle to a running decode loop thread
pub struct DecodeLoop {
    shared: Arc<LoopShared>,
    stop: StopHandle,
    geometry: VideoGeometry,
    mime: String,
    thread_handle: Option<JoinHandle<()>>,
}

impl DecodeLoop {
    /// Open the source, pick its first video track and start decoding
    ///
    /// Source and decoder are created on the calling thread so that open
    /// failures are returned here instead of surfacing on the loop thread.
    pub fn start<B: MediaBackend>(
        backend: &B,
        path: &Path,
        config: DecodeConfig,
        mut forwarder: FrameForwarder,
        sink: Arc<dyn FrameSink>,
        stats: Arc<PipelineStats>,
    ) -> Result<Self, SourceError> {
        let mut source = backend.open_source(path)?;
        let (track_index, format) =
            select_video_track(&source).ok_or_else(|| SourceError::NoVideoTrack(path.display().to_string()))?;
        source.select_track(track_index)?;
        let decoder = backend.create_decoder(&source, track_index, &format)?;

        let geometry = format.geometry();
        forwarder.set_geometry(geometry);

        tracing::info!(
            "Decoding {} track {} ({}, {})",
            path.display(),
            track_index,
            format.mime,
            geometry
        );

        let shared = Arc::new(LoopShared {
            state: AtomicU8::new(LoopState::Running as u8),
            stop: AtomicBool::new(false),
            output_format: Mutex::new(None),
        });
        let stop = StopHandle {
            shared: Arc::clone(&shared),
            closer: forwarder.closer(),
        };

        let worker = Worker {
            source,
            decoder,
            track_index,
            input_done: false,
            config,
            forwarder,
            sink,
            stats,
            shared: Arc::clone(&shared),
        };

        let thread_handle = thread::Builder::new()
            .name("decode-loop".to_string())
            .spawn(move || worker.run())
            .map_err(|e| SourceError::OpenFailed {
                path: path.display().to_string(),
                reason: format!("Failed to spawn decode thread: {}", e),
            })?;

        Ok(Self {
            shared,
            stop,
            geometry,
            mime: format.mime,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    /// Wait for the loop thread to exit
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                tracing::warn!("Failed to join decode thread: {:?}", e);
            }
        }
    }

    pub fn state(&self) -> LoopState {
        self.shared.state()
    }

    /// Geometry of the selected video track
    pub fn geometry(&self) -> VideoGeometry {
        self.geometry
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Last output format reported by the decoder
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.shared.output_format.lock().ok().and_then(|format| format.clone())
    }
}

impl Drop for DecodeLoop {
    fn drop(&mut self) {
        self.request_stop();
        self.join();
    }
}

enum Step {
    Continue,
    Finished,
}

/// Everything the loop thread owns
struct Worker<S, D> {
    source: S,
    decoder: D,
    track_index: usize,
    /// End of stream was queued for the current pass
    input_done: bool,
    config: DecodeConfig,
    forwarder: FrameForwarder,
    sink: Arc<dyn FrameSink>,
    stats: Arc<PipelineStats>,
    shared: Arc<LoopShared>,
}

impl<S: MediaSource, D: HardwareDecoder> Worker<S, D> {
    fn run(mut self) {
        while !self.shared.stop_requested() {
            if let Step::Finished = self.step() {
                break;
            }
        }

        self.forwarder.close();
        self.shared.set_state(LoopState::Finished);
        tracing::info!("Playback finished");
        self.sink.on_finished();
    }

    fn step(&mut self) -> Step {
        if !self.input_done {
            self.feed_input();
        }

        match self.decoder.dequeue_output(self.config.output_timeout) {
            Ok(OutputEvent::TryAgainLater) => Step::Continue,
            Ok(OutputEvent::FormatChanged(format)) => {
                tracing::debug!(
                    "Decoder output format changed: {} {}x{}",
                    format.pixel_format,
                    format.width,
                    format.height
                );
                self.stats.record_format_change();
                if let Ok(mut current) = self.shared.output_format.lock() {
                    *current = Some(format);
                }
                Step::Continue
            }
            Ok(OutputEvent::Buffer(buffer)) => self.drain(buffer),
            Err(e) => {
                tracing::warn!("Failed to dequeue decoder output: {}", e);
                Step::Continue
            }
        }
    }

    /// Submit the next access unit, or end of stream once the source is dry
    fn feed_input(&mut self) {
        let Some(slot) = self.decoder.dequeue_input(self.config.input_timeout) else {
            return;
        };

        let sample = match self.source.read_sample() {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!("Failed to read sample, ending pass: {}", e);
                None
            }
        };

        match sample {
            Some(unit) => {
                if unit.track_index != self.track_index {
                    tracing::warn!(
                        "Sample from track {} while track {} is selected",
                        unit.track_index,
                        self.track_index
                    );
                }
                if let Err(e) = self
                    .decoder
                    .queue_input(slot, &unit.data, unit.pts_us, BufferFlags::NONE)
                {
                    tracing::warn!("Failed to queue access unit at {}us: {}", unit.pts_us, e);
                }
                self.source.advance();
            }
            None => {
                if let Err(e) = self.decoder.queue_input(slot, &[], 0, BufferFlags::END_OF_STREAM) {
                    tracing::warn!("Failed to queue end of stream: {}", e);
                }
                self.input_done = true;
            }
        }
    }

    fn drain(&mut self, buffer: OutputBuffer) -> Step {
        if buffer.size > 0 {
            self.stats.record_decoded();
            let packed = self.decoder.output_image(buffer.index).map(|image| repack(&image));
            self.decoder.release_output(buffer.index, false);

            match packed {
                Some(Ok(frame)) => {
                    self.stats.record_repacked();
                    self.fan_out(&frame);
                }
                Some(Err(e)) => {
                    tracing::warn!("Skipping frame at {}us: {}", buffer.pts_us, e);
                    self.stats.record_repack_failure();
                }
                None => {
                    tracing::warn!("No image for output buffer {}", buffer.index);
                    self.stats.record_repack_failure();
                }
            }
        } else {
            self.decoder.release_output(buffer.index, false);
        }

        if !buffer.flags.end_of_stream {
            return Step::Continue;
        }
        if !self.config.loop_playback || self.shared.stop_requested() {
            return Step::Finished;
        }
        self.restart()
    }

    /// Forward first, then render; a failed forward never skips rendering
    fn fan_out(&mut self, frame: &PackedFrame) {
        if self.shared.stop_requested() {
            return;
        }

        match self.forwarder.forward(frame) {
            Ok(()) => self.stats.record_forward(true),
            Err(ForwardError::Closed) => {
                self.stats.record_forward(false);
                return;
            }
            Err(e) => {
                tracing::debug!("Frame at {}us not forwarded: {}", frame.pts_us, e);
                self.stats.record_forward(false);
            }
        }

        if self.shared.stop_requested() {
            return;
        }
        self.sink.on_frame(frame);
        self.stats.record_rendered();
    }

    fn restart(&mut self) -> Step {
        if let Err(e) = self.source.seek_to(0, SeekMode::ClosestSync) {
            tracing::error!("Failed to rewind source for looping: {}", e);
            return Step::Finished;
        }
        self.decoder.flush();
        self.input_done = false;
        self.stats.record_loop_restart();
        tracing::debug!("End of stream, looping");
        Step::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ForwardConfig, SocketKind};
    use crate::video::testing::{RecordingSink, ScriptedBackend};
    use std::time::Instant;

    fn forwarder(dir: &tempfile::TempDir) -> FrameForwarder {
        FrameForwarder::new(ForwardConfig {
            endpoint: dir.path().join("video0"),
            kind: SocketKind::Stream,
        })
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    fn no_loop() -> DecodeConfig {
        DecodeConfig {
            loop_playback: false,
            ..DecodeConfig::default()
        }
    }

    #[test]
    fn test_loops_after_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(2);
        let sink = Arc::new(RecordingSink::default());
        let stats = Arc::new(PipelineStats::new());

        let mut decode_loop = DecodeLoop::start(
            &backend,
            Path::new("clip.mp4"),
            DecodeConfig::default(),
            forwarder(&dir),
            sink.clone(),
            stats.clone(),
        )
        .unwrap();

        assert!(wait_until(|| backend.log.seeks() >= 2));
        decode_loop.request_stop();
        decode_loop.join();

        assert!(backend.log.flushes() >= 2);
        assert!(sink.frame_count() >= 4);
        assert!(stats.snapshot().loop_restarts >= 2);
        assert_eq!(sink.finished_count(), 1);
        assert_eq!(decode_loop.state(), LoopState::Finished);
    }

    #[test]
    fn test_end_of_stream_without_loop() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(3);
        let sink = Arc::new(RecordingSink::default());
        let stats = Arc::new(PipelineStats::new());

        let mut decode_loop = DecodeLoop::start(
            &backend,
            Path::new("clip.mp4"),
            no_loop(),
            forwarder(&dir),
            sink.clone(),
            stats.clone(),
        )
        .unwrap();
        decode_loop.join();

        assert_eq!(sink.frame_count(), 3);
        assert_eq!(sink.finished_count(), 1);
        assert_eq!(backend.log.seeks(), 0);
        assert_eq!(decode_loop.state(), LoopState::Finished);
        assert_eq!(decode_loop.geometry(), VideoGeometry::new(16, 8));
        assert_eq!(decode_loop.output_format(), Some(backend.output_format()));
        assert_eq!(stats.snapshot().format_changes, 1);

        // Timestamps come through in order
        let pts = sink.timestamps();
        assert_eq!(pts, vec![0, 33_333, 66_666]);
    }

    #[test]
    fn test_stop_from_sink_ends_fan_out() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(4);
        let sink = Arc::new(RecordingSink::stopping_after(3));
        let stats = Arc::new(PipelineStats::new());

        let mut decode_loop = DecodeLoop::start(
            &backend,
            Path::new("clip.mp4"),
            DecodeConfig::default(),
            forwarder(&dir),
            sink.clone(),
            stats.clone(),
        )
        .unwrap();
        sink.set_stop_handle(decode_loop.stop_handle());
        decode_loop.join();

        assert_eq!(sink.frame_count(), 3);
        assert_eq!(sink.finished_count(), 1);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.forward_attempts, 3);
        assert_eq!(snapshot.frames_rendered, 3);
    }

    #[test]
    fn test_two_plane_images_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(2).with_plane_count(2);
        let sink = Arc::new(RecordingSink::default());
        let stats = Arc::new(PipelineStats::new());

        let mut decode_loop = DecodeLoop::start(
            &backend,
            Path::new("clip.mp4"),
            no_loop(),
            forwarder(&dir),
            sink.clone(),
            stats.clone(),
        )
        .unwrap();
        decode_loop.join();

        let snapshot = stats.snapshot();
        assert_eq!(sink.frame_count(), 0);
        assert_eq!(snapshot.frames_decoded, 2);
        assert_eq!(snapshot.repack_failures, 2);
        assert_eq!(snapshot.forward_attempts, 0);
        // Every buffer went back to the decoder and the pass still completed
        assert_eq!(backend.log.releases(), 3);
        assert_eq!(sink.finished_count(), 1);
    }

    #[test]
    fn test_empty_crop_reaches_neither_sink() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(2).with_empty_crop();
        let sink = Arc::new(RecordingSink::default());
        let stats = Arc::new(PipelineStats::new());

        let mut decode_loop = DecodeLoop::start(
            &backend,
            Path::new("clip.mp4"),
            no_loop(),
            forwarder(&dir),
            sink.clone(),
            stats.clone(),
        )
        .unwrap();
        decode_loop.join();

        let snapshot = stats.snapshot();
        assert_eq!(sink.frame_count(), 0);
        assert_eq!(snapshot.repack_failures, 2);
        assert_eq!(snapshot.forward_attempts, 0);
        assert_eq!(sink.finished_count(), 1);
    }

    #[test]
    fn test_forward_happens_before_render() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(3);
        let stats = Arc::new(PipelineStats::new());
        let sink = Arc::new(RecordingSink::with_stats(stats.clone()));

        let mut decode_loop = DecodeLoop::start(
            &backend,
            Path::new("clip.mp4"),
            no_loop(),
            forwarder(&dir),
            sink.clone(),
            stats.clone(),
        )
        .unwrap();
        decode_loop.join();

        // No listener: each forward fails, yet every frame is still rendered
        assert_eq!(sink.forward_attempts_seen(), vec![1, 2, 3]);
        assert_eq!(stats.snapshot().forward_failures, 3);
    }

    #[test]
    fn test_wrong_track_samples_still_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(2).with_wrong_track();
        let sink = Arc::new(RecordingSink::default());

        let mut decode_loop = DecodeLoop::start(
            &backend,
            Path::new("clip.mp4"),
            no_loop(),
            forwarder(&dir),
            sink.clone(),
            Arc::new(PipelineStats::new()),
        )
        .unwrap();
        decode_loop.join();

        assert_eq!(sink.frame_count(), 2);
    }

    #[test]
    fn test_missing_video_track_fails_start() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(2).audio_only();
        let sink = Arc::new(RecordingSink::default());

        let result = DecodeLoop::start(
            &backend,
            Path::new("song.m4a"),
            DecodeConfig::default(),
            forwarder(&dir),
            sink.clone(),
            Arc::new(PipelineStats::new()),
        );

        assert!(matches!(result, Err(SourceError::NoVideoTrack(_))));
        assert_eq!(sink.finished_count(), 0);
    }
}

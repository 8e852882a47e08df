//! Scripted media backend and recording sink for pipeline tests

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use crate::telemetry::PipelineStats;

use super::decode_loop::{FrameSink, StopHandle};
use super::frame::{PackedFrame, VideoGeometry};
use super::image::{CropRect, DecodedImage, ImageFormat, PlaneView};
use super::source::{
    BufferFlags, DecoderError, EncodedUnit, HardwareDecoder, InputSlot, MediaBackend, MediaSource,
    OutputBuffer, OutputEvent, OutputFormat, SeekMode, SourceError, TrackFormat,
};

const WIDTH: u32 = 16;
const HEIGHT: u32 = 8;
const FRAME_INTERVAL_US: i64 = 33_333;

/// Calls observed on the scripted source and decoder
#[derive(Debug, Default)]
pub struct CallLog {
    seeks: AtomicUsize,
    flushes: AtomicUsize,
    releases: AtomicUsize,
}

impl CallLog {
    pub fn seeks(&self) -> usize {
        self.seeks.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

/// Backend producing a fixed number of 16x8 frames per pass
pub struct ScriptedBackend {
    units: usize,
    plane_count: usize,
    empty_crop: bool,
    wrong_track: bool,
    audio_only: bool,
    pub log: Arc<CallLog>,
}

impl ScriptedBackend {
    pub fn new(units: usize) -> Self {
        Self {
            units,
            plane_count: 3,
            empty_crop: false,
            wrong_track: false,
            audio_only: false,
            log: Arc::new(CallLog::default()),
        }
    }

    pub fn with_plane_count(mut self, plane_count: usize) -> Self {
        self.plane_count = plane_count;
        self
    }

    /// Images report a zero-width crop rectangle
    pub fn with_empty_crop(mut self) -> Self {
        self.empty_crop = true;
        self
    }

    /// Samples report track 1 while track 0 is the video track
    pub fn with_wrong_track(mut self) -> Self {
        self.wrong_track = true;
        self
    }

    pub fn audio_only(mut self) -> Self {
        self.audio_only = true;
        self
    }

    pub fn output_format(&self) -> OutputFormat {
        OutputFormat {
            pixel_format: "yuv420p".to_string(),
            width: WIDTH,
            height: HEIGHT,
        }
    }
}

impl MediaBackend for ScriptedBackend {
    type Source = ScriptedSource;
    type Decoder = ScriptedDecoder;

    fn open_source(&self, _path: &Path) -> Result<ScriptedSource, SourceError> {
        let video = TrackFormat {
            mime: "video/avc".to_string(),
            width: WIDTH,
            height: HEIGHT,
        };
        let audio = TrackFormat {
            mime: "audio/mp4a-latm".to_string(),
            width: 0,
            height: 0,
        };
        let tracks = if self.audio_only { vec![audio] } else { vec![video, audio] };
        let track_index = usize::from(self.wrong_track);

        Ok(ScriptedSource {
            tracks,
            units: (0..self.units)
                .map(|i| EncodedUnit {
                    data: vec![i as u8; 4],
                    pts_us: i as i64 * FRAME_INTERVAL_US,
                    track_index,
                })
                .collect(),
            position: 0,
            log: Arc::clone(&self.log),
        })
    }

    fn create_decoder(
        &self,
        _source: &ScriptedSource,
        _track_index: usize,
        _format: &TrackFormat,
    ) -> Result<ScriptedDecoder, SourceError> {
        let geometry = VideoGeometry::new(WIDTH, HEIGHT);
        Ok(ScriptedDecoder {
            queue: VecDeque::new(),
            held: None,
            announced: false,
            format: self.output_format(),
            planes: vec![
                vec![128; geometry.luma_len()],
                vec![64; geometry.chroma_len()],
                vec![192; geometry.chroma_len()],
            ],
            plane_count: self.plane_count,
            empty_crop: self.empty_crop,
            log: Arc::clone(&self.log),
        })
    }
}

pub struct ScriptedSource {
    tracks: Vec<TrackFormat>,
    units: Vec<EncodedUnit>,
    position: usize,
    log: Arc<CallLog>,
}

impl MediaSource for ScriptedSource {
    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, index: usize) -> Option<TrackFormat> {
        self.tracks.get(index).cloned()
    }

    fn select_track(&mut self, index: usize) -> Result<(), SourceError> {
        if index >= self.tracks.len() {
            return Err(SourceError::InvalidTrack(index));
        }
        Ok(())
    }

    fn read_sample(&mut self) -> Result<Option<EncodedUnit>, SourceError> {
        Ok(self.units.get(self.position).cloned())
    }

    fn advance(&mut self) -> bool {
        self.position += 1;
        self.position < self.units.len()
    }

    fn seek_to(&mut self, _time_us: i64, _mode: SeekMode) -> Result<(), SourceError> {
        self.position = 0;
        self.log.seeks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Decoder that emits one frame per queued unit, one iteration behind
pub struct ScriptedDecoder {
    queue: VecDeque<(i64, bool)>,
    held: Option<i64>,
    announced: bool,
    format: OutputFormat,
    planes: Vec<Vec<u8>>,
    plane_count: usize,
    empty_crop: bool,
    log: Arc<CallLog>,
}

impl HardwareDecoder for ScriptedDecoder {
    fn dequeue_input(&mut self, _timeout: Duration) -> Option<InputSlot> {
        Some(InputSlot(0))
    }

    fn queue_input(
        &mut self,
        _slot: InputSlot,
        _data: &[u8],
        pts_us: i64,
        flags: BufferFlags,
    ) -> Result<(), DecoderError> {
        self.queue.push_back((pts_us, flags.end_of_stream));
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> Result<OutputEvent, DecoderError> {
        if self.held.is_some() {
            return Err(DecoderError::InvalidOutputBuffer(0));
        }
        if !self.announced && !self.queue.is_empty() {
            self.announced = true;
            return Ok(OutputEvent::FormatChanged(self.format.clone()));
        }

        let Some((pts_us, end_of_stream)) = self.queue.pop_front() else {
            return Ok(OutputEvent::TryAgainLater);
        };
        self.held = Some(pts_us);
        let (size, flags) = if end_of_stream {
            (0, BufferFlags::END_OF_STREAM)
        } else {
            (self.planes.iter().map(Vec::len).sum(), BufferFlags::NONE)
        };
        Ok(OutputEvent::Buffer(OutputBuffer {
            index: 0,
            size,
            pts_us,
            flags,
        }))
    }

    fn output_image(&mut self, index: usize) -> Option<DecodedImage<'_>> {
        let pts_us = self.held.filter(|_| index == 0)?;
        Some(DecodedImage {
            format: ImageFormat::Yuv420Flexible,
            crop: CropRect::full(if self.empty_crop { 0 } else { WIDTH }, HEIGHT),
            planes: self
                .planes
                .iter()
                .enumerate()
                .take(self.plane_count)
                .map(|(i, data)| PlaneView::new(data, (if i == 0 { WIDTH } else { WIDTH / 2 }) as usize, 1))
                .collect(),
            pts_us,
        })
    }

    fn release_output(&mut self, _index: usize, _rendered: bool) {
        self.held = None;
        self.log.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn flush(&mut self) {
        self.queue.clear();
        self.held = None;
        self.log.flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn output_format(&self) -> Option<OutputFormat> {
        self.announced.then(|| self.format.clone())
    }
}

/// Sink recording what the decode loop delivers
#[derive(Default)]
pub struct RecordingSink {
    timestamps: Mutex<Vec<i64>>,
    finished: AtomicUsize,
    stop_after: Option<usize>,
    stop_handle: OnceLock<StopHandle>,
    stats: Option<Arc<PipelineStats>>,
    forward_attempts_seen: Mutex<Vec<u64>>,
}

impl RecordingSink {
    /// Requests a stop from inside the sink once `frames` frames arrived
    pub fn stopping_after(frames: usize) -> Self {
        Self {
            stop_after: Some(frames),
            ..Self::default()
        }
    }

    /// Samples the forward counter on every frame
    pub fn with_stats(stats: Arc<PipelineStats>) -> Self {
        Self {
            stats: Some(stats),
            ..Self::default()
        }
    }

    pub fn set_stop_handle(&self, handle: StopHandle) {
        let _ = self.stop_handle.set(handle);
    }

    pub fn frame_count(&self) -> usize {
        self.timestamps.lock().unwrap().len()
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.timestamps.lock().unwrap().clone()
    }

    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn forward_attempts_seen(&self) -> Vec<u64> {
        self.forward_attempts_seen.lock().unwrap().clone()
    }
}

impl FrameSink for RecordingSink {
    fn on_frame(&self, frame: &PackedFrame) {
        assert!(frame.is_valid());
        let count = {
            let mut timestamps = self.timestamps.lock().unwrap();
            timestamps.push(frame.pts_us);
            timestamps.len()
        };

        if let Some(stats) = &self.stats {
            self.forward_attempts_seen
                .lock()
                .unwrap()
                .push(stats.snapshot().forward_attempts);
        }

        if self.stop_after == Some(count) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while self.stop_handle.get().is_none() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
            if let Some(handle) = self.stop_handle.get() {
                handle.request_stop();
            }
        }
    }

    fn on_finished(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

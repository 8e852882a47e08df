//! Media source and hardware decoder boundaries
//!
//! The decode loop only talks to these traits. `decoder.rs` provides the
//! FFmpeg-backed implementation; tests provide scripted ones.

use std::path::Path;
use std::time::Duration;

use super::frame::VideoGeometry;
use super::image::DecodedImage;

/// Errors raised while opening a source or creating its decoder
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to open media source {path}: {reason}")]
    OpenFailed { path: String, reason: String },
    #[error("No video track found in {0}")]
    NoVideoTrack(String),
    #[error("Invalid track index {0}")]
    InvalidTrack(usize),
    #[error("Failed to create decoder for {mime}: {reason}")]
    DecoderCreationFailed { mime: String, reason: String },
    #[error("Seek failed: {0}")]
    SeekFailed(String),
    #[error("Failed to read sample: {0}")]
    ReadFailed(String),
}

/// Errors raised by the decoder's queues
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Input slot {0} is not available")]
    InvalidInputSlot(usize),
    #[error("Output buffer {0} is not available")]
    InvalidOutputBuffer(usize),
    #[error("Decoding failed: {0}")]
    DecodeFailed(String),
}

/// Format of one track in a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFormat {
    /// MIME type, e.g. `video/avc`
    pub mime: String,
    /// Pixel width (0 for non-video tracks)
    pub width: u32,
    /// Pixel height (0 for non-video tracks)
    pub height: u32,
}

impl TrackFormat {
    pub fn is_video(&self) -> bool {
        self.mime.starts_with("video/")
    }

    pub fn geometry(&self) -> VideoGeometry {
        VideoGeometry::new(self.width, self.height)
    }
}

/// One encoded access unit pulled from a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedUnit {
    pub data: Vec<u8>,
    /// Presentation timestamp in microseconds
    pub pts_us: i64,
    /// Track the unit belongs to
    pub track_index: usize,
}

/// How a seek resolves to a sync point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// Sync point at or before the requested time
    PreviousSync,
    /// Sync point at or after the requested time
    NextSync,
    /// Sync point nearest to the requested time
    ClosestSync,
}

/// A demuxed container opened from a local file
pub trait MediaSource {
    fn track_count(&self) -> usize;

    fn track_format(&self, index: usize) -> Option<TrackFormat>;

    /// Restrict `read_sample`/`advance` to one track
    fn select_track(&mut self, index: usize) -> Result<(), SourceError>;

    /// The current access unit, or `None` once the source is exhausted
    ///
    /// Does not move the read position; call `advance` for that.
    fn read_sample(&mut self) -> Result<Option<EncodedUnit>, SourceError>;

    /// Move to the next access unit. Returns false at end of stream.
    fn advance(&mut self) -> bool;

    fn seek_to(&mut self, time_us: i64, mode: SeekMode) -> Result<(), SourceError>;
}

/// Flags attached to decoder input and output buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferFlags {
    pub end_of_stream: bool,
}

impl BufferFlags {
    pub const NONE: BufferFlags = BufferFlags { end_of_stream: false };
    pub const END_OF_STREAM: BufferFlags = BufferFlags { end_of_stream: true };
}

/// Index of a free decoder input buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSlot(pub usize);

/// Metadata of a dequeued output buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputBuffer {
    pub index: usize,
    /// Payload size in bytes; zero for an empty (EOS-only) buffer
    pub size: usize,
    pub pts_us: i64,
    pub flags: BufferFlags,
}

/// The decoder's description of its output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat {
    pub pixel_format: String,
    pub width: u32,
    pub height: u32,
}

/// Result of polling the decoder's output queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// Nothing ready within the timeout
    TryAgainLater,
    /// The output format changed; no frame is attached
    FormatChanged(OutputFormat),
    /// A decoded buffer is ready and must be released
    Buffer(OutputBuffer),
}

/// A decoder driven through input and output queues
pub trait HardwareDecoder {
    /// Wait up to `timeout` for a free input slot
    fn dequeue_input(&mut self, timeout: Duration) -> Option<InputSlot>;

    /// Submit an encoded payload (empty with `END_OF_STREAM` to signal the end)
    fn queue_input(
        &mut self,
        slot: InputSlot,
        data: &[u8],
        pts_us: i64,
        flags: BufferFlags,
    ) -> Result<(), DecoderError>;

    /// Wait up to `timeout` for decoded output
    fn dequeue_output(&mut self, timeout: Duration) -> Result<OutputEvent, DecoderError>;

    /// Image view of a dequeued output buffer
    fn output_image(&mut self, index: usize) -> Option<DecodedImage<'_>>;

    /// Return an output buffer to the decoder
    fn release_output(&mut self, index: usize, rendered: bool);

    /// Discard all in-flight input and output without reconfiguring
    fn flush(&mut self);

    fn output_format(&self) -> Option<OutputFormat>;
}

/// Opens sources and creates matching decoders
pub trait MediaBackend {
    type Source: MediaSource + Send + 'static;
    type Decoder: HardwareDecoder + Send + 'static;

    fn open_source(&self, path: &Path) -> Result<Self::Source, SourceError>;

    /// Create a decoder configured for one track of an opened source
    fn create_decoder(
        &self,
        source: &Self::Source,
        track_index: usize,
        format: &TrackFormat,
    ) -> Result<Self::Decoder, SourceError>;
}

/// Index of the first track whose MIME type starts with `video/`
pub fn select_video_track<S: MediaSource + ?Sized>(source: &S) -> Option<(usize, TrackFormat)> {
    (0..source.track_count()).find_map(|index| {
        let format = source.track_format(index)?;
        tracing::debug!("Track {}: {}", index, format.mime);
        format.is_video().then_some((index, format))
    })
}

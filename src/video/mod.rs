//! Video decoding, repacking, and rendering module
//!
//! Decodes a local file with FFmpeg via the `ffmpeg-next` crate, repacks each
//! decoded image into contiguous planar YUV 4:2:0, and fans the packed frame
//! out to the frame forwarder and the GPU renderer.

mod decode_loop;
mod decoder;
mod frame;
mod image;
mod player;
mod renderer;
mod repack;
mod source;
mod texture;

#[cfg(test)]
mod testing;

pub use decode_loop::{DecodeConfig, DecodeLoop, FrameSink, LoopState, StopHandle, DEFAULT_QUEUE_TIMEOUT};
pub use decoder::{codec_mime, FfmpegBackend, FfmpegDecoder, FfmpegSource, HwAccelMethod};
pub use frame::{PackedFrame, VideoGeometry};
pub use image::{CropRect, DecodedImage, ImageFormat, PlaneView};
pub use player::{FrameSlot, PlayerConfig, PlayerError, VideoPlayer};
pub use renderer::{ShaderBuildError, Vertex, YuvRenderer, QUAD_VERTICES};
pub use repack::{repack, RepackError};
pub use source::{
    select_video_track, BufferFlags, DecoderError, EncodedUnit, HardwareDecoder, InputSlot, MediaBackend,
    MediaSource, OutputBuffer, OutputEvent, OutputFormat, SeekMode, SourceError, TrackFormat,
};
pub use texture::{plane_extents, PlaneTextures};

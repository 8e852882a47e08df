//! Relay Player Library
//!
//! Hardware-accelerated video playback that renders planar YUV frames on the
//! GPU and relays each decoded frame, raw, to a local socket consumer.

pub mod gpu_context;
pub mod network;
pub mod settings;
pub mod shaders;
pub mod telemetry;
pub mod video;

pub use gpu_context::GpuContext;
pub use network::{ForwardConfig, FrameForwarder, SocketKind};
pub use settings::PlayerSettings;
pub use video::{
    repack, DecodeConfig, DecodeLoop, FfmpegBackend, FrameSlot, PackedFrame, PlayerConfig, VideoGeometry,
    VideoPlayer, YuvRenderer,
};

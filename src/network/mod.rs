//! Network module for relaying decoded frames to a local consumer.
//!
//! Packed YUV 4:2:0 frames are written raw and back-to-back to a Unix-domain
//! socket; the consumer learns the geometry out of band.

pub mod forwarder;

pub use forwarder::{ForwardCloser, ForwardConfig, ForwardError, FrameForwarder, SocketKind, DEFAULT_ENDPOINT};

//! Packed video frame representation
//!
//! A `PackedFrame` is the unit handed from the decode loop to both sinks:
//! tightly packed planar YUV 4:2:0 with the Y plane first, followed by the
//! U (Cb) and V (Cr) planes. There is no padding and no stride gap.

use bytes::Bytes;

/// Pixel geometry of a video stream or frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VideoGeometry {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl VideoGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of a subsampled chroma plane (rounded up for odd sizes)
    pub fn chroma(&self) -> VideoGeometry {
        VideoGeometry {
            width: self.width.div_ceil(2),
            height: self.height.div_ceil(2),
        }
    }

    /// Number of bytes in the luma plane
    pub fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of bytes in one chroma plane
    pub fn chroma_len(&self) -> usize {
        self.chroma().luma_len()
    }

    /// Exact size of a packed 4:2:0 frame with this geometry
    pub fn packed_len(&self) -> usize {
        self.luma_len() + 2 * self.chroma_len()
    }

    /// Socket send buffer size for frames of this geometry (12 bits per pixel)
    pub fn send_buffer_len(&self) -> usize {
        self.width as usize * self.height as usize * 3 / 2
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for VideoGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A repacked frame ready for fan-out
///
/// Cloning is cheap: the pixel data is reference counted, so the renderer
/// and the forwarder can each hold the frame without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedFrame {
    /// Packed Y, U, V planes
    pub data: Bytes,
    /// Frame geometry (the decoder's crop rectangle size)
    pub geometry: VideoGeometry,
    /// Presentation timestamp in microseconds
    pub pts_us: i64,
}

impl PackedFrame {
    pub fn new(data: impl Into<Bytes>, geometry: VideoGeometry, pts_us: i64) -> Self {
        Self {
            data: data.into(),
            geometry,
            pts_us,
        }
    }

    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    /// Check that the data length matches the geometry exactly
    pub fn is_valid(&self) -> bool {
        self.data.len() == self.geometry.packed_len()
    }

    /// Luma plane bytes
    pub fn y_plane(&self) -> &[u8] {
        &self.data[..self.geometry.luma_len()]
    }

    /// Cb plane bytes
    pub fn u_plane(&self) -> &[u8] {
        let start = self.geometry.luma_len();
        &self.data[start..start + self.geometry.chroma_len()]
    }

    /// Cr plane bytes
    pub fn v_plane(&self) -> &[u8] {
        let start = self.geometry.luma_len() + self.geometry.chroma_len();
        &self.data[start..start + self.geometry.chroma_len()]
    }

    /// The three planes in upload order (Y, U, V)
    pub fn planes(&self) -> [&[u8]; 3] {
        [self.y_plane(), self.u_plane(), self.v_plane()]
    }
}

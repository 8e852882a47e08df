//! Decoder output images
//!
//! A `DecodedImage` borrows plane memory owned by the decoder. It is only
//! valid until the output buffer it came from is released.

/// Image formats a decoder may report for its output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageFormat {
    /// Flexible YUV 4:2:0 (planar or semi-planar, described by plane strides)
    Yuv420Flexible,
    /// Semi-planar 4:2:0 with interleaved V/U
    Nv21,
    /// Planar 4:2:0 with the V plane stored before U
    Yv12,
    /// Anything else, tagged with the decoder's own name for it
    Unsupported(String),
}

impl ImageFormat {
    /// Bits per pixel, averaged over the whole image
    pub fn bits_per_pixel(&self) -> Option<u32> {
        match self {
            ImageFormat::Yuv420Flexible | ImageFormat::Nv21 | ImageFormat::Yv12 => Some(12),
            ImageFormat::Unsupported(_) => None,
        }
    }

    pub fn is_yuv420(&self) -> bool {
        self.bits_per_pixel().is_some()
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageFormat::Yuv420Flexible => write!(f, "yuv420-flexible"),
            ImageFormat::Nv21 => write!(f, "nv21"),
            ImageFormat::Yv12 => write!(f, "yv12"),
            ImageFormat::Unsupported(name) => write!(f, "unsupported({})", name),
        }
    }
}

/// The valid region of an image inside its allocated planes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// A crop covering the whole image starting at the origin
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}

/// One plane of a decoded image
#[derive(Debug, Clone, Copy)]
pub struct PlaneView<'a> {
    /// Plane memory, starting at the plane's first allocated byte
    pub data: &'a [u8],
    /// Bytes between the starts of consecutive rows
    pub row_stride: usize,
    /// Bytes between consecutive samples within a row
    pub pixel_stride: usize,
}

impl<'a> PlaneView<'a> {
    pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }
}

/// A decoded picture as exposed by the decoder
#[derive(Debug, Clone)]
pub struct DecodedImage<'a> {
    pub format: ImageFormat,
    pub crop: CropRect,
    pub planes: Vec<PlaneView<'a>>,
    /// Presentation timestamp in microseconds
    pub pts_us: i64,
}

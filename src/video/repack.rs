//! Planar repacking of decoder output
//!
//! Converts a possibly padded, possibly interleaved decoder image into a
//! `PackedFrame`: Y plane first, then U and V, no stride gaps.

use super::frame::{PackedFrame, VideoGeometry};
use super::image::{DecodedImage, ImageFormat};

/// Errors that prevent a frame from being repacked
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepackError {
    #[error("YUV 4:2:0 images must have 3 planes, got {0}")]
    WrongPlaneCount(usize),
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(ImageFormat),
    #[error("Plane {plane} has an invalid pixel stride of {pixel_stride}")]
    InvalidPixelStride { plane: usize, pixel_stride: usize },
    #[error("Plane {plane} ends before row {row} of the crop rectangle")]
    PlaneTooShort { plane: usize, row: usize },
    #[error("Crop rectangle is empty ({width}x{height})")]
    EmptyCrop { width: u32, height: u32 },
}

/// Repack a decoded image into a contiguous planar 4:2:0 buffer
///
/// Plane 0 is read at full resolution, planes 1 and 2 at half resolution in
/// both directions (odd sizes round up). Rows whose pixel stride equals the
/// sample size are copied in bulk; interleaved rows are gathered sample by
/// sample from a single bounds-checked row slice.
pub fn repack(image: &DecodedImage<'_>) -> Result<PackedFrame, RepackError> {
    let bits_per_pixel = image
        .format
        .bits_per_pixel()
        .ok_or_else(|| RepackError::UnsupportedFormat(image.format.clone()))?;
    if image.planes.len() != 3 {
        return Err(RepackError::WrongPlaneCount(image.planes.len()));
    }

    let bytes_per_pixel = (bits_per_pixel / 8) as usize;
    let crop = image.crop;
    if crop.width == 0 || crop.height == 0 {
        return Err(RepackError::EmptyCrop {
            width: crop.width,
            height: crop.height,
        });
    }
    let geometry = VideoGeometry::new(crop.width, crop.height);
    let mut data = Vec::with_capacity(geometry.packed_len());

    for (index, plane) in image.planes.iter().enumerate() {
        let shift = if index == 0 { 0 } else { 1 };
        let width = ((crop.width + shift) >> shift) as usize;
        let height = ((crop.height + shift) >> shift) as usize;
        if plane.pixel_stride == 0 {
            return Err(RepackError::InvalidPixelStride {
                plane: index,
                pixel_stride: 0,
            });
        }

        let origin = plane.row_stride * (crop.top >> shift) as usize
            + plane.pixel_stride * (crop.left >> shift) as usize;

        for row in 0..height {
            let start = origin + row * plane.row_stride;
            if plane.pixel_stride == bytes_per_pixel {
                let length = width * bytes_per_pixel;
                let src = plane
                    .data
                    .get(start..start + length)
                    .ok_or(RepackError::PlaneTooShort { plane: index, row })?;
                data.extend_from_slice(src);
            } else {
                let length = (width - 1) * plane.pixel_stride + bytes_per_pixel;
                let row_bytes = plane
                    .data
                    .get(start..start + length)
                    .ok_or(RepackError::PlaneTooShort { plane: index, row })?;
                data.extend(row_bytes.iter().step_by(plane.pixel_stride).take(width));
            }
        }
    }

    debug_assert_eq!(data.len(), geometry.packed_len());
    Ok(PackedFrame::new(data, geometry, image.pts_us))
}

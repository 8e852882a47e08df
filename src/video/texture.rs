//! GPU textures for packed YUV frames
//!
//! One single-channel texture per plane: Y at full resolution, U and V at
//! half resolution. The set is keyed by geometry; a frame with a different
//! geometry replaces the whole set, otherwise frames are written in place.

use super::frame::{PackedFrame, VideoGeometry};

/// Texture format used for every plane
pub const PLANE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;

/// Width and height of the Y, U and V planes for a geometry
pub fn plane_extents(geometry: VideoGeometry) -> [(u32, u32); 3] {
    let chroma = geometry.chroma();
    [
        (geometry.width, geometry.height),
        (chroma.width, chroma.height),
        (chroma.width, chroma.height),
    ]
}

/// The three plane textures for one video geometry
pub struct PlaneTextures {
    geometry: VideoGeometry,
    textures: [wgpu::Texture; 3],
    views: [wgpu::TextureView; 3],
}

impl PlaneTextures {
    /// Allocate textures sized for `geometry`
    pub fn new(device: &wgpu::Device, geometry: VideoGeometry) -> Self {
        let [y, u, v] = plane_extents(geometry);
        let (y_texture, y_view) = Self::create_plane(device, "Y Plane Texture", y);
        let (u_texture, u_view) = Self::create_plane(device, "U Plane Texture", u);
        let (v_texture, v_view) = Self::create_plane(device, "V Plane Texture", v);

        log::debug!("Allocated plane textures for {}", geometry);

        Self {
            geometry,
            textures: [y_texture, u_texture, v_texture],
            views: [y_view, u_view, v_view],
        }
    }

    fn create_plane(
        device: &wgpu::Device,
        label: &str,
        (width, height): (u32, u32),
    ) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: PLANE_FORMAT,
            // COPY_DST for uploading data, TEXTURE_BINDING for shader sampling
            usage: wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        (texture, view)
    }

    /// Write a frame's planes into the existing textures
    ///
    /// The frame must have this set's geometry; the renderer reallocates the
    /// set before calling this when the geometry changed.
    pub fn upload(&self, queue: &wgpu::Queue, frame: &PackedFrame) {
        debug_assert_eq!(frame.geometry, self.geometry);

        for ((texture, data), (width, height)) in self
            .textures
            .iter()
            .zip(frame.planes())
            .zip(plane_extents(self.geometry))
        {
            if width == 0 || height == 0 {
                continue;
            }
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    pub fn matches(&self, geometry: VideoGeometry) -> bool {
        self.geometry == geometry
    }

    pub fn geometry(&self) -> VideoGeometry {
        self.geometry
    }

    /// Y, U and V views, in binding order
    pub fn views(&self) -> [&wgpu::TextureView; 3] {
        [&self.views[0], &self.views[1], &self.views[2]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_extents_even() {
        assert_eq!(
            plane_extents(VideoGeometry::new(64, 64)),
            [(64, 64), (32, 32), (32, 32)]
        );
    }

    #[test]
    fn test_plane_extents_odd() {
        // Chroma rounds up so the last column and row are covered
        assert_eq!(
            plane_extents(VideoGeometry::new(5, 3)),
            [(5, 3), (3, 2), (3, 2)]
        );
    }

    #[test]
    fn test_extents_cover_packed_frame() {
        let geometry = VideoGeometry::new(1280, 720);
        let total: usize = plane_extents(geometry)
            .iter()
            .map(|&(w, h)| w as usize * h as usize)
            .sum();
        assert_eq!(total, geometry.packed_len());
    }
}

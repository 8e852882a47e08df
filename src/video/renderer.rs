//! YUV renderer for displaying packed frames
//!
//! Uploads the newest staged frame into the plane textures and draws a
//! full-screen quad (triangle strip) through the YUV to RGB program.

use wgpu::util::DeviceExt;

use super::frame::PackedFrame;
use super::player::FrameSlot;
use super::texture::PlaneTextures;
use crate::shaders::YUV_TO_RGB_SHADER;

/// Program build failure; rendering stays disabled until a rebuild succeeds
#[derive(Debug, thiserror::Error)]
pub enum ShaderBuildError {
    #[error("Shader build failed: {0}")]
    Compile(String),
}

/// Vertex of the full-screen quad
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Clip-space position
    pub position: [f32; 2],
    /// Texture coordinate, origin at the top-left of the image
    pub tex_coord: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Full-screen quad as a triangle strip; bottom vertices sample the last row
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex {
        position: [-1.0, -1.0],
        tex_coord: [0.0, 1.0],
    },
    Vertex {
        position: [1.0, -1.0],
        tex_coord: [1.0, 1.0],
    },
    Vertex {
        position: [-1.0, 1.0],
        tex_coord: [0.0, 0.0],
    },
    Vertex {
        position: [1.0, 1.0],
        tex_coord: [1.0, 0.0],
    },
];

/// Renders packed YUV frames to a surface
pub struct YuvRenderer {
    /// Render pipeline; `None` while the program failed to build
    pipeline: Option<wgpu::RenderPipeline>,
    /// Bind group layout for the three planes + sampler
    bind_group_layout: wgpu::BindGroupLayout,
    /// Sampler for plane filtering
    sampler: wgpu::Sampler,
    /// Quad vertices
    vertex_buffer: wgpu::Buffer,
    /// Format of the render target
    output_format: wgpu::TextureFormat,
    /// Plane textures for the current geometry
    textures: Option<PlaneTextures>,
    bind_group: Option<wgpu::BindGroup>,
    /// Viewport size in physical pixels
    viewport: (u32, u32),
    frames_uploaded: u64,
}

impl YuvRenderer {
    /// Create a renderer and build the embedded program
    ///
    /// A build failure is logged and leaves rendering disabled; see
    /// `rebuild_program`.
    pub fn new(device: &wgpu::Device, output_format: wgpu::TextureFormat, viewport: (u32, u32)) -> Self {
        // Nearest when minifying, linear when magnifying
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Plane Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let plane_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("YUV Bind Group Layout"),
            entries: &[
                plane_entry(0),
                plane_entry(1),
                plane_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let mut renderer = Self {
            pipeline: None,
            bind_group_layout,
            sampler,
            vertex_buffer,
            output_format,
            textures: None,
            bind_group: None,
            viewport,
            frames_uploaded: 0,
        };

        if let Err(e) = renderer.rebuild_program(device, YUV_TO_RGB_SHADER) {
            log::error!("{}; rendering disabled", e);
        }
        renderer
    }

    /// Compile `source` and replace the render pipeline
    ///
    /// On failure the previous pipeline is dropped as well, so nothing is
    /// drawn until a later rebuild succeeds.
    pub fn rebuild_program(&mut self, device: &wgpu::Device, source: &str) -> Result<(), ShaderBuildError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("YUV Shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("YUV Pipeline Layout"),
            bind_group_layouts: &[&self.bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("YUV Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.output_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            self.pipeline = None;
            return Err(ShaderBuildError::Compile(error.to_string()));
        }

        self.pipeline = Some(pipeline);
        log::info!("YUV program built");
        Ok(())
    }

    pub fn is_program_ready(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Track the output surface size
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.viewport = (width, height);
        }
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn frames_uploaded(&self) -> u64 {
        self.frames_uploaded
    }

    /// Upload a frame, reallocating the plane textures on a geometry change
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, frame: &PackedFrame) {
        if !frame.is_valid() || frame.geometry.is_empty() {
            log::warn!(
                "Ignoring frame with {} bytes for {}",
                frame.data.len(),
                frame.geometry
            );
            return;
        }

        let reallocate = self
            .textures
            .as_ref()
            .map_or(true, |textures| !textures.matches(frame.geometry));
        if reallocate {
            let textures = PlaneTextures::new(device, frame.geometry);
            self.bind_group = Some(self.create_bind_group(device, &textures));
            self.textures = Some(textures);
        }

        if let Some(textures) = &self.textures {
            textures.upload(queue, frame);
            self.frames_uploaded += 1;
        }
    }

    fn create_bind_group(&self, device: &wgpu::Device, textures: &PlaneTextures) -> wgpu::BindGroup {
        let [y, u, v] = textures.views();
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("YUV Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(y),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(u),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(v),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    /// Draw the most recently staged frame
    ///
    /// Picks up a new frame from `slot` if one was staged, otherwise redraws
    /// the previous upload. Returns whether a draw call was issued; with no
    /// program or no frame yet the target is only cleared.
    pub fn draw_frame(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        slot: &FrameSlot,
        output_view: &wgpu::TextureView,
    ) -> bool {
        if let Some(frame) = slot.take_frame() {
            self.upload(device, queue, &frame);
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("YUV Render Encoder"),
        });

        let mut drawn = false;
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("YUV Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: output_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let (Some(pipeline), Some(bind_group)) = (&self.pipeline, &self.bind_group) {
                let (width, height) = self.viewport;
                render_pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, bind_group, &[]);
                render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
                render_pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
                drawn = true;
            }
        }

        queue.submit(std::iter::once(encoder.finish()));
        drawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fragment stage color conversion on normalized samples, unclamped
    fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [f32; 3] {
        let u = u - 0.5;
        let v = v - 0.5;
        [
            y + v * 1.402,
            y - u * 0.3441 - v * 0.7141,
            y + u * 1.772,
        ]
    }

    fn assert_close(actual: [f32; 3], expected: [f32; 3]) {
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 0.01, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_mid_gray() {
        // 8-bit 128 everywhere
        let sample = 128.0 / 255.0;
        assert_close(yuv_to_rgb(sample, sample, sample), [0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_pure_chroma_offsets() {
        assert_close(yuv_to_rgb(0.5, 0.5, 1.0), [0.5 + 0.701, 0.5 - 0.35705, 0.5]);
        assert_close(yuv_to_rgb(0.5, 1.0, 0.5), [0.5, 0.5 - 0.17205, 0.5 + 0.886]);
    }

    #[test]
    fn test_out_of_range_not_clamped() {
        let [r, _, b] = yuv_to_rgb(1.0, 1.0, 1.0);
        assert!(r > 1.0);
        assert!(b > 1.0);
    }

    #[test]
    fn test_quad_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 16);
        assert_eq!(Vertex::layout().array_stride, 16);
        // Top-left corner of the screen samples the first image row
        let top_left = QUAD_VERTICES.iter().find(|v| v.position == [-1.0, 1.0]).unwrap();
        assert_eq!(top_left.tex_coord, [0.0, 0.0]);
        let bottom_right = QUAD_VERTICES.iter().find(|v| v.position == [1.0, -1.0]).unwrap();
        assert_eq!(bottom_right.tex_coord, [1.0, 1.0]);
    }
}

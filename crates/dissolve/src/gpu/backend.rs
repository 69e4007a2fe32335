use std::fmt;
use std::sync::Arc;

use image::RgbaImage;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::backend::Backend;
use crate::config::{DEFAULT_DISSOLVE_HIGH_EDGE, DEFAULT_DISSOLVE_LOW_EDGE};
use crate::error::DissolveError;
use crate::texture::{TextureDevice, TextureResource};

use super::context::{GpuContext, RenderTarget};
use super::program::DissolveProgram;
use super::uniforms::DissolveUniforms;

type DetachHook = Box<dyn FnOnce()>;

/// [`Backend`] drawing through wgpu into a window surface or an offscreen texture.
pub struct WgpuBackend {
    context: GpuContext,
    program: Option<DissolveProgram>,
    uniforms: DissolveUniforms,
    textures: Option<wgpu::BindGroup>,
    detach_hook: Option<DetachHook>,
    released: bool,
    has_frame: bool,
}

impl WgpuBackend {
    /// Creates a backend presenting to `window`.
    pub fn for_window<W>(window: Arc<W>, width: u32, height: u32) -> Result<Self, DissolveError>
    where
        W: HasDisplayHandle + HasWindowHandle + Send + Sync + 'static,
    {
        Self::from_context(GpuContext::for_window(window, (width, height))?)
    }

    /// Creates a backend rendering into an offscreen texture that supports
    /// [`Backend::snapshot`].
    pub fn offscreen(width: u32, height: u32) -> Result<Self, DissolveError> {
        Self::from_context(GpuContext::offscreen((width, height))?)
    }

    fn from_context(context: GpuContext) -> Result<Self, DissolveError> {
        let uniforms = DissolveUniforms::new(DEFAULT_DISSOLVE_LOW_EDGE, DEFAULT_DISSOLVE_HIGH_EDGE);
        let program = DissolveProgram::new(&context.device, context.format(), &uniforms)?;
        Ok(Self {
            context,
            program: Some(program),
            uniforms,
            textures: None,
            detach_hook: None,
            released: false,
            has_frame: false,
        })
    }

    /// Runs `hook` when the engine detaches the surface.
    pub fn with_detach_hook(mut self, hook: impl FnOnce() + 'static) -> Self {
        self.detach_hook = Some(Box::new(hook));
        self
    }

    fn write_uniforms(&self) {
        if let Some(program) = self.program.as_ref() {
            program.write_uniforms(&self.context.queue, &self.uniforms);
        }
    }

    fn acquire_frame(
        surface: &wgpu::Surface<'static>,
        context: &GpuContext,
    ) -> Result<wgpu::SurfaceTexture, DissolveError> {
        match surface.get_current_texture() {
            Ok(frame) => Ok(frame),
            Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                tracing::warn!(error = %err, "surface lost; reconfiguring");
                context.reconfigure();
                Ok(surface.get_current_texture()?)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn read_offscreen(&self) -> Result<Option<RgbaImage>, DissolveError> {
        let RenderTarget::Offscreen { texture, size } = &self.context.target else {
            return Ok(None);
        };
        let (width, height) = *size;
        let device = &self.context.device;
        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("dissolve readback"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("dissolve readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.context.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| DissolveError::Readback(format!("device poll failed: {err:?}")))?;
        receiver
            .recv()
            .map_err(|_| DissolveError::Readback("readback channel closed".into()))?
            .map_err(|err| DissolveError::Readback(err.to_string()))?;

        let mapped = slice.get_mapped_range();
        let row_bytes = unpadded as usize;
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * padded as usize;
            pixels.extend_from_slice(&mapped[start..start + row_bytes]);
        }
        drop(mapped);
        buffer.unmap();
        buffer.destroy();

        RgbaImage::from_raw(width, height, pixels)
            .map(Some)
            .ok_or_else(|| DissolveError::Readback("readback size mismatch".into()))
    }
}

fn encode_frame(
    context: &GpuContext,
    program: &DissolveProgram,
    textures: &wgpu::BindGroup,
    view: &wgpu::TextureView,
) {
    let (width, height) = context.size();
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("dissolve encoder"),
        });
    {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("dissolve pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
        program.draw(&mut pass, textures);
    }
    context.queue.submit(Some(encoder.finish()));
}

impl Backend for WgpuBackend {
    fn texture_device(&self) -> Option<TextureDevice> {
        if self.released {
            return None;
        }
        Some(TextureDevice::new(
            self.context.device.clone(),
            self.context.queue.clone(),
        ))
    }

    fn size(&self) -> (u32, u32) {
        self.context.size()
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.released {
            return;
        }
        self.context.resize(width, height);
        self.has_frame = false;
    }

    fn set_dissolve_edges(&mut self, low: f32, high: f32) {
        self.uniforms.dissolve_low_edge = low;
        self.uniforms.dissolve_high_edge = high;
        self.write_uniforms();
    }

    fn set_uv_scale(&mut self, uv_scale: [f32; 2]) {
        self.uniforms.uv_scale = uv_scale;
        self.write_uniforms();
    }

    fn bind_textures(&mut self, media: &TextureResource, mask: &TextureResource) {
        let Some(program) = self.program.as_ref() else {
            return;
        };
        let device = &self.context.device;
        self.textures = media
            .with_gpu(|media| mask.with_gpu(|mask| program.texture_bind_group(device, media, mask)))
            .flatten();
    }

    fn draw(&mut self, progress: f32) -> Result<(), DissolveError> {
        if self.released {
            return Ok(());
        }
        let (Some(program), Some(textures)) = (self.program.as_ref(), self.textures.as_ref()) else {
            tracing::debug!("textures not bound yet; skipping draw");
            return Ok(());
        };
        self.uniforms.progress = progress;
        program.write_uniforms(&self.context.queue, &self.uniforms);

        match &self.context.target {
            RenderTarget::Window { surface, .. } => {
                let frame = Self::acquire_frame(surface, &self.context)?;
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                encode_frame(&self.context, program, textures, &view);
                frame.present();
            }
            RenderTarget::Offscreen { texture, .. } => {
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                encode_frame(&self.context, program, textures, &view);
            }
        }
        self.has_frame = true;
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.textures = None;
        if let Some(program) = self.program.take() {
            program.destroy();
        }
        self.context.destroy_target();
        tracing::debug!("released dissolve backend");
    }

    fn detach(&mut self) {
        if let Some(hook) = self.detach_hook.take() {
            hook();
        }
    }

    fn snapshot(&mut self) -> Result<Option<RgbaImage>, DissolveError> {
        if self.released || !self.has_frame {
            return Ok(None);
        }
        self.read_offscreen()
    }
}

impl fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("size", &self.context.size())
            .field("format", &self.context.format())
            .field("released", &self.released)
            .finish()
    }
}

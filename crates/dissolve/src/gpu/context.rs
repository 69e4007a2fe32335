use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::DissolveError;

/// Format used for offscreen targets; matches the sampled texture format.
pub(crate) const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub(crate) enum RenderTarget {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
        size: (u32, u32),
    },
}

/// Instance, device and the surface or texture frames are drawn into.
pub(crate) struct GpuContext {
    _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub target: RenderTarget,
}

impl GpuContext {
    pub(crate) fn for_window<W>(window: Arc<W>, size: (u32, u32)) -> Result<Self, DissolveError>
    where
        W: HasDisplayHandle + HasWindowHandle + Send + Sync + 'static,
    {
        let instance = create_instance();
        let surface = instance
            .create_surface(window)
            .map_err(|err| DissolveError::UnsupportedSurface(format!("failed to create surface: {err}")))?;
        let adapter = request_adapter(&instance, Some(&surface))?;
        let (device, queue) = request_device(&adapter)?;

        let caps = surface.get_capabilities(&adapter);
        let Some(&first_format) = caps.formats.first() else {
            return Err(DissolveError::UnsupportedSurface(
                "surface reports no supported formats".into(),
            ));
        };
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .unwrap_or_else(|| {
                tracing::warn!(
                    fallback = ?first_format,
                    "no linear (non-sRGB) surface format available; colours will be gamma-encoded twice"
                );
                first_format
            });
        let alpha_mode = [
            wgpu::CompositeAlphaMode::PostMultiplied,
            wgpu::CompositeAlphaMode::PreMultiplied,
        ]
        .into_iter()
        .find(|mode| caps.alpha_modes.contains(mode))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let present_mode = if caps.present_modes.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            caps.present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::AutoVsync)
        };
        tracing::debug!(?format, ?alpha_mode, ?present_mode, "configuring window surface");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.0.max(1),
            height: size.1.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            _instance: instance,
            device,
            queue,
            target: RenderTarget::Window { surface, config },
        })
    }

    pub(crate) fn offscreen(size: (u32, u32)) -> Result<Self, DissolveError> {
        let instance = create_instance();
        let adapter = request_adapter(&instance, None)?;
        let (device, queue) = request_device(&adapter)?;
        let size = (size.0.max(1), size.1.max(1));
        let texture = create_offscreen_texture(&device, size);
        Ok(Self {
            _instance: instance,
            device,
            queue,
            target: RenderTarget::Offscreen { texture, size },
        })
    }

    pub(crate) fn format(&self) -> wgpu::TextureFormat {
        match &self.target {
            RenderTarget::Window { config, .. } => config.format,
            RenderTarget::Offscreen { .. } => OFFSCREEN_FORMAT,
        }
    }

    pub(crate) fn size(&self) -> (u32, u32) {
        match &self.target {
            RenderTarget::Window { config, .. } => (config.width, config.height),
            RenderTarget::Offscreen { size, .. } => *size,
        }
    }

    pub(crate) fn resize(&mut self, width: u32, height: u32) {
        let size = (width.max(1), height.max(1));
        match &mut self.target {
            RenderTarget::Window { surface, config } => {
                config.width = size.0;
                config.height = size.1;
                surface.configure(&self.device, config);
            }
            RenderTarget::Offscreen {
                texture,
                size: current,
            } => {
                if *current == size {
                    return;
                }
                let replacement = create_offscreen_texture(&self.device, size);
                std::mem::replace(texture, replacement).destroy();
                *current = size;
            }
        }
    }

    /// Reapplies the surface configuration after the surface was lost.
    pub(crate) fn reconfigure(&self) {
        if let RenderTarget::Window { surface, config } = &self.target {
            surface.configure(&self.device, config);
        }
    }

    pub(crate) fn destroy_target(&self) {
        if let RenderTarget::Offscreen { texture, .. } = &self.target {
            texture.destroy();
        }
    }
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    })
}

fn request_adapter(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'_>>,
) -> Result<wgpu::Adapter, DissolveError> {
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::default(),
        compatible_surface: surface,
        force_fallback_adapter: false,
    }))
    .map_err(|err| DissolveError::UnsupportedSurface(format!("no suitable GPU adapter: {err}")))?;
    let info = adapter.get_info();
    tracing::debug!(
        name = %info.name,
        backend = ?info.backend,
        device_type = ?info.device_type,
        "selected GPU adapter"
    );
    Ok(adapter)
}

fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue), DissolveError> {
    pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("dissolve device"),
        required_features: wgpu::Features::empty(),
        required_limits: adapter.limits(),
        memory_hints: wgpu::MemoryHints::MemoryUsage,
        trace: wgpu::Trace::default(),
    }))
    .map_err(|err| DissolveError::UnsupportedSurface(format!("failed to create GPU device: {err}")))
}

fn create_offscreen_texture(device: &wgpu::Device, size: (u32, u32)) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("dissolve offscreen target"),
        size: wgpu::Extent3d {
            width: size.0,
            height: size.1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

//! GPU texture backing one of the engine's inputs.
//!
//! A [`TextureResource`] always holds valid pixels: a 1×1 opaque black
//! placeholder until its source is ready, then the source itself. Every upload
//! (placeholder included) ends with an `updated` notification.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use image::imageops::{self, flip_vertical_in_place, FilterType};
use image::RgbaImage;
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::events::{EventDispatcher, ListenerId, NamedEvent, UPDATED};
use crate::gpu::limits::is_power_of_two;
use crate::source::{ImageSource, TextureSource};

const PLACEHOLDER_PIXEL: [u8; 4] = [0, 0, 0, 255];
const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Device and queue used for texture uploads.
#[derive(Clone, Debug)]
pub struct TextureDevice {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
}

impl TextureDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    pub fn max_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

pub(crate) struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    size: (u32, u32),
    mip_levels: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureEvent {
    Updated,
}

impl NamedEvent for TextureEvent {
    fn name(&self) -> &'static str {
        match self {
            TextureEvent::Updated => UPDATED,
        }
    }
}

/// What the texture currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureContent {
    Placeholder,
    Source { width: u32, height: u32 },
}

struct TextureState {
    source: TextureSource,
    device: Option<TextureDevice>,
    gpu: Option<GpuTexture>,
    content: TextureContent,
    pending_load: Option<(ImageSource, ListenerId)>,
    uploads: u64,
    released: bool,
}

pub struct TextureResource {
    label: String,
    state: RefCell<TextureState>,
    events: EventDispatcher<TextureEvent>,
}

impl TextureResource {
    /// Allocates the texture with the placeholder, then adopts `source`.
    ///
    /// Without a device the resource runs headless: uploads are tracked but no
    /// GPU work happens.
    pub fn new(
        label: impl Into<String>,
        source: TextureSource,
        device: Option<TextureDevice>,
    ) -> Rc<Self> {
        let resource = Rc::new(Self {
            label: label.into(),
            state: RefCell::new(TextureState {
                source: source.clone(),
                device,
                gpu: None,
                content: TextureContent::Placeholder,
                pending_load: None,
                uploads: 0,
                released: false,
            }),
            events: EventDispatcher::new(),
        });
        resource.upload_placeholder();
        resource.set_source(source);
        resource
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> TextureSource {
        self.state.borrow().source.clone()
    }

    pub fn content(&self) -> TextureContent {
        self.state.borrow().content
    }

    pub fn is_placeholder(&self) -> bool {
        self.content() == TextureContent::Placeholder
    }

    /// Number of uploads performed, placeholder uploads included.
    pub fn upload_count(&self) -> u64 {
        self.state.borrow().uploads
    }

    pub fn has_pending_load(&self) -> bool {
        self.state.borrow().pending_load.is_some()
    }

    pub fn is_released(&self) -> bool {
        self.state.borrow().released
    }

    /// Replaces the source and uploads it, or the placeholder while it decodes.
    pub fn set_source(self: &Rc<Self>, source: TextureSource) {
        let stale = {
            let mut state = self.state.borrow_mut();
            state.source = source.clone();
            state.pending_load.take()
        };
        if let Some((image, id)) = stale {
            image.remove_load_listener(id);
        }

        match source.pixels() {
            Some(pixels) if source.is_ready() => self.upload_pixels(&pixels),
            _ => {
                self.upload_placeholder();
                if let TextureSource::Image(image) = &source {
                    self.watch_load(image);
                }
            }
        }

        self.events.dispatch(&TextureEvent::Updated);
    }

    fn watch_load(self: &Rc<Self>, image: &ImageSource) {
        if self.state.borrow().released {
            return;
        }
        let weak = Rc::downgrade(self);
        let id = image.on_load(move |_| {
            if let Some(resource) = weak.upgrade() {
                resource.finish_load();
            }
        });
        tracing::debug!(texture = %self.label, "waiting for image to decode");
        self.state.borrow_mut().pending_load = Some((image.clone(), id));
    }

    fn finish_load(self: &Rc<Self>) {
        let pending = self.state.borrow_mut().pending_load.take();
        let Some((image, id)) = pending else {
            return;
        };
        image.remove_load_listener(id);
        self.set_source(TextureSource::Image(image));
    }

    pub fn on_updated<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TextureEvent) + 'static,
    {
        self.events.add_listener(UPDATED, listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.events.remove_listener(UPDATED, id)
    }

    pub fn has_listener(&self, id: ListenerId) -> bool {
        self.events.has_listener(UPDATED, id)
    }

    /// Destroys the GPU texture and stops watching pending loads.
    ///
    /// The resource stays usable in headless mode; later uploads never
    /// allocate GPU memory again.
    pub fn release(&self) {
        let (gpu, pending) = {
            let mut state = self.state.borrow_mut();
            state.released = true;
            state.device = None;
            (state.gpu.take(), state.pending_load.take())
        };
        if let Some((image, id)) = pending {
            image.remove_load_listener(id);
        }
        if let Some(gpu) = gpu {
            gpu.texture.destroy();
            tracing::debug!(texture = %self.label, "released texture");
        }
    }

    pub(crate) fn with_gpu<R>(&self, f: impl FnOnce(&GpuTexture) -> R) -> Option<R> {
        self.state.borrow().gpu.as_ref().map(f)
    }

    fn upload_placeholder(&self) {
        let placeholder = RgbaImage::from_raw(1, 1, PLACEHOLDER_PIXEL.to_vec());
        let mut state = self.state.borrow_mut();
        state.uploads += 1;
        state.content = TextureContent::Placeholder;
        if let (Some(device), Some(pixels)) = (state.device.clone(), placeholder) {
            upload_levels(&mut state, &device, &self.label, vec![pixels]);
        }
    }

    fn upload_pixels(&self, pixels: &RgbaImage) {
        let (width, height) = pixels.dimensions();
        if width == 0 || height == 0 {
            self.upload_placeholder();
            return;
        }

        let mut state = self.state.borrow_mut();
        state.uploads += 1;
        let Some(device) = state.device.clone() else {
            state.content = TextureContent::Source { width, height };
            return;
        };

        let limit = device.max_dimension().max(1);
        let fitted: Cow<'_, RgbaImage> = if width > limit || height > limit {
            let target = (width.min(limit), height.min(limit));
            tracing::warn!(
                texture = %self.label,
                width,
                height,
                limit,
                "source exceeds the device texture limit; resampling"
            );
            Cow::Owned(imageops::resize(pixels, target.0, target.1, FilterType::Triangle))
        } else {
            Cow::Borrowed(pixels)
        };

        let mut base = fitted.into_owned();
        flip_vertical_in_place(&mut base);
        let (width, height) = base.dimensions();
        let levels = if is_power_of_two(width) && is_power_of_two(height) {
            mip_chain(base)
        } else {
            vec![base]
        };
        state.content = TextureContent::Source { width, height };
        upload_levels(&mut state, &device, &self.label, levels);
    }
}

/// Writes `levels` into the existing texture when its shape matches,
/// otherwise replaces the texture.
fn upload_levels(
    state: &mut TextureState,
    device: &TextureDevice,
    label: &str,
    levels: Vec<RgbaImage>,
) {
    let Some(base) = levels.first() else {
        return;
    };
    let size = base.dimensions();
    let mip_levels = levels.len() as u32;

    if let Some(gpu) = state
        .gpu
        .as_ref()
        .filter(|gpu| gpu.size == size && gpu.mip_levels == mip_levels)
    {
        for (level, pixels) in levels.iter().enumerate() {
            let (width, height) = pixels.dimensions();
            device.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &gpu.texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                pixels.as_raw(),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * width),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }
        tracing::debug!(texture = label, width = size.0, height = size.1, "rewrote texture");
        return;
    }

    let mut data = Vec::with_capacity(levels.iter().map(|level| level.as_raw().len()).sum());
    for level in &levels {
        data.extend_from_slice(level.as_raw());
    }
    let texture = device.device.create_texture_with_data(
        &device.queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &data,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });

    if let Some(previous) = state.gpu.replace(GpuTexture {
        texture,
        view,
        sampler,
        size,
        mip_levels,
    }) {
        previous.texture.destroy();
    }
    tracing::debug!(
        texture = label,
        width = size.0,
        height = size.1,
        mip_levels,
        "allocated texture"
    );
}

/// Full mip chain down to 1×1, base level first.
fn mip_chain(base: RgbaImage) -> Vec<RgbaImage> {
    let (mut width, mut height) = base.dimensions();
    let mut levels = vec![base];
    while width > 1 || height > 1 {
        width = (width / 2).max(1);
        height = (height / 2).max(1);
        let Some(previous) = levels.last() else {
            break;
        };
        let next = imageops::resize(previous, width, height, FilterType::Triangle);
        levels.push(next);
    }
    levels
}

impl fmt::Debug for TextureResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("TextureResource")
            .field("label", &self.label)
            .field("source", &state.source)
            .field("content", &state.content)
            .field("uploads", &state.uploads)
            .field("headless", &state.device.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::source::VideoSource;

    fn counting(resource: &TextureResource) -> Rc<Cell<u32>> {
        let count = Rc::new(Cell::new(0));
        let inner = count.clone();
        resource.on_updated(move |_| inner.set(inner.get() + 1));
        count
    }

    #[test]
    fn ready_source_is_uploaded_immediately() {
        let resource = TextureResource::new("media", RgbaImage::new(4, 2).into(), None);
        assert_eq!(
            resource.content(),
            TextureContent::Source {
                width: 4,
                height: 2
            }
        );
        assert_eq!(resource.upload_count(), 2);
        assert!(!resource.has_pending_load());
    }

    #[test]
    fn pending_image_shows_placeholder_until_loaded() {
        let image = ImageSource::pending();
        let resource = TextureResource::new("media", image.clone().into(), None);
        let updates = counting(&resource);
        assert!(resource.is_placeholder());
        assert!(resource.has_pending_load());

        image.complete(RgbaImage::new(16, 8));
        assert_eq!(
            resource.content(),
            TextureContent::Source {
                width: 16,
                height: 8
            }
        );
        assert_eq!(updates.get(), 1);
        assert!(!resource.has_pending_load());

        image.complete(RgbaImage::new(2, 2));
        assert_eq!(updates.get(), 1, "load listener must be one-shot");
    }

    #[test]
    fn replacing_a_pending_source_cancels_its_load() {
        let first = ImageSource::pending();
        let resource = TextureResource::new("media", first.clone().into(), None);
        let updates = counting(&resource);

        resource.set_source(RgbaImage::new(8, 8).into());
        assert_eq!(updates.get(), 1);

        first.complete(RgbaImage::new(32, 32));
        assert_eq!(updates.get(), 1);
        assert_eq!(
            resource.content(),
            TextureContent::Source {
                width: 8,
                height: 8
            }
        );
    }

    #[test]
    fn video_without_frame_uses_placeholder() {
        let resource = TextureResource::new("media", VideoSource::new().into(), None);
        assert!(resource.is_placeholder());
        assert!(!resource.has_pending_load());
    }

    #[test]
    fn released_resource_ignores_later_loads() {
        let image = ImageSource::pending();
        let resource = TextureResource::new("mask", image.clone().into(), None);
        let updates = counting(&resource);
        resource.release();
        assert!(resource.is_released());
        image.complete(RgbaImage::new(4, 4));
        assert_eq!(updates.get(), 0);
        assert!(resource.is_placeholder());
    }

    #[test]
    fn mip_chain_reaches_one_by_one() {
        let levels = mip_chain(RgbaImage::new(8, 2));
        let sizes: Vec<_> = levels.iter().map(|level| level.dimensions()).collect();
        assert_eq!(sizes, vec![(8, 2), (4, 1), (2, 1), (1, 1)]);
    }
}

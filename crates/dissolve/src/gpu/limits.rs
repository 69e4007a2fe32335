use std::sync::OnceLock;

use image::imageops::{self, FilterType};

use crate::source::TextureSource;

static MAX_TEXTURE_DIMENSION: OnceLock<u32> = OnceLock::new();

/// Largest 2D texture edge supported by the default adapter.
///
/// The first call creates a throwaway instance and adapter; the answer is
/// cached for the rest of the process.
pub fn max_texture_dimension() -> u32 {
    *MAX_TEXTURE_DIMENSION.get_or_init(query_max_texture_dimension)
}

fn query_max_texture_dimension() -> u32 {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    match pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default())) {
        Ok(adapter) => {
            let limit = adapter.limits().max_texture_dimension_2d;
            tracing::debug!(
                adapter = %adapter.get_info().name,
                limit,
                "queried max texture dimension"
            );
            limit
        }
        Err(err) => {
            let fallback = wgpu::Limits::downlevel_webgl2_defaults().max_texture_dimension_2d;
            tracing::warn!(
                error = %err,
                fallback,
                "no adapter available to query texture limits; using downlevel default"
            );
            fallback
        }
    }
}

pub fn is_power_of_two(value: u32) -> bool {
    value.is_power_of_two()
}

/// Smallest power of two not below `value`; zero maps to 1.
pub fn ceil_power_of_two(value: u32) -> u32 {
    value.checked_next_power_of_two().unwrap_or(1 << 31)
}

/// Resamples a decoded source to power-of-two dimensions within the device limit.
pub fn fit_to_gpu_limits(source: &TextureSource) -> TextureSource {
    fit_to_limit(source, max_texture_dimension())
}

/// Like [`fit_to_gpu_limits`] with an explicit edge limit.
///
/// Sources already at power-of-two dimensions within `max_dimension` come back
/// unchanged. Anything else is resampled to `min(ceil_power_of_two(edge), max)`
/// per axis and returned as a canvas. Undecoded images are returned as-is.
pub fn fit_to_limit(source: &TextureSource, max_dimension: u32) -> TextureSource {
    let Some(pixels) = source.pixels().filter(|_| source.is_ready()) else {
        tracing::warn!(
            kind = source.kind(),
            "cannot fit a source that has not finished decoding; returning it unchanged"
        );
        return source.clone();
    };
    let (width, height) = pixels.dimensions();
    if width == 0 || height == 0 {
        return source.clone();
    }
    let max_dimension = max_dimension.max(1);
    if is_power_of_two(width)
        && is_power_of_two(height)
        && width <= max_dimension
        && height <= max_dimension
    {
        return source.clone();
    }

    let target_width = ceil_power_of_two(width).min(max_dimension);
    let target_height = ceil_power_of_two(height).min(max_dimension);
    tracing::debug!(
        width,
        height,
        target_width,
        target_height,
        "resampling source to gpu-friendly dimensions"
    );
    let resized = imageops::resize(&*pixels, target_width, target_height, FilterType::Triangle);
    TextureSource::from(resized)
}

use bytemuck::{Pod, Zeroable};

/// CPU mirror of the `DissolveParams` uniform block (std140).
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct DissolveUniforms {
    pub uv_scale: [f32; 2],
    pub progress: f32,
    pub dissolve_low_edge: f32,
    pub dissolve_high_edge: f32,
    pub _padding: [f32; 3],
}

impl DissolveUniforms {
    pub fn new(dissolve_low_edge: f32, dissolve_high_edge: f32) -> Self {
        Self {
            uv_scale: [1.0, 1.0],
            progress: 0.0,
            dissolve_low_edge,
            dissolve_high_edge,
            _padding: [0.0; 3],
        }
    }
}

/// UV scale that letterboxes media of `media_aspect` onto a surface of `surface_aspect`.
///
/// Both aspects are width over height. The axis that would overflow is scaled
/// down so the media covers the surface without distortion.
pub fn uv_scale(media_aspect: f32, surface_aspect: f32) -> [f32; 2] {
    let aspect = media_aspect / surface_aspect;
    if !aspect.is_finite() || aspect <= 0.0 {
        return [1.0, 1.0];
    }
    if aspect < 1.0 {
        [1.0, aspect]
    } else {
        [1.0 / aspect, 1.0]
    }
}

//! wgpu plumbing behind the [`Backend`](crate::backend::Backend) port.
//!
//! - `context` owns instance/device wiring and the window surface or offscreen
//!   texture frames land in.
//! - `program` compiles the dissolve GLSL and owns the pipeline, quad buffers
//!   and uniform buffer.
//! - `uniforms` mirrors the shader's uniform block and computes aspect
//!   correction.
//! - `limits` answers texture-size questions and resamples bitmaps to
//!   GPU-friendly dimensions.
//! - `backend` glues everything into [`WgpuBackend`].

mod backend;
mod context;
pub mod limits;
mod program;
pub mod uniforms;

pub use backend::WgpuBackend;
pub use limits::{
    ceil_power_of_two, fit_to_gpu_limits, fit_to_limit, is_power_of_two, max_texture_dimension,
};
pub use uniforms::uv_scale;

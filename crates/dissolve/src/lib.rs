//! GPU dissolve transition between a media source and a greyscale mask.
//!
//! The media fades in wherever the mask's red channel has been overtaken by
//! the transition's progress, softened by a smoothstep band. The overall flow
//! is:
//!
//! ```text
//!   caller ──▶ Backend + media + mask + FrameScheduler + TransitionConfig
//!                 │
//!                 ▼
//!   DissolveTransition::new ──▶ TextureResource ×2 ──▶ `updated` ──▶ rebind / aspect
//!                 │
//!   start() ──▶ tick ──▶ Backend::draw(progress) ──▶ schedule_frame(tick) …
//!                                  │
//!                                  └─ progress == 1 ──▶ `transitionEnd`
//! ```
//!
//! [`WgpuBackend`] renders through wgpu into a window surface or an offscreen
//! texture; [`HeadlessBackend`] records operations without touching a GPU.
//! Frames are driven by a [`FrameScheduler`]: the host's frame loop in
//! production, [`ManualScheduler`] in tests and still exports.
//!
//! Everything except [`ImageLoader`]'s worker threads is single-threaded and
//! lives on the frame thread.

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod frame;
pub mod gpu;
pub mod loader;
pub mod source;
pub mod texture;
pub mod timeline;

pub use backend::{Backend, BackendLog, BackendOp, HeadlessBackend};
pub use config::TransitionConfig;
pub use engine::{DissolveTransition, TransitionEvent, TransitionState};
pub use error::{DissolveError, ShaderStage};
pub use events::{EventDispatcher, ListenerId, NamedEvent};
pub use frame::{FrameCallback, FrameScheduler, ManualScheduler};
pub use gpu::{
    ceil_power_of_two, fit_to_gpu_limits, fit_to_limit, is_power_of_two, max_texture_dimension,
    WgpuBackend,
};
pub use loader::{load_image_from_url, ImageLoader};
pub use source::{CanvasSource, ImageEvent, ImageSource, TextureSource, VideoSource};
pub use texture::{TextureContent, TextureDevice, TextureEvent, TextureResource};
pub use timeline::{ease_out_sine, progress_at, Easing};

pub use image;

//! The dissolve transition state machine.
//!
//! ```text
//!            start()               progress == 1
//!   Idle ───────────────▶ Running ───────────────▶ Idle  (+ transitionEnd)
//!    ▲                       │
//!    └──────── reset() ──────┘
//!
//!   any state ── destroy() ──▶ Destroyed
//! ```
//!
//! Ticks run on the [`FrameScheduler`]. Each tick re-checks the phase and the
//! run generation before doing anything, so a tick queued by an earlier run
//! exits quietly after `reset(); start()`.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use image::RgbaImage;

use crate::backend::Backend;
use crate::config::TransitionConfig;
use crate::error::DissolveError;
use crate::events::{EventDispatcher, ListenerId, NamedEvent, TRANSITION_END};
use crate::frame::FrameScheduler;
use crate::gpu::uniforms::uv_scale;
use crate::source::TextureSource;
use crate::texture::TextureResource;
use crate::timeline::{progress_at, Easing};

/// Lifecycle phase of a [`DissolveTransition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionState {
    Idle,
    Running,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEvent {
    TransitionEnd,
}

impl NamedEvent for TransitionEvent {
    fn name(&self) -> &'static str {
        match self {
            TransitionEvent::TransitionEnd => TRANSITION_END,
        }
    }
}

struct EngineState {
    backend: Box<dyn Backend>,
    phase: TransitionState,
    run: u64,
    started_at: Option<Instant>,
    progress: f32,
    duration: Duration,
    easing: Easing,
    dissolve_edges: (f32, f32),
    redraw_pending: bool,
    texture_listeners: Vec<(Rc<TextureResource>, ListenerId)>,
}

impl EngineState {
    fn draw(&mut self) {
        let progress = self.progress;
        if let Err(err) = self.backend.draw(progress) {
            tracing::warn!(error = %err, progress, "failed to render dissolve frame");
        }
    }
}

struct Shared {
    state: RefCell<EngineState>,
    events: EventDispatcher<TransitionEvent>,
    scheduler: Rc<dyn FrameScheduler>,
    media: Rc<TextureResource>,
    mask: Rc<TextureResource>,
}

/// Animated dissolve from transparent to `media`, revealed in the order of
/// `mask`'s red channel.
pub struct DissolveTransition {
    shared: Rc<Shared>,
}

impl DissolveTransition {
    /// Builds GPU resources for `media` and `mask` on `backend`.
    ///
    /// Sources that are still decoding show a placeholder and are uploaded
    /// when their `load` notification fires.
    pub fn new<B>(
        backend: B,
        media: TextureSource,
        mask: TextureSource,
        scheduler: Rc<dyn FrameScheduler>,
        config: &TransitionConfig,
    ) -> Result<Self, DissolveError>
    where
        B: Backend + 'static,
    {
        config.validate()?;
        let mut backend: Box<dyn Backend> = Box::new(backend);
        backend.set_dissolve_edges(config.dissolve_low_edge, config.dissolve_high_edge);

        let device = backend.texture_device();
        let media = TextureResource::new("dissolve media", media, device.clone());
        let mask = TextureResource::new("dissolve mask", mask, device);

        let shared = Rc::new(Shared {
            state: RefCell::new(EngineState {
                backend,
                phase: TransitionState::Idle,
                run: 0,
                started_at: None,
                progress: 0.0,
                duration: config.duration,
                easing: config.easing,
                dissolve_edges: (config.dissolve_low_edge, config.dissolve_high_edge),
                redraw_pending: false,
                texture_listeners: Vec::with_capacity(2),
            }),
            events: EventDispatcher::new(),
            scheduler,
            media,
            mask,
        });

        for texture in [shared.media.clone(), shared.mask.clone()] {
            let weak = Rc::downgrade(&shared);
            let id = texture.on_updated(move |_| {
                if let Some(shared) = weak.upgrade() {
                    update_texture(&shared);
                }
            });
            shared
                .state
                .borrow_mut()
                .texture_listeners
                .push((texture, id));
        }

        update_texture(&shared);
        tracing::debug!(
            duration = ?config.duration,
            easing = %config.easing,
            "dissolve transition ready"
        );
        Ok(Self { shared })
    }

    /// Starts a run. Does nothing while running or after destroy.
    pub fn start(&self) {
        let run = {
            let mut state = self.shared.state.borrow_mut();
            if state.phase != TransitionState::Idle {
                return;
            }
            state.phase = TransitionState::Running;
            state.run += 1;
            state.started_at = Some(self.shared.scheduler.now());
            state.progress = 0.0;
            tracing::debug!(run = state.run, "transition started");
            state.run
        };
        tick(&self.shared, run);
    }

    /// Stops any run, rewinds progress to 0 and renders immediately.
    pub fn reset(&self) {
        let mut state = self.shared.state.borrow_mut();
        if state.phase == TransitionState::Destroyed {
            return;
        }
        state.phase = TransitionState::Idle;
        state.progress = 0.0;
        state.started_at = None;
        state.draw();
        tracing::debug!("transition reset");
    }

    /// Resizes the surface and recomputes aspect correction.
    ///
    /// Zero dimensions are clamped to 1; an unchanged size is ignored.
    pub fn set_size(&self, width: u32, height: u32) {
        let size = (width.max(1), height.max(1));
        {
            let mut state = self.shared.state.borrow_mut();
            if state.phase == TransitionState::Destroyed || state.backend.size() == size {
                return;
            }
            state.backend.resize(size.0, size.1);
        }
        update_aspect(&self.shared);
    }

    pub fn size(&self) -> (u32, u32) {
        self.shared.state.borrow().backend.size()
    }

    /// Draws the current progress once. Never schedules frames.
    pub fn render(&self) {
        render(&self.shared);
    }

    /// Releases every GPU resource. Idempotent.
    ///
    /// With `remove_from_tree` the surface is also shrunk to 1×1 and detached.
    pub fn destroy(&self, remove_from_tree: bool) {
        let listeners = {
            let mut state = self.shared.state.borrow_mut();
            if state.phase == TransitionState::Destroyed {
                return;
            }
            state.phase = TransitionState::Destroyed;
            if remove_from_tree {
                state.backend.resize(1, 1);
            }
            state.backend.release();
            if remove_from_tree {
                state.backend.detach();
            }
            std::mem::take(&mut state.texture_listeners)
        };
        for (texture, id) in listeners {
            texture.remove_listener(id);
        }
        self.shared.media.release();
        self.shared.mask.release();
        tracing::debug!(remove_from_tree, "transition destroyed");
    }

    pub fn duration(&self) -> Duration {
        self.shared.state.borrow().duration
    }

    /// Takes effect from the next tick of a running transition.
    pub fn set_duration(&self, duration: Duration) {
        self.shared.state.borrow_mut().duration = duration;
    }

    pub fn easing(&self) -> Easing {
        self.shared.state.borrow().easing
    }

    pub fn set_easing(&self, easing: Easing) {
        self.shared.state.borrow_mut().easing = easing;
    }

    pub fn dissolve_edges(&self) -> (f32, f32) {
        self.shared.state.borrow().dissolve_edges
    }

    /// Changes the smoothstep edges applied to the mask threshold.
    pub fn set_dissolve_edges(&self, low: f32, high: f32) -> Result<(), DissolveError> {
        if !low.is_finite() || !high.is_finite() || low >= high {
            return Err(DissolveError::InvalidConfig(format!(
                "dissolve edges must be finite with low < high (got {low}, {high})"
            )));
        }
        {
            let mut state = self.shared.state.borrow_mut();
            if state.phase == TransitionState::Destroyed {
                return Ok(());
            }
            state.dissolve_edges = (low, high);
            state.backend.set_dissolve_edges(low, high);
        }
        request_redraw(&self.shared);
        Ok(())
    }

    pub fn progress(&self) -> f32 {
        self.shared.state.borrow().progress
    }

    pub fn state(&self) -> TransitionState {
        self.shared.state.borrow().phase
    }

    pub fn is_running(&self) -> bool {
        self.state() == TransitionState::Running
    }

    pub fn media(&self) -> TextureSource {
        self.shared.media.source()
    }

    pub fn mask(&self) -> TextureSource {
        self.shared.mask.source()
    }

    /// Replaces the media source.
    pub fn set_media(&self, source: TextureSource) {
        if self.state() == TransitionState::Destroyed {
            return;
        }
        self.shared.media.set_source(source);
    }

    /// Replaces the mask source.
    pub fn set_mask(&self, source: TextureSource) {
        if self.state() == TransitionState::Destroyed {
            return;
        }
        self.shared.mask.set_source(source);
    }

    /// Registers `listener` for `transitionEnd`, fired once per completed run.
    pub fn on_transition_end<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TransitionEvent) + 'static,
    {
        self.shared.events.add_listener(TRANSITION_END, listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.events.remove_listener(TRANSITION_END, id)
    }

    pub fn has_listener(&self, id: ListenerId) -> bool {
        self.shared.events.has_listener(TRANSITION_END, id)
    }

    /// Reads back the last rendered frame when the backend supports it.
    pub fn snapshot(&self) -> Result<Option<RgbaImage>, DissolveError> {
        let mut state = self.shared.state.borrow_mut();
        if state.phase == TransitionState::Destroyed {
            return Ok(None);
        }
        state.backend.snapshot()
    }
}

impl Drop for DissolveTransition {
    fn drop(&mut self) {
        self.destroy(false);
    }
}

impl fmt::Debug for DissolveTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("DissolveTransition")
            .field("phase", &state.phase)
            .field("progress", &state.progress)
            .field("duration", &state.duration)
            .field("easing", &state.easing)
            .field("size", &state.backend.size())
            .finish()
    }
}

fn tick(shared: &Rc<Shared>, run: u64) {
    let finished = {
        let mut state = shared.state.borrow_mut();
        if state.phase != TransitionState::Running || state.run != run {
            return;
        }
        let elapsed = state
            .started_at
            .map(|start| shared.scheduler.now().saturating_duration_since(start))
            .unwrap_or_default();
        let sampled = progress_at(elapsed, state.duration, state.easing);
        state.progress = state.progress.max(sampled);
        state.draw();
        if state.progress >= 1.0 {
            state.phase = TransitionState::Idle;
            true
        } else {
            false
        }
    };

    if finished {
        tracing::debug!(run, "transition finished");
        shared.events.dispatch(&TransitionEvent::TransitionEnd);
    } else {
        let weak = Rc::downgrade(shared);
        shared
            .scheduler
            .schedule_frame(Box::new(move || with_shared(&weak, |shared| tick(shared, run))));
    }
}

fn render(shared: &Shared) {
    let mut state = shared.state.borrow_mut();
    if state.phase == TransitionState::Destroyed {
        return;
    }
    state.draw();
}

fn update_texture(shared: &Rc<Shared>) {
    {
        let mut state = shared.state.borrow_mut();
        if state.phase == TransitionState::Destroyed {
            return;
        }
        state.backend.bind_textures(&shared.media, &shared.mask);
    }
    update_aspect(shared);
}

fn update_aspect(shared: &Rc<Shared>) {
    {
        let mut state = shared.state.borrow_mut();
        if state.phase == TransitionState::Destroyed {
            return;
        }
        let (width, height) = state.backend.size();
        let surface_aspect = width.max(1) as f32 / height.max(1) as f32;
        let media_aspect = shared.media.source().aspect_ratio();
        state
            .backend
            .set_uv_scale(uv_scale(media_aspect, surface_aspect));
    }
    request_redraw(shared);
}

/// Schedules one deferred render while idle; running transitions redraw anyway.
fn request_redraw(shared: &Rc<Shared>) {
    {
        let mut state = shared.state.borrow_mut();
        if state.phase != TransitionState::Idle || state.redraw_pending {
            return;
        }
        state.redraw_pending = true;
    }
    let weak = Rc::downgrade(shared);
    shared.scheduler.schedule_frame(Box::new(move || {
        with_shared(&weak, |shared| {
            shared.state.borrow_mut().redraw_pending = false;
            render(shared);
        })
    }));
}

fn with_shared(weak: &Weak<Shared>, f: impl FnOnce(&Rc<Shared>)) {
    if let Some(shared) = weak.upgrade() {
        f(&shared);
    }
}

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dissolve::{
    DissolveTransition, FrameCallback, FrameScheduler, ImageLoader, TextureSource,
    TransitionConfig, WgpuBackend,
};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::cli::Args;
use crate::run::load_source;

/// How often the loop wakes while images are still being fetched.
const LOADER_POLL_INTERVAL: Duration = Duration::from_millis(16);

/// Frame clock driven by winit redraw requests.
struct WindowFrames {
    window: Arc<Window>,
    queue: RefCell<Vec<FrameCallback>>,
}

impl WindowFrames {
    fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            queue: RefCell::new(Vec::new()),
        }
    }

    /// Runs the callbacks queued before this frame. Anything they schedule
    /// waits for the next redraw.
    fn run_frame(&self) -> usize {
        let batch = std::mem::take(&mut *self.queue.borrow_mut());
        let count = batch.len();
        for callback in batch {
            callback();
        }
        count
    }
}

impl FrameScheduler for WindowFrames {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule_frame(&self, callback: FrameCallback) {
        self.queue.borrow_mut().push(callback);
        self.window.request_redraw();
    }
}

pub fn run_window(args: &Args, config: &TransitionConfig) -> Result<()> {
    let event_loop = EventLoopBuilder::new()
        .build()
        .context("failed to create event loop")?;

    let (width, height) = args.size;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Dissolve Preview")
            .with_inner_size(PhysicalSize::new(width, height))
            .with_transparent(true)
            .build(&event_loop)
            .context("failed to create preview window")?,
    );
    let size = window.inner_size();

    let hidden = window.clone();
    let backend = WgpuBackend::for_window(window.clone(), size.width.max(1), size.height.max(1))
        .context("failed to initialise renderer")?
        .with_detach_hook(move || hidden.set_visible(false));

    // Resampling needs decoded pixels, so `--fit` loads up front.
    let loader = ImageLoader::new();
    let (media, mask): (TextureSource, TextureSource) = if args.fit {
        (load_source(&args.media, true)?, load_source(&args.mask, true)?)
    } else {
        (
            loader.load(args.media.clone()).into(),
            loader.load(args.mask.clone()).into(),
        )
    };

    let frames = Rc::new(WindowFrames::new(window.clone()));
    let engine = DissolveTransition::new(backend, media, mask, frames.clone(), config)
        .context("failed to create dissolve transition")?;

    let restart = Rc::new(Cell::new(false));
    if args.repeat {
        let restart = restart.clone();
        engine.on_transition_end(move |_| restart.set(true));
    }

    tracing::info!("space restarts the transition, r resets it, escape quits");

    let mut started = false;
    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => {
                    engine.destroy(true);
                    elwt.exit();
                }
                WindowEvent::Resized(size) => {
                    engine.set_size(size.width, size.height);
                }
                WindowEvent::RedrawRequested => {
                    if frames.run_frame() == 0 {
                        engine.render();
                    }
                }
                WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            logical_key,
                            state: ElementState::Pressed,
                            repeat: false,
                            ..
                        },
                    ..
                } => match logical_key {
                    Key::Named(NamedKey::Escape) => {
                        engine.destroy(true);
                        elwt.exit();
                    }
                    Key::Named(NamedKey::Space) => {
                        engine.reset();
                        engine.start();
                        started = true;
                    }
                    Key::Character(ref text) if text.eq_ignore_ascii_case("r") => {
                        engine.reset();
                    }
                    _ => {}
                },
                _ => {}
            },
            Event::AboutToWait => {
                let completed = loader.pump();
                if completed > 0 {
                    tracing::debug!(completed, "image loads finished");
                }
                if !started && loader.is_idle() {
                    engine.start();
                    started = true;
                }
                if restart.replace(false) {
                    engine.reset();
                    engine.start();
                }
                if loader.is_idle() {
                    elwt.set_control_flow(ControlFlow::Wait);
                } else {
                    elwt.set_control_flow(ControlFlow::WaitUntil(
                        Instant::now() + LOADER_POLL_INTERVAL,
                    ));
                }
            }
            _ => {}
        })
        .context("event loop terminated with an error")
}

use std::cell::{Cell, RefCell};
use std::fmt;
use std::time::{Duration, Instant};

/// Work queued for the next frame.
pub type FrameCallback = Box<dyn FnOnce()>;

/// Abstraction over the host's frame clock.
///
/// Callbacks must run on the thread that owns the engine, one frame after
/// they were scheduled, never synchronously inside `schedule_frame`.
pub trait FrameScheduler {
    /// Timestamp of the current frame.
    fn now(&self) -> Instant;
    /// Queues `callback` to run on the next frame.
    fn schedule_frame(&self, callback: FrameCallback);
}

/// Scheduler stepped by hand.
///
/// The clock only moves through [`ManualScheduler::advance`], which makes it
/// suitable for tests and for rendering stills at an exact timestamp.
pub struct ManualScheduler {
    now: Cell<Instant>,
    queue: RefCell<Vec<FrameCallback>>,
    frames: Cell<u64>,
}

impl ManualScheduler {
    /// Creates a scheduler whose clock starts at `Instant::now()`.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Creates a scheduler whose clock starts at `origin`.
    pub fn starting_at(origin: Instant) -> Self {
        Self {
            now: Cell::new(origin),
            queue: RefCell::new(Vec::new()),
            frames: Cell::new(0),
        }
    }

    /// Moves the clock forward without running any callback.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    /// Number of callbacks waiting for the next frame.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Number of frames run so far.
    pub fn frames_run(&self) -> u64 {
        self.frames.get()
    }

    /// Runs every callback queued before this call and returns how many ran.
    ///
    /// Callbacks scheduled while the frame runs wait for the next one.
    pub fn run_frame(&self) -> usize {
        let batch = std::mem::take(&mut *self.queue.borrow_mut());
        let count = batch.len();
        for callback in batch {
            callback();
        }
        self.frames.set(self.frames.get().saturating_add(1));
        count
    }

    /// Advances the clock by `by`, then runs one frame.
    pub fn step(&self, by: Duration) -> usize {
        self.advance(by);
        self.run_frame()
    }

    /// Steps until the queue drains or `max_frames` frames ran; returns the frame count.
    pub fn run_until_idle(&self, by: Duration, max_frames: usize) -> usize {
        let mut frames = 0;
        while self.pending() > 0 && frames < max_frames {
            self.step(by);
            frames += 1;
        }
        frames
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler for ManualScheduler {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn schedule_frame(&self, callback: FrameCallback) {
        self.queue.borrow_mut().push(callback);
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .field("frames_run", &self.frames_run())
            .finish()
    }
}

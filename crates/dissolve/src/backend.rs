use std::cell::RefCell;
use std::rc::Rc;

use image::RgbaImage;

use crate::error::DissolveError;
use crate::texture::{TextureDevice, TextureResource};

/// Drawing surface plus rendering context the engine renders through.
pub trait Backend {
    /// Device used for texture uploads; `None` runs textures headless.
    fn texture_device(&self) -> Option<TextureDevice>;
    /// Current surface size in physical pixels.
    fn size(&self) -> (u32, u32);
    /// Resizes the surface and viewport.
    fn resize(&mut self, width: u32, height: u32);
    fn set_dissolve_edges(&mut self, low: f32, high: f32);
    fn set_uv_scale(&mut self, uv_scale: [f32; 2]);
    /// Binds the media and mask textures for subsequent draws.
    fn bind_textures(&mut self, media: &TextureResource, mask: &TextureResource);
    /// Clears to transparent black and draws the dissolve at `progress`.
    fn draw(&mut self, progress: f32) -> Result<(), DissolveError>;
    /// Frees every GPU object the backend owns. Later calls must be no-ops.
    fn release(&mut self);
    /// Removes the surface from wherever it is displayed.
    fn detach(&mut self) {}
    /// Reads back the last drawn frame when the target supports it.
    fn snapshot(&mut self) -> Result<Option<RgbaImage>, DissolveError> {
        Ok(None)
    }
}

/// Operation recorded by [`HeadlessBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOp {
    Resize { width: u32, height: u32 },
    DissolveEdges { low: f32, high: f32 },
    UvScale([f32; 2]),
    BindTextures,
    Draw { progress: f32 },
    Release,
    Detach,
}

/// Shared view of the operations a [`HeadlessBackend`] performed.
#[derive(Debug, Clone, Default)]
pub struct BackendLog {
    ops: Rc<RefCell<Vec<BackendOp>>>,
}

impl BackendLog {
    pub fn ops(&self) -> Vec<BackendOp> {
        self.ops.borrow().clone()
    }

    pub fn clear(&self) {
        self.ops.borrow_mut().clear();
    }

    pub fn draws(&self) -> Vec<f32> {
        self.ops
            .borrow()
            .iter()
            .filter_map(|op| match op {
                BackendOp::Draw { progress } => Some(*progress),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&BackendOp) -> bool) -> usize {
        self.ops.borrow().iter().filter(|op| predicate(op)).count()
    }

    pub fn last_uv_scale(&self) -> Option<[f32; 2]> {
        self.ops.borrow().iter().rev().find_map(|op| match op {
            BackendOp::UvScale(scale) => Some(*scale),
            _ => None,
        })
    }

    fn push(&self, op: BackendOp) {
        self.ops.borrow_mut().push(op);
    }
}

/// Backend that performs no GPU work and records what it was asked to do.
#[derive(Debug)]
pub struct HeadlessBackend {
    size: (u32, u32),
    log: BackendLog,
    released: bool,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width.max(1), height.max(1)),
            log: BackendLog::default(),
            released: false,
        }
    }

    pub fn log(&self) -> BackendLog {
        self.log.clone()
    }
}

impl Backend for HeadlessBackend {
    fn texture_device(&self) -> Option<TextureDevice> {
        None
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.log.push(BackendOp::Resize { width, height });
    }

    fn set_dissolve_edges(&mut self, low: f32, high: f32) {
        self.log.push(BackendOp::DissolveEdges { low, high });
    }

    fn set_uv_scale(&mut self, uv_scale: [f32; 2]) {
        self.log.push(BackendOp::UvScale(uv_scale));
    }

    fn bind_textures(&mut self, _media: &TextureResource, _mask: &TextureResource) {
        self.log.push(BackendOp::BindTextures);
    }

    fn draw(&mut self, progress: f32) -> Result<(), DissolveError> {
        self.log.push(BackendOp::Draw { progress });
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.log.push(BackendOp::Release);
    }

    fn detach(&mut self) {
        self.log.push(BackendOp::Detach);
    }
}

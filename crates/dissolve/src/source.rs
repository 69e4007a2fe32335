//! Pixel sources the engine can sample from.
//!
//! Sources are reference-counted handles owned by the caller. The engine only
//! reads them and never frees them; cloning a source clones the handle, and two
//! handles compare equal through [`TextureSource::same_source`] when they point
//! at the same underlying pixels.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use image::RgbaImage;

use crate::events::{EventDispatcher, ListenerId, NamedEvent, LOAD};

/// Image, canvas, or video frame feeding one of the engine's textures.
#[derive(Clone, Debug)]
pub enum TextureSource {
    /// Decoded asynchronously; natural dimensions are zero until decoding completes.
    Image(ImageSource),
    /// An in-memory bitmap, always ready.
    Canvas(CanvasSource),
    /// The current frame of a video, always considered ready.
    Video(VideoSource),
}

impl TextureSource {
    /// Natural pixel dimensions, `(0, 0)` while nothing is decoded.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            TextureSource::Image(image) => (image.natural_width(), image.natural_height()),
            TextureSource::Canvas(canvas) => (canvas.width(), canvas.height()),
            TextureSource::Video(video) => video
                .current_frame()
                .map_or((0, 0), |frame| frame.dimensions()),
        }
    }

    /// Canvas and video sources are always ready; images once decoded.
    pub fn is_ready(&self) -> bool {
        match self {
            TextureSource::Image(image) => image.natural_width() != 0,
            TextureSource::Canvas(_) | TextureSource::Video(_) => true,
        }
    }

    /// Width over height used for aspect correction.
    ///
    /// Videos and undecoded images report a square aspect.
    pub fn aspect_ratio(&self) -> f32 {
        let (width, height) = match self {
            TextureSource::Image(image) if image.is_decoded() => {
                (image.natural_width(), image.natural_height())
            }
            TextureSource::Canvas(canvas) => (canvas.width(), canvas.height()),
            _ => return 1.0,
        };
        if width == 0 || height == 0 {
            return 1.0;
        }
        width as f32 / height as f32
    }

    /// Current pixels, if any are available.
    pub fn pixels(&self) -> Option<Rc<RgbaImage>> {
        match self {
            TextureSource::Image(image) => image.pixels(),
            TextureSource::Canvas(canvas) => Some(canvas.pixels()),
            TextureSource::Video(video) => video.current_frame(),
        }
    }

    pub fn same_source(&self, other: &TextureSource) -> bool {
        match (self, other) {
            (TextureSource::Image(a), TextureSource::Image(b)) => a.ptr_eq(b),
            (TextureSource::Canvas(a), TextureSource::Canvas(b)) => Rc::ptr_eq(&a.pixels, &b.pixels),
            (TextureSource::Video(a), TextureSource::Video(b)) => Rc::ptr_eq(&a.frame, &b.frame),
            _ => false,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            TextureSource::Image(_) => "image",
            TextureSource::Canvas(_) => "canvas",
            TextureSource::Video(_) => "video",
        }
    }
}

impl From<ImageSource> for TextureSource {
    fn from(value: ImageSource) -> Self {
        TextureSource::Image(value)
    }
}

impl From<CanvasSource> for TextureSource {
    fn from(value: CanvasSource) -> Self {
        TextureSource::Canvas(value)
    }
}

impl From<VideoSource> for TextureSource {
    fn from(value: VideoSource) -> Self {
        TextureSource::Video(value)
    }
}

impl From<RgbaImage> for TextureSource {
    fn from(value: RgbaImage) -> Self {
        TextureSource::Canvas(CanvasSource::new(value))
    }
}

/// Notification emitted by an [`ImageSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEvent {
    Loaded,
}

impl NamedEvent for ImageEvent {
    fn name(&self) -> &'static str {
        match self {
            ImageEvent::Loaded => LOAD,
        }
    }
}

#[derive(Clone)]
pub struct ImageSource {
    inner: Rc<ImageInner>,
}

struct ImageInner {
    origin: Option<String>,
    pixels: RefCell<Option<Rc<RgbaImage>>>,
    events: EventDispatcher<ImageEvent>,
}

impl ImageSource {
    /// An image whose pixels will arrive later through [`ImageSource::complete`].
    pub fn pending() -> Self {
        Self::build(None, None)
    }

    /// Like [`ImageSource::pending`], remembering where the pixels come from.
    pub fn pending_from(origin: impl Into<String>) -> Self {
        Self::build(Some(origin.into()), None)
    }

    pub fn decoded(pixels: RgbaImage) -> Self {
        Self::build(None, Some(Rc::new(pixels)))
    }

    pub(crate) fn decoded_from(origin: impl Into<String>, pixels: RgbaImage) -> Self {
        Self::build(Some(origin.into()), Some(Rc::new(pixels)))
    }

    fn build(origin: Option<String>, pixels: Option<Rc<RgbaImage>>) -> Self {
        Self {
            inner: Rc::new(ImageInner {
                origin,
                pixels: RefCell::new(pixels),
                events: EventDispatcher::new(),
            }),
        }
    }

    pub fn origin(&self) -> Option<&str> {
        self.inner.origin.as_deref()
    }

    pub fn is_decoded(&self) -> bool {
        self.natural_width() != 0
    }

    pub fn natural_width(&self) -> u32 {
        self.inner.pixels.borrow().as_ref().map_or(0, |p| p.width())
    }

    pub fn natural_height(&self) -> u32 {
        self.inner.pixels.borrow().as_ref().map_or(0, |p| p.height())
    }

    pub fn pixels(&self) -> Option<Rc<RgbaImage>> {
        self.inner.pixels.borrow().clone()
    }

    /// Stores decoded pixels and notifies `load` listeners.
    pub fn complete(&self, pixels: RgbaImage) {
        self.inner.pixels.replace(Some(Rc::new(pixels)));
        self.inner.events.dispatch(&ImageEvent::Loaded);
    }

    pub fn on_load<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ImageEvent) + 'static,
    {
        self.inner.events.add_listener(LOAD, listener)
    }

    pub fn remove_load_listener(&self, id: ListenerId) -> bool {
        self.inner.events.remove_listener(LOAD, id)
    }

    pub fn has_load_listener(&self, id: ListenerId) -> bool {
        self.inner.events.has_listener(LOAD, id)
    }

    pub fn ptr_eq(&self, other: &ImageSource) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSource")
            .field("origin", &self.inner.origin)
            .field("natural_width", &self.natural_width())
            .field("natural_height", &self.natural_height())
            .finish()
    }
}

#[derive(Clone)]
pub struct CanvasSource {
    pixels: Rc<RgbaImage>,
}

impl CanvasSource {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels: Rc::new(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> Rc<RgbaImage> {
        self.pixels.clone()
    }
}

impl fmt::Debug for CanvasSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanvasSource")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// A video's current frame. Frames are pushed by the caller's decoder.
#[derive(Clone, Default)]
pub struct VideoSource {
    frame: Rc<RefCell<Option<Rc<RgbaImage>>>>,
}

impl VideoSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_frame(&self, frame: RgbaImage) {
        self.frame.replace(Some(Rc::new(frame)));
    }

    pub fn current_frame(&self) -> Option<Rc<RgbaImage>> {
        self.frame.borrow().clone()
    }
}

impl fmt::Debug for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dimensions = self.current_frame().map(|frame| frame.dimensions());
        f.debug_struct("VideoSource")
            .field("frame", &dimensions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn pending_image_is_not_ready_until_completed() {
        let image = ImageSource::pending();
        let source = TextureSource::from(image.clone());
        assert!(!source.is_ready());
        assert_eq!(source.dimensions(), (0, 0));

        image.complete(RgbaImage::new(8, 4));
        assert!(source.is_ready());
        assert_eq!(source.dimensions(), (8, 4));
    }

    #[test]
    fn canvas_and_video_are_always_ready() {
        assert!(TextureSource::from(RgbaImage::new(3, 3)).is_ready());
        let video = VideoSource::new();
        assert!(TextureSource::from(video.clone()).is_ready());
        assert!(video.current_frame().is_none());
    }

    #[test]
    fn aspect_ratio_follows_source_kind() {
        let wide = TextureSource::from(RgbaImage::new(200, 100));
        assert!((wide.aspect_ratio() - 2.0).abs() < 1e-6);

        let image = TextureSource::from(ImageSource::decoded(RgbaImage::new(100, 400)));
        assert!((image.aspect_ratio() - 0.25).abs() < 1e-6);

        let pending = TextureSource::from(ImageSource::pending());
        assert_eq!(pending.aspect_ratio(), 1.0);

        let video = VideoSource::new();
        video.set_frame(RgbaImage::new(1920, 1080));
        assert_eq!(TextureSource::from(video).aspect_ratio(), 1.0);
    }

    #[test]
    fn complete_notifies_load_listeners() {
        let image = ImageSource::pending();
        let fired = Rc::new(Cell::new(0));
        let id = {
            let fired = fired.clone();
            image.on_load(move |_| fired.set(fired.get() + 1))
        };
        assert!(image.has_load_listener(id));
        image.complete(RgbaImage::new(1, 1));
        assert_eq!(fired.get(), 1);
        assert!(image.remove_load_listener(id));
        image.complete(RgbaImage::new(2, 2));
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn same_source_compares_handles() {
        let image = ImageSource::pending();
        let a = TextureSource::from(image.clone());
        let b = TextureSource::from(image);
        let c = TextureSource::from(ImageSource::pending());
        assert!(a.same_source(&b));
        assert!(!a.same_source(&c));
        let canvas = CanvasSource::new(RgbaImage::new(1, 1));
        assert!(TextureSource::from(canvas.clone()).same_source(&TextureSource::from(canvas)));
    }
}

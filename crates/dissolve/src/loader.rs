//! Fetching and decoding images from paths and URLs.
//!
//! [`load_image_from_url`] blocks the caller. [`ImageLoader`] fetches on worker
//! threads and hands decoded pixels back to the frame thread through
//! [`ImageLoader::pump`], where the pending [`ImageSource`] completes and fires
//! its `load` notification.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use image::RgbaImage;
use reqwest::blocking::Client;
use reqwest::Url;

use crate::error::DissolveError;
use crate::source::ImageSource;

/// Fetches and decodes an image, blocking until it is ready.
///
/// Accepts `http(s)://` URLs, `file://` URLs and plain filesystem paths.
pub fn load_image_from_url(url: &str) -> Result<ImageSource, DissolveError> {
    let pixels = fetch_and_decode(url).map_err(|err| DissolveError::load(url, err))?;
    Ok(ImageSource::decoded_from(url, pixels))
}

enum Location {
    Remote(Url),
    File(PathBuf),
}

fn resolve(location: &str) -> Result<Location> {
    if let Ok(url) = Url::parse(location) {
        match url.scheme() {
            "http" | "https" => return Ok(Location::Remote(url)),
            "file" => {
                return url
                    .to_file_path()
                    .map(Location::File)
                    .map_err(|_| anyhow!("'{location}' is not a valid file url"));
            }
            // Drive letters such as `C:` parse as single-letter schemes.
            scheme if scheme.len() > 1 => bail!("unsupported url scheme '{scheme}'"),
            _ => {}
        }
    }
    Ok(Location::File(PathBuf::from(location)))
}

fn fetch_bytes(location: &str) -> Result<Vec<u8>> {
    match resolve(location)? {
        Location::Remote(url) => {
            tracing::debug!(%url, "fetching image");
            let response = Client::builder()
                .build()?
                .get(url.clone())
                .send()
                .with_context(|| format!("requesting {url}"))?
                .error_for_status()
                .with_context(|| format!("{url} returned an error status"))?;
            Ok(response.bytes()?.to_vec())
        }
        Location::File(path) => {
            tracing::debug!(path = %path.display(), "reading image");
            fs::read(&path).with_context(|| format!("reading {}", path.display()))
        }
    }
}

fn fetch_and_decode(location: &str) -> Result<RgbaImage> {
    let bytes = fetch_bytes(location)?;
    let decoded = image::load_from_memory(&bytes).context("decoding image")?;
    Ok(decoded.to_rgba8())
}

struct Completion {
    id: u64,
    result: Result<RgbaImage>,
}

/// Background image loader whose completions are delivered on the caller's thread.
pub struct ImageLoader {
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
    in_flight: RefCell<HashMap<u64, ImageSource>>,
    next_id: Cell<u64>,
}

impl ImageLoader {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            in_flight: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }

    /// Starts loading `url` and returns a pending image for it.
    ///
    /// The image completes during a later [`ImageLoader::pump`]. Failed loads
    /// are logged and leave the image pending.
    pub fn load(&self, url: impl Into<String>) -> ImageSource {
        let url = url.into();
        let image = ImageSource::pending_from(url.clone());
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.in_flight.borrow_mut().insert(id, image.clone());

        let sender = self.sender.clone();
        let spawned = thread::Builder::new()
            .name("dissolve-loader".into())
            .spawn(move || {
                let result = fetch_and_decode(&url);
                let _ = sender.send(Completion { id, result });
            });
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "failed to spawn image loader thread");
            self.in_flight.borrow_mut().remove(&id);
        }
        image
    }

    /// Completes every image whose fetch has finished; returns how many succeeded.
    pub fn pump(&self) -> usize {
        let mut completed = 0;
        while let Ok(completion) = self.receiver.try_recv() {
            if self.finish(completion) {
                completed += 1;
            }
        }
        completed
    }

    /// Waits up to `timeout` for at least one fetch to finish, then pumps.
    pub fn wait(&self, timeout: Duration) -> usize {
        if self.is_idle() {
            return 0;
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(completion) => usize::from(self.finish(completion)) + self.pump(),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }

    fn finish(&self, completion: Completion) -> bool {
        let Some(image) = self.in_flight.borrow_mut().remove(&completion.id) else {
            return false;
        };
        match completion.result {
            Ok(pixels) => {
                tracing::debug!(
                    origin = image.origin().unwrap_or_default(),
                    width = pixels.width(),
                    height = pixels.height(),
                    "image decoded"
                );
                image.complete(pixels);
                true
            }
            Err(err) => {
                tracing::warn!(
                    origin = image.origin().unwrap_or_default(),
                    error = %format!("{err:#}"),
                    "failed to load image; keeping placeholder"
                );
                false
            }
        }
    }
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

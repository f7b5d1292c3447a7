//! Load states of rasters and handles to rasters that are loaded asynchronously.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use meridian_types::cartesian::Rect;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::decoded_image::DecodedImage;

/// State of a raster image or tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadState {
    /// Loading has not been requested yet.
    Idle,
    /// Loading is in progress.
    Loading,
    /// Image is available.
    Loaded,
    /// Loading failed.
    Error,
    /// There is no data for this raster.
    Empty,
}

impl LoadState {
    /// Returns true if the state cannot change anymore.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadState::Loaded | LoadState::Error | LoadState::Empty)
    }
}

/// Raster image (or tile) in some projection that can be loaded on request.
///
/// State changes are published through a [`watch`] channel. Dropping the receiver returned by
/// [`RasterHandle::subscribe`] is all that is needed to stop listening.
pub trait RasterHandle: Send + Sync {
    /// Current state.
    fn state(&self) -> LoadState;
    /// Extent covered by the image.
    fn extent(&self) -> Rect;
    /// Size of one nominal pixel in projection units.
    fn resolution(&self) -> f64;
    /// Number of image pixels per nominal pixel.
    fn pixel_ratio(&self) -> f64;
    /// Image data. Only available in [`LoadState::Loaded`] state.
    fn image(&self) -> Option<Arc<DecodedImage>>;
    /// Starts loading. Does nothing unless the state is [`LoadState::Idle`].
    fn load(&self);
    /// Subscribes to state changes.
    fn subscribe(&self) -> watch::Receiver<LoadState>;
}

type FetchFn = Box<dyn FnOnce(RasterCompleter) + Send>;

struct Shared {
    state: watch::Sender<LoadState>,
    image: Mutex<Option<Arc<DecodedImage>>>,
}

impl Shared {
    fn new(state: LoadState, image: Option<Arc<DecodedImage>>) -> Arc<Self> {
        let (state, _) = watch::channel(state);
        Arc::new(Self {
            state,
            image: Mutex::new(image),
        })
    }
}

/// [`RasterHandle`] whose data is obtained by a fetch function.
///
/// The fetch function is called once, on the first [`load`](RasterHandle::load) call, with a
/// [`RasterCompleter`] that must be resolved when the data is ready. It may resolve it right
/// away, or move it into an async task.
pub struct LoadableRaster {
    extent: Rect,
    resolution: f64,
    pixel_ratio: f64,
    fetch: Mutex<Option<FetchFn>>,
    shared: Arc<Shared>,
}

impl Debug for LoadableRaster {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadableRaster")
            .field("extent", &self.extent)
            .field("resolution", &self.resolution)
            .field("state", &self.state())
            .finish()
    }
}

impl LoadableRaster {
    /// Creates an idle raster.
    pub fn new(
        extent: Rect,
        resolution: f64,
        pixel_ratio: f64,
        fetch: impl FnOnce(RasterCompleter) + Send + 'static,
    ) -> Self {
        Self {
            extent,
            resolution,
            pixel_ratio,
            fetch: Mutex::new(Some(Box::new(fetch))),
            shared: Shared::new(LoadState::Idle, None),
        }
    }

    /// Creates a raster that is already loaded.
    pub fn loaded(extent: Rect, resolution: f64, pixel_ratio: f64, image: DecodedImage) -> Self {
        Self {
            extent,
            resolution,
            pixel_ratio,
            fetch: Mutex::new(None),
            shared: Shared::new(LoadState::Loaded, Some(Arc::new(image))),
        }
    }

    /// Creates a raster without data.
    pub fn empty(extent: Rect, resolution: f64, pixel_ratio: f64) -> Self {
        Self {
            extent,
            resolution,
            pixel_ratio,
            fetch: Mutex::new(None),
            shared: Shared::new(LoadState::Empty, None),
        }
    }
}

impl RasterHandle for LoadableRaster {
    fn state(&self) -> LoadState {
        *self.shared.state.borrow()
    }

    fn extent(&self) -> Rect {
        self.extent
    }

    fn resolution(&self) -> f64 {
        self.resolution
    }

    fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    fn image(&self) -> Option<Arc<DecodedImage>> {
        self.shared.image.lock().clone()
    }

    fn load(&self) {
        let Some(fetch) = self.fetch.lock().take() else {
            return;
        };

        self.shared.state.send_replace(LoadState::Loading);
        fetch(RasterCompleter {
            shared: Some(self.shared.clone()),
        });
    }

    fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.shared.state.subscribe()
    }
}

/// Resolves the load of a [`LoadableRaster`]. A completer that is dropped without being resolved
/// puts the raster into [`LoadState::Error`].
pub struct RasterCompleter {
    shared: Option<Arc<Shared>>,
}

impl RasterCompleter {
    /// Sets the image and moves the raster into [`LoadState::Loaded`].
    pub fn loaded(mut self, image: DecodedImage) {
        self.finish(LoadState::Loaded, Some(Arc::new(image)));
    }

    /// Moves the raster into [`LoadState::Error`].
    pub fn failed(mut self) {
        self.finish(LoadState::Error, None);
    }

    /// Moves the raster into [`LoadState::Empty`].
    pub fn empty(mut self) {
        self.finish(LoadState::Empty, None);
    }

    fn finish(&mut self, state: LoadState, image: Option<Arc<DecodedImage>>) {
        if let Some(shared) = self.shared.take() {
            *shared.image.lock() = image;
            shared.state.send_replace(state);
        }
    }
}

impl Drop for RasterCompleter {
    fn drop(&mut self) {
        self.finish(LoadState::Error, None);
    }
}

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use meridian_types::cartesian::Rect;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::{start_loading, ReprojectionContext};
use crate::decoded_image::DecodedImage;
use crate::error::MeridianError;
use crate::handle::{LoadState, RasterHandle};
use crate::render::{WarpRequest, WarpSource};
use crate::resolution::calculate_source_resolution;
use crate::triangulation::Triangulation;

/// Single image in the target projection, resampled from one source image.
///
/// The source image is requested on construction, but is loaded only when [`load`] is called.
/// The owner is expected to call [`update`] when the source changes its state (or to await
/// [`loaded`]); the image is reprojected once, when the source reaches a terminal state.
///
/// [`load`]: RasterHandle::load
/// [`update`]: ReprojectedImage::update
/// [`loaded`]: ReprojectedImage::loaded
pub struct ReprojectedImage {
    context: ReprojectionContext,
    target_extent: Rect,
    target_resolution: f64,
    pixel_ratio: f64,
    source_resolution: f64,
    triangulation: Option<Triangulation>,
    source: Option<Arc<dyn RasterHandle>>,
    state: watch::Sender<LoadState>,
    inner: Mutex<ImageInner>,
}

#[derive(Default)]
struct ImageInner {
    image: Option<Arc<DecodedImage>>,
    source_state: Option<watch::Receiver<LoadState>>,
    disposed: bool,
}

impl Debug for ReprojectedImage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReprojectedImage")
            .field("target_extent", &self.target_extent)
            .field("target_resolution", &self.target_resolution)
            .field("source_resolution", &self.source_resolution)
            .field("state", &self.state())
            .finish()
    }
}

impl ReprojectedImage {
    /// Prepares the reprojection of the `target_extent` at `target_resolution`.
    ///
    /// `get_image` is called at most once with the source extent, source resolution and pixel
    /// ratio, and returns the source image covering them. If the target extent does not overlap
    /// the target projection, or no usable source exists, the image is created in the
    /// [`LoadState::Empty`] state.
    ///
    /// Returns an error if the projections of the context cannot be related to each other.
    pub fn new(
        context: &ReprojectionContext,
        target_extent: Rect,
        target_resolution: f64,
        pixel_ratio: f64,
        get_image: impl FnOnce(&Rect, f64, f64) -> Option<Arc<dyn RasterHandle>>,
    ) -> Result<Self, MeridianError> {
        let mut image = Self {
            context: context.clone(),
            target_extent,
            target_resolution,
            pixel_ratio,
            source_resolution: f64::NAN,
            triangulation: None,
            source: None,
            state: watch::channel(LoadState::Empty).0,
            inner: Mutex::new(ImageInner::default()),
        };

        let clipped = match context.target().extent() {
            Some(limit) => target_extent.intersection(limit),
            None => Some(target_extent),
        };
        let Some(clipped) = clipped.filter(|extent| extent.area() > 0.0) else {
            log::debug!("Target extent {target_extent:?} is outside of the target projection");
            return Ok(image);
        };

        let source_resolution = calculate_source_resolution(
            context.registry(),
            context.source(),
            context.target(),
            &clipped.center(),
            target_resolution,
        )?;
        image.source_resolution = source_resolution;
        if !(source_resolution.is_finite() && source_resolution > 0.0) {
            return Ok(image);
        }

        let max_source_extent = context.source().extent();
        let triangulation = Triangulation::new(
            context.registry(),
            context.source(),
            context.target(),
            clipped,
            max_source_extent,
            source_resolution * context.options().error_threshold,
        )?;

        let mut source_extent = triangulation.calculate_source_extent();
        if !triangulation.wraps_x_in_source() {
            if let Some(limit) = max_source_extent {
                source_extent = source_extent.and_then(|extent| extent.intersection(limit));
            }
        }
        image.triangulation = Some(triangulation);

        let Some(source_extent) = source_extent.filter(|extent| extent.area() > 0.0) else {
            return Ok(image);
        };

        if let Some(source) = get_image(&source_extent, source_resolution, pixel_ratio) {
            image.source = Some(source);
            image.state.send_replace(LoadState::Idle);
        }

        Ok(image)
    }

    /// Resolution of the source image.
    pub fn source_resolution(&self) -> f64 {
        self.source_resolution
    }

    /// Source image, if one was requested.
    pub fn source(&self) -> Option<&Arc<dyn RasterHandle>> {
        self.source.as_ref()
    }

    /// Mesh used to resample the source image.
    pub fn triangulation(&self) -> Option<&Triangulation> {
        self.triangulation.as_ref()
    }

    /// Reprojects the source image if it finished loading. Does nothing unless the image is in
    /// the [`LoadState::Loading`] state.
    pub fn update(&self) {
        let mut inner = self.inner.lock();
        if inner.disposed || self.state() != LoadState::Loading {
            return;
        }

        let Some(source) = &self.source else {
            return;
        };
        let source_state = source.state();
        if !source_state.is_terminal() {
            return;
        }

        inner.source_state = None;
        let (state, image) = self.reproject(source_state, source.as_ref());
        inner.image = image;
        self.state.send_replace(state);
        drop(inner);

        log::debug!(
            "Reprojected image {:?} finished with state {state:?}",
            self.target_extent
        );
    }

    /// Waits until the source image reaches a terminal state and reprojects it.
    pub async fn loaded(&self) -> LoadState {
        let receiver = self.inner.lock().source_state.clone();
        if let Some(mut receiver) = receiver {
            let _ = receiver.wait_for(LoadState::is_terminal).await;
        }

        self.update();
        self.state()
    }

    /// Stops listening to the source image. The state of the image does not change after this
    /// call.
    pub fn dispose(&self) {
        let mut inner = self.inner.lock();
        inner.disposed = true;
        inner.source_state = None;
    }

    fn reproject(
        &self,
        source_state: LoadState,
        source: &dyn RasterHandle,
    ) -> (LoadState, Option<Arc<DecodedImage>>) {
        if source_state != LoadState::Loaded {
            return (source_state, None);
        }

        let (Some(triangulation), Some(source_image)) = (&self.triangulation, source.image())
        else {
            return (LoadState::Error, None);
        };

        let pixel_ratio = source.pixel_ratio();
        let width = (pixel_ratio * self.target_extent.width() / self.target_resolution).round();
        let height = (pixel_ratio * self.target_extent.height() / self.target_resolution).round();

        let sources = [WarpSource {
            extent: source.extent(),
            image: source_image,
        }];
        let options = self.context.options();
        let request = WarpRequest {
            width: width as u32,
            height: height as u32,
            pixel_ratio,
            source_resolution: source.resolution(),
            max_source_extent: self.context.source().extent(),
            target_resolution: self.target_resolution,
            target_extent: self.target_extent,
            triangulation,
            sources: &sources,
            gutter: 0,
            interpolate: options.interpolate,
            render_edges: options.render_edges,
        };

        let image = self.context.warp().warp(&request);
        (LoadState::Loaded, Some(Arc::new(image)))
    }
}

impl RasterHandle for ReprojectedImage {
    fn state(&self) -> LoadState {
        *self.state.borrow()
    }

    fn extent(&self) -> Rect {
        self.target_extent
    }

    fn resolution(&self) -> f64 {
        self.target_resolution
    }

    fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    fn image(&self) -> Option<Arc<DecodedImage>> {
        self.inner.lock().image.clone()
    }

    fn load(&self) {
        let Some(source) = &self.source else {
            return;
        };

        let pending = {
            let mut inner = self.inner.lock();
            if inner.disposed || !start_loading(&self.state) {
                return;
            }

            let pending = !source.state().is_terminal();
            if pending {
                inner.source_state = Some(source.subscribe());
            }
            pending
        };

        if pending {
            source.load();
        }
        self.update();
    }

    fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.state.subscribe()
    }
}

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use meridian_types::cartesian::Rect;

use super::provider::ImageProvider;
use super::{ImageEntry, RasterEntry};
use crate::error::MeridianError;
use crate::handle::{LoadableRaster, RasterHandle};
use crate::messenger::Messenger;
use crate::reproj::{ReprojectedImage, ReprojectionContext};

/// Source of single images (for example a WMS service) that reprojects the images of the
/// provider if they are in another projection.
pub struct ReprojectingImageSource {
    provider: Arc<dyn ImageProvider>,
    context: ReprojectionContext,
    messenger: Option<Arc<dyn Messenger>>,
}

impl Debug for ReprojectingImageSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReprojectingImageSource")
            .field("context", &self.context)
            .finish()
    }
}

impl ReprojectingImageSource {
    /// Creates a source that loads images in the source projection of the `context` and returns
    /// them in its target projection.
    pub fn new(provider: impl ImageProvider + 'static, context: ReprojectionContext) -> Self {
        Self {
            provider: Arc::new(provider),
            context,
            messenger: None,
        }
    }

    /// Sets the messenger that is notified when a source image is loaded.
    pub fn with_messenger(mut self, messenger: impl Messenger + 'static) -> Self {
        self.messenger = Some(Arc::new(messenger));
        self
    }

    /// Reprojection context.
    pub fn context(&self) -> &ReprojectionContext {
        &self.context
    }

    /// Image covering the `extent` in the target projection.
    pub fn get_image(
        &self,
        extent: Rect,
        resolution: f64,
        pixel_ratio: f64,
    ) -> Result<ImageEntry, MeridianError> {
        if self.context.is_identity() {
            return Ok(RasterEntry::Direct(
                self.source_image(extent, resolution, pixel_ratio),
            ));
        }

        let image = ReprojectedImage::new(
            &self.context,
            extent,
            resolution,
            pixel_ratio,
            |source_extent, source_resolution, pixel_ratio| {
                Some(self.source_image(*source_extent, source_resolution, pixel_ratio))
            },
        )?;

        Ok(RasterEntry::Reprojected(Arc::new(image)))
    }

    fn source_image(
        &self,
        extent: Rect,
        resolution: f64,
        pixel_ratio: f64,
    ) -> Arc<dyn RasterHandle> {
        let provider = self.provider.clone();
        let messenger = self.messenger.clone();
        Arc::new(LoadableRaster::new(
            extent,
            resolution,
            pixel_ratio,
            move |completer| {
                crate::async_runtime::spawn(async move {
                    match provider.load(extent, resolution, pixel_ratio).await {
                        Ok(image) => completer.loaded(image),
                        Err(MeridianError::NotFound) => completer.empty(),
                        Err(err) => {
                            log::debug!("Failed to load image {extent:?}: {err}");
                            completer.failed();
                        }
                    }

                    if let Some(messenger) = messenger {
                        messenger.request_redraw();
                    }
                });
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use meridian_types::cartesian::Size;
    use parking_lot::Mutex;

    use super::*;
    use crate::decoded_image::DecodedImage;
    use crate::handle::LoadState;
    use crate::registry::{ProjectionRegistry, EPSG_3857, EPSG_4326};
    use crate::reproj::test_utils::CountingWarp;

    const GREEN: [u8; 4] = [0, 255, 0, 255];

    #[derive(Default)]
    struct GreenImages {
        requests: Mutex<Vec<(Rect, f64)>>,
    }

    #[async_trait::async_trait]
    impl ImageProvider for Arc<GreenImages> {
        async fn load(
            &self,
            extent: Rect,
            resolution: f64,
            pixel_ratio: f64,
        ) -> Result<DecodedImage, MeridianError> {
            self.requests.lock().push((extent, resolution));
            let size = Size::new(
                (pixel_ratio * extent.width() / resolution).ceil() as u32,
                (pixel_ratio * extent.height() / resolution).ceil() as u32,
            );
            let bytes: Vec<u8> = std::iter::repeat(GREEN)
                .take((size.width() * size.height()) as usize)
                .flatten()
                .collect();
            DecodedImage::from_raw(bytes, size)
        }
    }

    struct Failing(AtomicUsize);

    #[async_trait::async_trait]
    impl ImageProvider for Arc<Failing> {
        async fn load(
            &self,
            _extent: Rect,
            _resolution: f64,
            _pixel_ratio: f64,
        ) -> Result<DecodedImage, MeridianError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(MeridianError::IO)
        }
    }

    fn context(source: &str, target: &str, warp: Arc<CountingWarp>) -> ReprojectionContext {
        ReprojectionContext::new(ProjectionRegistry::global(), source, target)
            .expect("registered")
            .with_warp(warp)
    }

    #[tokio::test]
    async fn same_projection_skips_reprojection() {
        let provider = Arc::new(GreenImages::default());
        let warp = Arc::new(CountingWarp::default());
        let source = ReprojectingImageSource::new(
            provider.clone(),
            context(EPSG_3857, "EPSG:900913", warp.clone()),
        );

        let extent = Rect::new(0.0, 0.0, 1000.0, 500.0);
        let image = source.get_image(extent, 10.0, 1.0).expect("valid context");
        assert!(!image.is_reprojected());

        image.load();
        assert_eq!(image.loaded().await, LoadState::Loaded);
        assert_eq!(
            image.handle().image().map(|image| image.size()),
            Some(Size::new(100, 50))
        );
        assert_eq!(warp.calls(), 0);
        assert_eq!(*provider.requests.lock(), vec![(extent, 10.0)]);
    }

    #[tokio::test]
    async fn reprojects_image() {
        let provider = Arc::new(GreenImages::default());
        let warp = Arc::new(CountingWarp::default());
        let source = ReprojectingImageSource::new(
            provider.clone(),
            context(EPSG_4326, EPSG_3857, warp.clone()),
        );

        let image = source
            .get_image(Rect::new(0.0, 0.0, 1e6, 1e6), 1e4, 1.0)
            .expect("valid context");
        assert!(image.is_reprojected());

        image.load();
        assert_eq!(image.loaded().await, LoadState::Loaded);
        assert_eq!(warp.calls(), 1);

        let requests = provider.requests.lock().clone();
        assert_eq!(requests.len(), 1);
        let (source_extent, _) = requests[0];
        assert!(source_extent.x_min.abs() < 1e-9);
        assert!(source_extent.x_max > 8.9 && source_extent.x_max < 9.0);

        let output = image.handle().image().expect("loaded");
        assert_eq!(output.size(), Size::new(100, 100));
        assert_eq!(output.pixel(50, 50), Some(GREEN));
    }

    #[tokio::test]
    async fn load_error_is_propagated() {
        let provider = Arc::new(Failing(AtomicUsize::new(0)));
        let warp = Arc::new(CountingWarp::default());
        let source = ReprojectingImageSource::new(
            provider.clone(),
            context(EPSG_4326, EPSG_3857, warp.clone()),
        );

        let image = source
            .get_image(Rect::new(0.0, 0.0, 1e6, 1e6), 1e4, 1.0)
            .expect("valid context");
        image.load();
        assert_eq!(image.loaded().await, LoadState::Error);
        assert_eq!(provider.0.load(Ordering::SeqCst), 1);
        assert_eq!(warp.calls(), 0);
    }
}

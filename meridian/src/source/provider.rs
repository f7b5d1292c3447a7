use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use meridian_types::cartesian::Rect;

use crate::decoded_image::DecodedImage;
use crate::error::MeridianError;
use crate::tile_schema::{TileIndex, TileSchema};

/// Provider of source tiles for a [`ReprojectingTileSource`](super::ReprojectingTileSource).
#[async_trait::async_trait]
pub trait RasterTileProvider: Send + Sync {
    /// Loads the tile with the given index.
    ///
    /// [`MeridianError::NotFound`] means that there is no data for the tile.
    async fn load(&self, index: TileIndex) -> Result<DecodedImage, MeridianError>;
}

/// Provider of source images for a [`ReprojectingImageSource`](super::ReprojectingImageSource).
#[async_trait::async_trait]
pub trait ImageProvider: Send + Sync {
    /// Loads the image covering `extent` at the given resolution.
    async fn load(
        &self,
        extent: Rect,
        resolution: f64,
        pixel_ratio: f64,
    ) -> Result<DecodedImage, MeridianError>;
}

/// Loads raw data by URL. The transport is up to the application.
#[async_trait::async_trait]
pub trait BytesLoader: Send + Sync {
    /// Loads the data.
    async fn load_bytes(&self, url: &str) -> Result<Bytes, MeridianError>;
}

/// Function that returns the URL of the data for the key.
pub trait UrlSource<Key: ?Sized>: (Fn(&Key) -> String) + Send + Sync {}
impl<Key: ?Sized, T: Fn(&Key) -> String> UrlSource<Key> for T where T: Send + Sync {}

/// URL template with `{x}`, `{y}`, `{z}` and `{-y}` placeholders.
///
/// `{-y}` is the row index counted from the other side of the grid, as used by TMS services.
///
/// ```
/// use meridian::source::TileUrlTemplate;
/// use meridian::{TileIndex, TileSchema};
///
/// let template =
///     TileUrlTemplate::new("https://example.com/{z}/{x}/{-y}.png", TileSchema::web(18))?;
/// assert_eq!(
///     template.url(TileIndex::new(1, 0, 1))?,
///     "https://example.com/1/1/1.png"
/// );
/// # Ok::<(), meridian::error::MeridianError>(())
/// ```
#[derive(Debug, Clone)]
pub struct TileUrlTemplate {
    template: String,
    schema: TileSchema,
}

const INVERTED_Y_KEY: &str = "inverted_y";

impl TileUrlTemplate {
    /// Creates a template for tiles of the `schema`. Fails if the template has unknown
    /// placeholders.
    pub fn new(template: &str, schema: TileSchema) -> Result<Self, MeridianError> {
        let template = Self {
            template: template.replace("{-y}", &format!("{{{INVERTED_Y_KEY}}}")),
            schema,
        };

        let z = template
            .schema
            .lods
            .first()
            .map(|lod| lod.z_index())
            .unwrap_or(0);
        template.url(TileIndex::new(0, 0, z))?;

        Ok(template)
    }

    /// URL of the tile.
    pub fn url(&self, index: TileIndex) -> Result<String, MeridianError> {
        let inverted_y = self
            .schema
            .full_range(index.z)
            .map(|range| range.y_max + range.y_min - index.y)
            .unwrap_or(index.y);

        let vars: HashMap<String, i64> = [
            ("x".to_string(), index.x as i64),
            ("y".to_string(), index.y as i64),
            ("z".to_string(), index.z as i64),
            (INVERTED_Y_KEY.to_string(), inverted_y as i64),
        ]
        .into_iter()
        .collect();

        strfmt::strfmt(&self.template, &vars)
            .map_err(|err| MeridianError::Generic(format!("invalid url template: {err}")))
    }
}

enum TileUrl {
    Source(Box<dyn UrlSource<TileIndex>>),
    Template(TileUrlTemplate),
}

/// Raster tile provider that requests every tile by its own URL and decodes the response as an
/// image.
pub struct UrlTileProvider {
    url: TileUrl,
    loader: Arc<dyn BytesLoader>,
}

impl UrlTileProvider {
    /// Creates a provider that gets tile URLs from the function.
    pub fn new(url_source: impl UrlSource<TileIndex> + 'static, loader: Arc<dyn BytesLoader>) -> Self {
        Self {
            url: TileUrl::Source(Box::new(url_source)),
            loader,
        }
    }

    /// Creates a provider that gets tile URLs from the template.
    pub fn with_template(template: TileUrlTemplate, loader: Arc<dyn BytesLoader>) -> Self {
        Self {
            url: TileUrl::Template(template),
            loader,
        }
    }

    /// URL of the tile.
    pub fn url(&self, index: TileIndex) -> Result<String, MeridianError> {
        match &self.url {
            TileUrl::Source(url_source) => Ok(url_source(&index)),
            TileUrl::Template(template) => template.url(index),
        }
    }
}

#[async_trait::async_trait]
impl RasterTileProvider for UrlTileProvider {
    async fn load(&self, index: TileIndex) -> Result<DecodedImage, MeridianError> {
        let url = self.url(index)?;

        log::debug!("Loading {url}");
        let bytes = self.loader.load_bytes(&url).await?;
        DecodedImage::new(&bytes)
    }
}

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use quick_cache::sync::Cache;

use super::provider::RasterTileProvider;
use super::{RasterEntry, TileEntry};
use crate::error::MeridianError;
use crate::handle::{LoadState, LoadableRaster, RasterHandle};
use crate::messenger::Messenger;
use crate::options::ReprojectionOptions;
use crate::registry::ProjectionRegistry;
use crate::render::RasterWarp;
use crate::reproj::{ReprojectedTile, ReprojectionContext};
use crate::tile_schema::{TileIndex, TileSchema, WrappingTileIndex};

const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Tiled raster source that provides tiles of the target tile grid, reprojecting the tiles of the
/// provider if its grid is in another projection.
///
/// Use [`ReprojectingTileSourceBuilder`] to create one.
pub struct ReprojectingTileSource {
    provider: Arc<dyn RasterTileProvider>,
    source_schema: TileSchema,
    target_schema: TileSchema,
    context: ReprojectionContext,
    source_tiles: Cache<TileIndex, Arc<LoadableRaster>>,
    tiles: Cache<TileIndex, Arc<ReprojectedTile>>,
    messenger: Option<Arc<dyn Messenger>>,
    wrap_x: bool,
}

impl Debug for ReprojectingTileSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReprojectingTileSource")
            .field("source_crs", &self.source_schema.crs)
            .field("target_crs", &self.target_schema.crs)
            .field("source_tiles", &self.source_tiles.len())
            .field("tiles", &self.tiles.len())
            .finish()
    }
}

impl ReprojectingTileSource {
    /// Tile of the target grid.
    ///
    /// If the target projection wraps around the world, X indices outside of the grid are
    /// wrapped. Returns `None` if the index is outside of the grid.
    ///
    /// Reprojected tiles are cached, so asking for the same index again returns the same tile
    /// unless it failed to load.
    pub fn get_tile(
        &self,
        index: TileIndex,
        pixel_ratio: f64,
    ) -> Result<Option<TileEntry>, MeridianError> {
        let Some(wrapped) = self.target_schema.wrap_index(index, self.wrap_x) else {
            return Ok(None);
        };

        if self.context.is_identity() {
            return Ok(self
                .source_tile(wrapped.into(), pixel_ratio)
                .map(|tile| RasterEntry::Direct(tile as Arc<dyn RasterHandle>)));
        }

        if let Some(tile) = self.tiles.get(&index) {
            if tile.state() != LoadState::Error {
                return Ok(Some(RasterEntry::Reprojected(tile)));
            }
        }

        let tile = Arc::new(self.reproject_tile(wrapped, pixel_ratio)?);
        self.tiles.insert(index, tile.clone());
        Ok(Some(RasterEntry::Reprojected(tile)))
    }

    /// Drops the cached source tiles and creates the tile anew, so that its data is loaded again.
    ///
    /// A reprojected tile that was created before is kept as the interim tile of the new one.
    pub fn refresh(
        &self,
        index: TileIndex,
        pixel_ratio: f64,
    ) -> Result<Option<TileEntry>, MeridianError> {
        self.source_tiles.clear();

        let Some(wrapped) = self.target_schema.wrap_index(index, self.wrap_x) else {
            return Ok(None);
        };
        if self.context.is_identity() {
            return self.get_tile(index, pixel_ratio);
        }

        let tile = Arc::new(self.reproject_tile(wrapped, pixel_ratio)?);
        if let Some(previous) = self.tiles.get(&index) {
            tile.set_interim_tile(previous);
            tile.refresh_interim_chain();
        }

        self.tiles.insert(index, tile.clone());
        Ok(Some(RasterEntry::Reprojected(tile)))
    }

    /// Grid of the returned tiles.
    pub fn tile_schema(&self) -> &TileSchema {
        &self.target_schema
    }

    /// Grid of the provider tiles.
    pub fn source_tile_schema(&self) -> &TileSchema {
        &self.source_schema
    }

    /// Reprojection context.
    pub fn context(&self) -> &ReprojectionContext {
        &self.context
    }

    fn reproject_tile(
        &self,
        index: WrappingTileIndex,
        pixel_ratio: f64,
    ) -> Result<ReprojectedTile, MeridianError> {
        ReprojectedTile::new(
            &self.context,
            &self.source_schema,
            &self.target_schema,
            index,
            pixel_ratio,
            |source_index, pixel_ratio| {
                self.source_tile(source_index, pixel_ratio)
                    .map(|tile| tile as Arc<dyn RasterHandle>)
            },
        )
    }

    fn source_tile(&self, index: TileIndex, pixel_ratio: f64) -> Option<Arc<LoadableRaster>> {
        if let Some(tile) = self.source_tiles.get(&index) {
            return Some(tile);
        }

        let extent = self.source_schema.tile_bbox(index)?;
        let resolution = self.source_schema.lod_resolution(index.z)?;
        let provider = self.provider.clone();
        let messenger = self.messenger.clone();
        let tile = Arc::new(LoadableRaster::new(
            extent,
            resolution,
            pixel_ratio,
            move |completer| {
                crate::async_runtime::spawn(async move {
                    match provider.load(index).await {
                        Ok(image) => completer.loaded(image),
                        Err(MeridianError::NotFound) => completer.empty(),
                        Err(err) => {
                            log::debug!("Failed to load tile {index:?}: {err}");
                            completer.failed();
                        }
                    }

                    if let Some(messenger) = messenger {
                        messenger.request_redraw();
                    }
                });
            },
        ));

        self.source_tiles.insert(index, tile.clone());
        Some(tile)
    }
}

/// Constructor for a [`ReprojectingTileSource`].
///
/// ```
/// use meridian::error::MeridianError;
/// use meridian::source::{RasterTileProvider, ReprojectingTileSourceBuilder};
/// use meridian::{DecodedImage, TileIndex, TileSchema};
///
/// struct NoTiles;
///
/// #[async_trait::async_trait]
/// impl RasterTileProvider for NoTiles {
///     async fn load(&self, _index: TileIndex) -> Result<DecodedImage, MeridianError> {
///         Err(MeridianError::NotFound)
///     }
/// }
///
/// let source = ReprojectingTileSourceBuilder::new(
///     NoTiles,
///     TileSchema::geographic(18),
///     TileSchema::web(18),
/// )
/// .with_cache_capacity(500)
/// .build()?;
/// assert!(!source.context().is_identity());
/// # Ok::<(), MeridianError>(())
/// ```
pub struct ReprojectingTileSourceBuilder {
    provider: Arc<dyn RasterTileProvider>,
    source_schema: TileSchema,
    target_schema: TileSchema,
    registry: Option<Arc<ProjectionRegistry>>,
    warp: Option<Arc<dyn RasterWarp>>,
    options: ReprojectionOptions,
    messenger: Option<Arc<dyn Messenger>>,
    cache_capacity: usize,
}

impl ReprojectingTileSourceBuilder {
    /// Initializes a builder for a source that loads tiles of `source_schema` from the `provider`
    /// and returns tiles of `target_schema`.
    pub fn new(
        provider: impl RasterTileProvider + 'static,
        source_schema: TileSchema,
        target_schema: TileSchema,
    ) -> Self {
        Self {
            provider: Arc::new(provider),
            source_schema,
            target_schema,
            registry: None,
            warp: None,
            options: ReprojectionOptions::default(),
            messenger: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Sets the projection registry. [`ProjectionRegistry::global`] is used by default.
    pub fn with_registry(mut self, registry: Arc<ProjectionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the raster warp implementation. [`CpuWarp`](crate::render::CpuWarp) is used by
    /// default.
    pub fn with_warp(mut self, warp: Arc<dyn RasterWarp>) -> Self {
        self.warp = Some(warp);
        self
    }

    /// Sets the reprojection options.
    pub fn with_options(mut self, options: ReprojectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the messenger that is notified when a source tile is loaded.
    pub fn with_messenger(mut self, messenger: impl Messenger + 'static) -> Self {
        self.messenger = Some(Arc::new(messenger));
        self
    }

    /// Sets the maximum number of source tiles and reprojected tiles kept in memory.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Consumes the builder and constructs the source.
    ///
    /// Fails if the projections of the schemas are not registered, or cannot be transformed into
    /// each other.
    pub fn build(self) -> Result<ReprojectingTileSource, MeridianError> {
        let Self {
            provider,
            source_schema,
            target_schema,
            registry,
            warp,
            options,
            messenger,
            cache_capacity,
        } = self;

        let registry = registry.unwrap_or_else(ProjectionRegistry::global);
        let mut context =
            ReprojectionContext::new(registry, &source_schema.crs, &target_schema.crs)?
                .with_options(options);
        if let Some(warp) = warp {
            context = context.with_warp(warp);
        }

        let wrap_x = context.target().can_wrap_x();

        Ok(ReprojectingTileSource {
            provider,
            source_schema,
            target_schema,
            context,
            source_tiles: Cache::new(cache_capacity),
            tiles: Cache::new(cache_capacity),
            messenger,
            wrap_x,
        })
    }
}

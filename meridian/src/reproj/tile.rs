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
use crate::resolution::calculate_source_extent_resolution;
use crate::tile_schema::{TileIndex, TileSchema, WrappingTileIndex};
use crate::triangulation::Triangulation;
use crate::wrap::wrap_and_slice_x;

/// Source tile together with the horizontal shift that puts it next to the other source tiles
/// when the target tile crosses the antimeridian of the source projection.
#[derive(Clone)]
struct SourceTile {
    handle: Arc<dyn RasterHandle>,
    offset: f64,
}

/// Tile of the target tile grid, resampled from the tiles of the source grid that it overlaps.
///
/// Works the same way as [`ReprojectedImage`](super::ReprojectedImage), but with several source
/// tiles. Reprojection runs once all source tiles reach a terminal state. Tiles that failed to
/// load are left blank in the result; the tile becomes [`LoadState::Error`] only if none of the
/// source tiles loaded and at least one of them failed.
pub struct ReprojectedTile {
    context: ReprojectionContext,
    index: WrappingTileIndex,
    target_extent: Rect,
    target_resolution: f64,
    tile_width: u32,
    tile_height: u32,
    pixel_ratio: f64,
    source_z: Option<u32>,
    source_resolution: f64,
    triangulation: Option<Triangulation>,
    state: watch::Sender<LoadState>,
    inner: Mutex<TileInner>,
}

#[derive(Default)]
struct TileInner {
    image: Option<Arc<DecodedImage>>,
    sources: Vec<SourceTile>,
    source_states: Vec<watch::Receiver<LoadState>>,
    interim: Option<Arc<ReprojectedTile>>,
    disposed: bool,
}

impl Debug for ReprojectedTile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReprojectedTile")
            .field("index", &self.index)
            .field("source_z", &self.source_z)
            .field("state", &self.state())
            .finish()
    }
}

impl ReprojectedTile {
    /// Prepares the reprojection of the tile `index` of the `target_schema`.
    ///
    /// `get_tile` is called for every tile of the `source_schema` that the target tile overlaps,
    /// with the tile index and the pixel ratio. Tiles for which it returns `None` are skipped.
    ///
    /// Returns an error if the projections of the context cannot be related to each other.
    pub fn new(
        context: &ReprojectionContext,
        source_schema: &TileSchema,
        target_schema: &TileSchema,
        index: WrappingTileIndex,
        pixel_ratio: f64,
        mut get_tile: impl FnMut(TileIndex, f64) -> Option<Arc<dyn RasterHandle>>,
    ) -> Result<Self, MeridianError> {
        let target_index = TileIndex::from(index);
        let mut tile = Self {
            context: context.clone(),
            index,
            target_extent: target_schema
                .tile_bbox(target_index)
                .unwrap_or_else(|| Rect::new(0.0, 0.0, 0.0, 0.0)),
            target_resolution: target_schema.lod_resolution(index.z).unwrap_or(f64::NAN),
            tile_width: target_schema.tile_width,
            tile_height: target_schema.tile_height,
            pixel_ratio,
            source_z: None,
            source_resolution: f64::NAN,
            triangulation: None,
            state: watch::channel(LoadState::Empty).0,
            inner: Mutex::new(TileInner::default()),
        };

        let Some(limited_extent) = tile
            .target_extent
            .intersection(target_schema.bounds)
            .filter(|extent| extent.area() > 0.0)
        else {
            log::debug!("Tile {index:?} is outside of the target tile grid");
            return Ok(tile);
        };

        let source = context.source();
        let max_source_extent = match source.extent() {
            Some(extent) => source_schema.bounds.intersection(extent),
            None => Some(source_schema.bounds),
        };

        let source_resolution = calculate_source_extent_resolution(
            context.registry(),
            source,
            context.target(),
            &limited_extent,
            tile.target_resolution,
        )?;
        tile.source_resolution = source_resolution;
        if !(source_resolution.is_finite() && source_resolution > 0.0) {
            return Ok(tile);
        }

        let triangulation = Triangulation::new(
            context.registry(),
            source,
            context.target(),
            limited_extent,
            max_source_extent,
            source_resolution * context.options().error_threshold,
        )?;
        if triangulation.triangles().is_empty() {
            return Ok(tile);
        }

        let Some(source_z) = source_schema
            .nearest_lod(source_resolution)
            .map(|lod| lod.z_index())
        else {
            return Ok(tile);
        };
        tile.source_z = Some(source_z);

        let source_extent = triangulation
            .calculate_source_extent()
            .and_then(|extent| match max_source_extent {
                Some(max) if triangulation.can_wrap_x_in_source() => Some(Rect::new(
                    extent.x_min,
                    extent.y_min.max(max.y_min),
                    extent.x_max,
                    extent.y_max.min(max.y_max),
                )),
                Some(max) => extent.intersection(max),
                None => Some(extent),
            });
        tile.triangulation = Some(triangulation);

        let Some(source_extent) = source_extent.filter(|extent| extent.area() > 0.0) else {
            return Ok(tile);
        };

        let world = source.extent().filter(|_| source.can_wrap_x());
        let mut worlds_away = world
            .map(|world| ((source_extent.x_min - world.x_min) / world.width()).floor())
            .unwrap_or(0.0);
        let mut sources = Vec::new();
        for slice in wrap_and_slice_x(source_extent, source, true) {
            let offset = world.map(|world| worlds_away * world.width()).unwrap_or(0.0);
            if let Some(range) = source_schema.tile_range(&slice, source_z) {
                for source_index in range.iter() {
                    if let Some(handle) = get_tile(source_index, pixel_ratio) {
                        sources.push(SourceTile { handle, offset });
                    }
                }
            }
            worlds_away += 1.0;
        }

        if sources.is_empty() {
            return Ok(tile);
        }

        log::trace!(
            "Tile {index:?} will be reprojected from {} source tiles at z {source_z}",
            sources.len()
        );
        tile.inner.get_mut().sources = sources;
        tile.state.send_replace(LoadState::Idle);

        Ok(tile)
    }

    /// Index of the tile in the target grid.
    pub fn index(&self) -> WrappingTileIndex {
        self.index
    }

    /// Z-level of the source tiles.
    pub fn source_z(&self) -> Option<u32> {
        self.source_z
    }

    /// Resolution of the source tiles, as calculated for the tile extent.
    pub fn source_resolution(&self) -> f64 {
        self.source_resolution
    }

    /// Mesh used to resample the source tiles.
    pub fn triangulation(&self) -> Option<&Triangulation> {
        self.triangulation.as_ref()
    }

    /// Composes the source tiles if all of them finished loading. Does nothing unless the tile is
    /// in the [`LoadState::Loading`] state.
    pub fn update(&self) {
        let mut inner = self.inner.lock();
        if inner.disposed || self.state() != LoadState::Loading {
            return;
        }

        if !inner
            .sources
            .iter()
            .all(|source| source.handle.state().is_terminal())
        {
            return;
        }

        let sources = std::mem::take(&mut inner.sources);
        inner.source_states.clear();
        let (state, image) = self.reproject(&sources);
        inner.image = image;
        // Published under the lock, so a concurrent update sees the terminal state.
        self.state.send_replace(state);
        drop(inner);

        log::debug!("Reprojected tile {:?} finished with state {state:?}", self.index);
    }

    /// Waits until all source tiles reach a terminal state and composes them.
    pub async fn loaded(&self) -> LoadState {
        let receivers = self.inner.lock().source_states.clone();
        for mut receiver in receivers {
            let _ = receiver.wait_for(LoadState::is_terminal).await;
        }

        self.update();
        self.state()
    }

    /// Stops listening to the source tiles and releases them. The state of the tile does not
    /// change after this call.
    pub fn dispose(&self) {
        let mut inner = self.inner.lock();
        inner.disposed = true;
        inner.source_states.clear();
        inner.sources.clear();
        inner.interim = None;
    }

    /// Sets a previously rendered tile to show while this one is loading.
    pub fn set_interim_tile(&self, tile: Arc<ReprojectedTile>) {
        self.inner.lock().interim = Some(tile);
    }

    /// The first loaded tile in the interim chain, or this tile if there is none.
    pub fn interim_tile(self: &Arc<Self>) -> Arc<ReprojectedTile> {
        let mut next = self.inner.lock().interim.clone();
        while let Some(tile) = next {
            if tile.state() == LoadState::Loaded {
                return tile;
            }
            next = tile.inner.lock().interim.clone();
        }

        self.clone()
    }

    /// Removes tiles that never started loading from the interim chain and cuts the chain after
    /// the first loaded tile.
    pub fn refresh_interim_chain(&self) {
        let mut chain = Vec::new();
        let mut next = self.inner.lock().interim.clone();
        while let Some(tile) = next {
            next = tile.inner.lock().interim.clone();
            match tile.state() {
                LoadState::Idle => {}
                LoadState::Loaded => {
                    chain.push(tile);
                    break;
                }
                _ => chain.push(tile),
            }
        }

        let mut link = None;
        for tile in chain.into_iter().rev() {
            tile.inner.lock().interim = link.take();
            link = Some(tile);
        }
        self.inner.lock().interim = link;
    }

    fn reproject(&self, sources: &[SourceTile]) -> (LoadState, Option<Arc<DecodedImage>>) {
        let mut loaded = Vec::with_capacity(sources.len());
        let mut failed = false;
        for source in sources {
            match (source.handle.state(), source.handle.image()) {
                (LoadState::Loaded, Some(image)) => loaded.push(WarpSource {
                    extent: source.handle.extent().shift_x(source.offset),
                    image,
                }),
                (LoadState::Empty, _) => {}
                (state, _) => {
                    log::debug!(
                        "Source tile {:?} of tile {:?} is not available: {state:?}",
                        source.handle.extent(),
                        self.index
                    );
                    failed = true;
                }
            }
        }

        let Some(triangulation) = &self.triangulation else {
            return (LoadState::Error, None);
        };
        if loaded.is_empty() {
            let state = if failed {
                LoadState::Error
            } else {
                LoadState::Empty
            };
            return (state, None);
        }

        let options = self.context.options();
        let request = WarpRequest {
            width: (self.tile_width as f64 * self.pixel_ratio).round() as u32,
            height: (self.tile_height as f64 * self.pixel_ratio).round() as u32,
            pixel_ratio: self.pixel_ratio,
            source_resolution: self.source_resolution,
            max_source_extent: triangulation.max_source_extent(),
            target_resolution: self.target_resolution,
            target_extent: self.target_extent,
            triangulation,
            sources: &loaded,
            gutter: options.gutter,
            interpolate: options.interpolate,
            render_edges: options.render_edges,
        };

        let image = self.context.warp().warp(&request);
        (LoadState::Loaded, Some(Arc::new(image)))
    }
}

impl RasterHandle for ReprojectedTile {
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
        let pending: Vec<Arc<dyn RasterHandle>> = {
            let mut inner = self.inner.lock();
            if inner.disposed || !start_loading(&self.state) {
                return;
            }

            let pending: Vec<_> = inner
                .sources
                .iter()
                .filter(|source| !source.handle.state().is_terminal())
                .map(|source| source.handle.clone())
                .collect();
            inner.source_states = pending.iter().map(|handle| handle.subscribe()).collect();
            pending
        };

        for handle in pending {
            handle.load();
        }

        self.update();
    }

    fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use meridian_types::cartesian::{Point2, Size};

    use super::*;
    use crate::crs::Crs;
    use crate::handle::{LoadableRaster, RasterCompleter};
    use crate::registry::{ProjectionRegistry, EPSG_3857, EPSG_4326};
    use crate::reproj::test_utils::CountingWarp;
    use crate::tile_schema::{Lod, VerticalDirection};
    use crate::units::Units;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

    fn context() -> ReprojectionContext {
        ReprojectionContext::new(ProjectionRegistry::global(), EPSG_4326, EPSG_3857)
            .expect("default projections")
    }

    fn schemas() -> (TileSchema, TileSchema) {
        (TileSchema::geographic(10), TileSchema::web(10))
    }

    fn red_tile(schema: &TileSchema, index: TileIndex) -> Arc<dyn RasterHandle> {
        let bytes: Vec<u8> = std::iter::repeat(RED).take(256 * 256).flatten().collect();
        let image = DecodedImage::from_raw(bytes, Size::new(256, 256)).expect("valid size");
        let resolution = schema.lod_resolution(index.z).expect("valid z");
        Arc::new(LoadableRaster::loaded(
            schema.tile_bbox(index).expect("valid z"),
            resolution,
            1.0,
            image,
        ))
    }

    fn index(x: i32, y: i32, z: u32) -> WrappingTileIndex {
        WrappingTileIndex {
            z,
            x,
            y,
            display_x: x,
        }
    }

    fn target_index(schema: &TileSchema, x: i32, y: i32, z: u32) -> WrappingTileIndex {
        schema
            .wrap_index(TileIndex::new(x, y, z), true)
            .expect("inside the grid")
    }

    #[test]
    fn picks_source_tiles() {
        let (source_schema, target_schema) = schemas();
        let mut requested = Vec::new();
        let tile = ReprojectedTile::new(
            &context(),
            &source_schema,
            &target_schema,
            target_index(&target_schema, 0, 0, 1),
            1.0,
            |index, _| {
                requested.push(index);
                Some(red_tile(&source_schema, index))
            },
        )
        .expect("valid context");

        assert_eq!(tile.source_z(), Some(1));
        assert_eq!(
            requested,
            vec![TileIndex::new(0, 0, 1), TileIndex::new(1, 0, 1)]
        );
        assert_eq!(tile.state(), LoadState::Idle);

        tile.load();
        assert_eq!(tile.state(), LoadState::Loaded);
        let image = tile.image().expect("loaded");
        assert_eq!(image.size(), Size::new(256, 256));
        assert_eq!(image.pixel(128, 128), Some(RED));
    }

    #[test]
    fn partial_composite_uses_loaded_tiles() {
        let (source_schema, target_schema) = schemas();
        let tile = ReprojectedTile::new(
            &context(),
            &source_schema,
            &target_schema,
            target_index(&target_schema, 0, 0, 1),
            1.0,
            |index, _| {
                if index.x == 0 {
                    let extent = source_schema.tile_bbox(index).expect("valid z");
                    let failing: Arc<dyn RasterHandle> =
                        Arc::new(LoadableRaster::new(extent, 1.0, 1.0, |c| c.failed()));
                    Some(failing)
                } else {
                    Some(red_tile(&source_schema, index))
                }
            },
        )
        .expect("valid context");

        tile.load();
        assert_eq!(tile.state(), LoadState::Loaded);
        let image = tile.image().expect("loaded");
        assert_eq!(image.pixel(10, 128), Some(TRANSPARENT));
        assert_eq!(image.pixel(200, 128), Some(RED));
    }

    #[test]
    fn all_failed_is_error() {
        let (source_schema, target_schema) = schemas();
        let tile = ReprojectedTile::new(
            &context(),
            &source_schema,
            &target_schema,
            target_index(&target_schema, 1, 1, 1),
            1.0,
            |index, _| {
                let extent = source_schema.tile_bbox(index).expect("valid z");
                let handle: Arc<dyn RasterHandle> = if index.x % 2 == 0 {
                    Arc::new(LoadableRaster::new(extent, 1.0, 1.0, |c| c.failed()))
                } else {
                    Arc::new(LoadableRaster::empty(extent, 1.0, 1.0))
                };
                Some(handle)
            },
        )
        .expect("valid context");

        tile.load();
        assert_eq!(tile.state(), LoadState::Error);
        assert!(tile.image().is_none());
    }

    #[test]
    fn all_empty_is_empty() {
        let (source_schema, target_schema) = schemas();
        let tile = ReprojectedTile::new(
            &context(),
            &source_schema,
            &target_schema,
            target_index(&target_schema, 1, 0, 1),
            1.0,
            |index, _| {
                let extent = source_schema.tile_bbox(index).expect("valid z");
                let handle: Arc<dyn RasterHandle> =
                    Arc::new(LoadableRaster::empty(extent, 1.0, 1.0));
                Some(handle)
            },
        )
        .expect("valid context");

        tile.load();
        assert_eq!(tile.state(), LoadState::Empty);
    }

    #[test]
    fn no_source_tiles_is_empty() {
        let (source_schema, target_schema) = schemas();
        let tile = ReprojectedTile::new(
            &context(),
            &source_schema,
            &target_schema,
            target_index(&target_schema, 0, 0, 1),
            1.0,
            |_, _| None,
        )
        .expect("valid context");
        assert_eq!(tile.state(), LoadState::Empty);

        let outside = index(5, 0, 1);
        let tile = ReprojectedTile::new(
            &context(),
            &source_schema,
            &target_schema,
            outside,
            1.0,
            |_, _| panic!("no source tiles expected"),
        )
        .expect("valid context");
        assert_eq!(tile.state(), LoadState::Empty);
    }

    fn pending_tile(
        pending: &Arc<Mutex<Vec<RasterCompleter>>>,
        index: WrappingTileIndex,
    ) -> ReprojectedTile {
        pending_tile_in(&context(), pending, index)
    }

    fn pending_tile_in(
        context: &ReprojectionContext,
        pending: &Arc<Mutex<Vec<RasterCompleter>>>,
        index: WrappingTileIndex,
    ) -> ReprojectedTile {
        let (source_schema, target_schema) = schemas();
        ReprojectedTile::new(
            context,
            &source_schema,
            &target_schema,
            index,
            1.0,
            |source_index, _| {
                let slot = pending.clone();
                let extent = source_schema.tile_bbox(source_index).expect("valid z");
                let handle: Arc<dyn RasterHandle> =
                    Arc::new(LoadableRaster::new(extent, 1.0, 1.0, move |completer| {
                        slot.lock().push(completer)
                    }));
                Some(handle)
            },
        )
        .expect("valid context")
    }

    #[test]
    fn waits_for_all_source_tiles() {
        let pending = Arc::new(Mutex::new(Vec::new()));
        let tile = pending_tile(&pending, index(0, 0, 1));
        tile.load();
        assert_eq!(tile.state(), LoadState::Loading);
        assert_eq!(pending.lock().len(), 2);

        let first = pending.lock().remove(0);
        first.empty();
        tile.update();
        assert_eq!(tile.state(), LoadState::Loading);

        let second = pending.lock().remove(0);
        second.failed();
        tile.update();
        assert_eq!(tile.state(), LoadState::Error);
    }

    #[test]
    fn disposed_tile_ignores_source_tiles() {
        let pending = Arc::new(Mutex::new(Vec::new()));
        let tile = pending_tile(&pending, index(0, 0, 1));
        let mut state = tile.subscribe();
        tile.load();
        state.borrow_and_update();

        tile.dispose();
        for completer in pending.lock().drain(..) {
            completer.empty();
        }
        tile.update();

        assert_eq!(tile.state(), LoadState::Loading);
        assert!(!state.has_changed().unwrap_or(true));
    }

    #[test]
    fn disposed_tile_does_not_start_loading() {
        let pending = Arc::new(Mutex::new(Vec::new()));
        let tile = pending_tile(&pending, index(0, 0, 1));
        assert_eq!(tile.state(), LoadState::Idle);

        tile.dispose();
        tile.load();

        assert_eq!(tile.state(), LoadState::Idle);
        assert!(pending.lock().is_empty());
    }

    #[test]
    fn concurrent_updates_reproject_once() {
        let warp = Arc::new(CountingWarp::slow(Duration::from_millis(100)));
        let pending = Arc::new(Mutex::new(Vec::new()));
        let tile = pending_tile_in(
            &context().with_warp(warp.clone()),
            &pending,
            index(0, 0, 1),
        );
        tile.load();

        for completer in pending.lock().drain(..) {
            let bytes: Vec<u8> = std::iter::repeat(RED).take(256 * 256).flatten().collect();
            completer.loaded(DecodedImage::from_raw(bytes, Size::new(256, 256)).expect("valid"));
        }

        std::thread::scope(|scope| {
            scope.spawn(|| tile.update());
            std::thread::sleep(Duration::from_millis(30));
            scope.spawn(|| tile.update());
            tile.update();
        });

        assert_eq!(warp.calls(), 1);
        assert_eq!(tile.state(), LoadState::Loaded);
        assert!(tile.image().is_some());
    }

    fn shifted_context() -> ReprojectionContext {
        let mut registry = ProjectionRegistry::with_defaults();
        registry.add_projection(
            Crs::new("TEST:shifted", Units::Degrees)
                .with_extent(Rect::new(-180.0, -90.0, 180.0, 90.0))
                .with_global(true),
        );
        // Lon/lat with the central meridian at 180.
        let shift = |p: &Point2| Some(Point2::new((p.x + 360.0).rem_euclid(360.0) - 180.0, p.y));
        registry.add_coordinate_transforms("TEST:shifted", EPSG_4326, shift, shift);

        ReprojectionContext::new(Arc::new(registry), EPSG_4326, "TEST:shifted")
            .expect("registered")
    }

    #[test]
    fn wraps_across_the_antimeridian() {
        let source_schema = TileSchema::geographic(10);
        let target_schema = TileSchema {
            origin: Point2::new(-180.0, 90.0),
            bounds: Rect::new(-180.0, -90.0, 180.0, 90.0),
            lods: vec![Lod::new(40.0 / 256.0, 0).expect("valid")],
            tile_width: 256,
            tile_height: 256,
            y_direction: VerticalDirection::TopToBottom,
            crs: "TEST:shifted".to_string(),
        };

        let mut requested = Vec::new();
        let tile = ReprojectedTile::new(
            &shifted_context(),
            &source_schema,
            &target_schema,
            index(4, 2, 0),
            1.0,
            |index, _| {
                requested.push(index);
                Some(red_tile(&source_schema, index))
            },
        )
        .expect("valid context");

        assert!(tile
            .triangulation()
            .is_some_and(|triangulation| triangulation.wraps_x_in_source()));
        assert_eq!(tile.source_z(), Some(2));
        assert!(requested.iter().any(|index| index.x == 0));
        assert!(requested.iter().any(|index| index.x == 7));

        tile.load();
        let image = tile.image().expect("loaded");
        assert_eq!(image.pixel(10, 128), Some(RED));
        assert_eq!(image.pixel(245, 128), Some(RED));
    }

    #[tokio::test]
    async fn waits_for_async_source_tiles() {
        let (source_schema, target_schema) = schemas();
        let tile = ReprojectedTile::new(
            &context(),
            &source_schema,
            &target_schema,
            target_index(&target_schema, 0, 0, 1),
            1.0,
            |index, _| {
                let loaded = red_tile(&source_schema, index);
                let handle: Arc<dyn RasterHandle> = Arc::new(LoadableRaster::new(
                    loaded.extent(),
                    loaded.resolution(),
                    1.0,
                    move |completer| {
                        tokio::spawn(async move {
                            match loaded.image() {
                                Some(image) => completer.loaded((*image).clone()),
                                None => completer.failed(),
                            }
                        });
                    },
                ));
                Some(handle)
            },
        )
        .expect("valid context");

        tile.load();
        assert_eq!(tile.loaded().await, LoadState::Loaded);
        assert_eq!(tile.image().and_then(|i| i.pixel(128, 128)), Some(RED));
    }

    #[test]
    fn interim_chain() {
        let pending = Arc::new(Mutex::new(Vec::new()));
        let index = index(0, 0, 1);
        let (source_schema, target_schema) = schemas();

        let loaded = Arc::new(
            ReprojectedTile::new(
                &context(),
                &source_schema,
                &target_schema,
                index,
                1.0,
                |source_index, _| Some(red_tile(&source_schema, source_index)),
            )
            .expect("valid context"),
        );
        loaded.load();
        let older = Arc::new(pending_tile(&pending, index));
        loaded.set_interim_tile(older.clone());

        let idle = Arc::new(pending_tile(&pending, index));
        idle.set_interim_tile(loaded.clone());
        let loading = Arc::new(pending_tile(&pending, index));
        loading.load();
        loading.set_interim_tile(idle.clone());

        let current = Arc::new(pending_tile(&pending, index));
        current.set_interim_tile(loading.clone());
        assert!(Arc::ptr_eq(&current.interim_tile(), &loaded));

        current.refresh_interim_chain();
        let chain = |tile: &Arc<ReprojectedTile>| tile.inner.lock().interim.clone();
        let first = chain(&current).expect("loading tile is kept");
        assert!(Arc::ptr_eq(&first, &loading));
        let second = chain(&first).expect("loaded tile is kept");
        assert!(Arc::ptr_eq(&second, &loaded));
        assert!(chain(&second).is_none());

        assert!(Arc::ptr_eq(&older.interim_tile(), &older));
    }
}

//! Tile and image sources that reproject the data of a provider when its projection differs from
//! the requested one.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::handle::{LoadState, RasterHandle};
use crate::reproj::{ReprojectedImage, ReprojectedTile};

mod image;
mod provider;
mod tile;

pub use image::ReprojectingImageSource;
pub use provider::{
    BytesLoader, ImageProvider, RasterTileProvider, TileUrlTemplate, UrlSource, UrlTileProvider,
};
pub use tile::{ReprojectingTileSource, ReprojectingTileSourceBuilder};

/// Raster returned by a source: either the provider data as is, or the reprojected data.
pub enum RasterEntry<R> {
    /// Source and target projections are equivalent, so the provider data is used directly.
    Direct(Arc<dyn RasterHandle>),
    /// Data reprojected into the target projection.
    Reprojected(Arc<R>),
}

/// Tile returned by a [`ReprojectingTileSource`].
pub type TileEntry = RasterEntry<ReprojectedTile>;
/// Image returned by a [`ReprojectingImageSource`].
pub type ImageEntry = RasterEntry<ReprojectedImage>;

impl<R> Clone for RasterEntry<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Direct(handle) => Self::Direct(handle.clone()),
            Self::Reprojected(raster) => Self::Reprojected(raster.clone()),
        }
    }
}

impl<R: RasterHandle + 'static> Debug for RasterEntry<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterEntry")
            .field("reprojected", &self.is_reprojected())
            .field("extent", &self.handle().extent())
            .field("state", &self.state())
            .finish()
    }
}

impl<R: RasterHandle + 'static> RasterEntry<R> {
    /// Handle of the raster.
    pub fn handle(&self) -> Arc<dyn RasterHandle> {
        match self {
            Self::Direct(handle) => handle.clone(),
            Self::Reprojected(raster) => raster.clone(),
        }
    }

    /// Returns true if the data is reprojected.
    pub fn is_reprojected(&self) -> bool {
        matches!(self, Self::Reprojected(_))
    }

    /// Starts loading.
    pub fn load(&self) {
        match self {
            Self::Direct(handle) => handle.load(),
            Self::Reprojected(raster) => raster.load(),
        }
    }

    /// Current state.
    pub fn state(&self) -> LoadState {
        match self {
            Self::Direct(handle) => handle.state(),
            Self::Reprojected(raster) => raster.state(),
        }
    }
}

impl TileEntry {
    /// Reprojects the tile if its source tiles are loaded.
    pub fn update(&self) {
        if let Self::Reprojected(tile) = self {
            tile.update();
        }
    }

    /// Waits until the tile reaches a terminal state. Must be called after [`load`](Self::load).
    pub async fn loaded(&self) -> LoadState {
        match self {
            Self::Direct(handle) => wait_for_terminal(handle.as_ref()).await,
            Self::Reprojected(tile) => tile.loaded().await,
        }
    }
}

impl ImageEntry {
    /// Reprojects the image if its source image is loaded.
    pub fn update(&self) {
        if let Self::Reprojected(image) = self {
            image.update();
        }
    }

    /// Waits until the image reaches a terminal state. Must be called after [`load`](Self::load).
    pub async fn loaded(&self) -> LoadState {
        match self {
            Self::Direct(handle) => wait_for_terminal(handle.as_ref()).await,
            Self::Reprojected(image) => image.loaded().await,
        }
    }
}

async fn wait_for_terminal(handle: &dyn RasterHandle) -> LoadState {
    let mut receiver = handle.subscribe();
    let state = match receiver.wait_for(LoadState::is_terminal).await {
        Ok(state) => *state,
        Err(_) => handle.state(),
    };
    state
}

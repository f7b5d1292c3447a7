//! Images and tiles resampled from a source projection into a target projection.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use tokio::sync::watch;

use crate::crs::Crs;
use crate::error::MeridianError;
use crate::handle::LoadState;
use crate::options::ReprojectionOptions;
use crate::registry::ProjectionRegistry;
use crate::render::{CpuWarp, RasterWarp};

mod image;
mod tile;

pub use image::ReprojectedImage;
pub use tile::ReprojectedTile;

/// Everything needed to reproject rasters between one pair of projections.
#[derive(Clone)]
pub struct ReprojectionContext {
    registry: Arc<ProjectionRegistry>,
    source: Arc<Crs>,
    target: Arc<Crs>,
    warp: Arc<dyn RasterWarp>,
    options: ReprojectionOptions,
}

impl Debug for ReprojectionContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReprojectionContext")
            .field("source", &self.source.code())
            .field("target", &self.target.code())
            .field("options", &self.options)
            .finish()
    }
}

impl ReprojectionContext {
    /// Creates a context with the default options and [`CpuWarp`].
    ///
    /// Fails if either of the projections is not registered, or if there is no transform between
    /// them.
    pub fn new(
        registry: Arc<ProjectionRegistry>,
        source_code: &str,
        target_code: &str,
    ) -> Result<Self, MeridianError> {
        let source = registry.crs(source_code)?;
        let target = registry.crs(target_code)?;
        registry.transform_between(&target, &source)?;

        Ok(Self {
            registry,
            source,
            target,
            warp: Arc::new(CpuWarp),
            options: ReprojectionOptions::default(),
        })
    }

    /// Replaces the raster warp implementation.
    pub fn with_warp(mut self, warp: Arc<dyn RasterWarp>) -> Self {
        self.warp = warp;
        self
    }

    /// Replaces the options.
    pub fn with_options(mut self, options: ReprojectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns true if the source data can be used in the target projection as is.
    pub fn is_identity(&self) -> bool {
        self.registry.equivalent(&self.source, &self.target)
    }

    /// Projection registry.
    pub fn registry(&self) -> &ProjectionRegistry {
        &self.registry
    }

    /// Source projection.
    pub fn source(&self) -> &Crs {
        &self.source
    }

    /// Target projection.
    pub fn target(&self) -> &Crs {
        &self.target
    }

    /// Raster warp implementation.
    pub fn warp(&self) -> &dyn RasterWarp {
        &*self.warp
    }

    /// Reprojection options.
    pub fn options(&self) -> &ReprojectionOptions {
        &self.options
    }
}

/// Moves the state from `Idle` to `Loading`. Returns false if the state was not `Idle`.
fn start_loading(state: &watch::Sender<LoadState>) -> bool {
    state.send_if_modified(|state| {
        let idle = *state == LoadState::Idle;
        if idle {
            *state = LoadState::Loading;
        }
        idle
    })
}

//! Meridian reprojects raster map data on the fly: it takes images and tiles served in one
//! projection and resamples them into another one.
//!
//! # Quick start
//!
//! Most applications only need a tile source. It loads the tiles of the provider grid and returns
//! the tiles of the requested grid, reprojecting them when the projections differ:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use meridian::error::MeridianError;
//! use meridian::source::{
//!     BytesLoader, ReprojectingTileSourceBuilder, TileUrlTemplate, UrlTileProvider,
//! };
//! use meridian::{RasterHandle, TileIndex, TileSchema};
//!
//! struct Http;
//!
//! #[async_trait::async_trait]
//! impl BytesLoader for Http {
//!     async fn load_bytes(&self, url: &str) -> Result<Bytes, MeridianError> {
//!         // Any HTTP client can be plugged in here.
//!         Err(MeridianError::NotFound)
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let source_schema = TileSchema::geographic(16);
//! let template = TileUrlTemplate::new(
//!     "https://example.com/{z}/{x}/{y}.png",
//!     source_schema.clone(),
//! )?;
//! let source = ReprojectingTileSourceBuilder::new(
//!     UrlTileProvider::with_template(template, Arc::new(Http)),
//!     source_schema,
//!     TileSchema::web(18),
//! )
//! .build()?;
//!
//! if let Some(tile) = source.get_tile(TileIndex::new(3, 2, 3), 1.0)? {
//!     tile.load();
//!     tile.loaded().await;
//!     let image = tile.handle().image();
//! }
//! # Ok::<(), MeridianError>(())
//! # });
//! ```
//!
//! # Main components
//!
//! * [`ProjectionRegistry`] knows the projections by their codes and transforms coordinates
//!   between them.
//! * [`resolution`] calculates which resolution of the source data matches the requested
//!   resolution in the target projection.
//! * [`Triangulation`] approximates the transform between the projections with a triangle mesh,
//!   subdividing the target extent until the linear approximation is precise enough.
//! * [`render::RasterWarp`] resamples the source rasters along the mesh.
//! * [`ReprojectedImage`] and [`ReprojectedTile`] wire it all together for one image or tile.
//! * [`source`] decides whether reprojection is needed at all and loads the source data.

pub(crate) mod async_runtime;
pub mod crs;
pub mod decoded_image;
pub mod error;
pub mod handle;
mod messenger;
mod options;
pub mod registry;
pub mod render;
pub mod reproj;
pub mod resolution;
pub mod source;
pub mod tile_schema;
pub mod triangulation;
pub mod units;
pub mod wrap;

pub use crs::{AxisOrientation, Crs};
pub use decoded_image::DecodedImage;
pub use handle::{LoadState, LoadableRaster, RasterCompleter, RasterHandle};
pub use messenger::Messenger;
pub use options::ReprojectionOptions;
pub use registry::ProjectionRegistry;
pub use reproj::{ReprojectedImage, ReprojectedTile, ReprojectionContext};
pub use tile_schema::{Lod, TileIndex, TileSchema, WrappingTileIndex};
pub use triangulation::{Triangle, Triangulation};
pub use units::Units;

// Reexport meridian_types
pub use meridian_types;

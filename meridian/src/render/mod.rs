//! Raster warp: resampling of source rasters into the target projection along a triangle mesh.

use std::sync::Arc;

use meridian_types::cartesian::Rect;

use crate::decoded_image::DecodedImage;
use crate::triangulation::Triangulation;

mod cpu_warp;
pub use cpu_warp::CpuWarp;

/// Source raster placed in source projection coordinates.
#[derive(Debug, Clone)]
pub struct WarpSource {
    /// Extent covered by the image, not including the gutter.
    pub extent: Rect,
    /// Image data.
    pub image: Arc<DecodedImage>,
}

/// Parameters of one warp operation.
#[derive(Debug, Clone, Copy)]
pub struct WarpRequest<'a> {
    /// Width of the output image in pixels.
    pub width: u32,
    /// Height of the output image in pixels.
    pub height: u32,
    /// Ratio of the output pixels to the nominal pixels of the target resolution.
    pub pixel_ratio: f64,
    /// Resolution of the source rasters.
    pub source_resolution: f64,
    /// Maximum extent of the source data.
    pub max_source_extent: Option<Rect>,
    /// Resolution of the output image, in target units per nominal pixel.
    pub target_resolution: f64,
    /// Extent of the output image.
    pub target_extent: Rect,
    /// Mesh relating target and source coordinates.
    pub triangulation: &'a Triangulation,
    /// Source rasters.
    pub sources: &'a [WarpSource],
    /// Number of extra pixels on each side of every source image.
    pub gutter: u32,
    /// Use bilinear instead of nearest neighbour sampling.
    pub interpolate: bool,
    /// Draw the edges of the mesh triangles over the output.
    pub render_edges: bool,
}

/// Resamples source rasters into one target image.
pub trait RasterWarp: Send + Sync {
    /// Produces the output image. Areas not covered by any source are transparent.
    fn warp(&self, request: &WarpRequest<'_>) -> DecodedImage;
}

use serde::{Deserialize, Serialize};

/// Parameters of raster reprojection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionOptions {
    /// Maximum allowed error of the triangulation, in source pixels.
    pub error_threshold: f64,
    /// Number of extra pixels on each side of the source tiles.
    pub gutter: u32,
    /// Use bilinear sampling of the source rasters.
    pub interpolate: bool,
    /// Draw the mesh triangles over the reprojected images.
    pub render_edges: bool,
}

impl Default for ReprojectionOptions {
    fn default() -> Self {
        Self {
            error_threshold: 0.5,
            gutter: 0,
            interpolate: true,
            render_edges: false,
        }
    }
}

impl ReprojectionOptions {
    /// Sets the error threshold.
    pub fn with_error_threshold(mut self, error_threshold: f64) -> Self {
        self.error_threshold = error_threshold;
        self
    }

    /// Sets the gutter of the source tiles.
    pub fn with_gutter(mut self, gutter: u32) -> Self {
        self.gutter = gutter;
        self
    }

    /// Enables or disables interpolation.
    pub fn with_interpolate(mut self, interpolate: bool) -> Self {
        self.interpolate = interpolate;
        self
    }

    /// Enables or disables drawing of the mesh.
    pub fn with_render_edges(mut self, render_edges: bool) -> Self {
        self.render_edges = render_edges;
        self
    }
}

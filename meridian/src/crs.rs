//! Descriptors of coordinate reference systems.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use meridian_types::cartesian::{Point2, Rect};
use serde::{Deserialize, Serialize};

use crate::units::Units;

/// Function that returns the resolution of a projection at the given point, measured along the
/// surface, for the nominal `resolution` in projection units.
pub type PointResolutionFn = Arc<dyn Fn(f64, &Point2) -> f64 + Send + Sync>;

/// Orientation of the coordinate axes of a CRS.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AxisOrientation {
    /// East, north, up.
    #[default]
    Enu,
    /// North, east, up.
    Neu,
    /// West, south, up.
    Wsu,
}

/// Coordinate reference system descriptor.
///
/// Descriptors are created once, registered in a
/// [`ProjectionRegistry`](crate::registry::ProjectionRegistry) and shared by reference afterwards.
#[derive(Clone)]
pub struct Crs {
    code: String,
    units: Units,
    extent: Option<Rect>,
    world_extent: Option<Rect>,
    axis_orientation: AxisOrientation,
    global: bool,
    can_wrap_x: bool,
    point_resolution: Option<PointResolutionFn>,
    meters_per_unit: Option<f64>,
}

impl Debug for Crs {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crs")
            .field("code", &self.code)
            .field("units", &self.units)
            .field("extent", &self.extent)
            .field("global", &self.global)
            .finish()
    }
}

impl Crs {
    /// Creates a non-global CRS without extents.
    pub fn new(code: impl Into<String>, units: Units) -> Self {
        Self {
            code: code.into(),
            units,
            extent: None,
            world_extent: None,
            axis_orientation: AxisOrientation::default(),
            global: false,
            can_wrap_x: false,
            point_resolution: None,
            meters_per_unit: None,
        }
    }

    /// Sets the validity extent in the CRS coordinates.
    pub fn with_extent(mut self, extent: Rect) -> Self {
        self.set_extent(extent);
        self
    }

    /// Sets the validity extent in geographic degrees.
    pub fn with_world_extent(mut self, world_extent: Rect) -> Self {
        self.world_extent = Some(world_extent);
        self
    }

    /// Marks the CRS as covering the whole world horizontally.
    pub fn with_global(mut self, global: bool) -> Self {
        self.set_global(global);
        self
    }

    /// Sets the axis orientation.
    pub fn with_axis_orientation(mut self, axis_orientation: AxisOrientation) -> Self {
        self.axis_orientation = axis_orientation;
        self
    }

    /// Sets a custom point resolution function.
    pub fn with_point_resolution(
        mut self,
        point_resolution: impl Fn(f64, &Point2) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.point_resolution = Some(Arc::new(point_resolution));
        self
    }

    /// Overrides the meters-per-unit value derived from the units.
    pub fn with_meters_per_unit(mut self, meters_per_unit: f64) -> Self {
        self.meters_per_unit = Some(meters_per_unit);
        self
    }

    /// Code of the CRS, e.g. `EPSG:3857`.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Units of the coordinates.
    pub fn units(&self) -> Units {
        self.units
    }

    /// Validity extent in the CRS coordinates.
    pub fn extent(&self) -> Option<Rect> {
        self.extent
    }

    /// Validity extent in geographic degrees.
    pub fn world_extent(&self) -> Option<Rect> {
        self.world_extent
    }

    /// Axis orientation.
    pub fn axis_orientation(&self) -> AxisOrientation {
        self.axis_orientation
    }

    /// Whether the CRS covers the whole world horizontally.
    pub fn is_global(&self) -> bool {
        self.global
    }

    /// Whether coordinates can be wrapped over the antimeridian. True for global CRSs with a
    /// validity extent.
    pub fn can_wrap_x(&self) -> bool {
        self.can_wrap_x
    }

    /// Custom point resolution function, if any.
    pub fn point_resolution_fn(&self) -> Option<&PointResolutionFn> {
        self.point_resolution.as_ref()
    }

    /// Length of one coordinate unit in meters.
    pub fn meters_per_unit(&self) -> Option<f64> {
        self.meters_per_unit.or_else(|| self.units.meters_per_unit())
    }

    /// Width of the validity extent.
    pub fn world_width(&self) -> Option<f64> {
        self.extent.map(|extent| extent.width())
    }

    /// Sets the validity extent.
    pub fn set_extent(&mut self, extent: Rect) {
        self.extent = Some(extent);
        self.can_wrap_x = self.global && self.extent.is_some();
    }

    /// Sets the world extent.
    pub fn set_world_extent(&mut self, world_extent: Rect) {
        self.world_extent = Some(world_extent);
    }

    /// Sets the global flag.
    pub fn set_global(&mut self, global: bool) {
        self.global = global;
        self.can_wrap_x = self.global && self.extent.is_some();
    }
}

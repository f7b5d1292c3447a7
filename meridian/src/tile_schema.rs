//! [`TileSchema`] describes how a tile grid is laid over a projection and converts between tile
//! indices and extents.

use meridian_types::cartesian::{Point2, Rect};
use serde::{Deserialize, Serialize};

use crate::registry::{EPSG_3857, EPSG_4326};

const RESOLUTION_TOLERANCE: f64 = 0.01;

/// Level of detail: resolution of one z-level of a tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lod {
    resolution: f64,
    z_index: u32,
}

impl Lod {
    /// Creates a level of detail. Returns `None` if the resolution is not finite and positive.
    pub fn new(resolution: f64, z_index: u32) -> Option<Self> {
        (resolution.is_finite() && resolution > 0.0).then_some(Self {
            resolution,
            z_index,
        })
    }

    /// Z-index.
    pub fn z_index(&self) -> u32 {
        self.z_index
    }

    /// Size of one pixel in projection units.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }
}

/// Direction of the Y index of tiles.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum VerticalDirection {
    /// Tiles with `Y == 0` are at the top of the grid.
    TopToBottom,
    /// Tiles with `Y == 0` are at the bottom of the grid.
    BottomToTop,
}

/// Tile index.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash, Serialize, Deserialize)]
pub struct TileIndex {
    /// X index.
    pub x: i32,
    /// Y index.
    pub y: i32,
    /// Z index.
    pub z: u32,
}

impl TileIndex {
    /// Creates a new index.
    pub fn new(x: i32, y: i32, z: u32) -> Self {
        Self { x, y, z }
    }
}

/// Tile index of a grid that repeats horizontally. `x` is the index of the tile inside the grid
/// bounds, `display_x` is the requested virtual index that can be outside of them.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash, Serialize, Deserialize)]
pub struct WrappingTileIndex {
    /// Z index.
    pub z: u32,
    /// X index inside the grid.
    pub x: i32,
    /// Y index.
    pub y: i32,
    /// Virtual X index.
    pub display_x: i32,
}

impl From<WrappingTileIndex> for TileIndex {
    fn from(value: WrappingTileIndex) -> Self {
        Self {
            x: value.x,
            y: value.y,
            z: value.z,
        }
    }
}

/// Inclusive rectangular range of tile indices on one z-level.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct TileRange {
    /// Z index.
    pub z: u32,
    /// Minimum X index.
    pub x_min: i32,
    /// Maximum X index.
    pub x_max: i32,
    /// Minimum Y index.
    pub y_min: i32,
    /// Maximum Y index.
    pub y_max: i32,
}

impl TileRange {
    /// Iterates over the indices, row by row.
    pub fn iter(&self) -> impl Iterator<Item = TileIndex> {
        let TileRange {
            z,
            x_min,
            x_max,
            y_min,
            y_max,
        } = *self;
        (y_min..=y_max).flat_map(move |y| (x_min..=x_max).map(move |x| TileIndex::new(x, y, z)))
    }

    /// Number of tiles in the range.
    pub fn count(&self) -> usize {
        ((self.x_max - self.x_min + 1) as usize) * ((self.y_max - self.y_min + 1) as usize)
    }

    /// Whether the index belongs to the range.
    pub fn contains(&self, index: TileIndex) -> bool {
        index.z == self.z
            && (self.x_min..=self.x_max).contains(&index.x)
            && (self.y_min..=self.y_max).contains(&index.y)
    }
}

/// Tile grid of a tiled raster source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TileSchema {
    /// Position of the corner of the tile with `X == 0, Y == 0`.
    pub origin: Point2,
    /// Rectangle that contains all tiles of the grid.
    pub bounds: Rect,
    /// Levels of detail.
    pub lods: Vec<Lod>,
    /// Width of a single tile in pixels.
    pub tile_width: u32,
    /// Height of a single tile in pixels.
    pub tile_height: u32,
    /// Direction of the Y axis.
    pub y_direction: VerticalDirection,
    /// Code of the projection of the grid.
    pub crs: String,
}

impl TileSchema {
    /// Resolution of the z-level, if it exists.
    pub fn lod_resolution(&self, z: u32) -> Option<f64> {
        self.lods
            .iter()
            .find(|lod| lod.z_index() == z)
            .map(Lod::resolution)
    }

    /// Selects the least detailed level whose resolution is not coarser than the given one (with
    /// a small tolerance). Resolutions finer than any level give the most detailed level.
    pub fn select_lod(&self, resolution: f64) -> Option<Lod> {
        if !resolution.is_finite() {
            return None;
        }

        let mut lods = self.sorted_lods().rev();
        let mut selected = lods.next()?;
        for lod in lods {
            if lod.resolution() * (1.0 - RESOLUTION_TOLERANCE) > resolution {
                break;
            }
            selected = lod;
        }

        Some(selected)
    }

    /// Level whose resolution is the closest to the given one. Ties go to the more detailed
    /// level.
    pub fn nearest_lod(&self, resolution: f64) -> Option<Lod> {
        if !resolution.is_finite() {
            return None;
        }

        let mut lods = self.sorted_lods();
        let mut prev = lods.next()?;
        if prev.resolution() <= resolution {
            return Some(prev);
        }

        for lod in lods {
            if lod.resolution() <= resolution {
                return if prev.resolution() - resolution < resolution - lod.resolution() {
                    Some(prev)
                } else {
                    Some(lod)
                };
            }
            prev = lod;
        }

        Some(prev)
    }

    /// Levels from the least to the most detailed one.
    fn sorted_lods(&self) -> impl DoubleEndedIterator<Item = Lod> {
        let mut lods = self.lods.clone();
        lods.sort_by(|a, b| b.resolution().total_cmp(&a.resolution()));
        lods.into_iter()
    }

    /// Extent of the tile. Returns `None` if the z-level does not exist.
    pub fn tile_bbox(&self, index: TileIndex) -> Option<Rect> {
        let resolution = self.lod_resolution(index.z)?;
        let width = self.tile_width as f64 * resolution;
        let height = self.tile_height as f64 * resolution;

        let x_min = self.origin.x + index.x as f64 * width;
        let y_min = match self.y_direction {
            VerticalDirection::TopToBottom => self.origin.y - (index.y + 1) as f64 * height,
            VerticalDirection::BottomToTop => self.origin.y + index.y as f64 * height,
        };

        Some(Rect::new(x_min, y_min, x_min + width, y_min + height))
    }

    /// Indices of the tiles on the z-level that lie within the grid bounds.
    pub fn full_range(&self, z: u32) -> Option<TileRange> {
        self.range_for(&self.bounds, z)
    }

    /// Indices of the tiles on the z-level that overlap the extent, limited to the grid bounds.
    /// Tiles that only touch the extent are not included. Returns `None` if there are no such
    /// tiles.
    pub fn tile_range(&self, extent: &Rect, z: u32) -> Option<TileRange> {
        let full = self.full_range(z)?;
        let range = self.range_for(extent, z)?;

        let clipped = TileRange {
            z,
            x_min: range.x_min.max(full.x_min),
            x_max: range.x_max.min(full.x_max),
            y_min: range.y_min.max(full.y_min),
            y_max: range.y_max.min(full.y_max),
        };

        (clipped.x_min <= clipped.x_max && clipped.y_min <= clipped.y_max).then_some(clipped)
    }

    fn range_for(&self, extent: &Rect, z: u32) -> Option<TileRange> {
        let resolution = self.lod_resolution(z)?;
        let width = self.tile_width as f64 * resolution;
        let height = self.tile_height as f64 * resolution;

        let x_from = snap((extent.x_min - self.origin.x) / width);
        let x_to = snap((extent.x_max - self.origin.x) / width);
        let (y_from, y_to) = match self.y_direction {
            VerticalDirection::TopToBottom => (
                snap((self.origin.y - extent.y_max) / height),
                snap((self.origin.y - extent.y_min) / height),
            ),
            VerticalDirection::BottomToTop => (
                snap((extent.y_min - self.origin.y) / height),
                snap((extent.y_max - self.origin.y) / height),
            ),
        };

        if ![x_from, x_to, y_from, y_to].iter().all(|v| v.is_finite()) {
            return None;
        }

        Some(TileRange {
            z,
            x_min: x_from.floor() as i32,
            x_max: x_to.ceil() as i32 - 1,
            y_min: y_from.floor() as i32,
            y_max: y_to.ceil() as i32 - 1,
        })
    }

    /// Converts a possibly out-of-bounds index into an index inside the grid.
    ///
    /// If `wrap_x` is set, X is wrapped around the grid width, otherwise indices with X outside
    /// of the grid give `None`. Indices with Y outside of the grid always give `None`.
    pub fn wrap_index(&self, index: TileIndex, wrap_x: bool) -> Option<WrappingTileIndex> {
        let full = self.full_range(index.z)?;
        if index.y < full.y_min || index.y > full.y_max {
            return None;
        }

        let x = if wrap_x {
            let columns = full.x_max - full.x_min + 1;
            (index.x - full.x_min).rem_euclid(columns) + full.x_min
        } else if (full.x_min..=full.x_max).contains(&index.x) {
            index.x
        } else {
            return None;
        };

        Some(WrappingTileIndex {
            z: index.z,
            x,
            y: index.y,
            display_x: index.x,
        })
    }

    /// Standard Web Mercator tile grid (used, for example, by OSM and Google maps).
    pub fn web(lods_count: u32) -> Self {
        const HALF_SIZE: f64 = 20_037_508.342789244;
        const TOP_RESOLUTION: f64 = HALF_SIZE * 2.0 / 256.0;

        Self::power_of_two(
            Rect::new(-HALF_SIZE, -HALF_SIZE, HALF_SIZE, HALF_SIZE),
            TOP_RESOLUTION,
            lods_count,
            EPSG_3857,
        )
    }

    /// Geographic tile grid with two 256px tiles on the top level.
    pub fn geographic(lods_count: u32) -> Self {
        const TOP_RESOLUTION: f64 = 360.0 / 512.0;

        Self::power_of_two(
            Rect::new(-180.0, -90.0, 180.0, 90.0),
            TOP_RESOLUTION,
            lods_count,
            EPSG_4326,
        )
    }

    fn power_of_two(bounds: Rect, top_resolution: f64, lods_count: u32, crs: &str) -> Self {
        let lods = (0..lods_count)
            .filter_map(|z| Lod::new(top_resolution / f64::from(1u32 << z.min(31)), z))
            .collect();

        Self {
            origin: bounds.top_left(),
            bounds,
            lods,
            tile_width: 256,
            tile_height: 256,
            y_direction: VerticalDirection::TopToBottom,
            crs: crs.to_string(),
        }
    }
}

/// Rounds values that are very close to an integer, so that extents aligned with the grid do not
/// pick up neighbouring tiles because of float errors.
fn snap(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() < 1e-5 {
        rounded
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn simple_schema() -> TileSchema {
        TileSchema {
            origin: Point2::new(0.0, 0.0),
            bounds: Rect::new(0.0, 0.0, 2048.0, 2048.0),
            lods: vec![
                Lod::new(8.0, 0).expect("valid"),
                Lod::new(4.0, 1).expect("valid"),
                Lod::new(2.0, 2).expect("valid"),
            ],
            tile_width: 256,
            tile_height: 256,
            y_direction: VerticalDirection::BottomToTop,
            crs: "TEST".to_string(),
        }
    }

    #[test]
    fn invalid_lod() {
        assert!(Lod::new(1.0, 1).is_some());
        assert!(Lod::new(0.0, 1).is_none());
        assert!(Lod::new(-1.0, 1).is_none());
        assert!(Lod::new(f64::NAN, 1).is_none());
        assert!(Lod::new(f64::INFINITY, 1).is_none());
    }

    #[test]
    fn select_lod() {
        let schema = simple_schema();
        let z = |resolution| schema.select_lod(resolution).map(|lod| lod.z_index());
        assert_eq!(z(16.0), Some(0));
        assert_eq!(z(8.0), Some(0));
        assert_eq!(z(7.99), Some(0));
        assert_eq!(z(7.5), Some(1));
        assert_eq!(z(4.0), Some(1));
        assert_eq!(z(1.0), Some(2));
        assert_eq!(z(f64::NAN), None);
    }

    #[test]
    fn nearest_lod() {
        let schema = simple_schema();
        let z = |resolution| schema.nearest_lod(resolution).map(|lod| lod.z_index());
        assert_eq!(z(100.0), Some(0));
        assert_eq!(z(6.5), Some(0));
        assert_eq!(z(6.0), Some(1));
        assert_eq!(z(5.0), Some(1));
        assert_eq!(z(3.0), Some(2));
        assert_eq!(z(0.1), Some(2));
    }

    #[test]
    fn tile_bbox() {
        let schema = simple_schema();
        assert_eq!(
            schema.tile_bbox(TileIndex::new(1, 2, 1)),
            Some(Rect::new(1024.0, 2048.0, 2048.0, 3072.0))
        );
        assert_eq!(schema.tile_bbox(TileIndex::new(0, 0, 5)), None);

        let web = TileSchema::web(3);
        let bbox = web.tile_bbox(TileIndex::new(0, 0, 1)).expect("z exists");
        assert_abs_diff_eq!(bbox.x_min, -20_037_508.342789244, epsilon = 1e-6);
        assert_abs_diff_eq!(bbox.x_max, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(bbox.y_min, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(bbox.y_max, 20_037_508.342789244, epsilon = 1e-6);
    }

    #[test]
    fn tile_range() {
        let schema = simple_schema();
        let range = schema
            .tile_range(&Rect::new(200.0, 700.0, 1200.0, 1100.0), 2)
            .expect("inside the grid");
        assert_eq!(
            range,
            TileRange {
                z: 2,
                x_min: 0,
                x_max: 2,
                y_min: 1,
                y_max: 2
            }
        );
        assert_eq!(range.count(), 6);
        assert_eq!(range.iter().count(), 6);
        assert!(range.contains(TileIndex::new(2, 1, 2)));

        // Aligned with tile borders.
        let range = schema
            .tile_range(&Rect::new(512.0, 0.0, 1024.0, 512.0), 2)
            .expect("inside the grid");
        assert_eq!((range.x_min, range.x_max), (1, 1));
        assert_eq!((range.y_min, range.y_max), (0, 0));

        assert_eq!(
            schema.tile_range(&Rect::new(-100.0, -100.0, -50.0, -50.0), 0),
            None
        );
    }

    #[test]
    fn geographic_range() {
        let schema = TileSchema::geographic(3);
        assert_eq!(schema.lod_resolution(1), Some(0.3515625));
        let range = schema
            .tile_range(&Rect::new(-180.0, 0.0, 0.0, 85.0), 1)
            .expect("inside the grid");
        assert_eq!((range.x_min, range.x_max), (0, 1));
        assert_eq!((range.y_min, range.y_max), (0, 0));
        assert_eq!(
            schema.full_range(0),
            Some(TileRange {
                z: 0,
                x_min: 0,
                x_max: 1,
                y_min: 0,
                y_max: 0
            })
        );
    }

    #[test]
    fn wrap_index() {
        let schema = TileSchema::web(3);
        assert_eq!(
            schema.wrap_index(TileIndex::new(-1, 0, 1), true),
            Some(WrappingTileIndex {
                z: 1,
                x: 1,
                y: 0,
                display_x: -1
            })
        );
        assert_eq!(schema.wrap_index(TileIndex::new(5, 1, 1), true).map(|i| i.x), Some(1));
        assert_eq!(schema.wrap_index(TileIndex::new(2, 0, 1), false), None);
        assert_eq!(schema.wrap_index(TileIndex::new(0, 2, 1), true), None);
        assert_eq!(schema.wrap_index(TileIndex::new(0, 0, 7), true), None);
    }
}

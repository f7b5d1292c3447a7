//! Handling of extents that cross the antimeridian of a wrapping projection.

use meridian_types::cartesian::Rect;

use crate::crs::Crs;

/// Moves the extent by a whole number of world widths so that its centre lies inside the
/// projection extent. Extents of non-wrapping projections are returned unchanged.
pub fn wrap_x(extent: Rect, crs: &Crs) -> Rect {
    let Some(world) = world_extent(crs) else {
        return extent;
    };

    let center = extent.center();
    if center.x < world.x_min || center.x >= world.x_max {
        let world_width = world.width();
        let worlds_away = ((center.x - world.x_min) / world_width).floor();
        extent.shift_x(-worlds_away * world_width)
    } else {
        extent
    }
}

/// Wraps the extent with [`wrap_x`] and splits it at the projection bounds into slices that lie
/// inside the world.
///
/// Extents wider than the world are replaced by one full-width slice unless `multi_world` is set,
/// in which case the two overlapping slices are returned. Extents with non-finite horizontal
/// bounds always become one full-width slice.
pub fn wrap_and_slice_x(extent: Rect, crs: &Crs, multi_world: bool) -> Vec<Rect> {
    let Some(world) = world_extent(crs) else {
        return vec![extent];
    };

    let full_width = Rect::new(world.x_min, extent.y_min, world.x_max, extent.y_max);
    if !extent.x_min.is_finite() || !extent.x_max.is_finite() {
        return vec![full_width];
    }

    let extent = wrap_x(extent, crs);
    let world_width = world.width();
    if extent.width() > world_width && !multi_world {
        return vec![full_width];
    }

    if extent.x_min < world.x_min {
        vec![
            Rect::new(
                extent.x_min + world_width,
                extent.y_min,
                world.x_max,
                extent.y_max,
            ),
            Rect::new(world.x_min, extent.y_min, extent.x_max, extent.y_max),
        ]
    } else if extent.x_max > world.x_max {
        vec![
            Rect::new(extent.x_min, extent.y_min, world.x_max, extent.y_max),
            Rect::new(
                world.x_min,
                extent.y_min,
                extent.x_max - world_width,
                extent.y_max,
            ),
        ]
    } else {
        vec![extent]
    }
}

fn world_extent(crs: &Crs) -> Option<Rect> {
    if crs.can_wrap_x() {
        crs.extent()
    } else {
        None
    }
}

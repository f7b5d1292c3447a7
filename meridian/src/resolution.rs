//! Conversion of resolutions between projections.

use meridian_types::cartesian::{CartesianPoint2dFloat, Point2, Rect};
use meridian_types::geo::Projection;

use crate::crs::Crs;
use crate::error::MeridianError;
use crate::registry::{ProjectionRegistry, EPSG_4326};
use crate::units::Units;

/// Mean Earth radius used for distance measurements.
pub const EARTH_RADIUS: f64 = 6_371_008.8;

/// Great circle distance in meters between two points given as longitude/latitude in degrees.
pub fn haversine_distance(a: &Point2, b: &Point2) -> f64 {
    let lat1 = a.y.to_radians();
    let lat2 = b.y.to_radians();
    let delta_lat_by2 = (lat2 - lat1) / 2.0;
    let delta_lon_by2 = (b.x - a.x).to_radians() / 2.0;
    let h = delta_lat_by2.sin().powi(2)
        + delta_lon_by2.sin().powi(2) * lat1.cos() * lat2.cos();

    2.0 * EARTH_RADIUS * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Resolution of the projection at the given point, measured along the surface and expressed in
/// the projection units.
///
/// Uses the projection's own point resolution function if it has one. Degrees are returned as
/// is. For other units a one-pixel cross around the point is transformed into EPSG:4326 and its
/// average arm length is measured. Projections without a transform into EPSG:4326 keep the
/// nominal resolution.
pub fn point_resolution(
    registry: &ProjectionRegistry,
    crs: &Crs,
    resolution: f64,
    point: &Point2,
) -> f64 {
    if let Some(resolution_fn) = crs.point_resolution_fn() {
        return resolution_fn(resolution, point);
    }

    if crs.units() == Units::Degrees {
        return resolution;
    }

    let Some(lonlat) = registry.get(EPSG_4326) else {
        return resolution;
    };
    let Some(to_lonlat) = registry.get_transform(crs, &lonlat) else {
        return resolution;
    };

    let half = resolution / 2.0;
    let arm = |a: Point2, b: Point2| -> f64 {
        match (to_lonlat.project(&a), to_lonlat.project(&b)) {
            (Some(a), Some(b)) => haversine_distance(&a, &b),
            _ => f64::NAN,
        }
    };
    let width = arm(
        Point2::new(point.x - half, point.y),
        Point2::new(point.x + half, point.y),
    );
    let height = arm(
        Point2::new(point.x, point.y - half),
        Point2::new(point.x, point.y + half),
    );
    let measured = (width + height) / 2.0;

    match crs.meters_per_unit() {
        Some(meters_per_unit) => measured / meters_per_unit,
        None => measured,
    }
}

/// Calculates the resolution of the source raster that gives approximately one source pixel per
/// target pixel around `target_center`.
///
/// The result may be non-finite if the point cannot be represented in one of the projections.
/// Returns an error if the projections cannot be related to each other.
pub fn calculate_source_resolution(
    registry: &ProjectionRegistry,
    source: &Crs,
    target: &Crs,
    target_center: &Point2,
    target_resolution: f64,
) -> Result<f64, MeridianError> {
    let target_meters_per_unit = target.meters_per_unit();
    let source_meters_per_unit = source.meters_per_unit();
    if target_meters_per_unit.is_none() && source_meters_per_unit.is_none() {
        return Err(MeridianError::UnknownMetersPerUnit(target.code().to_string()));
    }

    let source_center = registry
        .transform(target_center, target, source)?
        .unwrap_or_else(|| Point2::new(f64::NAN, f64::NAN));

    let mut source_resolution =
        point_resolution(registry, target, target_resolution, target_center);
    if let Some(meters_per_unit) = target_meters_per_unit {
        source_resolution *= meters_per_unit;
    }
    if let Some(meters_per_unit) = source_meters_per_unit {
        source_resolution /= meters_per_unit;
    }

    let compensate = match source.extent() {
        Some(extent) => source_center.is_finite() && extent.contains(&source_center),
        None => true,
    };
    if compensate {
        let compensation_factor =
            point_resolution(registry, source, source_resolution, &source_center)
                / source_resolution;
        if compensation_factor.is_finite() && compensation_factor > 0.0 {
            source_resolution /= compensation_factor;
        }
    }

    Ok(source_resolution)
}

/// Same as [`calculate_source_resolution`] for the centre of `target_extent`. If the centre does
/// not give a usable value, the corners of the extent are tried one by one.
pub fn calculate_source_extent_resolution(
    registry: &ProjectionRegistry,
    source: &Crs,
    target: &Crs,
    target_extent: &Rect,
    target_resolution: f64,
) -> Result<f64, MeridianError> {
    let usable = |resolution: f64| resolution.is_finite() && resolution > 0.0;

    let mut resolution = calculate_source_resolution(
        registry,
        source,
        target,
        &target_extent.center(),
        target_resolution,
    )?;

    if !usable(resolution) {
        for corner in [
            target_extent.bottom_left(),
            target_extent.bottom_right(),
            target_extent.top_right(),
            target_extent.top_left(),
        ] {
            resolution =
                calculate_source_resolution(registry, source, target, &corner, target_resolution)?;
            if usable(resolution) {
                break;
            }
        }
    }

    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use approx::assert_abs_diff_eq;
    use assert_matches::assert_matches;

    use super::*;
    use crate::registry::EPSG_3857;

    const METERS_PER_DEGREE: f64 = 111_194.87428468118;

    fn registry() -> ProjectionRegistry {
        ProjectionRegistry::with_defaults()
    }

    #[test]
    fn haversine_along_equator() {
        let distance = haversine_distance(&Point2::new(0.0, 0.0), &Point2::new(1.0, 0.0));
        assert_abs_diff_eq!(distance, EARTH_RADIUS * PI / 180.0, epsilon = 1e-6);
    }

    #[test]
    fn point_resolution_of_mercator_shrinks_with_latitude() {
        let registry = registry();
        let mercator = registry.crs(EPSG_3857).expect("registered");
        assert_abs_diff_eq!(
            point_resolution(&registry, &mercator, 100.0, &Point2::new(0.0, 0.0)),
            100.0
        );

        let y = registry
            .transform(
                &Point2::new(0.0, 60.0),
                &registry.crs(EPSG_4326).expect("registered"),
                &mercator,
            )
            .expect("registered")
            .expect("finite");
        assert_abs_diff_eq!(
            point_resolution(&registry, &mercator, 100.0, &y),
            50.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn point_resolution_by_measuring_distance() {
        let mut registry = registry();
        let meters_per_degree = EARTH_RADIUS * PI / 180.0;
        let plate = registry.add_projection(Crs::new("TEST:plate", Units::Meters));
        registry.add_coordinate_transforms(
            "TEST:plate",
            EPSG_4326,
            move |p| Some(Point2::new(p.x / meters_per_degree, p.y / meters_per_degree)),
            move |p| Some(Point2::new(p.x * meters_per_degree, p.y * meters_per_degree)),
        );

        let resolution = point_resolution(&registry, &plate, 1000.0, &Point2::new(0.0, 0.0));
        assert_abs_diff_eq!(resolution, 1000.0, epsilon = 1e-6);
    }

    #[test]
    fn mercator_to_lonlat() {
        let registry = registry();
        let resolution = calculate_source_resolution(
            &registry,
            &registry.crs(EPSG_4326).expect("registered"),
            &registry.crs(EPSG_3857).expect("registered"),
            &Point2::new(0.0, 0.0),
            1000.0,
        )
        .expect("valid projections");
        assert_abs_diff_eq!(resolution, 1000.0 / METERS_PER_DEGREE, epsilon = 1e-12);
    }

    #[test]
    fn lonlat_to_mercator_compensates_distortion() {
        let registry = registry();
        let lonlat = registry.crs(EPSG_4326).expect("registered");
        let mercator = registry.crs(EPSG_3857).expect("registered");

        let at_equator = calculate_source_resolution(
            &registry,
            &mercator,
            &lonlat,
            &Point2::new(0.0, 0.0),
            0.01,
        )
        .expect("valid projections");
        assert_abs_diff_eq!(at_equator, 0.01 * METERS_PER_DEGREE, epsilon = 1e-6);

        let at_60 = calculate_source_resolution(
            &registry,
            &mercator,
            &lonlat,
            &Point2::new(0.0, 60.0),
            0.01,
        )
        .expect("valid projections");
        assert_abs_diff_eq!(at_60, 0.02 * METERS_PER_DEGREE, epsilon = 1e-6);
    }

    #[test]
    fn unknown_scale_is_configuration_error() {
        let mut registry = registry();
        let a = registry.add_projection(Crs::new("A", Units::Pixels));
        let b = registry.add_projection(Crs::new("B", Units::TilePixels));
        registry.add_coordinate_transforms("A", "B", |p| Some(*p), |p| Some(*p));

        assert_matches!(
            calculate_source_resolution(&registry, &a, &b, &Point2::new(0.0, 0.0), 1.0),
            Err(MeridianError::UnknownMetersPerUnit(_))
        );
    }

    #[test]
    fn extent_resolution_falls_back_to_corners() {
        let mut registry = registry();
        let lonlat = registry.crs(EPSG_4326).expect("registered");
        // Scale vanishes on the vertical axis.
        let target = registry.add_projection(
            Crs::new("TEST:pinched", Units::Degrees)
                .with_point_resolution(|resolution, point| resolution * point.x.abs().min(1.0)),
        );
        registry.add_coordinate_transforms("TEST:pinched", EPSG_4326, |p| Some(*p), |p| Some(*p));

        let at_center = calculate_source_resolution(
            &registry,
            &lonlat,
            &target,
            &Point2::new(0.0, 0.0),
            0.1,
        )
        .expect("valid projections");
        assert_eq!(at_center, 0.0);

        let resolution = calculate_source_extent_resolution(
            &registry,
            &lonlat,
            &target,
            &Rect::new(-10.0, -10.0, 10.0, 10.0),
            0.1,
        )
        .expect("valid projections");
        assert_abs_diff_eq!(resolution, 0.1, epsilon = 1e-12);
    }
}

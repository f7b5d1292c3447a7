//! Registry of known projections and coordinate transforms between them.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

use lazy_static::lazy_static;
use meridian_types::cartesian::{CartesianPoint2dFloat, Point2, Rect};
use meridian_types::geo::impls::{IdentityProjection, WebMercator};
use meridian_types::geo::{
    ChainProjection, Datum, GeoPoint, GeoPoint2d, InvertedProjection, NewGeoPoint, Projection,
};

use crate::crs::{AxisOrientation, Crs};
use crate::error::MeridianError;
use crate::units::Units;

/// Code of the geographic WGS84 CRS.
pub const EPSG_4326: &str = "EPSG:4326";
/// Code of the Web Mercator CRS.
pub const EPSG_3857: &str = "EPSG:3857";

/// Maximum latitude representable in Web Mercator.
const MAX_MERCATOR_LAT: f64 = 85.0511287798066;

const WEB_MERCATOR_CODES: [&str; 6] = [
    EPSG_3857,
    "EPSG:102100",
    "EPSG:102113",
    "EPSG:900913",
    "http://www.opengis.net/def/crs/EPSG/0/3857",
    "http://www.opengis.net/gml/srs/epsg.xml#3857",
];

const LONLAT_CODES: [(&str, AxisOrientation); 7] = [
    ("CRS:84", AxisOrientation::Enu),
    (EPSG_4326, AxisOrientation::Neu),
    ("urn:ogc:def:crs:OGC:1.3:CRS84", AxisOrientation::Enu),
    ("urn:ogc:def:crs:OGC:2:84", AxisOrientation::Enu),
    ("http://www.opengis.net/def/crs/OGC/1.3/CRS84", AxisOrientation::Enu),
    ("urn:ogc:def:crs:EPSG::4326", AxisOrientation::Neu),
    ("http://www.opengis.net/gml/srs/epsg.xml#4326", AxisOrientation::Neu),
];

/// Point transform between two projected coordinate systems. `project` converts from the first
/// system into the second, `unproject` does the opposite.
pub type PointTransform = dyn Projection<InPoint = Point2, OutPoint = Point2> + Send + Sync;

type TransformFn = Box<dyn Fn(&Point2) -> Option<Point2> + Send + Sync>;

struct FnProjection {
    forward: TransformFn,
    inverse: TransformFn,
}

impl Projection for FnProjection {
    type InPoint = Point2;
    type OutPoint = Point2;

    fn project(&self, input: &Point2) -> Option<Point2> {
        (self.forward)(input)
    }

    fn unproject(&self, input: &Point2) -> Option<Point2> {
        (self.inverse)(input)
    }
}

/// Web Mercator over points with longitude as X and latitude as Y. Latitudes beyond the Mercator
/// limit are clamped so that the forward transform stays finite at the poles.
struct LonLatWebMercator {
    inner: WebMercator<GeoPoint2d, Point2>,
}

impl Projection for LonLatWebMercator {
    type InPoint = Point2;
    type OutPoint = Point2;

    fn project(&self, input: &Point2) -> Option<Point2> {
        let lat = input.y.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
        self.inner.project(&GeoPoint2d::latlon(lat, input.x))
    }

    fn unproject(&self, input: &Point2) -> Option<Point2> {
        let point = self.inner.unproject(input)?;
        Some(Point2::new(point.lon(), point.lat()))
    }
}

#[derive(Clone)]
struct RegisteredTransform {
    transform: Arc<PointTransform>,
    identity: bool,
}

lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<ProjectionRegistry> =
        Arc::new(ProjectionRegistry::with_defaults());
}

/// Maps projection codes to [`Crs`] descriptors and holds coordinate transforms between them.
///
/// The registry is written during explicit registration calls and only read afterwards. A
/// process-wide instance with the default projections is available through
/// [`ProjectionRegistry::global`].
#[derive(Default, Clone)]
pub struct ProjectionRegistry {
    projections: HashMap<String, Arc<Crs>>,
    transforms: HashMap<(String, String), RegisteredTransform>,
}

impl ProjectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with EPSG:4326 and EPSG:3857 (and their aliases) and transforms between
    /// them.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        let half_size = PI * Datum::WGS84.semimajor();
        let radius = Datum::WGS84.semimajor();
        for code in WEB_MERCATOR_CODES {
            registry.add_projection(
                Crs::new(code, Units::Meters)
                    .with_extent(Rect::new(-half_size, -half_size, half_size, half_size))
                    .with_world_extent(Rect::new(-180.0, -85.0, 180.0, 85.0))
                    .with_global(true)
                    .with_point_resolution(move |resolution, point| {
                        resolution / (point.y / radius).cosh()
                    }),
            );
        }

        for (code, axis_orientation) in LONLAT_CODES {
            registry.add_projection(
                Crs::new(code, Units::Degrees)
                    .with_extent(Rect::new(-180.0, -90.0, 180.0, 90.0))
                    .with_world_extent(Rect::new(-180.0, -90.0, 180.0, 90.0))
                    .with_axis_orientation(axis_orientation)
                    .with_global(true),
            );
        }

        let lonlat_codes: Vec<&str> = LONLAT_CODES.iter().map(|(code, _)| *code).collect();
        registry.add_equivalent_projections(&WEB_MERCATOR_CODES);
        registry.add_equivalent_projections(&lonlat_codes);
        registry.add_equivalent_transforms(
            &lonlat_codes,
            &WEB_MERCATOR_CODES,
            Arc::new(LonLatWebMercator {
                inner: WebMercator::new(Datum::WGS84),
            }),
        );

        registry
    }

    /// Shared registry with the default projections.
    pub fn global() -> Arc<Self> {
        GLOBAL_REGISTRY.clone()
    }

    /// Registers the CRS under its code, replacing any previous registration.
    pub fn add_projection(&mut self, crs: Crs) -> Arc<Crs> {
        let crs = Arc::new(crs);
        self.projections
            .insert(crs.code().to_string(), crs.clone());
        crs
    }

    /// Returns the CRS registered under the code.
    pub fn get(&self, code: &str) -> Option<Arc<Crs>> {
        self.projections.get(code).cloned()
    }

    /// Returns the CRS registered under the code, or a configuration error.
    pub fn crs(&self, code: &str) -> Result<Arc<Crs>, MeridianError> {
        self.get(code)
            .ok_or_else(|| MeridianError::UnknownProjection(code.to_string()))
    }

    /// Registers identity transforms between all the given codes, marking them as describing the
    /// same coordinate system.
    pub fn add_equivalent_projections(&mut self, codes: &[&str]) {
        let identity: Arc<PointTransform> = Arc::new(IdentityProjection::<Point2>::new());
        for from in codes {
            for to in codes {
                self.transforms.insert(
                    (from.to_string(), to.to_string()),
                    RegisteredTransform {
                        transform: identity.clone(),
                        identity: true,
                    },
                );
            }
        }
    }

    /// Registers the transform between every code of `from_codes` and every code of `to_codes`
    /// and its inverse in the opposite direction.
    pub fn add_equivalent_transforms(
        &mut self,
        from_codes: &[&str],
        to_codes: &[&str],
        transform: Arc<PointTransform>,
    ) {
        let inverse: Arc<PointTransform> = Arc::new(InvertedProjection::new(transform.clone()));
        for from in from_codes {
            for to in to_codes {
                self.insert_transform(from, to, transform.clone());
                self.insert_transform(to, from, inverse.clone());
            }
        }
    }

    /// Registers a pair of functions converting coordinates from `from` into `to` and back.
    pub fn add_coordinate_transforms(
        &mut self,
        from: &str,
        to: &str,
        forward: impl Fn(&Point2) -> Option<Point2> + Send + Sync + 'static,
        inverse: impl Fn(&Point2) -> Option<Point2> + Send + Sync + 'static,
    ) {
        self.add_equivalent_transforms(
            &[from],
            &[to],
            Arc::new(FnProjection {
                forward: Box::new(forward),
                inverse: Box::new(inverse),
            }),
        );
    }

    fn insert_transform(&mut self, from: &str, to: &str, transform: Arc<PointTransform>) {
        self.transforms.insert(
            (from.to_string(), to.to_string()),
            RegisteredTransform {
                transform,
                identity: false,
            },
        );
    }

    /// Transform from `from` into `to`.
    ///
    /// If no direct transform is registered, but both projections can be converted to and from
    /// EPSG:4326, the two transforms are chained.
    pub fn get_transform(&self, from: &Crs, to: &Crs) -> Option<Arc<PointTransform>> {
        if from.code() == to.code() {
            return Some(Arc::new(IdentityProjection::<Point2>::new()));
        }

        if let Some(registered) = self.direct_transform(from.code(), to.code()) {
            return Some(registered.transform.clone());
        }

        let to_lonlat = self.direct_transform(from.code(), EPSG_4326)?;
        let from_lonlat = self.direct_transform(EPSG_4326, to.code())?;
        Some(Arc::new(ChainProjection::new(
            to_lonlat.transform.clone(),
            from_lonlat.transform.clone(),
        )))
    }

    /// Same as [`ProjectionRegistry::get_transform`], but returns a configuration error if the
    /// transform is not registered.
    pub fn transform_between(
        &self,
        from: &Crs,
        to: &Crs,
    ) -> Result<Arc<PointTransform>, MeridianError> {
        self.get_transform(from, to)
            .ok_or_else(|| MeridianError::MissingTransform {
                from: from.code().to_string(),
                to: to.code().to_string(),
            })
    }

    fn direct_transform(&self, from: &str, to: &str) -> Option<&RegisteredTransform> {
        self.transforms.get(&(from.to_string(), to.to_string()))
    }

    /// Converts a point from `from` into `to`. Returns `Ok(None)` if the point cannot be
    /// represented in `to`.
    pub fn transform(
        &self,
        point: &Point2,
        from: &Crs,
        to: &Crs,
    ) -> Result<Option<Point2>, MeridianError> {
        Ok(self.transform_between(from, to)?.project(point))
    }

    /// Converts an extent by transforming its corners and `stops` intermediate points on each
    /// side, and taking the bounding box of the finite results.
    pub fn transform_extent(
        &self,
        extent: &Rect,
        from: &Crs,
        to: &Crs,
        stops: usize,
    ) -> Result<Option<Rect>, MeridianError> {
        let transform = self.transform_between(from, to)?;
        let corners = extent.corners();
        let mut points = Vec::with_capacity(4 * (stops + 1));
        for (i, start) in corners.iter().enumerate() {
            let end = corners[(i + 1) % 4];
            for step in 0..=stops {
                let k = step as f64 / (stops + 1) as f64;
                let point = Point2::new(
                    start.x + (end.x - start.x) * k,
                    start.y + (end.y - start.y) * k,
                );
                if let Some(projected) = transform.project(&point) {
                    if projected.is_finite() {
                        points.push(projected);
                    }
                }
            }
        }

        Ok(Rect::from_points(points.iter()))
    }

    /// Returns true if the two projections describe the same coordinate system, so that
    /// coordinates can be used without transforming them.
    pub fn equivalent(&self, a: &Crs, b: &Crs) -> bool {
        let equal_units = a.units() == b.units();
        if a.code() == b.code() {
            return equal_units;
        }

        self.direct_transform(a.code(), b.code())
            .map(|registered| registered.identity && equal_units)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn default_projections() {
        let registry = ProjectionRegistry::with_defaults();
        let mercator = registry.crs(EPSG_3857).expect("registered");
        assert!(mercator.can_wrap_x());
        assert_abs_diff_eq!(
            mercator.world_width().expect("has extent"),
            40_075_016.68557849,
            epsilon = 1e-6
        );

        let lonlat = registry.crs("CRS:84").expect("registered");
        assert_eq!(lonlat.units(), Units::Degrees);
        assert_eq!(lonlat.axis_orientation(), AxisOrientation::Enu);
        assert_eq!(
            registry.crs(EPSG_4326).expect("registered").axis_orientation(),
            AxisOrientation::Neu
        );

        assert!(matches!(
            registry.crs("EPSG:27700"),
            Err(MeridianError::UnknownProjection(_))
        ));
    }

    #[test]
    fn equivalence() {
        let registry = ProjectionRegistry::with_defaults();
        let get = |code| registry.crs(code).expect("registered");

        assert!(registry.equivalent(&get(EPSG_3857), &get("EPSG:900913")));
        assert!(registry.equivalent(&get(EPSG_4326), &get("CRS:84")));
        assert!(!registry.equivalent(&get(EPSG_4326), &get(EPSG_3857)));
    }

    #[test]
    fn lonlat_to_mercator() {
        let registry = ProjectionRegistry::with_defaults();
        let lonlat = registry.crs(EPSG_4326).expect("registered");
        let mercator = registry.crs("EPSG:900913").expect("registered");

        let projected = registry
            .transform(&Point2::new(180.0, 90.0), &lonlat, &mercator)
            .expect("transform registered")
            .expect("pole is clamped");
        assert_abs_diff_eq!(projected.x, 20_037_508.342789244, epsilon = 1e-6);
        assert_abs_diff_eq!(projected.y, 20_037_508.342789244, epsilon = 1e-3);

        let back = registry
            .transform(&projected, &mercator, &lonlat)
            .expect("transform registered")
            .expect("finite");
        assert_abs_diff_eq!(back.x, 180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(back.y, MAX_MERCATOR_LAT, epsilon = 1e-9);
    }

    #[test]
    fn custom_transforms_are_chained_through_lonlat() {
        let mut registry = ProjectionRegistry::with_defaults();
        registry.add_projection(Crs::new("TEST:shifted", Units::Degrees));
        registry.add_coordinate_transforms(
            "TEST:shifted",
            EPSG_4326,
            |p| Some(Point2::new(p.x + 10.0, p.y)),
            |p| Some(Point2::new(p.x - 10.0, p.y)),
        );

        let shifted = registry.crs("TEST:shifted").expect("registered");
        let mercator = registry.crs(EPSG_3857).expect("registered");
        let projected = registry
            .transform(&Point2::new(-10.0, 0.0), &shifted, &mercator)
            .expect("chained")
            .expect("finite");
        assert_abs_diff_eq!(projected.x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(projected.y, 0.0, epsilon = 1e-9);

        let lonlat = registry.crs(EPSG_4326).expect("registered");
        let unshifted = registry
            .transform(&Point2::new(15.0, 1.0), &lonlat, &shifted)
            .expect("inverse registered")
            .expect("finite");
        assert_eq!(unshifted, Point2::new(5.0, 1.0));
    }

    #[test]
    fn missing_transform_is_configuration_error() {
        let mut registry = ProjectionRegistry::with_defaults();
        let local = registry.add_projection(Crs::new("LOCAL", Units::Meters));
        let mercator = registry.crs(EPSG_3857).expect("registered");
        assert!(matches!(
            registry.transform(&Point2::new(0.0, 0.0), &local, &mercator),
            Err(MeridianError::MissingTransform { .. })
        ));
    }

    #[test]
    fn extent_transform() {
        let registry = ProjectionRegistry::global();
        let lonlat = registry.crs(EPSG_4326).expect("registered");
        let mercator = registry.crs(EPSG_3857).expect("registered");
        let extent = registry
            .transform_extent(
                &Rect::new(-20_037_508.342789244, 0.0, 0.0, 20_037_508.342789244),
                &mercator,
                &lonlat,
                8,
            )
            .expect("transform registered")
            .expect("non-empty");
        assert_abs_diff_eq!(extent.x_min(), -180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(extent.x_max(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(extent.y_min(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(extent.y_max(), MAX_MERCATOR_LAT, epsilon = 1e-9);
    }
}

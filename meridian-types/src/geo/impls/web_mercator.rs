use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::marker::PhantomData;

use crate::cartesian::{CartesianPoint2d, NewCartesianPoint2d};
use crate::geo::{Datum, GeoPoint, NewGeoPoint, Projection};

/// Spherical Web Mercator projection (EPSG:3857).
///
/// Points that do not have finite projected coordinates make [`Projection::project`]
/// return `None`.
#[derive(Debug, Copy, Clone)]
pub struct WebMercator<In, Out> {
    datum: Datum,
    phantom_in: PhantomData<fn() -> In>,
    phantom_out: PhantomData<fn() -> Out>,
}

impl<In, Out> WebMercator<In, Out> {
    /// Creates a projection for the given datum.
    pub fn new(datum: Datum) -> Self {
        Self {
            datum,
            phantom_in: PhantomData,
            phantom_out: PhantomData,
        }
    }

    /// Half of the world width in projected units.
    pub fn half_world_size(&self) -> f64 {
        std::f64::consts::PI * self.datum.semimajor()
    }
}

impl<In, Out> Default for WebMercator<In, Out> {
    fn default() -> Self {
        Self::new(Datum::WGS84)
    }
}

impl<In: NewGeoPoint<f64>, Out: NewCartesianPoint2d<f64>> Projection for WebMercator<In, Out> {
    type InPoint = In;
    type OutPoint = Out;

    fn project(&self, input: &Self::InPoint) -> Option<Self::OutPoint> {
        let x = self.datum.semimajor() * input.lon_rad();
        let y = self.datum.semimajor() * (FRAC_PI_4 + input.lat_rad() / 2.0).tan().ln();

        if x.is_finite() && y.is_finite() {
            Some(Self::OutPoint::new(x, y))
        } else {
            None
        }
    }

    fn unproject(&self, input: &Self::OutPoint) -> Option<Self::InPoint> {
        let lat = 2.0 * (input.y() / self.datum.semimajor()).exp().atan() - FRAC_PI_2;
        let lon = input.x() / self.datum.semimajor();

        if lat.is_finite() && lon.is_finite() {
            Some(Self::InPoint::latlon(lat.to_degrees(), lon.to_degrees()))
        } else {
            None
        }
    }
}

//! Geographic points (latitude and longitude, see [`GeoPoint`]) and conversion of points between
//! coordinate systems (see [`Projection`]).

mod datum;
pub mod impls;
mod point;
mod projection;

pub use datum::Datum;
pub use point::{GeoPoint, GeoPoint2d, NewGeoPoint};
pub use projection::{ChainProjection, InvertedProjection, Projection};

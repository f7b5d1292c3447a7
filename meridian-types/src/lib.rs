//! Geometric primitives used by the `meridian` reprojection engine.
//!
//! * [`cartesian`] contains points, extents ([`Rect`](cartesian::Rect)) and sizes in projected
//!   coordinates.
//! * [`geo`] contains geographic points and the [`Projection`](geo::Projection) trait that converts
//!   points between coordinate systems.

pub mod cartesian;
pub mod geo;

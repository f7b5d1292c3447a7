//! Types and functions on geometries in cartesian coordinates.

mod point;
mod rect;
mod size;

pub use point::{CartesianPoint2d, CartesianPoint2dFloat, NewCartesianPoint2d, Point2, Vector2};
pub use rect::Rect;
pub use size::Size;

use nalgebra::Scalar;
use num_traits::{Bounded, Float, FromPrimitive, Num};
use serde::{Deserialize, Serialize};

use super::point::{CartesianPoint2d, Point2};

/// Axis-aligned rectangle, used to describe extents of tiles, images and projections.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rect<N = f64> {
    /// Minimum X.
    pub x_min: N,
    /// Minimum Y.
    pub y_min: N,
    /// Maximum X.
    pub x_max: N,
    /// Maximum Y.
    pub y_max: N,
}

impl<N: Num + Copy + PartialOrd + Scalar + FromPrimitive + Bounded> Rect<N> {
    /// Creates a new rectangle.
    pub fn new(x_min: N, y_min: N, x_max: N, y_max: N) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Minimum X.
    pub fn x_min(&self) -> N {
        self.x_min
    }

    /// Maximum X.
    pub fn x_max(&self) -> N {
        self.x_max
    }

    /// Minimum Y.
    pub fn y_min(&self) -> N {
        self.y_min
    }

    /// Maximum Y.
    pub fn y_max(&self) -> N {
        self.y_max
    }

    /// Width of the rectangle.
    pub fn width(&self) -> N {
        self.x_max - self.x_min
    }

    /// Height of the rectangle.
    pub fn height(&self) -> N {
        self.y_max - self.y_min
    }

    /// Tight bounding rectangle of the points. Returns `None` if the iterator is empty.
    pub fn from_points<'a, P: CartesianPoint2d<Num = N> + 'a>(
        mut points: impl Iterator<Item = &'a P>,
    ) -> Option<Self> {
        let first = points.next()?;
        let mut x_min = first.x();
        let mut y_min = first.y();
        let mut x_max = first.x();
        let mut y_max = first.y();

        for p in points {
            if x_min > p.x() {
                x_min = p.x();
            }
            if y_min > p.y() {
                y_min = p.y();
            }
            if x_max < p.x() {
                x_max = p.x();
            }
            if y_max < p.y() {
                y_max = p.y();
            }
        }

        Some(Self {
            x_min,
            y_min,
            x_max,
            y_max,
        })
    }

    /// Returns true if the point is inside the rectangle or on its border.
    pub fn contains(&self, point: &impl CartesianPoint2d<Num = N>) -> bool {
        self.x_min <= point.x()
            && self.x_max >= point.x()
            && self.y_min <= point.y()
            && self.y_max >= point.y()
    }

    /// Returns true if the rectangles overlap or touch.
    pub fn intersects(&self, other: Self) -> bool {
        self.x_min <= other.x_max
            && self.x_max >= other.x_min
            && self.y_min <= other.y_max
            && self.y_max >= other.y_min
    }

    /// Overlapping part of the rectangles, or `None` if they do not intersect.
    pub fn intersection(&self, other: Self) -> Option<Self> {
        if !self.intersects(other) {
            return None;
        }

        Some(Self {
            x_min: if self.x_min > other.x_min {
                self.x_min
            } else {
                other.x_min
            },
            y_min: if self.y_min > other.y_min {
                self.y_min
            } else {
                other.y_min
            },
            x_max: if self.x_max < other.x_max {
                self.x_max
            } else {
                other.x_max
            },
            y_max: if self.y_max < other.y_max {
                self.y_max
            } else {
                other.y_max
            },
        })
    }

    /// Center point.
    pub fn center(&self) -> Point2<N> {
        let two = N::one() + N::one();
        Point2::new(
            (self.x_min + self.x_max) / two,
            (self.y_min + self.y_max) / two,
        )
    }

    /// Corners of the rectangle clockwise starting from the top left one.
    pub fn corners(&self) -> [Point2<N>; 4] {
        [
            self.top_left(),
            self.top_right(),
            self.bottom_right(),
            self.bottom_left(),
        ]
    }

    /// Top left corner.
    pub fn top_left(&self) -> Point2<N> {
        Point2::new(self.x_min, self.y_max)
    }

    /// Top right corner.
    pub fn top_right(&self) -> Point2<N> {
        Point2::new(self.x_max, self.y_max)
    }

    /// Bottom right corner.
    pub fn bottom_right(&self) -> Point2<N> {
        Point2::new(self.x_max, self.y_min)
    }

    /// Bottom left corner.
    pub fn bottom_left(&self) -> Point2<N> {
        Point2::new(self.x_min, self.y_min)
    }

    /// Returns a copy of the rectangle moved along X axis by `dx`.
    pub fn shift_x(&self, dx: N) -> Self {
        Self {
            x_min: self.x_min + dx,
            x_max: self.x_max + dx,
            ..*self
        }
    }
}

impl<N: Float + Scalar + FromPrimitive + Bounded> Rect<N> {
    /// Area of the rectangle. Inverted rectangles have zero area.
    pub fn area(&self) -> N {
        if self.x_max < self.x_min || self.y_max < self.y_min {
            N::zero()
        } else {
            self.width() * self.height()
        }
    }

    /// Returns false if any of the bounds is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.x_min.is_finite()
            && self.y_min.is_finite()
            && self.x_max.is_finite()
            && self.y_max.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, -5.0, 15.0, 5.0);
        assert_eq!(a.intersection(b), Some(Rect::new(5.0, 0.0, 10.0, 5.0)));
        assert!(a.intersects(b));

        let touching = Rect::new(10.0, 0.0, 20.0, 10.0);
        assert!(a.intersects(touching));
        assert_eq!(a.intersection(touching).map(|r| r.area()), Some(0.0));

        let outside = Rect::new(11.0, 11.0, 20.0, 20.0);
        assert!(!a.intersects(outside));
        assert_eq!(a.intersection(outside), None);
    }

    #[test]
    fn nan_rect_does_not_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(f64::NAN, 0.0, 5.0, 5.0);
        assert!(!a.intersects(b));
        assert!(!b.is_finite());
    }

    #[test]
    fn bounding_rect_of_points() {
        let points = [
            Point2::new(1.0, 5.0),
            Point2::new(-3.0, 2.0),
            Point2::new(4.0, -1.0),
        ];
        assert_eq!(
            Rect::from_points(points.iter()),
            Some(Rect::new(-3.0, -1.0, 4.0, 5.0))
        );
        assert_eq!(Rect::<f64>::from_points(std::iter::empty::<&Point2>()), None);
    }

    #[test]
    fn corners_are_clockwise_from_top_left() {
        let rect = Rect::new(0.0, 0.0, 2.0, 1.0);
        assert_eq!(
            rect.corners(),
            [
                Point2::new(0.0, 1.0),
                Point2::new(2.0, 1.0),
                Point2::new(2.0, 0.0),
                Point2::new(0.0, 0.0),
            ]
        );
        assert_eq!(rect.center(), Point2::new(1.0, 0.5));
        assert_eq!(rect.shift_x(-2.0), Rect::new(-2.0, 0.0, 0.0, 1.0));
    }
}

use meridian_types::cartesian::{Point2, Rect, Size, Vector2};
use nalgebra::Matrix2;

use super::{RasterWarp, WarpRequest, WarpSource};
use crate::decoded_image::DecodedImage;
use crate::triangulation::Triangle;

const EDGE_COLOR: [u8; 4] = [0, 0, 0, 255];

/// Barycentric tolerance for pixels lying on a triangle edge.
const EDGE_TOLERANCE: f64 = 1e-9;

/// [`RasterWarp`] that resamples pixels on the CPU.
///
/// Every output pixel centre is mapped into the source projection with the affine transform of the
/// triangle that contains it, and the colour is sampled from the first source raster covering the
/// resulting point. Pixels shared by two triangles take the colour from the first one.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuWarp;

impl RasterWarp for CpuWarp {
    fn warp(&self, request: &WarpRequest<'_>) -> DecodedImage {
        let mut output = DecodedImage::blank(Size::new(request.width, request.height));
        if request.width == 0 || request.height == 0 {
            return output;
        }

        let grid = PixelGrid::new(request);
        let source_crs = request.triangulation.source();
        let world_width = source_crs
            .can_wrap_x()
            .then(|| source_crs.world_width())
            .flatten();

        let mut written = vec![false; request.width as usize * request.height as usize];
        for triangle in request.triangulation.triangles() {
            let Some(mapping) = TriangleMapping::new(triangle) else {
                continue;
            };

            let Some((x_range, y_range)) = grid.covered_pixels(&triangle.target) else {
                continue;
            };
            for py in y_range {
                for px in x_range.clone() {
                    let index = py as usize * request.width as usize + px as usize;
                    if written[index] {
                        continue;
                    }

                    let Some(source_point) = mapping.map(&grid.pixel_center(px, py)) else {
                        continue;
                    };
                    if let Some(color) = sample(request, &source_point, world_width) {
                        output.set_pixel(px, py, color);
                        written[index] = true;
                    }
                }
            }
        }

        if request.render_edges {
            for triangle in request.triangulation.triangles() {
                let [a, b, c] = triangle.target.map(|p| grid.to_pixel(&p));
                for (from, to) in [(a, b), (b, c), (c, a)] {
                    draw_line(&mut output, from, to);
                }
            }
        }

        output
    }
}

struct PixelGrid {
    extent: Rect,
    pixel_width: f64,
    pixel_height: f64,
    width: u32,
    height: u32,
}

impl PixelGrid {
    fn new(request: &WarpRequest<'_>) -> Self {
        Self {
            extent: request.target_extent,
            pixel_width: request.target_extent.width() / request.width as f64,
            pixel_height: request.target_extent.height() / request.height as f64,
            width: request.width,
            height: request.height,
        }
    }

    fn to_pixel(&self, point: &Point2) -> Point2 {
        Point2::new(
            (point.x - self.extent.x_min) / self.pixel_width,
            (self.extent.y_max - point.y) / self.pixel_height,
        )
    }

    fn pixel_center(&self, px: u32, py: u32) -> Point2 {
        Point2::new(
            self.extent.x_min + (px as f64 + 0.5) * self.pixel_width,
            self.extent.y_max - (py as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Pixel rows and columns that can have centres inside the triangle.
    fn covered_pixels(
        &self,
        triangle: &[Point2; 3],
    ) -> Option<(std::ops::RangeInclusive<u32>, std::ops::RangeInclusive<u32>)> {
        let pixels = triangle.map(|p| self.to_pixel(&p));
        let bounds = Rect::from_points(pixels.iter())?;
        if !bounds.is_finite() {
            return None;
        }

        let clamp = |value: f64, max: u32| value.clamp(0.0, max as f64 - 1.0) as u32;
        let x_min = (bounds.x_min - 0.5).floor();
        let x_max = (bounds.x_max - 0.5).ceil();
        let y_min = (bounds.y_min - 0.5).floor();
        let y_max = (bounds.y_max - 0.5).ceil();
        if x_max < 0.0 || y_max < 0.0 || x_min >= self.width as f64 || y_min >= self.height as f64
        {
            return None;
        }

        Some((
            clamp(x_min, self.width)..=clamp(x_max, self.width),
            clamp(y_min, self.height)..=clamp(y_max, self.height),
        ))
    }
}

/// Affine map from the target triangle into the source one.
struct TriangleMapping {
    origin: Point2,
    inverse_basis: Matrix2<f64>,
    source: [Point2; 3],
}

impl TriangleMapping {
    fn new(triangle: &Triangle) -> Option<Self> {
        let [t0, t1, t2] = triangle.target;
        let basis = Matrix2::new(t1.x - t0.x, t2.x - t0.x, t1.y - t0.y, t2.y - t0.y);

        Some(Self {
            origin: t0,
            inverse_basis: basis.try_inverse()?,
            source: triangle.source,
        })
    }

    /// Source point for the target point, or `None` if the point is outside the triangle.
    fn map(&self, point: &Point2) -> Option<Point2> {
        let weights = self.inverse_basis * Vector2::new(point.x - self.origin.x, point.y - self.origin.y);
        let (w1, w2) = (weights.x, weights.y);
        let w0 = 1.0 - w1 - w2;
        if w0 < -EDGE_TOLERANCE || w1 < -EDGE_TOLERANCE || w2 < -EDGE_TOLERANCE {
            return None;
        }

        let [s0, s1, s2] = self.source;
        Some(Point2::new(
            w0 * s0.x + w1 * s1.x + w2 * s2.x,
            w0 * s0.y + w1 * s1.y + w2 * s2.y,
        ))
    }
}

fn sample(request: &WarpRequest<'_>, point: &Point2, world_width: Option<f64>) -> Option<[u8; 4]> {
    let shifts = match world_width {
        Some(width) => [0.0, width, -width],
        None => [0.0; 3],
    };

    for shift in shifts {
        let shifted = Point2::new(point.x + shift, point.y);
        for source in request.sources {
            if source.extent.area() > 0.0 && source.extent.contains(&shifted) {
                if let Some(color) = sample_source(source, &shifted, request) {
                    return Some(color);
                }
            }
        }

        if world_width.is_none() {
            break;
        }
    }

    None
}

fn sample_source(source: &WarpSource, point: &Point2, request: &WarpRequest<'_>) -> Option<[u8; 4]> {
    let image = &source.image;
    let gutter = request.gutter as f64;
    let inner_width = image.width() as f64 - 2.0 * gutter;
    let inner_height = image.height() as f64 - 2.0 * gutter;
    if inner_width <= 0.0 || inner_height <= 0.0 {
        return None;
    }

    let extent = source.extent;
    let fx = gutter + (point.x - extent.x_min) / extent.width() * inner_width;
    let fy = gutter + (extent.y_max - point.y) / extent.height() * inner_height;

    if request.interpolate {
        Some(bilinear(image, fx - 0.5, fy - 0.5))
    } else {
        pixel_clamped(image, fx.floor(), fy.floor())
    }
}

fn pixel_clamped(image: &DecodedImage, x: f64, y: f64) -> Option<[u8; 4]> {
    let x = x.clamp(0.0, image.width() as f64 - 1.0) as u32;
    let y = y.clamp(0.0, image.height() as f64 - 1.0) as u32;
    image.pixel(x, y)
}

fn bilinear(image: &DecodedImage, x: f64, y: f64) -> [u8; 4] {
    let x0 = x.floor();
    let y0 = y.floor();
    let tx = x - x0;
    let ty = y - y0;

    let corner = |dx: f64, dy: f64| pixel_clamped(image, x0 + dx, y0 + dy).unwrap_or([0; 4]);
    let (c00, c10, c01, c11) = (
        corner(0.0, 0.0),
        corner(1.0, 0.0),
        corner(0.0, 1.0),
        corner(1.0, 1.0),
    );

    let mut color = [0; 4];
    for channel in 0..4 {
        let top = c00[channel] as f64 * (1.0 - tx) + c10[channel] as f64 * tx;
        let bottom = c01[channel] as f64 * (1.0 - tx) + c11[channel] as f64 * tx;
        color[channel] = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
    }

    color
}

fn draw_line(image: &mut DecodedImage, from: Point2, to: Point2) {
    let steps = (to.x - from.x).abs().max((to.y - from.y).abs()).ceil();
    if !steps.is_finite() {
        return;
    }

    let steps = steps.max(1.0) as u32;
    for step in 0..=steps {
        let k = step as f64 / steps as f64;
        let x = (from.x + (to.x - from.x) * k).floor();
        let y = (from.y + (to.y - from.y) * k).floor();
        if x >= 0.0 && y >= 0.0 {
            image.set_pixel(x as u32, y as u32, EDGE_COLOR);
        }
    }
}

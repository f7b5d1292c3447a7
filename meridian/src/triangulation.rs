//! Adaptive triangulation of the mapping between target and source coordinates.
//!
//! The target extent is split into quads, and each quad is subdivided until the linear
//! interpolation of the source coordinates over it is close enough to the exact transform. Every
//! terminal quad becomes two triangles that carry both target and source coordinates of their
//! vertices, which is all a raster warp needs to resample the source image.

use ahash::AHashMap;
use meridian_types::cartesian::{CartesianPoint2dFloat, Point2, Rect};
use meridian_types::geo::Projection;

use crate::crs::Crs;
use crate::error::MeridianError;
use crate::registry::ProjectionRegistry;

/// Maximum number of times a quad can be split.
pub const MAX_SUBDIVISION: u32 = 10;

/// Maximum width of a quad as a share of the world width before it is split regardless of the
/// interpolation error.
pub const MAX_TRIANGLE_WIDTH: f64 = 0.25;

/// Triangle of the mesh. `target[i]` corresponds to `source[i]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// Vertices in the source projection.
    pub source: [Point2; 3],
    /// Vertices in the target projection.
    pub target: [Point2; 3],
}

impl Triangle {
    fn new(target: [Point2; 3], source: [Point2; 3]) -> Self {
        Self { source, target }
    }

    fn source_x_bounds(&self) -> (f64, f64) {
        self.source
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), p| {
                (min.min(p.x), max.max(p.x))
            })
    }
}

/// Triangle mesh covering one target extent.
#[derive(Debug, Clone)]
pub struct Triangulation {
    source: Crs,
    target: Crs,
    target_extent: Rect,
    max_source_extent: Option<Rect>,
    triangles: Vec<Triangle>,
    wraps_x_in_source: bool,
    can_wrap_x_in_source: bool,
}

impl Triangulation {
    /// Builds the mesh for `target_extent` using the transform from the registry.
    ///
    /// `error_threshold` is the maximum allowed distance, in source units, between the
    /// interpolated and the exact source position of a quad's centre. Quads whose source
    /// coordinates fall completely outside of `max_source_extent` are dropped.
    pub fn new(
        registry: &ProjectionRegistry,
        source: &Crs,
        target: &Crs,
        target_extent: Rect,
        max_source_extent: Option<Rect>,
        error_threshold: f64,
    ) -> Result<Self, MeridianError> {
        let transform = registry.transform_between(target, source)?;
        Ok(Self::with_transform(
            &*transform,
            source,
            target,
            target_extent,
            max_source_extent,
            error_threshold,
        ))
    }

    /// Builds the mesh with the given transform from target into source coordinates.
    pub fn with_transform<P>(
        transform: &P,
        source: &Crs,
        target: &Crs,
        target_extent: Rect,
        max_source_extent: Option<Rect>,
        error_threshold: f64,
    ) -> Self
    where
        P: Projection<InPoint = Point2, OutPoint = Point2> + ?Sized,
    {
        let source_world_width = source.world_width();
        let can_wrap_x_in_source = source.can_wrap_x()
            && matches!(
                (max_source_extent, source_world_width),
                (Some(max), Some(world)) if max.width() >= world
            );

        let mut builder = MeshBuilder {
            transform,
            cache: AHashMap::new(),
            error_threshold_sq: error_threshold * error_threshold,
            max_source_extent,
            source_world_width,
            source_global: source.is_global(),
            source_can_wrap: source.can_wrap_x(),
            target_world_width: target.world_width().filter(|_| target.is_global()),
            can_wrap_x_in_source,
            wraps_x_in_source: false,
            triangles: Vec::new(),
        };
        builder.build(&target_extent);

        let MeshBuilder {
            mut triangles,
            wraps_x_in_source,
            ..
        } = builder;

        if wraps_x_in_source {
            if let Some(world_width) = source_world_width {
                shift_wrapped_triangles(&mut triangles, world_width);
            }
        }

        log::trace!(
            "Triangulated {target_extent:?} from {} to {}: {} triangles, wraps x: {wraps_x_in_source}",
            target.code(),
            source.code(),
            triangles.len()
        );

        Self {
            source: source.clone(),
            target: target.clone(),
            target_extent,
            max_source_extent,
            triangles,
            wraps_x_in_source,
            can_wrap_x_in_source,
        }
    }

    /// Triangles of the mesh.
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Tight bounding box of all source vertices. `None` if the mesh is empty.
    pub fn calculate_source_extent(&self) -> Option<Rect> {
        Rect::from_points(self.triangles.iter().flat_map(|t| t.source.iter()))
    }

    /// Whether the mesh crosses the antimeridian of the source projection. Source coordinates of
    /// such meshes are shifted into one contiguous band and can extend beyond the projection
    /// extent.
    pub fn wraps_x_in_source(&self) -> bool {
        self.wraps_x_in_source
    }

    /// Whether the source projection wraps and the maximum source extent spans the whole world.
    pub fn can_wrap_x_in_source(&self) -> bool {
        self.can_wrap_x_in_source
    }

    /// Source projection.
    pub fn source(&self) -> &Crs {
        &self.source
    }

    /// Target projection.
    pub fn target(&self) -> &Crs {
        &self.target
    }

    /// Extent the mesh was built for.
    pub fn target_extent(&self) -> Rect {
        self.target_extent
    }

    /// Maximum source extent the mesh was limited to.
    pub fn max_source_extent(&self) -> Option<Rect> {
        self.max_source_extent
    }
}

/// Quad in target space with the images of its corners. Corners go clockwise from top left.
struct Quad {
    target: [Point2; 4],
    source: [Point2; 4],
    budget: u32,
}

struct MeshBuilder<'a, P: ?Sized> {
    transform: &'a P,
    cache: AHashMap<(u64, u64), Point2>,
    error_threshold_sq: f64,
    max_source_extent: Option<Rect>,
    source_world_width: Option<f64>,
    source_global: bool,
    source_can_wrap: bool,
    target_world_width: Option<f64>,
    can_wrap_x_in_source: bool,
    wraps_x_in_source: bool,
    triangles: Vec<Triangle>,
}

impl<P> MeshBuilder<'_, P>
where
    P: Projection<InPoint = Point2, OutPoint = Point2> + ?Sized,
{
    fn build(&mut self, extent: &Rect) {
        let target = extent.corners();
        let source = target.map(|p| self.to_source(&p));
        let mut stack = vec![Quad {
            target,
            source,
            budget: MAX_SUBDIVISION,
        }];

        while let Some(quad) = stack.pop() {
            if let Some([first, second]) = self.process(&quad) {
                stack.push(second);
                stack.push(first);
            }
        }
    }

    fn to_source(&mut self, point: &Point2) -> Point2 {
        // Adding zero folds -0.0 into 0.0.
        let key = ((point.x + 0.0).to_bits(), (point.y + 0.0).to_bits());
        let transform = self.transform;
        *self.cache.entry(key).or_insert_with(|| {
            transform
                .project(point)
                .unwrap_or_else(|| Point2::new(f64::NAN, f64::NAN))
        })
    }

    /// Either emits the triangles of the quad, drops it, or returns its two halves.
    fn process(&mut self, quad: &Quad) -> Option<[Quad; 2]> {
        let [a, b, c, d] = quad.target;
        let [a_src, b_src, c_src, d_src] = quad.source;

        let corners_finite = quad.source.iter().all(|p| p.is_finite());
        let source_quad_extent = if corners_finite {
            Rect::from_points(quad.source.iter())
        } else {
            None
        };
        let source_coverage_x = match (source_quad_extent, self.source_world_width) {
            (Some(extent), Some(world_width)) => Some(extent.width() / world_width),
            _ => None,
        };
        let wraps_x = self.source_can_wrap
            && source_coverage_x.is_some_and(|coverage| coverage > 0.5 && coverage < 1.0);

        let mut needs_subdivision = false;
        if quad.budget > 0 {
            if let Some(world_width) = self.target_world_width {
                let target_width = (b.x - a.x).abs().max((c.x - d.x).abs());
                needs_subdivision = target_width / world_width > MAX_TRIANGLE_WIDTH;
            }
            if !wraps_x && self.source_global {
                if let Some(coverage) = source_coverage_x {
                    needs_subdivision |= coverage > MAX_TRIANGLE_WIDTH;
                }
            }
        }

        if !needs_subdivision {
            if let (Some(max_extent), Some(quad_extent)) =
                (self.max_source_extent, source_quad_extent)
            {
                if !quad_extent.intersects(max_extent) {
                    return None;
                }
            }
        }

        // Bit mask of the corners without a source image: a = 8, b = 4, c = 2, d = 1.
        let mut non_finite = 0u8;
        if !needs_subdivision && !corners_finite {
            if quad.budget > 0 {
                needs_subdivision = true;
            } else {
                for (bit, corner) in [8, 4, 2, 1].into_iter().zip(quad.source.iter()) {
                    if !corner.is_finite() {
                        non_finite |= bit;
                    }
                }
                // Only a quad with a single bad corner can still give a triangle.
                if non_finite.count_ones() != 1 {
                    return None;
                }
            }
        }

        if quad.budget > 0 {
            if !needs_subdivision {
                needs_subdivision = self.center_error_sq(quad, wraps_x) > self.error_threshold_sq;
            }

            if needs_subdivision {
                return Some(self.split(quad));
            }
        }

        if wraps_x {
            if !self.can_wrap_x_in_source {
                return None;
            }
            self.wraps_x_in_source = true;
        }

        if non_finite & 0b1011 == 0 {
            self.triangles
                .push(Triangle::new([a, c, d], [a_src, c_src, d_src]));
        }
        if non_finite & 0b1110 == 0 {
            self.triangles
                .push(Triangle::new([a, b, c], [a_src, b_src, c_src]));
        }
        if non_finite != 0 {
            if non_finite & 0b1101 == 0 {
                self.triangles
                    .push(Triangle::new([b, d, a], [b_src, d_src, a_src]));
            }
            if non_finite & 0b0111 == 0 {
                self.triangles
                    .push(Triangle::new([b, d, c], [b_src, d_src, c_src]));
            }
        }

        None
    }

    /// Squared distance between the exact source image of the quad centre and its linear
    /// estimate along the a-c diagonal.
    fn center_error_sq(&mut self, quad: &Quad, wraps_x: bool) -> f64 {
        let [a, _, c, _] = quad.target;
        let [a_src, _, c_src, _] = quad.source;
        let center = Point2::new((a.x + c.x) / 2.0, (a.y + c.y) / 2.0);
        let center_src = self.to_source(&center);

        let dx = match (wraps_x, self.source_world_width) {
            (true, Some(world_width)) => {
                let estimate =
                    (a_src.x.rem_euclid(world_width) + c_src.x.rem_euclid(world_width)) / 2.0;
                estimate - center_src.x.rem_euclid(world_width)
            }
            _ => (a_src.x + c_src.x) / 2.0 - center_src.x,
        };
        let dy = (a_src.y + c_src.y) / 2.0 - center_src.y;

        dx * dx + dy * dy
    }

    fn split(&mut self, quad: &Quad) -> [Quad; 2] {
        let [a, b, c, d] = quad.target;
        let [a_src, b_src, c_src, d_src] = quad.source;
        let budget = quad.budget - 1;
        let mid = |p: Point2, q: Point2| Point2::new((p.x + q.x) / 2.0, (p.y + q.y) / 2.0);

        if (a.x - c.x).abs() <= (a.y - c.y).abs() {
            // Top and bottom halves.
            let bc = mid(b, c);
            let da = mid(d, a);
            let bc_src = self.to_source(&bc);
            let da_src = self.to_source(&da);
            [
                Quad {
                    target: [a, b, bc, da],
                    source: [a_src, b_src, bc_src, da_src],
                    budget,
                },
                Quad {
                    target: [da, bc, c, d],
                    source: [da_src, bc_src, c_src, d_src],
                    budget,
                },
            ]
        } else {
            // Left and right halves.
            let ab = mid(a, b);
            let cd = mid(c, d);
            let ab_src = self.to_source(&ab);
            let cd_src = self.to_source(&cd);
            [
                Quad {
                    target: [a, ab, cd, d],
                    source: [a_src, ab_src, cd_src, d_src],
                    budget,
                },
                Quad {
                    target: [ab, b, c, cd],
                    source: [ab_src, b_src, c_src, cd_src],
                    budget,
                },
            ]
        }
    }
}

/// Moves source vertices that are more than half a world to the right of the leftmost vertex one
/// world to the left, unless that would stretch the triangle over half a world.
fn shift_wrapped_triangles(triangles: &mut [Triangle], world_width: f64) {
    let left_bound = triangles
        .iter()
        .map(|t| t.source_x_bounds().0)
        .fold(f64::INFINITY, f64::min);
    let half_world = world_width / 2.0;

    for triangle in triangles.iter_mut() {
        if triangle.source_x_bounds().1 - left_bound <= half_world {
            continue;
        }

        let mut shifted = triangle.source;
        for vertex in shifted.iter_mut() {
            if vertex.x - left_bound > half_world {
                vertex.x -= world_width;
            }
        }

        let candidate = Triangle::new(triangle.target, shifted);
        let (min_x, max_x) = candidate.source_x_bounds();
        if max_x - min_x < half_world {
            *triangle = candidate;
        }
    }
}

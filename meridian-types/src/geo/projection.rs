use std::marker::PhantomData;
use std::sync::Arc;

/// Converts points from one coordinate system into another.
///
/// Both directions return `None` when the point cannot be represented in the output coordinate
/// system.
pub trait Projection {
    /// Type of the input point.
    type InPoint;
    /// Type of the output point.
    type OutPoint;

    /// Converts a point from the input coordinate system into the output one.
    fn project(&self, input: &Self::InPoint) -> Option<Self::OutPoint>;
    /// Converts a point from the output coordinate system back into the input one.
    fn unproject(&self, input: &Self::OutPoint) -> Option<Self::InPoint>;
}

impl<P: Projection + ?Sized> Projection for Arc<P> {
    type InPoint = P::InPoint;
    type OutPoint = P::OutPoint;

    fn project(&self, input: &Self::InPoint) -> Option<Self::OutPoint> {
        (**self).project(input)
    }

    fn unproject(&self, input: &Self::OutPoint) -> Option<Self::InPoint> {
        (**self).unproject(input)
    }
}

/// Projection that swaps the directions of the inner one.
#[derive(Debug, Clone)]
pub struct InvertedProjection<P> {
    inner: P,
}

impl<P: Projection> InvertedProjection<P> {
    /// Wraps the projection.
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P: Projection> Projection for InvertedProjection<P> {
    type InPoint = P::OutPoint;
    type OutPoint = P::InPoint;

    fn project(&self, input: &Self::InPoint) -> Option<Self::OutPoint> {
        self.inner.unproject(input)
    }

    fn unproject(&self, input: &Self::OutPoint) -> Option<Self::InPoint> {
        self.inner.project(input)
    }
}

/// Applies two projections one after another.
pub struct ChainProjection<First, Second, Mid> {
    first: First,
    second: Second,
    phantom: PhantomData<fn() -> Mid>,
}

impl<Mid, First, Second> ChainProjection<First, Second, Mid>
where
    First: Projection<OutPoint = Mid>,
    Second: Projection<InPoint = Mid>,
{
    /// Creates a projection that applies `first` and then `second`.
    pub fn new(first: First, second: Second) -> Self {
        Self {
            first,
            second,
            phantom: PhantomData,
        }
    }
}

impl<Mid, First, Second> Projection for ChainProjection<First, Second, Mid>
where
    First: Projection<OutPoint = Mid>,
    Second: Projection<InPoint = Mid>,
{
    type InPoint = First::InPoint;
    type OutPoint = Second::OutPoint;

    fn project(&self, input: &Self::InPoint) -> Option<Self::OutPoint> {
        self.second.project(&self.first.project(input)?)
    }

    fn unproject(&self, input: &Self::OutPoint) -> Option<Self::InPoint> {
        self.first.unproject(&self.second.unproject(input)?)
    }
}

use std::marker::PhantomData;

use crate::geo::Projection;

/// Projection that returns its input unchanged.
#[derive(Debug, Clone, Copy)]
pub struct IdentityProjection<P> {
    phantom: PhantomData<fn() -> P>,
}

impl<P> IdentityProjection<P> {
    /// Creates a new instance.
    pub fn new() -> Self {
        Self {
            phantom: PhantomData,
        }
    }
}

impl<P> Default for IdentityProjection<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Clone> Projection for IdentityProjection<P> {
    type InPoint = P;
    type OutPoint = P;

    fn project(&self, input: &P) -> Option<P> {
        Some(input.clone())
    }

    fn unproject(&self, input: &P) -> Option<P> {
        Some(input.clone())
    }
}

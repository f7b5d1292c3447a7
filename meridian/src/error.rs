//! Error types used by the crate.

use thiserror::Error;

/// Meridian error type.
#[derive(Debug, Error)]
pub enum MeridianError {
    /// Projection with the given code is not registered.
    #[error("projection {0} is not registered")]
    UnknownProjection(String),
    /// No coordinate transform is registered between two projections.
    #[error("no transform from {from} to {to}")]
    MissingTransform {
        /// Code of the source projection.
        from: String,
        /// Code of the destination projection.
        to: String,
    },
    /// Linear scale of the projection units cannot be determined.
    #[error("meters per unit are not known for projection {0}")]
    UnknownMetersPerUnit(String),
    /// I/O error (network or file).
    #[error("failed to load data")]
    IO,
    /// Item not found.
    #[error("item not found")]
    NotFound,
    /// Image decoding error.
    #[error("image decode error: {0:?}")]
    ImageDecode(#[from] image::ImageError),
    /// Generic error - details are inside.
    #[error("{0}")]
    Generic(String),
}

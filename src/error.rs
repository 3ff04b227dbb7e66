//! Error type shared by the reconstruction pipeline.
//!
//! Only configuration-level problems are errors. Degenerate inputs such as an
//! all-background scalar field are valid and produce empty label masks.
use crate::image::Dims;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SegmentError {
    /// Two arrays that must share a spatial shape do not.
    #[error("{what}: expected shape {expected:?}, found {found:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Dims,
        found: Dims,
    },

    /// A plane in a stack does not match the first plane (stitching, stacking).
    #[error("plane {plane} has shape {found:?}, expected {expected:?}")]
    PlaneShapeMismatch {
        plane: usize,
        expected: Dims,
        found: Dims,
    },

    #[error("invalid dimensions: {0}")]
    InvalidDims(String),

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Failure reported by the network collaborator.
    #[error("network inference failed: {0}")]
    Network(String),

    #[error("size model: {0}")]
    SizeModel(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SegmentError>;

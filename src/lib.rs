#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod error;
pub mod field;
pub mod image;
pub mod model;

// Pipeline stages, public for tools and advanced users.
pub mod cluster;
pub mod dynamics;
pub mod masks;
pub mod tiling;

pub mod config;
pub mod diagnostics;

// --- High-level re-exports -------------------------------------------------

pub use crate::error::{Result, SegmentError};
pub use crate::field::{FlowField, NetworkOutput};
pub use crate::image::{Dims, Grid, Image, LabelMask};
pub use crate::model::{EvalParams, FlowNetwork, ModelPreset, SegmentationResult, Segmenter};

pub use crate::diagnostics::SegmentationReport;

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
///
/// ```no_run
/// use cellflow::prelude::*;
///
/// # fn main() -> cellflow::Result<()> {
/// let dims = Dims::plane(64, 64);
/// let output = NetworkOutput {
///     flows: FlowField::zeros(dims, 2)?,
///     scalar: Grid::new(dims),
///     boundary: None,
///     style: Vec::new(),
/// };
/// let segmenter = Segmenter::new(Precomputed::new(output)?, ModelPreset::from_name("cyto2"));
/// let params = EvalParams { rescale: Some(1.0), ..Default::default() };
/// let result = segmenter.eval(&Image::gray(Grid::new(dims))?, &params)?;
/// println!("{} instances", result.labels.count_instances());
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::cluster::ClusteringStrategy;
    pub use crate::field::{FlowField, NetworkOutput};
    pub use crate::image::{Dims, Grid, Image, LabelMask};
    pub use crate::model::{EvalParams, FlowNetwork, ModelPreset, Precomputed, Segmenter};
}

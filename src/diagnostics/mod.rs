//! Diagnostics returned alongside segmentation results.
//!
//! [`SegmentationReport`] is the serializable summary written by the tools;
//! [`flow_vis`] renders flow fields for inspection.

pub mod flow_vis;
pub mod report;
pub mod timing;

pub use flow_vis::flow_to_rgb;
pub use report::{InputDescriptor, SegmentationReport};
pub use timing::{StageTiming, TimingBreakdown};

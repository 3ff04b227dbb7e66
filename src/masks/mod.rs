//! Mask validator: post-clustering quality control.
//!
//! Runs, in order, the flow-consistency check (2D only), hole filling, the
//! minimum-size filter and a final sequential relabel. Every step only ever
//! zeroes or merges labels, so the result never has more instances than the
//! clustering produced.

pub mod diameters;
pub mod filter;
pub mod flow_error;
pub mod relabel;

pub use diameters::{distance_diameter, label_distance_transform, median_area_diameter};
pub use filter::{fill_holes, remove_edge_masks, remove_small_masks};
pub use flow_error::{flow_errors, masks_to_flows, remove_bad_flow_masks};
pub use relabel::{label_areas, relabel_sequential};

use crate::error::Result;
use crate::field::FlowField;
use crate::image::LabelMask;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    /// Minimum instance size in pixels. Values `<= 0` disable the filter.
    pub min_size: i64,
    /// Maximum mean squared flow error. Values `<= 0` disable the check.
    pub flow_threshold: f32,
    /// Fill enclosed holes before the size filter.
    pub fill_holes: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            min_size: 15,
            flow_threshold: 0.4,
            fill_holes: false,
        }
    }
}

/// Apply the configured checks to a clustered label mask.
///
/// `flows` are the predicted flows at the mask's resolution; the flow check is
/// skipped for volumes and when no flows are supplied.
pub fn validate(
    labels: &LabelMask,
    flows: Option<&FlowField>,
    flow_factor: f32,
    opts: &ValidationOptions,
) -> Result<LabelMask> {
    let before = labels.count_instances();
    let mut out = labels.clone();
    match flows {
        Some(f) if opts.flow_threshold > 0.0 && labels.dims().depth == 1 => {
            out = remove_bad_flow_masks(&out, f, opts.flow_threshold, flow_factor)?;
        }
        _ => {}
    }
    if opts.fill_holes {
        out = fill_holes(&out);
    }
    out = remove_small_masks(&out, opts.min_size);
    let out = relabel_sequential(&out);
    debug!(
        "validate: {} -> {} instances (min_size={}, flow_threshold={})",
        before,
        out.count_instances(),
        opts.min_size,
        opts.flow_threshold
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Dims, Grid};

    fn two_blobs() -> LabelMask {
        let mut g = LabelMask::new(Dims::plane(10, 10));
        for y in 0..3 {
            for x in 0..3 {
                g.set(0, y, x, 4);
            }
        }
        for y in 5..10 {
            for x in 5..10 {
                g.set(0, y, x, 9);
            }
        }
        g
    }

    #[test]
    fn size_filter_then_relabel() {
        let opts = ValidationOptions {
            min_size: 10,
            flow_threshold: 0.0,
            fill_holes: false,
        };
        let out = validate(&two_blobs(), None, 5.0, &opts).unwrap();
        assert_eq!(out.count_instances(), 1);
        assert_eq!(out.get(0, 7, 7), 1);
        assert_eq!(out.get(0, 1, 1), 0);
    }

    #[test]
    fn larger_min_size_never_adds_instances() {
        let labels = two_blobs();
        let mut last = usize::MAX;
        for min_size in [-1, 0, 5, 10, 30] {
            let opts = ValidationOptions {
                min_size,
                flow_threshold: 0.0,
                fill_holes: false,
            };
            let n = validate(&labels, None, 5.0, &opts).unwrap().count_instances();
            assert!(n <= last);
            last = n;
        }
        assert_eq!(last, 0);
    }

    #[test]
    fn flow_check_skipped_for_volumes() {
        let plane = two_blobs();
        let vol = Grid::stack(&[plane.clone(), plane]).unwrap();
        let flows = FlowField::zeros(vol.dims(), 3).unwrap();
        let out = validate(&vol, Some(&flows), 5.0, &ValidationOptions::default()).unwrap();
        assert_eq!(out.count_instances(), 2);
    }
}

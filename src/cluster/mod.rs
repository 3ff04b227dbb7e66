//! Instance clusterer: turns integrated endpoints into a label mask.
//!
//! The strategy is chosen once per pipeline run and injected here; it also
//! decides how the integrator treats the flow (raw vs unit-normalised) and
//! how many Euler steps an image receives.
//!
//! - [`histogram`] – classic rounding into bins plus seeded growth.
//! - [`density`] – DBSCAN over pooled endpoints ("omni" mode), optionally
//!   guided by a boundary field.

pub mod density;
pub mod histogram;

pub use density::{cluster_density, DensityOptions};
pub use histogram::{cluster_histogram, HistogramOptions};

use crate::dynamics::{Integration, IterationBudget};
use crate::image::{Grid, LabelMask};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ClusteringStrategy {
    Histogram(HistogramOptions),
    Density(DensityOptions),
}

impl Default for ClusteringStrategy {
    fn default() -> Self {
        ClusteringStrategy::Histogram(HistogramOptions::default())
    }
}

impl ClusteringStrategy {
    pub fn histogram() -> Self {
        ClusteringStrategy::Histogram(HistogramOptions::default())
    }

    pub fn density() -> Self {
        ClusteringStrategy::Density(DensityOptions::default())
    }

    /// Density mode treats the scalar field as a distance transform and
    /// integrates unit-length flows.
    pub fn is_density(&self) -> bool {
        matches!(self, ClusteringStrategy::Density(_))
    }

    /// Step budget for one image.
    ///
    /// `base` is the classic step count, `rescale` the factor the network
    /// input was scaled by, and `fixed` requests the unscaled classic budget
    /// (true 3D without resampling).
    pub fn iteration_budget(
        &self,
        scalar: &Grid<f32>,
        foreground: &Grid<bool>,
        base: usize,
        flow_factor: f32,
        rescale: f32,
        fixed: bool,
    ) -> IterationBudget {
        match self {
            ClusteringStrategy::Histogram(_) if fixed => IterationBudget::Fixed(base),
            ClusteringStrategy::Histogram(_) => IterationBudget::Rescaled { base, rescale },
            ClusteringStrategy::Density(_) => {
                let max_distance = scalar
                    .data()
                    .iter()
                    .zip(foreground.data())
                    .filter(|(_, &fg)| fg)
                    .map(|(&v, _)| v)
                    .fold(0.0f32, f32::max);
                IterationBudget::Distance {
                    max_distance,
                    flow_factor,
                    rescale,
                }
            }
        }
    }

    pub fn cluster(&self, integration: &Integration, boundary: Option<&Grid<f32>>) -> LabelMask {
        match self {
            ClusteringStrategy::Histogram(opts) => cluster_histogram(integration, opts),
            ClusteringStrategy::Density(opts) if opts.cluster => {
                cluster_density(integration, boundary, opts)
            }
            ClusteringStrategy::Density(_) => {
                cluster_histogram(integration, &HistogramOptions::default())
            }
        }
    }

    /// Density runs on objects at least `diam_threshold` pixels across
    /// group endpoints by histogram seeding instead of DBSCAN; smaller
    /// objects keep DBSCAN. Histogram strategies are returned unchanged.
    pub fn gated_by_diameter(self, diameter: f32, diam_threshold: Option<f32>) -> Self {
        match (self, diam_threshold) {
            (ClusteringStrategy::Density(mut opts), Some(t)) if diameter >= t => {
                opts.cluster = false;
                ClusteringStrategy::Density(opts)
            }
            (strategy, _) => strategy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Dims;

    #[test]
    fn strategy_deserializes_from_tagged_json() {
        let s: ClusteringStrategy =
            serde_json::from_str(r#"{"mode":"density","min_samples":5.0}"#).unwrap();
        match s {
            ClusteringStrategy::Density(o) => assert_eq!(o.min_samples, 5.0),
            other => panic!("unexpected strategy {:?}", other),
        }
    }

    fn converged(dims: Dims, groups: &[([f32; 3], usize)]) -> Integration {
        let positions: Vec<[f32; 3]> = groups
            .iter()
            .flat_map(|&(p, n)| std::iter::repeat(p).take(n))
            .collect();
        Integration {
            dims,
            indices: (0..positions.len()).collect(),
            positions,
            trajectories: None,
            iterations: 1,
        }
    }

    #[test]
    fn density_without_cluster_groups_by_histogram() {
        let dims = Dims::plane(16, 16);
        // a sink of 5 pixels: too weak for a histogram seed, dense enough for DBSCAN
        let integ = converged(dims, &[([0.0, 4.0, 4.0], 30), ([0.0, 12.0, 12.0], 5)]);
        let dbscan = ClusteringStrategy::density().cluster(&integ, None);
        assert_eq!(dbscan.count_instances(), 2);

        let histogram = ClusteringStrategy::Density(DensityOptions {
            cluster: false,
            ..Default::default()
        });
        assert!(histogram.is_density());
        let labels = histogram.cluster(&integ, None);
        assert_eq!(labels.count_instances(), 1);
        assert_eq!(labels.data()[0], 1);
        assert_eq!(labels.data()[34], 0);
    }

    #[test]
    fn diameter_gate_switches_large_objects_to_histogram() {
        let gate = |d: f32, t: Option<f32>| match ClusteringStrategy::density().gated_by_diameter(d, t) {
            ClusteringStrategy::Density(o) => o.cluster,
            other => panic!("unexpected strategy {:?}", other),
        };
        assert!(gate(30.0, None));
        assert!(gate(8.0, Some(12.0)));
        assert!(!gate(12.0, Some(12.0)));
        assert!(!gate(30.0, Some(12.0)));
        assert_eq!(
            ClusteringStrategy::histogram().gated_by_diameter(5.0, Some(12.0)),
            ClusteringStrategy::histogram()
        );
    }

    #[test]
    fn density_budget_uses_foreground_maximum() {
        let dims = Dims::plane(4, 4);
        let mut scalar = Grid::filled(dims, 2.0f32);
        scalar.set(0, 0, 0, 100.0);
        let mut fg = Grid::filled(dims, true);
        fg.set(0, 0, 0, false);
        let budget = ClusteringStrategy::density().iteration_budget(&scalar, &fg, 200, 5.0, 1.0, false);
        assert_eq!(
            budget,
            IterationBudget::Distance {
                max_distance: 2.0,
                flow_factor: 5.0,
                rescale: 1.0
            }
        );
    }
}

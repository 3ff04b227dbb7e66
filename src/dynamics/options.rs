use serde::{Deserialize, Serialize};

/// Hard cap on Euler steps regardless of rescale or distance field.
pub const MAX_ITERATIONS: usize = 2000;

/// Multiplier on the distance-derived budget in density mode.
const DISTANCE_BUDGET_SCALE: f32 = 1.5;

/// Options for the Euler integration of pixel positions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationOptions {
    /// Base number of steps for histogram clustering (before rescale).
    pub niter: usize,
    /// Network flows are divided by this factor to obtain per-step
    /// displacements.
    pub flow_factor: f32,
    /// Bilinear/trilinear sampling of the flow at sub-pixel positions. When
    /// false the flow of the containing pixel is used.
    pub interp: bool,
    /// Keep every visited position per pixel for diagnostics.
    pub record_trace: bool,
}

impl Default for IntegrationOptions {
    fn default() -> Self {
        Self {
            niter: 200,
            flow_factor: 5.0,
            interp: true,
            record_trace: false,
        }
    }
}

/// How many Euler steps to take for one image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IterationBudget {
    /// Constant step count (true 3D without resampling).
    Fixed(usize),
    /// `base / rescale`: outputs resampled to native resolution need
    /// proportionally more steps.
    Rescaled { base: usize, rescale: f32 },
    /// Derived from the largest distance value on the foreground.
    Distance {
        max_distance: f32,
        flow_factor: f32,
        rescale: f32,
    },
}

impl IterationBudget {
    /// Resolved step count, always in `[1, MAX_ITERATIONS]`.
    pub fn iterations(&self) -> usize {
        let raw = match *self {
            IterationBudget::Fixed(n) => n as f32,
            IterationBudget::Rescaled { base, rescale } => base as f32 / sanitize(rescale),
            IterationBudget::Distance {
                max_distance,
                flow_factor,
                rescale,
            } => {
                DISTANCE_BUDGET_SCALE * flow_factor.max(1.0) * max_distance.max(0.0)
                    / sanitize(rescale)
            }
        };
        if !raw.is_finite() {
            return MAX_ITERATIONS;
        }
        (raw.ceil() as usize).clamp(1, MAX_ITERATIONS)
    }
}

fn sanitize(rescale: f32) -> f32 {
    if rescale.is_finite() && rescale > 0.0 {
        rescale
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescaled_budget_grows_when_downsampled() {
        let b = IterationBudget::Rescaled {
            base: 200,
            rescale: 0.5,
        };
        assert_eq!(b.iterations(), 400);
    }

    #[test]
    fn budgets_are_capped() {
        let b = IterationBudget::Rescaled {
            base: 200,
            rescale: 1e-6,
        };
        assert_eq!(b.iterations(), MAX_ITERATIONS);
        let d = IterationBudget::Distance {
            max_distance: f32::INFINITY,
            flow_factor: 5.0,
            rescale: 1.0,
        };
        assert_eq!(d.iterations(), MAX_ITERATIONS);
        assert_eq!(IterationBudget::Fixed(0).iterations(), 1);
    }

    #[test]
    fn distance_budget_follows_largest_object() {
        let small = IterationBudget::Distance {
            max_distance: 4.0,
            flow_factor: 5.0,
            rescale: 1.0,
        };
        let large = IterationBudget::Distance {
            max_distance: 16.0,
            flow_factor: 5.0,
            rescale: 1.0,
        };
        assert_eq!(small.iterations(), 30);
        assert!(large.iterations() > small.iterations());
    }
}

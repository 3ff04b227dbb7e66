//! Fixed-step Euler integration of pixel positions along a flow field.
//!
//! Every foreground pixel starts at its own centre and is advanced by the
//! sampled displacement once per iteration. Positions are clipped to the
//! valid extent, so a pixel pushed against the border simply stalls there.
//! Background pixels never move and are not reported.
use super::interp::StepField;
use super::options::IntegrationOptions;
use crate::error::{Result, SegmentError};
use crate::field::FlowField;
use crate::image::{Dims, Grid};
use log::debug;

/// Fewer foreground pixels than this cannot form a mask; integration is
/// skipped and the caller receives an empty result.
pub const MIN_FOREGROUND_PIXELS: usize = 5;

/// Final positions of the integrated foreground pixels.
#[derive(Clone, Debug, Default)]
pub struct Integration {
    pub dims: Dims,
    /// Linear indices of the integrated pixels.
    pub indices: Vec<usize>,
    /// Final `[z, y, x]` position per entry of `indices`.
    pub positions: Vec<[f32; 3]>,
    /// Visited positions per pixel (start included) when tracing was requested.
    pub trajectories: Option<Vec<Vec<[f32; 3]>>>,
    pub iterations: usize,
}

impl Integration {
    pub fn empty(dims: Dims) -> Self {
        Self {
            dims,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Dense `[z, y, x]` final positions with background pixels left at their
    /// own coordinates.
    pub fn dense_positions(&self) -> Vec<[f32; 3]> {
        let mut out: Vec<[f32; 3]> = (0..self.dims.len())
            .map(|i| {
                let [z, y, x] = self.dims.coords(i);
                [z as f32, y as f32, x as f32]
            })
            .collect();
        for (&i, &p) in self.indices.iter().zip(&self.positions) {
            out[i] = p;
        }
        out
    }
}

/// Pixels with `scalar > threshold`.
pub fn foreground_mask(scalar: &Grid<f32>, threshold: f32) -> Grid<bool> {
    scalar.map(|v| v > threshold)
}

/// Advect all foreground pixels for `niter` steps.
///
/// Flows are divided by `opts.flow_factor` and zeroed off the foreground.
/// With `normalize` set the flow is first scaled to unit length per pixel.
pub fn follow_flows(
    flows: &FlowField,
    foreground: &Grid<bool>,
    niter: usize,
    normalize: bool,
    opts: &IntegrationOptions,
) -> Result<Integration> {
    let dims = flows.dims();
    if foreground.dims() != dims {
        return Err(SegmentError::ShapeMismatch {
            what: "foreground mask",
            expected: dims,
            found: foreground.dims(),
        });
    }
    let indices: Vec<usize> = foreground
        .data()
        .iter()
        .enumerate()
        .filter_map(|(i, &fg)| fg.then_some(i))
        .collect();
    if indices.len() < MIN_FOREGROUND_PIXELS {
        debug!(
            "follow_flows: {} foreground pixels, skipping integration",
            indices.len()
        );
        return Ok(Integration::empty(dims));
    }

    let field = step_field(flows, foreground, normalize, opts.flow_factor);
    let starts: Vec<[f32; 3]> = indices
        .iter()
        .map(|&i| {
            let [z, y, x] = dims.coords(i);
            [z as f32, y as f32, x as f32]
        })
        .collect();

    let advect_one = |start: &[f32; 3]| advect(*start, &field, niter, opts);

    #[cfg(feature = "parallel")]
    let results: Vec<([f32; 3], Option<Vec<[f32; 3]>>)> = {
        use rayon::prelude::*;
        starts.par_iter().map(advect_one).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let results: Vec<([f32; 3], Option<Vec<[f32; 3]>>)> = starts.iter().map(advect_one).collect();

    let mut positions = Vec::with_capacity(results.len());
    let mut trajectories = opts.record_trace.then(|| Vec::with_capacity(results.len()));
    for (p, trace) in results {
        positions.push(p);
        if let (Some(all), Some(t)) = (trajectories.as_mut(), trace) {
            all.push(t);
        }
    }
    debug!(
        "follow_flows: advected {} pixels for {} iterations",
        indices.len(),
        niter
    );
    Ok(Integration {
        dims,
        indices,
        positions,
        trajectories,
        iterations: niter,
    })
}

fn step_field(
    flows: &FlowField,
    foreground: &Grid<bool>,
    normalize: bool,
    flow_factor: f32,
) -> StepField {
    let dims = flows.dims();
    let n = dims.len();
    let inv = 1.0 / if flow_factor > 0.0 { flow_factor } else { 1.0 };
    let mut comps = [vec![0.0f32; n], vec![0.0f32; n], vec![0.0f32; n]];
    for (i, &fg) in foreground.data().iter().enumerate() {
        if !fg {
            continue;
        }
        let v = flows.vector_at(i);
        let scale = if normalize {
            let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
            if norm > 0.0 {
                inv / norm
            } else {
                0.0
            }
        } else {
            inv
        };
        for (c, comp) in comps.iter_mut().enumerate() {
            comp[i] = v[c] * scale;
        }
    }
    StepField { dims, comps }
}

fn advect(
    start: [f32; 3],
    field: &StepField,
    niter: usize,
    opts: &IntegrationOptions,
) -> ([f32; 3], Option<Vec<[f32; 3]>>) {
    let upper = field.dims.extent().map(|l| (l - 1) as f32);
    let mut p = start;
    let mut trace = opts.record_trace.then(|| {
        let mut t = Vec::with_capacity(niter + 1);
        t.push(start);
        t
    });
    for _ in 0..niter {
        let step = if opts.interp {
            field.trilinear(p)
        } else {
            field.nearest(p)
        };
        for k in 0..3 {
            p[k] = (p[k] + step[k]).clamp(0.0, upper[k]);
        }
        if let Some(t) = trace.as_mut() {
            t.push(p);
        }
    }
    (p, trace)
}

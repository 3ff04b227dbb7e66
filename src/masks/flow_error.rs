//! Flow-consistency check for 2D masks.
//!
//! Each mask gets an ideal flow field by simulating heat diffusion from its
//! most central pixel; the mean squared difference between that field and the
//! predicted flow (scaled down by the flow factor) is the mask's flow error.
use super::relabel::relabel_sequential;
use crate::error::{Result, SegmentError};
use crate::field::FlowField;
use crate::image::{Dims, Grid, LabelMask};
use log::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Per-label pixel lists of one plane, index 0 unused.
fn pixels_by_label(labels: &LabelMask) -> Vec<Vec<(usize, usize)>> {
    let w = labels.dims().width;
    let mut out = vec![Vec::new(); labels.max_label() as usize + 1];
    for (i, &l) in labels.data().iter().enumerate() {
        if l != 0 {
            out[l as usize].push((i / w, i % w));
        }
    }
    out
}

/// Unit flows `[dy, dx]` derived from a 2D label mask by heat diffusion.
pub fn masks_to_flows(labels: &LabelMask) -> Result<FlowField> {
    let dims = labels.dims();
    if dims.depth != 1 {
        return Err(SegmentError::InvalidDims(format!(
            "masks_to_flows expects a single plane, got depth {}",
            dims.depth
        )));
    }
    let mut dy = vec![0.0f32; dims.len()];
    let mut dx = vec![0.0f32; dims.len()];
    let groups = pixels_by_label(labels);

    #[cfg(feature = "parallel")]
    let per_mask: Vec<Vec<(usize, [f32; 2])>> = groups.par_iter().map(|p| diffuse(p, dims)).collect();
    #[cfg(not(feature = "parallel"))]
    let per_mask: Vec<Vec<(usize, [f32; 2])>> = groups.iter().map(|p| diffuse(p, dims)).collect();

    for (idx, v) in per_mask.into_iter().flatten() {
        dy[idx] = v[0];
        dx[idx] = v[1];
    }
    FlowField::new(vec![Grid::from_vec(dims, dy)?, Grid::from_vec(dims, dx)?])
}

/// Diffuse heat from the pixel closest to the median of `pixels` and return
/// the normalised gradient of `ln(1 + T)` at every pixel of the mask.
/// Lower median: even-length inputs take the smaller middle element.
fn lower_median(mut v: Vec<usize>) -> f32 {
    if v.is_empty() {
        return 0.0;
    }
    let mid = (v.len() - 1) / 2;
    *v.select_nth_unstable(mid).1 as f32
}

fn diffuse(pixels: &[(usize, usize)], dims: Dims) -> Vec<(usize, [f32; 2])> {
    if pixels.is_empty() {
        return Vec::new();
    }
    let (ymin, ymax, xmin, xmax) = pixels.iter().fold(
        (usize::MAX, 0, usize::MAX, 0),
        |(a, b, c, d), &(y, x)| (a.min(y), b.max(y), c.min(x), d.max(x)),
    );
    // one pixel of padding so every 3x3 neighbourhood stays inside the box
    let ly = ymax - ymin + 3;
    let lx = xmax - xmin + 3;
    let local: Vec<(usize, usize)> = pixels
        .iter()
        .map(|&(y, x)| (y - ymin + 1, x - xmin + 1))
        .collect();

    let ym = lower_median(local.iter().map(|p| p.0).collect());
    let xm = lower_median(local.iter().map(|p| p.1).collect());
    let centre = local
        .iter()
        .min_by(|a, b| {
            let da = (a.0 as f32 - ym).powi(2) + (a.1 as f32 - xm).powi(2);
            let db = (b.0 as f32 - ym).powi(2) + (b.1 as f32 - xm).powi(2);
            da.total_cmp(&db)
        })
        .copied()
        .unwrap_or(local[0]);

    let niter = 2 * ((ymax - ymin) + (xmax - xmin)) + 1;
    let mut t = vec![0.0f64; ly * lx];
    let mut next = vec![0.0f64; local.len()];
    for _ in 0..niter {
        t[centre.0 * lx + centre.1] += 1.0;
        for (k, &(y, x)) in local.iter().enumerate() {
            let mut s = 0.0;
            for yy in y - 1..=y + 1 {
                for xx in x - 1..=x + 1 {
                    s += t[yy * lx + xx];
                }
            }
            next[k] = s / 9.0;
        }
        for (k, &(y, x)) in local.iter().enumerate() {
            t[y * lx + x] = next[k];
        }
    }
    for &(y, x) in &local {
        t[y * lx + x] = (1.0 + t[y * lx + x]).ln();
    }

    local
        .iter()
        .zip(pixels)
        .map(|(&(y, x), &(gy, gx))| {
            let vy = (t[(y + 1) * lx + x] - t[(y - 1) * lx + x]) as f32;
            let vx = (t[y * lx + x + 1] - t[y * lx + x - 1]) as f32;
            let n = (vy * vy + vx * vx).sqrt();
            let v = if n > 1e-20 { [vy / n, vx / n] } else { [0.0, 0.0] };
            (gy * dims.width + gx, v)
        })
        .collect()
}

/// Mean squared flow error per label (index 0 unused).
pub fn flow_errors(labels: &LabelMask, flows: &FlowField, flow_factor: f32) -> Result<Vec<f32>> {
    let dims = labels.dims();
    if flows.dims() != dims {
        return Err(SegmentError::ShapeMismatch {
            what: "flow field",
            expected: dims,
            found: flows.dims(),
        });
    }
    let ideal = masks_to_flows(labels)?;
    let n = labels.max_label() as usize + 1;
    let mut sums = vec![0.0f64; n];
    let mut counts = vec![0usize; n];
    let ff = if flow_factor > 0.0 { flow_factor } else { 1.0 };
    for (i, &l) in labels.data().iter().enumerate() {
        if l == 0 {
            continue;
        }
        let pred = flows.vector_at(i);
        let want = ideal.vector_at(i);
        let e: f32 = (1..3).map(|k| (want[k] - pred[k] / ff).powi(2)).sum();
        sums[l as usize] += e as f64;
        counts[l as usize] += 1;
    }
    Ok(sums
        .iter()
        .zip(&counts)
        .map(|(&s, &c)| if c > 0 { (s / c as f64) as f32 } else { 0.0 })
        .collect())
}

/// Drop masks whose flow error exceeds `threshold` and renumber the rest.
pub fn remove_bad_flow_masks(
    labels: &LabelMask,
    flows: &FlowField,
    threshold: f32,
    flow_factor: f32,
) -> Result<LabelMask> {
    if labels.max_label() == 0 {
        return Ok(labels.clone());
    }
    let errors = flow_errors(labels, flows, flow_factor)?;
    let bad: Vec<bool> = errors.iter().map(|&e| e > threshold).collect();
    let dropped = bad.iter().skip(1).filter(|&&b| b).count();
    debug!(
        "remove_bad_flow_masks: {dropped} of {} masks above error {threshold}",
        errors.len() - 1
    );
    let kept = labels.map(|l| if bad[l as usize] { 0 } else { l });
    Ok(relabel_sequential(&kept))
}

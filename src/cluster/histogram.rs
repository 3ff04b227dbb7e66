//! Classic clustering: histogram the integrated endpoints and grow seeds.
//!
//! Endpoints are rounded into integer bins. Bins that equal the maximum of a
//! `max_filter_width` neighbourhood along every axis and hold more than
//! `seed_min_count` endpoints become seeds. Seeds are visited by descending
//! count and grown through the 3×3(×3) neighbourhood into bins with more than
//! `grow_min_count` endpoints. A later, weaker seed overwrites bins shared with
//! a stronger one; plateaus of equal maxima therefore stay separate seeds,
//! erring on the side of over-segmentation.
use crate::dynamics::Integration;
use crate::image::{Dims, Grid, LabelMask};
use crate::masks::relabel::relabel_sequential;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramOptions {
    /// Width of the per-axis maximum filter used for seed detection.
    pub max_filter_width: usize,
    /// A bin must hold more endpoints than this to seed a mask.
    pub seed_min_count: u32,
    /// Seeds only grow into bins holding more endpoints than this.
    pub grow_min_count: u32,
    /// Number of neighbourhood growth steps per seed.
    pub grow_iterations: usize,
    /// Masks covering more than this fraction of the image are dropped.
    pub max_size_fraction: f32,
}

impl Default for HistogramOptions {
    fn default() -> Self {
        Self {
            max_filter_width: 5,
            seed_min_count: 10,
            grow_min_count: 2,
            grow_iterations: 5,
            max_size_fraction: 0.4,
        }
    }
}

/// Label the integrated pixels by histogram seeding.
pub fn cluster_histogram(integration: &Integration, opts: &HistogramOptions) -> LabelMask {
    let dims = integration.dims;
    let mut labels = LabelMask::new(dims);
    if integration.is_empty() {
        return labels;
    }

    let bins: Vec<usize> = integration
        .positions
        .iter()
        .map(|p| bin_index(dims, p))
        .collect();
    let mut hist = Grid::<u32>::new(dims);
    for &b in &bins {
        hist.data_mut()[b] += 1;
    }

    let hmax = max_filter(&hist, opts.max_filter_width);
    let mut seeds: Vec<usize> = hist
        .data()
        .iter()
        .zip(hmax.data())
        .enumerate()
        .filter_map(|(i, (&h, &m))| (h == m && h > opts.seed_min_count).then_some(i))
        .collect();
    seeds.sort_by(|&a, &b| hist.data()[b].cmp(&hist.data()[a]).then(a.cmp(&b)));
    debug!("cluster_histogram: {} seeds", seeds.len());

    let mut bin_labels = Grid::<u32>::new(dims);
    let mut visited = vec![u32::MAX; dims.len()];
    for (k, &seed) in seeds.iter().enumerate() {
        let label = k as u32 + 1;
        for b in grow_seed(&hist, seed, k as u32, &mut visited, opts) {
            bin_labels.data_mut()[b] = label;
        }
    }

    for (&pix, &b) in integration.indices.iter().zip(&bins) {
        labels.data_mut()[pix] = bin_labels.data()[b];
    }

    let limit = (opts.max_size_fraction * dims.len() as f32) as usize;
    remove_large(&mut labels, limit);
    relabel_sequential(&labels)
}

#[inline]
fn bin_index(dims: Dims, p: &[f32; 3]) -> usize {
    let [d, h, w] = dims.extent();
    let z = (p[0].round().max(0.0) as usize).min(d - 1);
    let y = (p[1].round().max(0.0) as usize).min(h - 1);
    let x = (p[2].round().max(0.0) as usize).min(w - 1);
    dims.index(z, y, x)
}

/// Bins reachable from `seed` in at most `grow_iterations` king moves through
/// bins above `grow_min_count`.
fn grow_seed(
    hist: &Grid<u32>,
    seed: usize,
    stamp: u32,
    visited: &mut [u32],
    opts: &HistogramOptions,
) -> Vec<usize> {
    let dims = hist.dims();
    let [d, h, w] = dims.extent();
    let mut out = vec![seed];
    let mut queue = VecDeque::from([(seed, 0usize)]);
    visited[seed] = stamp;
    while let Some((idx, depth)) = queue.pop_front() {
        if depth == opts.grow_iterations {
            continue;
        }
        let [z, y, x] = dims.coords(idx);
        for nz in z.saturating_sub(1)..=(z + 1).min(d - 1) {
            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    let n = dims.index(nz, ny, nx);
                    if visited[n] == stamp || hist.data()[n] <= opts.grow_min_count {
                        continue;
                    }
                    visited[n] = stamp;
                    out.push(n);
                    queue.push_back((n, depth + 1));
                }
            }
        }
    }
    out
}

/// Separable running maximum of width `width` along every axis.
fn max_filter(src: &Grid<u32>, width: usize) -> Grid<u32> {
    let dims = src.dims();
    let radius = width / 2;
    let [d, h, w] = dims.extent();
    let mut cur = src.clone();
    let strides = [h * w, w, 1];
    for (axis, &len) in [d, h, w].iter().enumerate() {
        if len <= 1 || radius == 0 {
            continue;
        }
        let stride = strides[axis];
        let mut next = cur.clone();
        for idx in 0..dims.len() {
            let c = dims.coords(idx)[axis];
            let lo = c.saturating_sub(radius);
            let hi = (c + radius).min(len - 1);
            let base = idx - c * stride;
            let mut m = 0;
            for k in lo..=hi {
                m = m.max(cur.data()[base + k * stride]);
            }
            next.data_mut()[idx] = m;
        }
        cur = next;
    }
    cur
}

fn remove_large(labels: &mut LabelMask, limit: usize) {
    let max = labels.max_label() as usize;
    let mut counts = vec![0usize; max + 1];
    for &l in labels.data() {
        counts[l as usize] += 1;
    }
    let too_big: Vec<bool> = counts.iter().map(|&c| c > limit).collect();
    let mut removed = 0;
    for l in labels.data_mut() {
        if *l != 0 && too_big[*l as usize] {
            *l = 0;
            removed += 1;
        }
    }
    if removed > 0 {
        debug!("cluster_histogram: dropped {removed} pixels in oversized masks");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integration_with_sinks(dims: Dims, groups: &[([f32; 3], usize)]) -> Integration {
        let mut indices = Vec::new();
        let mut positions = Vec::new();
        let mut next = 0usize;
        for &(sink, n) in groups {
            for _ in 0..n {
                indices.push(next);
                positions.push(sink);
                next += 1;
            }
        }
        Integration {
            dims,
            indices,
            positions,
            trajectories: None,
            iterations: 1,
        }
    }

    #[test]
    fn separate_sinks_give_separate_labels() {
        let dims = Dims::plane(32, 32);
        let integ = integration_with_sinks(dims, &[([0.0, 8.0, 8.0], 40), ([0.0, 24.0, 24.0], 30)]);
        let labels = cluster_histogram(&integ, &HistogramOptions::default());
        assert_eq!(labels.count_instances(), 2);
        assert_eq!(labels.data()[0], 1, "stronger seed is labelled first");
        assert_eq!(labels.data()[40], 2);
    }

    #[test]
    fn weak_sinks_are_not_seeds() {
        let dims = Dims::plane(16, 16);
        let integ = integration_with_sinks(dims, &[([0.0, 8.0, 8.0], 10)]);
        let labels = cluster_histogram(&integ, &HistogramOptions::default());
        assert_eq!(labels.max_label(), 0);
    }

    #[test]
    fn oversized_masks_are_dropped() {
        let dims = Dims::plane(8, 8);
        let integ = integration_with_sinks(dims, &[([0.0, 4.0, 4.0], 30)]);
        let labels = cluster_histogram(&integ, &HistogramOptions::default());
        assert_eq!(labels.max_label(), 0, "30 of 64 pixels exceeds 40%");
    }

    #[test]
    fn max_filter_spreads_peak() {
        let dims = Dims::plane(7, 7);
        let mut g = Grid::<u32>::new(dims);
        g.set(0, 3, 3, 9);
        let m = max_filter(&g, 5);
        assert_eq!(m.get(0, 1, 1), 9);
        assert_eq!(m.get(0, 5, 5), 9);
        assert_eq!(m.get(0, 0, 3), 0);
    }
}

//! Density clustering of endpoints (DBSCAN over a pooled point set).
//!
//! Endpoints are first pooled on a sub-pixel lattice so that thousands of
//! pixels converging on the same spot become one weighted point; clustering
//! cost then scales with the number of distinct endpoint locations. A pooled
//! point is core when the total weight within `eps` reaches `min_samples`.
//! Pixels whose boundary logit exceeds `boundary_threshold` contribute no
//! weight, so a thin bridge of boundary pixels cannot join two instances.
use crate::dynamics::Integration;
use crate::image::{Grid, LabelMask};
use crate::masks::relabel::relabel_sequential;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const EPS_DEFAULT: f32 = std::f32::consts::SQRT_2;
const EPS_WITH_BOUNDARY: f32 = 1.0 + 1.0 / 3.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityOptions {
    /// Neighbourhood radius in pixels. `None` selects `sqrt(2)`, or `4/3`
    /// when a boundary field is available.
    pub eps: Option<f32>,
    /// Minimum neighbourhood weight (pixels) for a core point.
    pub min_samples: f32,
    /// Lattice subdivisions per pixel used to pool endpoints.
    pub subpixel: u32,
    /// Boundary logits above this value mark pixels as boundary.
    pub boundary_threshold: f32,
    /// Group endpoints with DBSCAN. When false the distance budget and
    /// unit-length flows are kept but endpoints are grouped by histogram
    /// seeding.
    pub cluster: bool,
}

impl Default for DensityOptions {
    fn default() -> Self {
        Self {
            eps: None,
            min_samples: 3.0,
            subpixel: 4,
            boundary_threshold: 0.0,
            cluster: true,
        }
    }
}

type Key = [i64; 3];

struct Pooled {
    pos: [f32; 3],
    weight: f32,
    members: Vec<usize>,
}

/// Label integrated pixels by density-connected endpoint clusters.
pub fn cluster_density(
    integration: &Integration,
    boundary: Option<&Grid<f32>>,
    opts: &DensityOptions,
) -> LabelMask {
    let dims = integration.dims;
    let mut labels = LabelMask::new(dims);
    if integration.is_empty() {
        return labels;
    }
    let eps = opts.eps.unwrap_or(if boundary.is_some() {
        EPS_WITH_BOUNDARY
    } else {
        EPS_DEFAULT
    });
    let points = pool(integration, boundary, opts);
    let cluster_of = dbscan(&points, eps, opts.min_samples);

    let mut clusters = 0;
    for (pt, cluster) in points.iter().zip(&cluster_of) {
        if let Some(c) = cluster {
            clusters = clusters.max(c + 1);
            for &m in &pt.members {
                labels.data_mut()[integration.indices[m]] = c + 1;
            }
        }
    }
    debug!(
        "cluster_density: {} pooled points, {} clusters, eps={:.3}",
        points.len(),
        clusters,
        eps
    );
    relabel_sequential(&labels)
}

fn pool(
    integration: &Integration,
    boundary: Option<&Grid<f32>>,
    opts: &DensityOptions,
) -> Vec<Pooled> {
    let sub = opts.subpixel.max(1) as f32;
    let mut map: BTreeMap<Key, Pooled> = BTreeMap::new();
    for (m, (&pix, p)) in integration
        .indices
        .iter()
        .zip(&integration.positions)
        .enumerate()
    {
        let key = p.map(|v| (v * sub).round() as i64);
        let on_boundary = boundary.is_some_and(|b| b.data()[pix] > opts.boundary_threshold);
        let entry = map.entry(key).or_insert_with(|| Pooled {
            pos: key.map(|k| k as f32 / sub),
            weight: 0.0,
            members: Vec::new(),
        });
        entry.members.push(m);
        if !on_boundary {
            entry.weight += 1.0;
        }
    }
    map.into_values().collect()
}

/// Classic DBSCAN on weighted points; returns the cluster id per point.
fn dbscan(points: &[Pooled], eps: f32, min_samples: f32) -> Vec<Option<u32>> {
    let cell = eps.max(1e-3);
    let cell_of = |p: &[f32; 3]| p.map(|v| (v / cell).floor() as i64);
    let mut cells: HashMap<Key, Vec<usize>> = HashMap::new();
    for (i, p) in points.iter().enumerate() {
        cells.entry(cell_of(&p.pos)).or_default().push(i);
    }
    let eps2 = eps * eps;
    let neighbours = |i: usize| -> Vec<usize> {
        let p = points[i].pos;
        let c = cell_of(&p);
        let mut out = Vec::new();
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if let Some(list) = cells.get(&[c[0] + dz, c[1] + dy, c[2] + dx]) {
                        for &j in list {
                            let q = points[j].pos;
                            let d2 = (p[0] - q[0]).powi(2)
                                + (p[1] - q[1]).powi(2)
                                + (p[2] - q[2]).powi(2);
                            if d2 <= eps2 {
                                out.push(j);
                            }
                        }
                    }
                }
            }
        }
        out
    };
    let is_core = |i: usize, nbrs: &[usize]| -> bool {
        points[i].weight > 0.0 && nbrs.iter().map(|&j| points[j].weight).sum::<f32>() >= min_samples
    };

    let mut assigned: Vec<Option<u32>> = vec![None; points.len()];
    let mut visited = vec![false; points.len()];
    let mut next_id = 0u32;
    for i in 0..points.len() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let nbrs = neighbours(i);
        if !is_core(i, &nbrs) {
            continue;
        }
        let id = next_id;
        next_id += 1;
        assigned[i] = Some(id);
        let mut stack = nbrs;
        while let Some(j) = stack.pop() {
            if assigned[j].is_none() {
                assigned[j] = Some(id);
            }
            if visited[j] {
                continue;
            }
            visited[j] = true;
            let nj = neighbours(j);
            if is_core(j, &nj) {
                stack.extend(nj.into_iter().filter(|&k| !visited[k] || assigned[k].is_none()));
            }
        }
    }
    assigned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Dims;

    fn integration(dims: Dims, positions: Vec<[f32; 3]>) -> Integration {
        Integration {
            dims,
            indices: (0..positions.len()).collect(),
            positions,
            trajectories: None,
            iterations: 1,
        }
    }

    #[test]
    fn two_tight_groups_form_two_clusters() {
        let dims = Dims::plane(16, 16);
        let mut pos = vec![[0.0, 3.0, 3.0]; 20];
        pos.extend(vec![[0.0, 3.0, 3.6]; 20]);
        pos.extend(vec![[0.0, 12.0, 12.0]; 20]);
        let labels = cluster_density(&integration(dims, pos), None, &DensityOptions::default());
        assert_eq!(labels.count_instances(), 2);
        assert_eq!(labels.data()[0], labels.data()[25]);
        assert_ne!(labels.data()[0], labels.data()[45]);
    }

    #[test]
    fn isolated_points_are_noise() {
        let dims = Dims::plane(16, 16);
        let pos = vec![[0.0, 1.0, 1.0], [0.0, 8.0, 8.0], [0.0, 14.0, 2.0]];
        let labels = cluster_density(&integration(dims, pos), None, &DensityOptions::default());
        assert_eq!(labels.max_label(), 0);
    }

    #[test]
    fn boundary_pixels_do_not_bridge() {
        let dims = Dims::plane(4, 16);
        // Two dense groups joined by a chain of single endpoints that all
        // originate on predicted boundary pixels.
        let mut pos = vec![[0.0, 1.0, 1.0]; 10];
        pos.extend(vec![[0.0, 1.0, 9.0]; 10]);
        for x in 2..9 {
            pos.push([0.0, 1.0, x as f32]);
        }
        let mut bd = Grid::filled(Dims::plane(4, 16), -5.0f32);
        for i in 20..27 {
            bd.data_mut()[i] = 5.0;
        }
        let integ = integration(dims, pos.clone());
        let without = cluster_density(&integ, None, &DensityOptions::default());
        assert_eq!(without.count_instances(), 1, "chain bridges without boundary");
        let with = cluster_density(&integ, Some(&bd), &DensityOptions::default());
        assert_eq!(with.count_instances(), 2);
    }
}

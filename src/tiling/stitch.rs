//! Stitch independently segmented planes into volume instances.
//!
//! Matching is greedy and forward-only: plane `i` is matched against the
//! already stitched plane `i - 1` and nothing else. A long object whose
//! cross-section disappears for one plane is split, and two objects that
//! overlap the same predecessor can be merged. This is a known limitation of
//! the method, kept for speed.
use crate::error::{Result, SegmentError};
use crate::image::{Grid, LabelMask};
use crate::masks::relabel::relabel_sequential;
use log::{debug, info};

/// IoU matrix `[current][previous]` including the background row/column.
fn iou_matrix(current: &[u32], previous: &[u32], n_cur: usize, n_prev: usize) -> Vec<Vec<f32>> {
    let mut overlap = vec![vec![0u32; n_prev + 1]; n_cur + 1];
    let mut area_cur = vec![0u32; n_cur + 1];
    let mut area_prev = vec![0u32; n_prev + 1];
    for (&c, &p) in current.iter().zip(previous) {
        overlap[c as usize][p as usize] += 1;
        area_cur[c as usize] += 1;
        area_prev[p as usize] += 1;
    }
    overlap
        .iter()
        .enumerate()
        .map(|(c, row)| {
            row.iter()
                .enumerate()
                .map(|(p, &inter)| {
                    let union = area_cur[c] + area_prev[p] - inter;
                    if union > 0 {
                        inter as f32 / union as f32
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

/// Stitch a stack of label planes (`depth` planes of one volume).
///
/// For each plane, IoU values below `threshold` are ignored, every previous
/// label keeps only its best-matching current label, and each current label
/// takes the previous label it overlaps most (lowest id on ties). Current
/// labels left without a match get fresh ids. The result is relabelled
/// sequentially.
pub fn stitch_volume(labels: &LabelMask, threshold: f32) -> Result<LabelMask> {
    let dims = labels.dims();
    if dims.depth < 2 {
        return Ok(relabel_sequential(labels));
    }
    info!(
        "stitching {} planes with stitch_threshold={:.3}",
        dims.depth, threshold
    );
    let mut out = labels.clone();
    let mut mmax = labels.plane(0).iter().copied().max().unwrap_or(0);
    for z in 1..dims.depth {
        let n_prev = out.plane(z - 1).iter().copied().max().unwrap_or(0) as usize;
        let n_cur = out.plane(z).iter().copied().max().unwrap_or(0) as usize;
        if n_cur == 0 {
            continue;
        }
        let mut lut = vec![0u32; n_cur + 1];
        let mut fresh = 0;
        if n_prev == 0 {
            for (l, slot) in lut.iter_mut().enumerate().skip(1) {
                *slot = mmax + l as u32;
            }
            mmax += n_cur as u32;
            fresh = n_cur;
        } else {
            let iou = iou_matrix(out.plane(z), out.plane(z - 1), n_cur, n_prev);
            let mut m: Vec<Vec<f32>> = iou
                .iter()
                .skip(1)
                .map(|row| {
                    row.iter()
                        .skip(1)
                        .map(|&v| if v < threshold { 0.0 } else { v })
                        .collect()
                })
                .collect();
            // keep only the best row per previous label
            for p in 0..n_prev {
                let best = m.iter().map(|row| row[p]).fold(0.0f32, f32::max);
                for row in m.iter_mut() {
                    if row[p] < best {
                        row[p] = 0.0;
                    }
                }
            }
            for (c, row) in m.iter().enumerate() {
                let (arg, best) = row
                    .iter()
                    .enumerate()
                    .fold((0usize, 0.0f32), |acc, (p, &v)| if v > acc.1 { (p, v) } else { acc });
                lut[c + 1] = if best > 0.0 {
                    arg as u32 + 1
                } else {
                    fresh += 1;
                    mmax + fresh as u32
                };
            }
            mmax += fresh as u32;
        }
        debug!("stitch plane {z}: {n_cur} labels, {fresh} new");
        for l in out.plane_mut(z) {
            *l = lut[*l as usize];
        }
    }
    Ok(relabel_sequential(&out))
}

/// Stack single planes and stitch them. All planes must share one shape.
pub fn stitch_planes(planes: &[LabelMask], threshold: f32) -> Result<LabelMask> {
    let first = planes
        .first()
        .ok_or_else(|| SegmentError::InvalidDims("no planes to stitch".to_string()))?;
    for (i, p) in planes.iter().enumerate() {
        if p.dims().depth != 1 || p.dims() != first.dims() {
            return Err(SegmentError::PlaneShapeMismatch {
                plane: i,
                expected: first.dims(),
                found: p.dims(),
            });
        }
    }
    stitch_volume(&Grid::stack(planes)?, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Dims;

    fn plane(rows: &[&[u32]]) -> LabelMask {
        let h = rows.len();
        let w = rows[0].len();
        Grid::from_vec(Dims::plane(h, w), rows.concat()).unwrap()
    }

    #[test]
    fn identical_planes_become_one_instance() {
        let p = plane(&[&[0, 1, 1, 0], &[0, 1, 1, 0], &[2, 0, 0, 3]]);
        let out = stitch_planes(&[p.clone(), p.clone(), p], 0.5).unwrap();
        assert_eq!(out.count_instances(), 3);
        for z in 1..3 {
            assert_eq!(out.plane(z), out.plane(0));
        }
    }

    #[test]
    fn relabelled_plane_is_matched_to_previous_ids() {
        let a = plane(&[&[1, 1, 0, 2, 2]]);
        let b = plane(&[&[2, 2, 0, 1, 1]]);
        let out = stitch_planes(&[a, b], 0.5).unwrap();
        assert_eq!(out.plane(0), out.plane(1));
    }

    #[test]
    fn low_overlap_starts_new_instance() {
        let a = plane(&[&[1, 1, 1, 1, 0, 0]]);
        let b = plane(&[&[0, 0, 0, 1, 1, 1]]);
        let out = stitch_planes(&[a, b], 0.5).unwrap();
        assert_eq!(out.count_instances(), 2);
        let loose = stitch_planes(&[out.extract_plane(0), plane(&[&[0, 0, 0, 1, 1, 1]])], 0.1).unwrap();
        assert_eq!(loose.count_instances(), 1);
    }

    #[test]
    fn empty_plane_does_not_reuse_ids() {
        let a = plane(&[&[1, 1, 0, 0]]);
        let e = plane(&[&[0, 0, 0, 0]]);
        let c = plane(&[&[0, 0, 1, 1]]);
        let out = stitch_planes(&[a, e, c], 0.5).unwrap();
        assert_eq!(out.count_instances(), 2);
        assert_ne!(out.get(0, 0, 0), out.get(2, 0, 2));
    }

    #[test]
    fn mismatched_planes_are_rejected() {
        let a = plane(&[&[1, 1]]);
        let b = plane(&[&[1, 1, 0]]);
        assert!(matches!(
            stitch_planes(&[a, b], 0.5),
            Err(SegmentError::PlaneShapeMismatch { plane: 1, .. })
        ));
    }
}

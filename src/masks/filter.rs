//! Label-level filters: size threshold, hole filling, border exclusion.
use super::relabel::{label_areas, relabel_sequential};
use crate::image::{Dims, LabelMask};
use std::collections::VecDeque;

/// Zero every instance with fewer than `min_size` pixels. `min_size <= 0`
/// disables the filter. Labels are not renumbered.
pub fn remove_small_masks(labels: &LabelMask, min_size: i64) -> LabelMask {
    if min_size <= 0 {
        return labels.clone();
    }
    let areas = label_areas(labels);
    labels.map(|l| {
        if l != 0 && (areas[l as usize] as i64) < min_size {
            0
        } else {
            l
        }
    })
}

/// Fill enclosed holes of every instance, plane by plane.
///
/// A hole is any pixel inside the instance's bounding box that cannot reach
/// the box border without crossing the instance (4-connectivity). Pixels of
/// other instances enclosed by a mask are absorbed by it.
pub fn fill_holes(labels: &LabelMask) -> LabelMask {
    let dims = labels.dims();
    let mut out = labels.clone();
    let max = labels.max_label() as usize;
    for z in 0..dims.depth {
        let plane = labels.plane(z);
        let boxes = bounding_boxes(plane, dims.width, max);
        for (label, bbox) in boxes.iter().enumerate() {
            let Some([y0, y1, x0, x1]) = *bbox else {
                continue;
            };
            let holes = enclosed(plane, dims, label as u32, [y0, y1, x0, x1]);
            let dst = out.plane_mut(z);
            for i in holes {
                dst[i] = label as u32;
            }
        }
    }
    out
}

/// Remove instances touching the image border and renumber the rest.
pub fn remove_edge_masks(labels: &LabelMask) -> LabelMask {
    let dims = labels.dims();
    let [d, h, w] = dims.extent();
    let mut touching = vec![false; labels.max_label() as usize + 1];
    for (i, &l) in labels.data().iter().enumerate() {
        if l == 0 {
            continue;
        }
        let [z, y, x] = dims.coords(i);
        let on_z = d > 1 && (z == 0 || z == d - 1);
        if on_z || y == 0 || y == h - 1 || x == 0 || x == w - 1 {
            touching[l as usize] = true;
        }
    }
    let kept = labels.map(|l| if touching[l as usize] { 0 } else { l });
    relabel_sequential(&kept)
}

/// `[y0, y1, x0, x1]` (inclusive) per label in one plane.
fn bounding_boxes(plane: &[u32], width: usize, max: usize) -> Vec<Option<[usize; 4]>> {
    let mut boxes: Vec<Option<[usize; 4]>> = vec![None; max + 1];
    for (i, &l) in plane.iter().enumerate() {
        if l == 0 {
            continue;
        }
        let (y, x) = (i / width, i % width);
        let b = boxes[l as usize].get_or_insert([y, y, x, x]);
        b[0] = b[0].min(y);
        b[1] = b[1].max(y);
        b[2] = b[2].min(x);
        b[3] = b[3].max(x);
    }
    boxes
}

/// Plane indices inside `bbox` not reachable from its border through pixels
/// that are not `label`.
fn enclosed(plane: &[u32], dims: Dims, label: u32, bbox: [usize; 4]) -> Vec<usize> {
    let [y0, y1, x0, x1] = bbox;
    let (bh, bw) = (y1 - y0 + 1, x1 - x0 + 1);
    if bh < 3 || bw < 3 {
        return Vec::new();
    }
    let at = |by: usize, bx: usize| (y0 + by) * dims.width + x0 + bx;
    let mut reached = vec![false; bh * bw];
    let mut queue = VecDeque::new();
    for by in 0..bh {
        for bx in 0..bw {
            let border = by == 0 || by == bh - 1 || bx == 0 || bx == bw - 1;
            if border && plane[at(by, bx)] != label {
                reached[by * bw + bx] = true;
                queue.push_back((by, bx));
            }
        }
    }
    while let Some((by, bx)) = queue.pop_front() {
        let mut visit = |ny: usize, nx: usize| {
            let k = ny * bw + nx;
            if !reached[k] && plane[at(ny, nx)] != label {
                reached[k] = true;
                queue.push_back((ny, nx));
            }
        };
        if by > 0 {
            visit(by - 1, bx);
        }
        if by + 1 < bh {
            visit(by + 1, bx);
        }
        if bx > 0 {
            visit(by, bx - 1);
        }
        if bx + 1 < bw {
            visit(by, bx + 1);
        }
    }
    let mut holes = Vec::new();
    for by in 0..bh {
        for bx in 0..bw {
            let i = at(by, bx);
            if !reached[by * bw + bx] && plane[i] != label {
                holes.push(i);
            }
        }
    }
    holes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Grid;

    fn ring(size: usize) -> LabelMask {
        let mut g = LabelMask::new(Dims::plane(size, size));
        for y in 1..size - 1 {
            for x in 1..size - 1 {
                let edge = y == 1 || y == size - 2 || x == 1 || x == size - 2;
                if edge {
                    g.set(0, y, x, 1);
                }
            }
        }
        g
    }

    #[test]
    fn small_masks_removed_and_sentinel_disables() {
        let labels = Grid::from_vec(Dims::plane(1, 6), vec![1, 1, 1, 2, 0, 3]).unwrap();
        let out = remove_small_masks(&labels, 2);
        assert_eq!(out.data(), &[1, 1, 1, 0, 0, 0]);
        assert_eq!(remove_small_masks(&labels, 0), labels);
        assert_eq!(remove_small_masks(&labels, -1), labels);
    }

    #[test]
    fn ring_hole_is_filled() {
        let labels = ring(7);
        let filled = fill_holes(&labels);
        assert_eq!(filled.get(0, 3, 3), 1);
        assert_eq!(filled.get(0, 0, 0), 0);
        let area = filled.data().iter().filter(|&&l| l == 1).count();
        assert_eq!(area, 25);
    }

    #[test]
    fn edge_masks_are_removed() {
        let mut labels = LabelMask::new(Dims::plane(6, 6));
        labels.set(0, 0, 2, 4);
        labels.set(0, 3, 3, 9);
        let out = remove_edge_masks(&labels);
        assert_eq!(out.get(0, 0, 2), 0);
        assert_eq!(out.get(0, 3, 3), 1);
    }
}

//! Typical object size of a label mask.
//!
//! Two estimators are provided: the area-based diameter of the median
//! instance, used with histogram clustering, and a distance-transform based
//! diameter, used when the scalar field is itself a distance map.
use super::relabel::label_areas;
use crate::image::{Dims, Grid, LabelMask};
use std::f32::consts::PI;

/// Diameter of a disk with the median instance area, `2·sqrt(area / π)`.
/// Returns `0.0` for a mask without instances.
pub fn median_area_diameter(labels: &LabelMask) -> f32 {
    let mut areas: Vec<usize> = label_areas(labels)
        .into_iter()
        .skip(1)
        .filter(|&a| a > 0)
        .collect();
    if areas.is_empty() {
        return 0.0;
    }
    areas.sort_unstable();
    let n = areas.len();
    let median = if n % 2 == 1 {
        areas[n / 2] as f32
    } else {
        0.5 * (areas[n / 2 - 1] + areas[n / 2]) as f32
    };
    2.0 * (median / PI).sqrt()
}

/// `2·(ndim + 1)·mean(edt)` over all foreground pixels, where `edt` is the
/// distance of every pixel to the nearest pixel not sharing its label.
pub fn distance_diameter(labels: &LabelMask) -> f32 {
    let dt = label_distance_transform(labels);
    let (sum, count) = labels
        .data()
        .iter()
        .zip(dt.data())
        .filter(|(&l, _)| l != 0)
        .fold((0.0f64, 0usize), |(s, c), (_, &d)| (s + d as f64, c + 1));
    if count == 0 {
        return 0.0;
    }
    let ndim = if labels.dims().depth > 1 { 3.0 } else { 2.0 };
    2.0 * (ndim + 1.0) * (sum / count as f64) as f32
}

/// Euclidean distance of every labelled pixel to the closest pixel carrying a
/// different label (background included). Space outside the grid counts as
/// background. Background pixels get 0.
pub fn label_distance_transform(labels: &LabelMask) -> Grid<f32> {
    let dims = labels.dims();
    let mut out = Grid::<f32>::new(dims);
    let max = labels.max_label() as usize;
    let mut boxes: Vec<Option<[usize; 6]>> = vec![None; max + 1];
    for (i, &l) in labels.data().iter().enumerate() {
        if l == 0 {
            continue;
        }
        let [z, y, x] = dims.coords(i);
        let b = boxes[l as usize].get_or_insert([z, z, y, y, x, x]);
        b[0] = b[0].min(z);
        b[1] = b[1].max(z);
        b[2] = b[2].min(y);
        b[3] = b[3].max(y);
        b[4] = b[4].min(x);
        b[5] = b[5].max(x);
    }
    for (label, bbox) in boxes.iter().enumerate() {
        if let Some(b) = bbox {
            fill_label_distance(labels, label as u32, *b, &mut out);
        }
    }
    out
}

/// Exact squared EDT of one instance inside its bounding box padded by one
/// pixel on every side (the padding is outside the instance by construction).
fn fill_label_distance(labels: &LabelMask, label: u32, b: [usize; 6], out: &mut Grid<f32>) {
    let dims = labels.dims();
    let planar = dims.depth == 1;
    let pad_z = if planar { 0 } else { 1 };
    let local = Dims::volume(
        b[1] - b[0] + 1 + 2 * pad_z,
        b[3] - b[2] + 3,
        b[5] - b[4] + 3,
    );
    let inside = |lz: usize, ly: usize, lx: usize| -> Option<usize> {
        let z = (b[0] + lz).checked_sub(pad_z)?;
        let y = (b[2] + ly).checked_sub(1)?;
        let x = (b[4] + lx).checked_sub(1)?;
        if z >= dims.depth || y >= dims.height || x >= dims.width {
            return None;
        }
        (labels.get(z, y, x) == label).then(|| dims.index(z, y, x))
    };
    let mut f = vec![0.0f32; local.len()];
    for (i, v) in f.iter_mut().enumerate() {
        let [lz, ly, lx] = local.coords(i);
        if inside(lz, ly, lx).is_some() {
            *v = f32::INFINITY;
        }
    }
    squared_edt(&mut f, local);
    for (i, &d2) in f.iter().enumerate() {
        let [lz, ly, lx] = local.coords(i);
        if let Some(g) = inside(lz, ly, lx) {
            out.data_mut()[g] = d2.sqrt();
        }
    }
}

/// In-place separable squared distance transform (Felzenszwalb and
/// Huttenlocher). Zeros are sites, `INFINITY` marks pixels to fill.
fn squared_edt(f: &mut [f32], dims: Dims) {
    let [d, h, w] = dims.extent();
    let strides = [h * w, w, 1];
    let mut line = Vec::new();
    let mut res = Vec::new();
    for (axis, &len) in [d, h, w].iter().enumerate() {
        if len <= 1 {
            continue;
        }
        let stride = strides[axis];
        for start in 0..dims.len() {
            if dims.coords(start)[axis] != 0 {
                continue;
            }
            line.clear();
            line.extend((0..len).map(|k| f[start + k * stride]));
            res.resize(len, 0.0);
            edt_1d(&line, &mut res);
            for (k, &v) in res.iter().enumerate() {
                f[start + k * stride] = v;
            }
        }
    }
}

fn edt_1d(f: &[f32], out: &mut [f32]) {
    let n = f.len();
    let mut v = vec![0usize; n];
    let mut z = vec![0.0f32; n + 1];
    let mut k = 0usize;
    // skip leading infinite entries: they cannot be parabola vertices
    let Some(first) = f.iter().position(|x| x.is_finite()) else {
        out.iter_mut().for_each(|o| *o = f32::INFINITY);
        return;
    };
    v[0] = first;
    z[0] = f32::NEG_INFINITY;
    z[1] = f32::INFINITY;
    for q in first + 1..n {
        if !f[q].is_finite() {
            continue;
        }
        let parabola = |p: usize| {
            ((f[q] + (q * q) as f32) - (f[p] + (p * p) as f32)) / (2.0 * (q - p) as f32)
        };
        let mut s = parabola(v[k]);
        while s <= z[k] {
            k -= 1;
            s = parabola(v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f32::INFINITY;
    }
    let mut j = 0;
    for (q, o) in out.iter_mut().enumerate() {
        while z[j + 1] < q as f32 {
            j += 1;
        }
        let p = v[j];
        let dq = q as f32 - p as f32;
        *o = dq * dq + f[p];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(lo: usize, hi: usize, label: u32, g: &mut LabelMask) {
        for y in lo..hi {
            for x in lo..hi {
                g.set(0, y, x, label);
            }
        }
    }

    #[test]
    fn area_diameter_of_median_instance() {
        let mut g = LabelMask::new(Dims::plane(20, 20));
        square(0, 2, 1, &mut g);
        square(5, 15, 2, &mut g);
        g.set(0, 19, 19, 3);
        // areas 4, 100, 1 -> median 4
        let d = median_area_diameter(&g);
        assert!((d - 2.0 * (4.0f32 / PI).sqrt()).abs() < 1e-5);
        assert_eq!(median_area_diameter(&LabelMask::new(Dims::plane(3, 3))), 0.0);
    }

    #[test]
    fn edt_matches_brute_force_on_square() {
        let mut g = LabelMask::new(Dims::plane(12, 12));
        square(2, 9, 1, &mut g);
        let dt = label_distance_transform(&g);
        // centre of a 7x7 square is 4 pixels from the nearest outside pixel
        assert!((dt.get(0, 5, 5) - 4.0).abs() < 1e-6);
        assert!((dt.get(0, 2, 2) - 1.0).abs() < 1e-6);
        assert_eq!(dt.get(0, 0, 0), 0.0);
    }

    #[test]
    fn touching_labels_are_separated() {
        let mut g = LabelMask::new(Dims::plane(5, 8));
        for y in 0..5 {
            for x in 0..8 {
                g.set(0, y, x, if x < 4 { 1 } else { 2 });
            }
        }
        let dt = label_distance_transform(&g);
        assert!((dt.get(0, 2, 3) - 1.0).abs() < 1e-6);
        assert!((dt.get(0, 2, 4) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn distance_diameter_is_positive_for_disks() {
        let mut g = LabelMask::new(Dims::plane(32, 32));
        for y in 0..32 {
            for x in 0..32 {
                if (y as f32 - 16.0).powi(2) + (x as f32 - 16.0).powi(2) <= 64.0 {
                    g.set(0, y, x, 1);
                }
            }
        }
        let d = distance_diameter(&g);
        // a disk of radius 8 has mean boundary distance near r/3
        assert!(d > 12.0 && d < 24.0, "{d}");
    }
}

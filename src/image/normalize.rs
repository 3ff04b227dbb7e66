//! Intensity normalisation applied before inference.
use super::{Grid, Image};

const LOWER_PERCENTILE: f32 = 1.0;
const UPPER_PERCENTILE: f32 = 99.0;

/// Linear-interpolated percentile (`p` in `[0, 100]`) of finite values.
pub fn percentile(values: &[f32], p: f32) -> Option<f32> {
    let mut v: Vec<f32> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(|a, b| a.total_cmp(b));
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (v.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let t = rank - lo as f32;
    Some(v[lo] + (v[hi] - v[lo]) * t)
}

/// Map the 1st percentile to 0 and the 99th to 1. Flat inputs map to zero.
pub fn normalize99(grid: &Grid<f32>) -> Grid<f32> {
    let data = grid.data();
    let (Some(lo), Some(hi)) = (
        percentile(data, LOWER_PERCENTILE),
        percentile(data, UPPER_PERCENTILE),
    ) else {
        return Grid::new(grid.dims());
    };
    let range = hi - lo;
    if range <= f32::EPSILON {
        return Grid::new(grid.dims());
    }
    grid.map(|v| (v - lo) / range)
}

/// Per-channel percentile normalisation, optionally inverting intensities.
pub fn normalize_image(image: &Image, invert: bool) -> Image {
    image.map_channels(|c| {
        let n = normalize99(c);
        if invert {
            n.map(|v| 1.0 - v)
        } else {
            n
        }
    })
}

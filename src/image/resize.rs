//! Resampling helpers used for diameter rescaling and output restoration.
//!
//! All mappings are centre-aligned: output sample `i` of `n_out` reads the
//! input at `(i + 0.5) * n_in / n_out - 0.5`. Borders clamp. Nearest-neighbour
//! resampling of an integer factor up and back down is exact.
use super::{Dims, Grid};

/// Output length for `len` scaled by `scale`, never below one pixel.
pub fn scaled_len(len: usize, scale: f32) -> usize {
    ((len as f32 * scale).round() as usize).max(1)
}

/// Plane extent after scaling `height × width` by `scale`.
pub fn scaled_plane(dims: Dims, scale: f32) -> Dims {
    Dims::volume(
        dims.depth,
        scaled_len(dims.height, scale),
        scaled_len(dims.width, scale),
    )
}

#[inline]
fn source_coord(i: usize, n_in: usize, n_out: usize) -> f32 {
    let s = (i as f32 + 0.5) * n_in as f32 / n_out as f32 - 0.5;
    s.clamp(0.0, (n_in - 1) as f32)
}

#[inline]
fn nearest_index(i: usize, n_in: usize, n_out: usize) -> usize {
    let s = ((i as f32 + 0.5) * n_in as f32 / n_out as f32).floor() as usize;
    s.min(n_in - 1)
}

/// Bilinear resize of every plane to `height × width`.
pub fn resize_bilinear(src: &Grid<f32>, height: usize, width: usize) -> Grid<f32> {
    let sd = src.dims();
    let dims = Dims::volume(sd.depth, height, width);
    if sd == dims {
        return src.clone();
    }
    let mut out = Grid::new(dims);
    let xs: Vec<(usize, usize, f32)> = (0..width)
        .map(|x| {
            let fx = source_coord(x, sd.width, width);
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(sd.width - 1);
            (x0, x1, fx - x0 as f32)
        })
        .collect();
    for z in 0..sd.depth {
        let plane = src.plane(z);
        let dst = out.plane_mut(z);
        for y in 0..height {
            let fy = source_coord(y, sd.height, height);
            let y0 = fy.floor() as usize;
            let y1 = (y0 + 1).min(sd.height - 1);
            let ty = fy - y0 as f32;
            let r0 = &plane[y0 * sd.width..(y0 + 1) * sd.width];
            let r1 = &plane[y1 * sd.width..(y1 + 1) * sd.width];
            for (x, &(x0, x1, tx)) in xs.iter().enumerate() {
                let top = r0[x0] + (r0[x1] - r0[x0]) * tx;
                let bottom = r1[x0] + (r1[x1] - r1[x0]) * tx;
                dst[y * width + x] = top + (bottom - top) * ty;
            }
        }
    }
    out
}

/// Nearest-neighbour resize of every plane; used for label masks.
pub fn resize_nearest<T: Copy + Default>(src: &Grid<T>, height: usize, width: usize) -> Grid<T> {
    let sd = src.dims();
    let dims = Dims::volume(sd.depth, height, width);
    if sd == dims {
        return src.clone();
    }
    let mut out = Grid::new(dims);
    let xs: Vec<usize> = (0..width)
        .map(|x| nearest_index(x, sd.width, width))
        .collect();
    for z in 0..sd.depth {
        let plane = src.plane(z);
        let dst = out.plane_mut(z);
        for y in 0..height {
            let sy = nearest_index(y, sd.height, height);
            for (x, &sx) in xs.iter().enumerate() {
                dst[y * width + x] = plane[sy * sd.width + sx];
            }
        }
    }
    out
}

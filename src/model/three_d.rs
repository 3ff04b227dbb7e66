//! True 3D prediction by fusing three orthogonal sets of 2D passes.
//!
//! The volume is sliced along Z (YX planes), Y (ZX planes) and X (ZY
//! planes). Every slice goes through the 2D network; each view contributes
//! the two in-plane flow components it sees, so every 3D axis receives the
//! sum of two predictions:
//!
//! - `dz = zx[0] + zy[0]`
//! - `dy = yx[0] + zy[1]`
//! - `dx = yx[1] + zx[1]`
//!
//! Views containing Z are stretched by `anisotropy` along Z before inference
//! and resampled back afterwards, so fused fields are at native resolution.
use crate::error::Result;
use crate::field::{FlowField, NetworkOutput};
use crate::image::resize::{resize_bilinear, scaled_len};
use crate::image::{Dims, Grid, Image};
use crate::model::network::FlowNetwork;
use crate::tiling::{run_tiled, TileOptions};
use log::debug;

/// Smoothing applied to fused fields in density mode.
const DENSITY_SMOOTH_SIGMA: f32 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum View {
    Yx,
    Zx,
    Zy,
}

impl View {
    const ALL: [View; 3] = [View::Yx, View::Zx, View::Zy];

    fn count(self, dims: Dims) -> usize {
        match self {
            View::Yx => dims.depth,
            View::Zx => dims.height,
            View::Zy => dims.width,
        }
    }

    /// `(rows, cols)` of one slice.
    fn plane_shape(self, dims: Dims) -> (usize, usize) {
        match self {
            View::Yx => (dims.height, dims.width),
            View::Zx => (dims.depth, dims.width),
            View::Zy => (dims.depth, dims.height),
        }
    }

    /// Volume index of slice `k`, row `r`, column `c`.
    #[inline]
    fn index(self, dims: Dims, k: usize, r: usize, c: usize) -> usize {
        match self {
            View::Yx => dims.index(k, r, c),
            View::Zx => dims.index(r, k, c),
            View::Zy => dims.index(r, c, k),
        }
    }

    /// Volume axes (`0 = z, 1 = y, 2 = x`) of the slice rows and columns.
    fn axes(self) -> [usize; 2] {
        match self {
            View::Yx => [1, 2],
            View::Zx => [0, 2],
            View::Zy => [0, 1],
        }
    }
}

fn slice(vol: &Grid<f32>, view: View, k: usize) -> Result<Grid<f32>> {
    let dims = vol.dims();
    let (rows, cols) = view.plane_shape(dims);
    let mut data = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            data.push(vol.data()[view.index(dims, k, r, c)]);
        }
    }
    Grid::from_vec(Dims::plane(rows, cols), data)
}

fn accumulate(dst: &mut Grid<f32>, view: View, k: usize, plane: &Grid<f32>) {
    let dims = dst.dims();
    let (rows, cols) = view.plane_shape(dims);
    for r in 0..rows {
        for c in 0..cols {
            let i = view.index(dims, k, r, c);
            dst.data_mut()[i] += plane.data()[r * cols + c];
        }
    }
}

/// Run the three orthogonal passes over a volume and fuse them.
///
/// `rescale` scales every slice before inference; `anisotropy` additionally
/// stretches the Z axis of the ZX and ZY views. In density mode the fused
/// scalar and boundary fields are averaged over views, flows are averaged
/// over their two contributions, and all fields are lightly smoothed.
pub fn run_orthogonal<N: FlowNetwork + ?Sized>(
    network: &N,
    image: &Image,
    rescale: f32,
    anisotropy: Option<f32>,
    tiling: &TileOptions,
    density: bool,
) -> Result<NetworkOutput> {
    let dims = image.dims();
    let aniso = anisotropy.unwrap_or(1.0);
    let mut flows = [Grid::new(dims), Grid::new(dims), Grid::new(dims)];
    let mut scalar = Grid::<f32>::new(dims);
    let mut boundary: Option<Grid<f32>> = None;
    let mut style: Vec<f32> = Vec::new();
    let mut style_planes = 0usize;

    for view in View::ALL {
        let (rows, cols) = view.plane_shape(dims);
        let row_scale = if view == View::Yx {
            rescale
        } else {
            rescale * aniso
        };
        let (sr, sc) = (scaled_len(rows, row_scale), scaled_len(cols, rescale));
        debug!(
            "run_orthogonal: {:?} view, {} slices of {}x{} at {}x{}",
            view,
            view.count(dims),
            rows,
            cols,
            sr,
            sc
        );
        for k in 0..view.count(dims) {
            let channels = image
                .channels()
                .iter()
                .map(|c| -> Result<Grid<f32>> { Ok(resize_bilinear(&slice(c, view, k)?, sr, sc)) })
                .collect::<Result<Vec<_>>>()?;
            let out = run_tiled(network, &Image::new(channels)?, tiling)?.resized(rows, cols);
            let [ra, ca] = view.axes();
            accumulate(&mut flows[ra], view, k, out.flows.component(0));
            accumulate(&mut flows[ca], view, k, out.flows.component(1));
            accumulate(&mut scalar, view, k, &out.scalar);
            if let Some(bd) = &out.boundary {
                let acc = boundary.get_or_insert_with(|| Grid::new(dims));
                accumulate(acc, view, k, bd);
            }
            if view == View::Yx {
                if style.len() < out.style.len() {
                    style.resize(out.style.len(), 0.0);
                }
                for (s, &v) in style.iter_mut().zip(&out.style) {
                    *s += v;
                }
                style_planes += 1;
            }
        }
    }
    if style_planes > 0 {
        let norm = style.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            style.iter_mut().for_each(|v| *v /= norm);
        }
    }

    let [fz, fy, fx] = flows;
    let (flows, scalar, boundary) = if density {
        let smooth = |g: &Grid<f32>, scale: f32| gaussian_smooth(g, DENSITY_SMOOTH_SIGMA).map(|v| v * scale);
        (
            vec![smooth(&fz, 0.5), smooth(&fy, 0.5), smooth(&fx, 0.5)],
            smooth(&scalar, 1.0 / 3.0),
            boundary.map(|b| smooth(&b, 1.0 / 3.0)),
        )
    } else {
        (vec![fz, fy, fx], scalar, boundary)
    };
    Ok(NetworkOutput {
        flows: FlowField::new(flows)?,
        scalar,
        boundary,
        style,
    })
}

/// Separable Gaussian blur with mirrored borders, truncated at four sigma.
fn gaussian_smooth(src: &Grid<f32>, sigma: f32) -> Grid<f32> {
    let radius = (4.0 * sigma + 0.5) as isize;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-(i * i) as f32 / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);

    let dims = src.dims();
    let [d, h, w] = dims.extent();
    let strides = [h * w, w, 1];
    let mut cur = src.clone();
    for (axis, &len) in [d, h, w].iter().enumerate() {
        if len <= 1 {
            continue;
        }
        let stride = strides[axis];
        let mut next = Grid::new(dims);
        for idx in 0..dims.len() {
            let c = dims.coords(idx)[axis] as isize;
            let base = idx - c as usize * stride;
            let mut acc = 0.0;
            for (t, &kv) in kernel.iter().enumerate() {
                let j = reflect(c + t as isize - radius, len as isize);
                acc += kv * cur.data()[base + j * stride];
            }
            next.data_mut()[idx] = acc;
        }
        cur = next;
    }
    cur
}

/// Half-sample symmetric reflection (`d c b a | a b c d | d c b a`).
fn reflect(mut i: isize, len: isize) -> usize {
    let period = 2 * len;
    i = i.rem_euclid(period);
    if i >= len {
        i = period - 1 - i;
    }
    i as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flows equal to the in-plane coordinates of each slice pixel.
    struct Coordinates;

    impl FlowNetwork for Coordinates {
        fn predict(&self, image: &Image) -> Result<NetworkOutput> {
            let dims = image.dims();
            let mut rows = Grid::new(dims);
            let mut cols = Grid::new(dims);
            for i in 0..dims.len() {
                let [_, r, c] = dims.coords(i);
                rows.data_mut()[i] = r as f32;
                cols.data_mut()[i] = c as f32;
            }
            Ok(NetworkOutput {
                flows: FlowField::new(vec![rows, cols])?,
                scalar: Grid::filled(dims, 1.0),
                boundary: None,
                style: vec![1.0],
            })
        }
    }

    #[test]
    fn views_sum_into_matching_axes() {
        let dims = Dims::volume(3, 4, 5);
        let image = Image::gray(Grid::new(dims)).unwrap();
        let tiling = TileOptions {
            tile: false,
            ..Default::default()
        };
        let out = run_orthogonal(&Coordinates, &image, 1.0, None, &tiling, false).unwrap();
        let i = dims.index(2, 3, 4);
        // each axis sees its own coordinate from two views
        assert_eq!(out.flows.vector_at(i), [4.0, 6.0, 8.0]);
        assert_eq!(out.scalar.data()[i], 3.0);
        assert_eq!(out.style, vec![1.0]);
    }

    #[test]
    fn reflect_mirrors_edges() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
    }

    #[test]
    fn smoothing_preserves_constants() {
        let g = Grid::filled(Dims::volume(3, 6, 6), 2.0f32);
        let s = gaussian_smooth(&g, 1.5);
        assert!(s.data().iter().all(|v| (v - 2.0).abs() < 1e-5));
    }
}

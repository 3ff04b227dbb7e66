//! Overlapping tiles over a plane and taper-weighted blending of their
//! predictions back into one full-size field.
use super::TileOptions;
use crate::error::{Result, SegmentError};
use crate::field::{FlowField, NetworkOutput};
use crate::image::{Dims, Grid, Image};
use crate::model::network::FlowNetwork;
use log::debug;

/// Sigmoid width of the tile taper, in pixels.
const TAPER_SIGMA: f32 = 7.5;
/// The taper is computed on at least this many pixels and cropped.
const TAPER_MIN_SIZE: usize = 224;
/// Distance from the tile centre at which the taper reaches one half, measured
/// inward from the half size.
const TAPER_MARGIN: f32 = 20.0;

/// One rectangular window into the plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tile {
    pub y0: usize,
    pub x0: usize,
    pub height: usize,
    pub width: usize,
}

/// Tile grid covering a `height × width` plane.
#[derive(Clone, Debug)]
pub struct TileLayout {
    pub height: usize,
    pub width: usize,
    pub tile_height: usize,
    pub tile_width: usize,
    pub ystarts: Vec<usize>,
    pub xstarts: Vec<usize>,
}

impl TileLayout {
    /// Tiles are `min(bsize, L)` long per axis. An axis longer than `bsize`
    /// gets `ceil((1 + 2·overlap)·L / bsize)` evenly spaced tiles; the overlap
    /// is clamped to `[0.05, 0.5]`.
    pub fn new(height: usize, width: usize, bsize: usize, overlap: f32) -> Result<Self> {
        if bsize == 0 {
            return Err(SegmentError::InvalidParameter {
                name: "tile_size",
                reason: "must be positive".to_string(),
            });
        }
        if height == 0 || width == 0 {
            return Err(SegmentError::InvalidDims(format!(
                "cannot tile an empty {height}x{width} plane"
            )));
        }
        let overlap = if overlap.is_finite() {
            overlap.clamp(0.05, 0.5)
        } else {
            0.1
        };
        let (tile_height, ystarts) = axis_starts(height, bsize, overlap);
        let (tile_width, xstarts) = axis_starts(width, bsize, overlap);
        Ok(Self {
            height,
            width,
            tile_height,
            tile_width,
            ystarts,
            xstarts,
        })
    }

    pub fn len(&self) -> usize {
        self.ystarts.len() * self.xstarts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row-major tile sequence.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        self.ystarts.iter().flat_map(move |&y0| {
            self.xstarts.iter().map(move |&x0| Tile {
                y0,
                x0,
                height: self.tile_height,
                width: self.tile_width,
            })
        })
    }
}

fn axis_starts(len: usize, bsize: usize, overlap: f32) -> (usize, Vec<usize>) {
    let tile = bsize.min(len);
    let n = if len <= bsize {
        1
    } else {
        ((1.0 + 2.0 * overlap) * len as f32 / bsize as f32).ceil() as usize
    };
    let span = (len - tile) as f32;
    let starts = (0..n)
        .map(|i| {
            if n == 1 {
                0
            } else {
                (span * i as f32 / (n - 1) as f32) as usize
            }
        })
        .collect();
    (tile, starts)
}

/// Row-major `height × width` blending weights: a separable sigmoid that is
/// close to one in the tile interior and falls off over the last ~20 pixels.
pub fn taper_mask(height: usize, width: usize) -> Vec<f32> {
    let bsize = TAPER_MIN_SIZE.max(height).max(width);
    let centre = (bsize as f32 - 1.0) / 2.0;
    let half = bsize as f32 / 2.0 - TAPER_MARGIN;
    let profile: Vec<f32> = (0..bsize)
        .map(|i| {
            let d = (i as f32 - centre).abs();
            1.0 / (1.0 + ((d - half) / TAPER_SIGMA).exp())
        })
        .collect();
    let oy = bsize / 2 - height / 2;
    let ox = bsize / 2 - width / 2;
    let mut out = Vec::with_capacity(height * width);
    for y in 0..height {
        for x in 0..width {
            out.push(profile[oy + y] * profile[ox + x]);
        }
    }
    out
}

/// Weighted accumulator of per-tile channel predictions.
pub struct TileBlender {
    dims: Dims,
    sums: Vec<Vec<f32>>,
    weights: Vec<f32>,
}

impl TileBlender {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        let dims = Dims::plane(height, width);
        Self {
            dims,
            sums: vec![vec![0.0; dims.len()]; channels],
            weights: vec![0.0; dims.len()],
        }
    }

    /// Add one tile. `channels[c]` is a row-major tile-sized buffer.
    pub fn add(&mut self, tile: Tile, channels: &[&[f32]], mask: &[f32]) {
        let w = self.dims.width;
        for ty in 0..tile.height {
            for tx in 0..tile.width {
                let t = ty * tile.width + tx;
                let g = (tile.y0 + ty) * w + tile.x0 + tx;
                self.weights[g] += mask[t];
                for (sum, src) in self.sums.iter_mut().zip(channels) {
                    sum[g] += src[t] * mask[t];
                }
            }
        }
    }

    /// Normalised full-size channels.
    pub fn finish(self) -> Result<Vec<Grid<f32>>> {
        let Self {
            dims,
            sums,
            weights,
        } = self;
        sums.into_iter()
            .map(|mut s| {
                for (v, &wt) in s.iter_mut().zip(&weights) {
                    if wt > 0.0 {
                        *v /= wt;
                    }
                }
                Grid::from_vec(dims, s)
            })
            .collect()
    }
}

/// Crop `tile` out of every channel of a single-plane image.
pub fn crop(image: &Image, tile: Tile) -> Result<Image> {
    let dims = image.dims();
    let channels = image
        .channels()
        .iter()
        .map(|c| {
            let src = c.plane(0);
            let mut data = Vec::with_capacity(tile.height * tile.width);
            for y in tile.y0..tile.y0 + tile.height {
                let row = y * dims.width;
                data.extend_from_slice(&src[row + tile.x0..row + tile.x0 + tile.width]);
            }
            Grid::from_vec(Dims::plane(tile.height, tile.width), data)
        })
        .collect::<Result<Vec<_>>>()?;
    Image::new(channels)
}

/// Run the network over one plane, tile by tile when enabled, and blend the
/// outputs. Styles of all tiles are summed and L2-normalised.
pub fn run_tiled<N: FlowNetwork + ?Sized>(
    network: &N,
    image: &Image,
    opts: &TileOptions,
) -> Result<NetworkOutput> {
    let dims = image.dims();
    if dims.depth != 1 {
        return Err(SegmentError::InvalidDims(format!(
            "tiled inference expects a single plane, got depth {}",
            dims.depth
        )));
    }
    if !opts.tile {
        let out = network.predict(image)?;
        check_output(&out, dims, "network output")?;
        return Ok(out);
    }

    let layout = TileLayout::new(dims.height, dims.width, opts.tile_size, opts.tile_overlap)?;
    debug!(
        "run_tiled: {}x{} plane -> {} tiles of {}x{}",
        dims.height,
        dims.width,
        layout.len(),
        layout.tile_height,
        layout.tile_width
    );
    let mask = taper_mask(layout.tile_height, layout.tile_width);
    let mut blender: Option<TileBlender> = None;
    let mut has_boundary = false;
    let mut style: Vec<f32> = Vec::new();

    for tile in layout.tiles() {
        let out = network.predict(&crop(image, tile)?)?;
        check_output(&out, Dims::plane(tile.height, tile.width), "tile output")?;
        let mut channels: Vec<&[f32]> = out.flows.components().iter().map(|c| c.data()).collect();
        channels.push(out.scalar.data());
        if let Some(bd) = &out.boundary {
            channels.push(bd.data());
        }
        let b = blender.get_or_insert_with(|| {
            has_boundary = out.boundary.is_some();
            TileBlender::new(dims.height, dims.width, channels.len())
        });
        if channels.len() != b.sums.len() {
            return Err(SegmentError::Network(
                "tiles disagree on the presence of a boundary field".to_string(),
            ));
        }
        b.add(tile, &channels, &mask);

        if style.len() < out.style.len() {
            style.resize(out.style.len(), 0.0);
        }
        for (s, &v) in style.iter_mut().zip(&out.style) {
            *s += v;
        }
    }

    let blender = blender.ok_or_else(|| SegmentError::InvalidDims("no tiles".to_string()))?;
    let mut channels = blender.finish()?.into_iter();
    let mut take = || {
        channels
            .next()
            .ok_or_else(|| SegmentError::Network("missing blended channel".to_string()))
    };
    let flows = FlowField::new(vec![take()?, take()?])?;
    let scalar = take()?;
    let boundary = if has_boundary { Some(take()?) } else { None };

    let norm = style.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        style.iter_mut().for_each(|v| *v /= norm);
    }
    Ok(NetworkOutput {
        flows,
        scalar,
        boundary,
        style,
    })
}

fn check_output(out: &NetworkOutput, expected: Dims, what: &'static str) -> Result<()> {
    out.validate()?;
    if out.dims() != expected {
        return Err(SegmentError::ShapeMismatch {
            what,
            expected,
            found: out.dims(),
        });
    }
    if out.flows.ndim() != 2 {
        return Err(SegmentError::Network(format!(
            "expected 2 flow components per plane, got {}",
            out.flows.ndim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Echoes the first image channel into every output field.
    struct Echo;

    impl FlowNetwork for Echo {
        fn predict(&self, image: &Image) -> Result<NetworkOutput> {
            let c = image.channel(0).clone();
            Ok(NetworkOutput {
                flows: FlowField::new(vec![c.clone(), c.map(|v| -v)])?,
                scalar: c.clone(),
                boundary: Some(c),
                style: vec![1.0, 1.0],
            })
        }
    }

    #[test]
    fn small_axis_gets_single_tile() {
        let layout = TileLayout::new(100, 500, 224, 0.1).unwrap();
        assert_eq!(layout.ystarts, vec![0]);
        assert_eq!(layout.tile_height, 100);
        // ceil(1.2 * 500 / 224) = 3 tiles, last one flush with the border
        assert_eq!(layout.xstarts, vec![0, 138, 276]);
        assert_eq!(layout.len(), 3);
    }

    #[test]
    fn overlap_is_clamped() {
        let wide = TileLayout::new(10, 1000, 100, 5.0).unwrap();
        // overlap 0.5: ceil(2.0 * 10) = 20
        assert_eq!(wide.xstarts.len(), 20);
    }

    #[test]
    fn taper_is_high_inside_low_at_edges() {
        let m = taper_mask(224, 224);
        let centre = m[112 * 224 + 112];
        let corner = m[0];
        assert!(centre > 0.99);
        assert!(corner < 0.1);
    }

    #[test]
    fn blending_reproduces_smooth_input() {
        let dims = Dims::plane(60, 90);
        let mut ramp = Grid::<f32>::new(dims);
        for (i, v) in ramp.data_mut().iter_mut().enumerate() {
            *v = (i % 90) as f32 * 0.1 + (i / 90) as f32;
        }
        let image = Image::gray(ramp.clone()).unwrap();
        let opts = TileOptions {
            tile: true,
            tile_size: 32,
            tile_overlap: 0.1,
        };
        let out = run_tiled(&Echo, &image, &opts).unwrap();
        for (a, b) in out.scalar.data().iter().zip(ramp.data()) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
        assert!(out.boundary.is_some());
        let norm: f32 = out.style.iter().map(|v| v * v).sum();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}

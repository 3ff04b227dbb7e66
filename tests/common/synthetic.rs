#![allow(dead_code)]

use cellflow::field::{FlowField, NetworkOutput};
use cellflow::image::{Dims, Grid, Image};
use cellflow::model::FlowNetwork;

/// Flow magnitude of the synthetic predictions (`flow_factor` pixels/step).
pub const FLOW_MAGNITUDE: f32 = 5.0;

#[derive(Clone, Copy, Debug)]
pub enum ScalarKind {
    /// 1 inside a disk, 0 outside.
    Probability,
    /// Distance to the disk edge inside, 0 outside.
    Distance,
}

/// Radial flows of magnitude [`FLOW_MAGNITUDE`] pointing at the centre of
/// each disk. Centres are `(y, x)` in pixels.
pub fn disk_output(dims: Dims, centres: &[(f32, f32)], radius: f32, kind: ScalarKind) -> NetworkOutput {
    assert_eq!(dims.depth, 1, "disk_output builds single planes");
    let mut dy = Grid::new(dims);
    let mut dx = Grid::new(dims);
    let mut scalar = Grid::new(dims);
    for i in 0..dims.len() {
        let [_, y, x] = dims.coords(i);
        let (y, x) = (y as f32, x as f32);
        for &(cy, cx) in centres {
            let (vy, vx) = (cy - y, cx - x);
            let d = (vy * vy + vx * vx).sqrt();
            if d > radius {
                continue;
            }
            scalar.data_mut()[i] = match kind {
                ScalarKind::Probability => 1.0,
                ScalarKind::Distance => (radius - d).max(0.5),
            };
            if d > 0.0 {
                dy.data_mut()[i] = FLOW_MAGNITUDE * vy / d;
                dx.data_mut()[i] = FLOW_MAGNITUDE * vx / d;
            }
        }
    }
    NetworkOutput {
        flows: FlowField::new(vec![dy, dx]).expect("two flow components"),
        scalar,
        boundary: None,
        style: Vec::new(),
    }
}

/// Boundary logits: `+1` on the outermost pixel ring of each disk, `-1`
/// everywhere else.
pub fn ring_boundary(dims: Dims, centres: &[(f32, f32)], radius: f32) -> Grid<f32> {
    let data = (0..dims.len())
        .map(|i| {
            let [_, y, x] = dims.coords(i);
            let on_ring = centres.iter().any(|&(cy, cx)| {
                let d = ((cy - y as f32).powi(2) + (cx - x as f32).powi(2)).sqrt();
                d > radius - 1.0 && d <= radius
            });
            if on_ring {
                1.0
            } else {
                -1.0
            }
        })
        .collect();
    Grid::from_vec(dims, data).expect("plane buffer")
}

/// Binary disk labels (1 inside, 0 outside) stacked `depth` times.
pub fn disk_label_stack(depth: usize, size: usize, radius: f32) -> Vec<Grid<u32>> {
    let dims = Dims::plane(size, size);
    let c = (size as f32 - 1.0) / 2.0;
    let plane = Grid::from_vec(
        dims,
        (0..dims.len())
            .map(|i| {
                let [_, y, x] = dims.coords(i);
                let (vy, vx) = (y as f32 - c, x as f32 - c);
                u32::from((vy * vy + vx * vx).sqrt() <= radius)
            })
            .collect(),
    )
    .expect("plane buffer");
    vec![plane; depth]
}

pub fn blank_image(dims: Dims) -> Image {
    Image::gray(Grid::new(dims)).expect("single channel")
}

/// Network that draws disks at fixed fractional positions of whatever plane
/// it is given, so predictions follow the input scale.
pub struct DiskNetwork {
    /// `(y, x)` centres as fractions of height and width.
    pub centres: Vec<(f32, f32)>,
    /// Radius as a fraction of the plane height.
    pub radius: f32,
    pub kind: ScalarKind,
    pub style: Vec<f32>,
    /// Also emit a boundary channel marking each disk's outer ring.
    pub boundary: bool,
}

impl FlowNetwork for DiskNetwork {
    fn predict(&self, image: &Image) -> cellflow::Result<NetworkOutput> {
        let dims = image.dims();
        let (h, w) = (dims.height as f32, dims.width as f32);
        let centres: Vec<(f32, f32)> = self.centres.iter().map(|&(cy, cx)| (cy * h, cx * w)).collect();
        let radius = self.radius * h;
        let mut out = disk_output(dims, &centres, radius, self.kind);
        if self.boundary {
            out.boundary = Some(ring_boundary(dims, &centres, radius));
        }
        out.style = self.style.clone();
        Ok(out)
    }

    fn style_len(&self) -> usize {
        self.style.len()
    }
}

/// Network that reads absolute pixel coordinates from the input (channel 0
/// holds the row, channel 1 the column) and draws disks at fixed absolute
/// centres. Predictions for a tile therefore match the same window of a
/// whole-plane prediction.
pub struct CoordinateDiskNetwork {
    /// `(y, x)` centres in pixels of the full plane.
    pub centres: Vec<(f32, f32)>,
    pub radius: f32,
}

impl CoordinateDiskNetwork {
    /// Two-channel image whose pixels carry their own `(y, x)` coordinates.
    pub fn coordinate_image(dims: Dims) -> Image {
        let ys = (0..dims.len()).map(|i| dims.coords(i)[1] as f32).collect();
        let xs = (0..dims.len()).map(|i| dims.coords(i)[2] as f32).collect();
        Image::new(vec![
            Grid::from_vec(dims, ys).expect("plane buffer"),
            Grid::from_vec(dims, xs).expect("plane buffer"),
        ])
        .expect("two channels")
    }
}

impl FlowNetwork for CoordinateDiskNetwork {
    fn predict(&self, image: &Image) -> cellflow::Result<NetworkOutput> {
        let dims = image.dims();
        let rows = image.channel(0).data();
        let cols = image.channel(1).data();
        let mut dy = Grid::new(dims);
        let mut dx = Grid::new(dims);
        let mut scalar = Grid::new(dims);
        for i in 0..dims.len() {
            let (y, x) = (rows[i], cols[i]);
            for &(cy, cx) in &self.centres {
                let (vy, vx) = (cy - y, cx - x);
                let d = (vy * vy + vx * vx).sqrt();
                if d > self.radius {
                    continue;
                }
                scalar.data_mut()[i] = 1.0;
                if d > 0.0 {
                    dy.data_mut()[i] = FLOW_MAGNITUDE * vy / d;
                    dx.data_mut()[i] = FLOW_MAGNITUDE * vx / d;
                }
            }
        }
        Ok(NetworkOutput {
            flows: FlowField::new(vec![dy, dx])?,
            scalar,
            boundary: None,
            style: Vec::new(),
        })
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

use cellflow::diagnostics::SegmentationReport;
use cellflow::field::{FlowField, NetworkOutput};
use cellflow::image::{Dims, Grid, Image};
use cellflow::model::{EvalParams, ModelPreset, Precomputed, Segmenter};

/// Flows of magnitude 5 pointing at the centre of each disk, scalar 1
/// inside and 0 outside.
fn disks(dims: Dims, centres: &[(f32, f32)], radius: f32) -> cellflow::Result<NetworkOutput> {
    let mut dy = Grid::new(dims);
    let mut dx = Grid::new(dims);
    let mut scalar = Grid::new(dims);
    for i in 0..dims.len() {
        let [_, y, x] = dims.coords(i);
        let (y, x) = (y as f32, x as f32);
        for &(cy, cx) in centres {
            let (vy, vx) = (cy - y, cx - x);
            let d = (vy * vy + vx * vx).sqrt();
            if d <= radius {
                scalar.data_mut()[i] = 1.0;
                if d > 0.0 {
                    dy.data_mut()[i] = 5.0 * vy / d;
                    dx.data_mut()[i] = 5.0 * vx / d;
                }
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

fn main() -> cellflow::Result<()> {
    let _ = env_logger::builder().format_timestamp(None).try_init();

    let dims = Dims::plane(64, 64);
    let output = disks(dims, &[(32.0, 12.0), (32.0, 52.0)], 8.0)?;
    let segmenter = Segmenter::new(Precomputed::new(output)?, ModelPreset::default());
    let params = EvalParams {
        rescale: Some(1.0),
        normalize: false,
        min_size: 10,
        ..Default::default()
    };
    let result = segmenter.eval(&Image::gray(Grid::new(dims))?, &params)?;
    let report = SegmentationReport::from_result(&result);
    println!("{}", report.summary());
    println!("areas={:?}", report.areas);
    Ok(())
}

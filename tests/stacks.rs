mod common;

use cellflow::image::{Dims, Grid, Image};
use cellflow::masks::relabel_sequential;
use cellflow::model::{EvalParams, ModelPreset, Segmenter};
use cellflow::tiling::{stitch_planes, TileOptions};
use common::synthetic::{disk_label_stack, init_logging, DiskNetwork, ScalarKind};

fn centred_disk_network() -> DiskNetwork {
    DiskNetwork {
        centres: vec![(0.5, 0.5)],
        radius: 0.25,
        kind: ScalarKind::Probability,
        style: vec![1.0, 0.0],
        boundary: false,
    }
}

fn stack_params(stitch_threshold: f32) -> EvalParams {
    EvalParams {
        rescale: Some(1.0),
        normalize: false,
        min_size: 10,
        stitch_threshold,
        tiling: TileOptions {
            tile: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn identical_disk_planes_stitch_into_one_instance() {
    init_logging();
    let planes = disk_label_stack(3, 32, 8.0);
    let stitched = stitch_planes(&planes, 0.5).unwrap();
    assert_eq!(stitched.dims(), Dims::volume(3, 32, 32));
    assert_eq!(stitched.count_instances(), 1);
    for z in 0..3 {
        assert!(
            stitched.plane(z).iter().any(|&l| l == 1),
            "instance missing from plane {z}"
        );
    }
}

#[test]
fn stitched_labels_are_sequential() {
    init_logging();
    let mut planes = disk_label_stack(2, 32, 6.0);
    // second plane carries a large unrelated id
    planes[1] = planes[1].map(|l| l * 40);
    let stitched = stitch_planes(&planes, 0.25).unwrap();
    assert_eq!(relabel_sequential(&stitched), stitched);
    assert_eq!(stitched.max_label(), 1);
}

#[test]
fn stack_eval_stitches_planes() {
    init_logging();
    let dims = Dims::volume(3, 32, 32);
    let image = Image::gray(Grid::new(dims)).unwrap();
    let segmenter = Segmenter::new(centred_disk_network(), ModelPreset::default());
    let result = segmenter.eval(&image, &stack_params(0.5)).unwrap();

    assert_eq!(result.labels.dims(), dims);
    assert_eq!(result.labels.count_instances(), 1);
    let centre = result.labels.get(0, 16, 16);
    assert!(centre > 0);
    for z in 1..3 {
        assert_eq!(result.labels.get(z, 16, 16), centre, "plane {z}");
    }
    // stacks report three flow components with zero dz
    assert_eq!(result.flows.ndim(), 3);
    assert!(result.flows.component(0).data().iter().all(|&v| v == 0.0));
    assert_eq!(result.endpoints.len(), dims.len());
    let norm: f32 = result.style.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5, "style norm {norm}");
}

#[test]
fn unstitched_stack_labels_planes_independently() {
    init_logging();
    let dims = Dims::volume(2, 32, 32);
    let image = Image::gray(Grid::new(dims)).unwrap();
    let segmenter = Segmenter::new(centred_disk_network(), ModelPreset::default());
    let result = segmenter.eval(&image, &stack_params(0.0)).unwrap();
    // each plane numbers its own instances from 1
    assert_eq!(result.labels.get(0, 16, 16), 1);
    assert_eq!(result.labels.get(1, 16, 16), 1);
}

#[test]
fn true_3d_run_returns_volume_fields() {
    init_logging();
    let dims = Dims::volume(8, 24, 24);
    let image = Image::gray(Grid::new(dims)).unwrap();
    let segmenter = Segmenter::new(centred_disk_network(), ModelPreset::default());
    let params = EvalParams {
        do_3d: true,
        anisotropy: Some(2.0),
        ..stack_params(0.0)
    };
    let result = segmenter.eval(&image, &params).unwrap();
    assert_eq!(result.labels.dims(), dims);
    assert_eq!(result.flows.ndim(), 3);
    assert_eq!(result.flows.dims(), dims);
    assert_eq!(result.scalar.dims(), dims);
    assert!(result.timings.stages.iter().any(|s| s.label == "network"));
}

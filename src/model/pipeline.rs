//! Orchestrator: sequences rescaling, inference, integration, clustering,
//! validation and stitching for single planes, plane stacks and volumes.
//!
//! Per image the stages run in a fixed order:
//! `rescale → network → integrate → cluster → validate → (stitch) → rescale back`.
//! Images of a batch are processed one after another and share no state.
use super::cache::{ModelCache, ModelFetcher};
use super::network::{FlowNetwork, SizeEstimator};
use super::params::EvalParams;
use super::presets::ModelPreset;
use super::size::SizeModel;
use super::three_d::run_orthogonal;
use crate::cluster::ClusteringStrategy;
use crate::diagnostics::flow_vis::flow_to_rgb;
use crate::diagnostics::timing::{elapsed_ms, TimingBreakdown};
use crate::dynamics::{follow_flows, foreground_mask};
use crate::error::{Result, SegmentError};
use crate::field::{FlowField, NetworkOutput};
use crate::image::normalize::normalize_image;
use crate::image::resize::{resize_bilinear, resize_nearest, scaled_plane};
use crate::image::{Grid, Image, LabelMask, ScalarField};
use crate::masks::{
    distance_diameter, median_area_diameter, remove_edge_masks, validate, ValidationOptions,
};
use crate::tiling::{run_tiled, stitch_planes};
use log::{debug, info, warn};
use serde::Serialize;
use std::time::Instant;

/// Everything produced for one input image.
#[derive(Clone, Debug)]
pub struct SegmentationResult {
    /// Instance labels at the input resolution; 0 is background.
    pub labels: LabelMask,
    /// Predicted flows at the input resolution (`[dz, dy, dx]` for stacks
    /// and volumes, `dz = 0` for stacks).
    pub flows: FlowField,
    /// Colour-wheel rendering of the in-plane flows.
    pub flow_rgb: Vec<[f32; 3]>,
    pub scalar: ScalarField,
    pub boundary: Option<ScalarField>,
    /// Final `[z, y, x]` position of every pixel of the integration grid;
    /// background pixels keep their own coordinates.
    pub endpoints: Vec<[f32; 3]>,
    pub trajectories: Option<Vec<Vec<[f32; 3]>>>,
    pub style: Vec<f32>,
    /// Diameter used to choose the rescale factor.
    pub diameter: f32,
    pub rescale: f32,
    /// Euler steps taken (largest over planes for stacks).
    pub iterations: usize,
    pub timings: TimingBreakdown,
}

/// Result of the two-step size estimation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiameterEstimate {
    /// Diameter measured on masks computed at the style-implied scale.
    pub diameter: f32,
    /// Diameter regressed from the style vector alone.
    pub style_diameter: f32,
}

struct PlaneRun {
    labels: LabelMask,
    output: NetworkOutput,
    endpoints: Vec<[f32; 3]>,
    trajectories: Option<Vec<Vec<[f32; 3]>>>,
    iterations: usize,
}

pub struct Segmenter<N: FlowNetwork> {
    network: N,
    preset: ModelPreset,
    size_model: Option<Box<dyn SizeEstimator>>,
}

impl<N: FlowNetwork> Segmenter<N> {
    pub fn new(network: N, preset: ModelPreset) -> Self {
        Self {
            network,
            preset,
            size_model: None,
        }
    }

    pub fn with_size_estimator(mut self, estimator: impl SizeEstimator + 'static) -> Self {
        self.size_model = Some(Box::new(estimator));
        self
    }

    /// Load the preset's size model through `cache`. Presets without a size
    /// model are returned unchanged. A model whose coefficient count differs
    /// from a nonzero [`FlowNetwork::style_len`] is rejected.
    pub fn load_size_model<F: ModelFetcher>(self, cache: &ModelCache<F>) -> Result<Self> {
        let Some(name) = self.preset.size_model_basename() else {
            return Ok(self);
        };
        let path = cache.resolve(&name)?;
        let model = SizeModel::from_json_file(&path, self.preset.diam_mean)?;
        let expected = self.network.style_len();
        if expected > 0 && model.style_len() != expected {
            return Err(SegmentError::SizeModel(format!(
                "{} has {} coefficients but the network emits {} style values",
                path.display(),
                model.style_len(),
                expected
            )));
        }
        info!("loaded size model {}", path.display());
        Ok(self.with_size_estimator(model))
    }

    pub fn preset(&self) -> &ModelPreset {
        &self.preset
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    fn strategy(&self, params: &EvalParams) -> ClusteringStrategy {
        params
            .clustering
            .clone()
            .unwrap_or_else(|| self.preset.clustering.clone())
    }

    /// Segment every image in order. The first error aborts the batch.
    pub fn eval_batch(
        &self,
        images: &[Image],
        params: &EvalParams,
    ) -> Result<Vec<SegmentationResult>> {
        let mut out = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            debug!("eval_batch: image {}/{}", i + 1, images.len());
            out.push(self.eval(image, params)?);
        }
        if images.len() > 1 {
            let total: f64 = out.iter().map(|r| r.timings.total_ms).sum();
            info!("segmented {} images in {:.1} ms", images.len(), total);
        }
        Ok(out)
    }

    /// Segment one plane, plane stack or volume.
    ///
    /// Planes (`depth == 1`) run the 2D path. Deeper images run true 3D
    /// fusion when `do_3d` is set, otherwise every plane is segmented on its
    /// own and, with `stitch_threshold > 0`, stitched into volume instances.
    pub fn eval(&self, image: &Image, params: &EvalParams) -> Result<SegmentationResult> {
        params.check()?;
        let start = Instant::now();
        let mut timings = TimingBreakdown::default();
        let strategy = self.strategy(params);

        let t = Instant::now();
        let img = self.prepare(image, params);
        let t = timings.lap("normalize", t);
        let (diameter, rescale) = self.resolve_scale(&img, params, &strategy)?;
        let strategy = strategy.gated_by_diameter(diameter, params.diam_threshold);
        timings.lap("size", t);
        debug!("eval: diameter {diameter:.2}, rescale {rescale:.3}");

        let dims = img.dims();
        let mut result = if dims.depth == 1 {
            let run = self.run_plane(&img, rescale, params, &strategy, &mut timings)?;
            let flow_rgb = flow_to_rgb(&run.output.flows)?;
            SegmentationResult {
                labels: run.labels,
                flow_rgb,
                flows: run.output.flows,
                scalar: run.output.scalar,
                boundary: run.output.boundary,
                endpoints: run.endpoints,
                trajectories: run.trajectories,
                style: run.output.style,
                diameter,
                rescale,
                iterations: run.iterations,
                timings: TimingBreakdown::default(),
            }
        } else if params.do_3d {
            self.run_volume(&img, rescale, params, &strategy, &mut timings, diameter)?
        } else {
            self.run_stack(&img, rescale, params, &strategy, &mut timings, diameter)?
        };

        if params.exclude_on_edges {
            result.labels = remove_edge_masks(&result.labels);
        }
        timings.total_ms = elapsed_ms(start);
        result.timings = timings;
        debug!(
            "eval: {} instances in {:.1} ms",
            result.labels.count_instances(),
            result.timings.total_ms
        );
        Ok(result)
    }

    /// Two-step diameter estimate for a single plane: regress a diameter
    /// from the style vector, segment at the implied scale, and measure the
    /// resulting masks. Zero or NaN results fall back to the preset's mean
    /// diameter.
    pub fn estimate_diameter(&self, image: &Image, params: &EvalParams) -> Result<DiameterEstimate> {
        params.check()?;
        let img = self.prepare(image, params);
        self.estimate_prepared(&img, params, &self.strategy(params))
    }

    fn prepare(&self, image: &Image, params: &EvalParams) -> Image {
        if params.normalize || params.invert {
            normalize_image(image, params.invert)
        } else {
            image.clone()
        }
    }

    /// `(diameter, rescale)` for a prepared image.
    fn resolve_scale(
        &self,
        img: &Image,
        params: &EvalParams,
        strategy: &ClusteringStrategy,
    ) -> Result<(f32, f32)> {
        let diam_mean = self.preset.diam_mean;
        if let Some(r) = params.rescale {
            return Ok((diam_mean / r, r));
        }
        if params.wants_size_estimate() {
            let diameter = self.estimate_prepared(img, params, strategy)?.diameter;
            return Ok((diameter, diam_mean / diameter));
        }
        let diameter = match params.diameter {
            Some(d) if d.is_finite() && d > 0.0 => d,
            other => {
                warn!("invalid diameter {other:?}, using mean diameter {diam_mean}");
                diam_mean
            }
        };
        Ok((diameter, diam_mean / diameter))
    }

    fn estimate_prepared(
        &self,
        img: &Image,
        params: &EvalParams,
        strategy: &ClusteringStrategy,
    ) -> Result<DiameterEstimate> {
        let diam_mean = self.preset.diam_mean;
        let fallback = DiameterEstimate {
            diameter: diam_mean,
            style_diameter: diam_mean,
        };
        let Some(size_model) = &self.size_model else {
            warn!("could not estimate diameter, no size model for {}", self.preset.name);
            return Ok(fallback);
        };
        if img.dims().depth != 1 {
            warn!("could not estimate diameter, image is not 2D");
            return Ok(fallback);
        }

        let styled = run_tiled(&self.network, img, &params.tiling)?;
        let mut style_diameter = size_model.estimate(&styled.style);
        if !(style_diameter.is_finite() && style_diameter > 0.0) {
            warn!("style diameter {style_diameter} is invalid, using {diam_mean}");
            style_diameter = diam_mean;
        }

        let mut sizing = params.clone();
        sizing.resample = false;
        sizing.integration.interp = false;
        sizing.integration.record_trace = false;
        let run = self.run_plane(
            img,
            diam_mean / style_diameter,
            &sizing,
            strategy,
            &mut TimingBreakdown::default(),
        )?;
        let measured = if strategy.is_density() {
            distance_diameter(&run.labels)
        } else {
            median_area_diameter(&run.labels)
        };
        let diameter = if measured.is_finite() && measured > 0.0 {
            measured
        } else {
            warn!("no masks found while estimating diameter, using {diam_mean}");
            diam_mean
        };
        info!("estimated diameter {diameter:.2} (style {style_diameter:.2})");
        Ok(DiameterEstimate {
            diameter,
            style_diameter,
        })
    }

    fn run_plane(
        &self,
        img: &Image,
        rescale: f32,
        params: &EvalParams,
        strategy: &ClusteringStrategy,
        timings: &mut TimingBreakdown,
    ) -> Result<PlaneRun> {
        let native = img.dims();
        let ff = params.integration.flow_factor;

        let t = Instant::now();
        let scaled = if (rescale - 1.0).abs() > f32::EPSILON {
            let target = scaled_plane(native, rescale);
            img.map_channels(|c| resize_bilinear(c, target.height, target.width))
        } else {
            img.clone()
        };
        let t = timings.lap("rescale", t);

        let mut out = run_tiled(&self.network, &scaled, &params.tiling)?;
        if params.resample && out.dims() != native {
            out = out.resized(native.height, native.width);
        }
        let t = timings.lap("network", t);

        let foreground = foreground_mask(&out.scalar, params.mask_threshold);
        let budget = strategy.iteration_budget(
            &out.scalar,
            &foreground,
            params.integration.niter,
            ff,
            rescale,
            false,
        );
        let integration = follow_flows(
            &out.flows,
            &foreground,
            budget.iterations(),
            strategy.is_density(),
            &params.integration,
        )?;
        let t = timings.lap("integrate", t);

        let clustered = strategy.cluster(&integration, out.boundary.as_ref());
        let t = timings.lap("cluster", t);

        let validation = params.validation();
        let labels = if out.dims() == native {
            validate(&clustered, Some(&out.flows), ff, &validation)?
        } else {
            // flow check at network resolution, size filter after restoring
            let flow_only = ValidationOptions {
                min_size: 0,
                fill_holes: false,
                ..validation.clone()
            };
            let checked = validate(&clustered, Some(&out.flows), ff, &flow_only)?;
            let restored = resize_nearest(&checked, native.height, native.width);
            out = out.resized(native.height, native.width);
            let size_only = ValidationOptions {
                flow_threshold: 0.0,
                ..validation
            };
            validate(&restored, None, ff, &size_only)?
        };
        timings.lap("validate", t);

        let endpoints = integration.dense_positions();
        Ok(PlaneRun {
            labels,
            output: out,
            endpoints,
            trajectories: integration.trajectories,
            iterations: integration.iterations,
        })
    }

    fn run_stack(
        &self,
        img: &Image,
        rescale: f32,
        params: &EvalParams,
        strategy: &ClusteringStrategy,
        timings: &mut TimingBreakdown,
        diameter: f32,
    ) -> Result<SegmentationResult> {
        let dims = img.dims();
        let mut runs = Vec::with_capacity(dims.depth);
        for z in 0..dims.depth {
            let mut plane_timings = TimingBreakdown::default();
            runs.push(self.run_plane(&img.plane(z), rescale, params, strategy, &mut plane_timings)?);
            timings.absorb("", plane_timings);
        }

        let t = Instant::now();
        let planes: Vec<LabelMask> = runs.iter().map(|r| r.labels.clone()).collect();
        let labels = if params.stitch_threshold > 0.0 {
            stitch_planes(&planes, params.stitch_threshold)?
        } else {
            Grid::stack(&planes)?
        };
        timings.lap("stitch", t);

        let stack = |f: &dyn Fn(&PlaneRun) -> Grid<f32>| -> Result<Grid<f32>> {
            Grid::stack(&runs.iter().map(f).collect::<Vec<_>>())
        };
        let dy = stack(&|r| r.output.flows.component(0).clone())?;
        let dx = stack(&|r| r.output.flows.component(1).clone())?;
        let flows = FlowField::new(vec![Grid::new(labels.dims()), dy, dx])?;
        let scalar = stack(&|r| r.output.scalar.clone())?;
        let boundary = runs
            .iter()
            .map(|r| r.output.boundary.clone())
            .collect::<Option<Vec<_>>>()
            .map(|planes| Grid::stack(&planes))
            .transpose()?;

        let mut endpoints = Vec::new();
        let mut trajectories = params.integration.record_trace.then(Vec::new);
        let style_len = runs
            .iter()
            .map(|r| r.output.style.len())
            .fold(self.network.style_len(), usize::max);
        let mut style = vec![0.0f32; style_len];
        let mut iterations = 0;
        for (z, run) in runs.into_iter().enumerate() {
            let zf = z as f32;
            endpoints.extend(run.endpoints.into_iter().map(|p| [zf, p[1], p[2]]));
            if let (Some(all), Some(tr)) = (trajectories.as_mut(), run.trajectories) {
                all.extend(
                    tr.into_iter()
                        .map(|path| path.into_iter().map(|p| [zf, p[1], p[2]]).collect()),
                );
            }
            for (s, v) in style.iter_mut().zip(&run.output.style) {
                *s += v;
            }
            iterations = iterations.max(run.iterations);
        }
        let norm = style.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            style.iter_mut().for_each(|v| *v /= norm);
        }

        Ok(SegmentationResult {
            labels,
            flow_rgb: flow_to_rgb(&flows)?,
            flows,
            scalar,
            boundary,
            endpoints,
            trajectories,
            style,
            diameter,
            rescale,
            iterations,
            timings: TimingBreakdown::default(),
        })
    }

    fn run_volume(
        &self,
        img: &Image,
        rescale: f32,
        params: &EvalParams,
        strategy: &ClusteringStrategy,
        timings: &mut TimingBreakdown,
        diameter: f32,
    ) -> Result<SegmentationResult> {
        let ff = params.integration.flow_factor;
        let t = Instant::now();
        let out = run_orthogonal(
            &self.network,
            img,
            rescale,
            params.anisotropy,
            &params.tiling,
            strategy.is_density(),
        )?;
        let t = timings.lap("network", t);

        let foreground = foreground_mask(&out.scalar, params.mask_threshold);
        let budget = strategy.iteration_budget(
            &out.scalar,
            &foreground,
            params.integration.niter,
            ff,
            rescale,
            !params.resample,
        );
        let integration = follow_flows(
            &out.flows,
            &foreground,
            budget.iterations(),
            strategy.is_density(),
            &params.integration,
        )?;
        let t = timings.lap("integrate", t);
        let clustered = strategy.cluster(&integration, out.boundary.as_ref());
        let t = timings.lap("cluster", t);
        let labels = validate(&clustered, Some(&out.flows), ff, &params.validation())?;
        timings.lap("validate", t);

        let endpoints = integration.dense_positions();
        Ok(SegmentationResult {
            labels,
            flow_rgb: flow_to_rgb(&out.flows)?,
            flows: out.flows,
            scalar: out.scalar,
            boundary: out.boundary,
            endpoints,
            trajectories: integration.trajectories,
            style: out.style,
            diameter,
            rescale,
            iterations: integration.iterations,
            timings: TimingBreakdown::default(),
        })
    }
}

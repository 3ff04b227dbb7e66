use crate::cluster::ClusteringStrategy;
use crate::dynamics::IntegrationOptions;
use crate::error::{Result, SegmentError};
use crate::masks::ValidationOptions;
use crate::tiling::TileOptions;
use log::warn;
use serde::{Deserialize, Serialize};

/// Per-run evaluation parameters.
///
/// Threshold sentinels: `min_size <= 0` keeps every instance,
/// `flow_threshold <= 0` skips the flow check and `stitch_threshold <= 0`
/// segments planes of a stack independently. `mask_threshold` has no
/// sentinel; pixels with a scalar value strictly above it are foreground.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalParams {
    /// Object diameter in pixels. `None` or `0` requests estimation through
    /// the size model, falling back to the model's mean diameter.
    pub diameter: Option<f32>,
    /// Explicit input scale factor; takes precedence over `diameter`.
    pub rescale: Option<f32>,
    /// Percentile-normalise every channel before inference.
    pub normalize: bool,
    pub invert: bool,
    /// Run true 3D fusion on volumes instead of per-plane segmentation.
    pub do_3d: bool,
    /// Ratio of Z spacing to XY spacing for true 3D runs.
    pub anisotropy: Option<f32>,
    /// Resample network outputs to native resolution before integration.
    pub resample: bool,
    pub mask_threshold: f32,
    pub flow_threshold: f32,
    pub min_size: i64,
    pub stitch_threshold: f32,
    pub fill_holes: bool,
    /// Drop instances touching the image border after validation.
    pub exclude_on_edges: bool,
    pub integration: IntegrationOptions,
    pub tiling: TileOptions,
    /// Overrides the model preset's clustering strategy.
    pub clustering: Option<ClusteringStrategy>,
    /// Density runs whose resolved diameter reaches this value group
    /// endpoints by histogram seeding instead of DBSCAN.
    pub diam_threshold: Option<f32>,
}

impl Default for EvalParams {
    fn default() -> Self {
        Self {
            diameter: Some(30.0),
            rescale: None,
            normalize: true,
            invert: false,
            do_3d: false,
            anisotropy: None,
            resample: true,
            mask_threshold: 0.0,
            flow_threshold: 0.4,
            min_size: 15,
            stitch_threshold: 0.0,
            fill_holes: false,
            exclude_on_edges: false,
            integration: IntegrationOptions::default(),
            tiling: TileOptions::default(),
            clustering: None,
            diam_threshold: None,
        }
    }
}

impl EvalParams {
    /// Reject parameter values no run can honour.
    pub fn check(&self) -> Result<()> {
        let positive = |name: &'static str, v: Option<f32>| -> Result<()> {
            match v {
                Some(x) if !(x.is_finite() && x > 0.0) => Err(SegmentError::InvalidParameter {
                    name,
                    reason: format!("must be a positive number, got {x}"),
                }),
                _ => Ok(()),
            }
        };
        positive("rescale", self.rescale)?;
        positive("anisotropy", self.anisotropy)?;
        positive("diam_threshold", self.diam_threshold)?;
        let thresholds = [
            ("mask_threshold", self.mask_threshold),
            ("flow_threshold", self.flow_threshold),
            ("stitch_threshold", self.stitch_threshold),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() {
                return Err(SegmentError::InvalidParameter {
                    name,
                    reason: format!("must be finite, got {value}"),
                });
            }
        }
        if self.tiling.tile_size == 0 {
            return Err(SegmentError::InvalidParameter {
                name: "tile_size",
                reason: "must be positive".to_string(),
            });
        }
        if !(self.integration.flow_factor.is_finite() && self.integration.flow_factor > 0.0) {
            return Err(SegmentError::InvalidParameter {
                name: "flow_factor",
                reason: format!("must be positive, got {}", self.integration.flow_factor),
            });
        }
        Ok(())
    }

    /// Whether a caller-supplied diameter is missing and must be estimated.
    pub fn wants_size_estimate(&self) -> bool {
        self.rescale.is_none() && self.diameter.map_or(true, |d| d == 0.0)
    }

    pub fn validation(&self) -> ValidationOptions {
        ValidationOptions {
            min_size: self.min_size,
            flow_threshold: self.flow_threshold,
            fill_holes: self.fill_holes,
        }
    }
}

/// Parameters as accepted at the input boundary, including the deprecated
/// `cellprob_threshold` / `dist_threshold` aliases of `mask_threshold`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawEvalParams {
    #[serde(flatten)]
    pub params: EvalParams,
    pub cellprob_threshold: Option<f32>,
    pub dist_threshold: Option<f32>,
}

impl RawEvalParams {
    /// Fold the deprecated aliases into `mask_threshold`. `cellprob_threshold`
    /// wins when both are present.
    pub fn normalize(self) -> EvalParams {
        let RawEvalParams {
            mut params,
            cellprob_threshold,
            dist_threshold,
        } = self;
        if let Some(t) = cellprob_threshold.or(dist_threshold) {
            warn!(
                "cellprob_threshold and dist_threshold are deprecated, use mask_threshold instead"
            );
            params.mask_threshold = t;
        }
        params
    }
}

impl From<EvalParams> for RawEvalParams {
    fn from(params: EvalParams) -> Self {
        Self {
            params,
            cellprob_threshold: None,
            dist_threshold: None,
        }
    }
}

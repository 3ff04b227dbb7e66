//! Linear style-to-diameter regression.
//!
//! `diam = max(5, exp(A · (style − smean) + ln(diam_mean) + ymean))`
//!
//! Parameters are stored as JSON:
//! `{"A": [...], "smean": [...], "ymean": 0.1}`.
use super::network::SizeEstimator;
use crate::error::{Result, SegmentError};
use log::warn;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Smallest diameter the regression reports.
pub const MIN_DIAMETER: f32 = 5.0;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SizeModelParams {
    #[serde(rename = "A")]
    pub a: Vec<f32>,
    pub smean: Vec<f32>,
    pub ymean: f32,
}

#[derive(Clone, Debug)]
pub struct SizeModel {
    a: DVector<f32>,
    smean: DVector<f32>,
    ymean: f32,
    diam_mean: f32,
}

impl SizeModel {
    pub fn new(params: SizeModelParams, diam_mean: f32) -> Result<Self> {
        if params.a.len() != params.smean.len() {
            return Err(SegmentError::SizeModel(format!(
                "A has {} coefficients but smean has {}",
                params.a.len(),
                params.smean.len()
            )));
        }
        if !(diam_mean.is_finite() && diam_mean > 0.0) {
            return Err(SegmentError::SizeModel(format!(
                "mean diameter must be positive, got {diam_mean}"
            )));
        }
        Ok(Self {
            a: DVector::from_vec(params.a),
            smean: DVector::from_vec(params.smean),
            ymean: params.ymean,
            diam_mean,
        })
    }

    pub fn from_json_file(path: &Path, diam_mean: f32) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let params: SizeModelParams = serde_json::from_str(&text)?;
        Self::new(params, diam_mean)
    }

    pub fn style_len(&self) -> usize {
        self.a.len()
    }

    /// Regressed diameter, or an error when the style length does not match.
    pub fn style_diameter(&self, style: &[f32]) -> Result<f32> {
        if style.len() != self.a.len() {
            return Err(SegmentError::SizeModel(format!(
                "style has {} entries, model expects {}",
                style.len(),
                self.a.len()
            )));
        }
        let centred = DVector::from_column_slice(style) - &self.smean;
        let log_diam = self.a.dot(&centred) + self.diam_mean.ln() + self.ymean;
        Ok(log_diam.exp().max(MIN_DIAMETER))
    }
}

impl SizeEstimator for SizeModel {
    fn estimate(&self, style: &[f32]) -> f32 {
        match self.style_diameter(style) {
            Ok(d) if d.is_finite() && d > 0.0 => d,
            Ok(d) => {
                warn!("size model produced diameter {d}, using {}", self.diam_mean);
                self.diam_mean
            }
            Err(e) => {
                warn!("could not estimate diameter ({e}), using {}", self.diam_mean);
                self.diam_mean
            }
        }
    }
}

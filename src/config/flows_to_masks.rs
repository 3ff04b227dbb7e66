use crate::field::{FlowField, NetworkOutput};
use crate::image::{Dims, Grid};
use crate::model::RawEvalParams;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct FlowsToMasksConfig {
    /// JSON file holding a [`NetworkOutputFile`].
    pub input: PathBuf,
    /// Pretrained model name; selects the mean diameter and clustering mode.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub masks: RawEvalParams,
    pub output: FlowsToMasksOutput,
}

fn default_model() -> String {
    "cyto".to_string()
}

#[derive(Debug, Deserialize)]
pub struct FlowsToMasksOutput {
    /// 16-bit label PNG.
    pub labels_png: PathBuf,
    /// Optional colour rendering of the flows.
    #[serde(default)]
    pub flow_png: Option<PathBuf>,
    pub summary_json: PathBuf,
}

/// Saved network output of one plane, fields row-major.
#[derive(Debug, Deserialize)]
pub struct NetworkOutputFile {
    pub height: usize,
    pub width: usize,
    pub dy: Vec<f32>,
    pub dx: Vec<f32>,
    /// Cell probability logits, or distance field for density models.
    #[serde(alias = "cellprob", alias = "dist")]
    pub scalar: Vec<f32>,
    #[serde(default)]
    pub boundary: Option<Vec<f32>>,
    #[serde(default)]
    pub style: Vec<f32>,
}

impl NetworkOutputFile {
    pub fn into_output(self) -> Result<NetworkOutput, String> {
        let dims = Dims::plane(self.height, self.width);
        let grid = |name: &str, data: Vec<f32>| {
            Grid::from_vec(dims, data).map_err(|e| format!("Field `{name}`: {e}"))
        };
        let flows = FlowField::new(vec![grid("dy", self.dy)?, grid("dx", self.dx)?])
            .map_err(|e| e.to_string())?;
        let boundary = match self.boundary {
            Some(b) => Some(grid("boundary", b)?),
            None => None,
        };
        Ok(NetworkOutput {
            flows,
            scalar: grid("scalar", self.scalar)?,
            boundary,
            style: self.style,
        })
    }
}

pub fn load_config(path: &Path) -> Result<FlowsToMasksConfig, String> {
    let data = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    serde_json::from_str(&data)
        .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))
}

pub fn load_network_output(path: &Path) -> Result<NetworkOutput, String> {
    let data = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read network output {}: {e}", path.display()))?;
    let file: NetworkOutputFile = serde_json::from_str(&data)
        .map_err(|e| format!("Failed to parse network output {}: {e}", path.display()))?;
    file.into_output()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_accepts_deprecated_threshold() {
        let cfg: FlowsToMasksConfig = serde_json::from_str(
            r#"{
                "input": "out.json",
                "masks": {"cellprob_threshold": -0.5, "min_size": 5},
                "output": {"labels_png": "labels.png", "summary_json": "summary.json"}
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.model, "cyto");
        assert!(cfg.output.flow_png.is_none());
        let params = cfg.masks.normalize();
        assert_eq!(params.mask_threshold, -0.5);
        assert_eq!(params.min_size, 5);
    }

    #[test]
    fn network_output_file_checks_lengths() {
        let file: NetworkOutputFile = serde_json::from_str(
            r#"{"height": 1, "width": 2, "dy": [0, 0], "dx": [0, 0], "cellprob": [1, 1]}"#,
        )
        .unwrap();
        let out = file.into_output().unwrap();
        assert_eq!(out.dims(), Dims::plane(1, 2));

        let bad: NetworkOutputFile = serde_json::from_str(
            r#"{"height": 1, "width": 2, "dy": [0], "dx": [0, 0], "scalar": [1, 1]}"#,
        )
        .unwrap();
        assert!(bad.into_output().unwrap_err().contains("dy"));
    }
}

use crate::cluster::ClusteringStrategy;
use serde::{Deserialize, Serialize};

/// Defaults implied by a pretrained model name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelPreset {
    pub name: String,
    /// Mean object diameter the model was trained at.
    pub diam_mean: f32,
    pub clustering: ClusteringStrategy,
    /// Bacterial and worm models ship without a size model.
    pub has_size_model: bool,
}

impl ModelPreset {
    /// `nuclei` models use a mean diameter of 17, everything else 30. Names
    /// containing `omni` select density clustering.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        let nuclear = lower.contains("nuclei");
        let bacterial = lower.contains("bact") || lower.contains("worm");
        let clustering = if lower.contains("omni") {
            ClusteringStrategy::density()
        } else {
            ClusteringStrategy::histogram()
        };
        Self {
            name: lower,
            diam_mean: if nuclear { 17.0 } else { 30.0 },
            clustering,
            has_size_model: !bacterial,
        }
    }

    /// File name of the size-model parameters, if the model has one.
    pub fn size_model_basename(&self) -> Option<String> {
        self.has_size_model
            .then(|| format!("size_{}torch_0.json", self.name))
    }
}

impl Default for ModelPreset {
    fn default() -> Self {
        Self::from_name("cyto")
    }
}

//! Model-facing layer: collaborator traits, presets, the size model, the
//! model file cache and the [`Segmenter`] orchestrator.

pub mod cache;
pub mod network;
pub mod params;
pub mod pipeline;
pub mod presets;
pub mod size;
pub mod three_d;

pub use cache::{ModelCache, ModelFetcher, NoFetch, MODELS_PATH_ENV};
pub use network::{FlowNetwork, Precomputed, SizeEstimator};
pub use params::{EvalParams, RawEvalParams};
pub use pipeline::{DiameterEstimate, SegmentationResult, Segmenter};
pub use presets::ModelPreset;
pub use size::{SizeModel, SizeModelParams};
pub use three_d::run_orthogonal;

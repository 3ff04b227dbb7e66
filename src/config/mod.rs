//! JSON configuration of the command-line tools.

pub mod flows_to_masks;

pub use flows_to_masks::{load_config, load_network_output, FlowsToMasksConfig};

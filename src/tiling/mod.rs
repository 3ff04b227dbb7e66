//! Tiler and stitcher.
//!
//! [`tiles`] bounds per-call network memory by running overlapping windows
//! and blending them with a taper mask. [`stitch`] joins per-plane label
//! masks of a stack into volume instances by greedy IoU matching.

pub mod stitch;
pub mod tiles;

pub use stitch::{stitch_planes, stitch_volume};
pub use tiles::{run_tiled, taper_mask, Tile, TileBlender, TileLayout};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileOptions {
    /// Split planes larger than `tile_size` into overlapping tiles.
    pub tile: bool,
    /// Tile edge length in pixels.
    pub tile_size: usize,
    /// Fractional overlap between neighbouring tiles, clamped to `[0.05, 0.5]`.
    pub tile_overlap: f32,
}

impl Default for TileOptions {
    fn default() -> Self {
        Self {
            tile: true,
            tile_size: 224,
            tile_overlap: 0.1,
        }
    }
}

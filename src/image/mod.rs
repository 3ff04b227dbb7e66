pub mod grid;
pub mod io;
pub mod normalize;
pub mod resize;

pub use self::grid::{Dims, Grid, LabelMask, ScalarField};

use crate::error::{Result, SegmentError};

/// Multi-channel input image. Channels share one [`Dims`]; the pipeline never
/// mutates an input image in place.
#[derive(Clone, Debug)]
pub struct Image {
    channels: Vec<Grid<f32>>,
}

impl Image {
    pub fn new(channels: Vec<Grid<f32>>) -> Result<Self> {
        let first = channels
            .first()
            .ok_or_else(|| SegmentError::InvalidDims("image has no channels".to_string()))?;
        let dims = first.dims();
        if dims.is_empty() {
            return Err(SegmentError::InvalidDims(format!("empty image {:?}", dims)));
        }
        for ch in &channels[1..] {
            if ch.dims() != dims {
                return Err(SegmentError::ShapeMismatch {
                    what: "image channel",
                    expected: dims,
                    found: ch.dims(),
                });
            }
        }
        Ok(Self { channels })
    }

    /// Single-channel (grayscale) image.
    pub fn gray(channel: Grid<f32>) -> Result<Self> {
        Self::new(vec![channel])
    }

    pub fn dims(&self) -> Dims {
        self.channels[0].dims()
    }

    pub fn channels(&self) -> &[Grid<f32>] {
        &self.channels
    }

    pub fn channel(&self, c: usize) -> &Grid<f32> {
        &self.channels[c]
    }

    /// Plane `z` of every channel.
    pub fn plane(&self, z: usize) -> Image {
        Image {
            channels: self.channels.iter().map(|c| c.extract_plane(z)).collect(),
        }
    }

    pub fn map_channels(&self, f: impl Fn(&Grid<f32>) -> Grid<f32>) -> Image {
        Image {
            channels: self.channels.iter().map(f).collect(),
        }
    }
}

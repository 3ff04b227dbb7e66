//! Collaborator seams: the flow network and the diameter estimator.
//!
//! The pipeline never runs a neural network itself. Callers plug in any
//! implementation of [`FlowNetwork`] (an inference runtime, a cached result,
//! a synthetic field in tests) and optionally a [`SizeEstimator`].
use crate::error::{Result, SegmentError};
use crate::field::NetworkOutput;
use crate::image::Image;

/// Predicts flows, the scalar field, an optional boundary field and a style
/// vector for one normalised single-plane image.
///
/// Implementations must return fields with exactly the spatial shape of the
/// input. Two-component flows `[dy, dx]` are expected.
pub trait FlowNetwork {
    fn predict(&self, image: &Image) -> Result<NetworkOutput>;

    /// Length of the style vector, or 0 when unknown. Sizes the stack style
    /// accumulator and is checked against loaded size models.
    fn style_len(&self) -> usize {
        0
    }
}

impl<N: FlowNetwork + ?Sized> FlowNetwork for &N {
    fn predict(&self, image: &Image) -> Result<NetworkOutput> {
        (**self).predict(image)
    }

    fn style_len(&self) -> usize {
        (**self).style_len()
    }
}

impl<N: FlowNetwork + ?Sized> FlowNetwork for Box<N> {
    fn predict(&self, image: &Image) -> Result<NetworkOutput> {
        (**self).predict(image)
    }

    fn style_len(&self) -> usize {
        (**self).style_len()
    }
}

/// Replays a network output computed elsewhere.
///
/// Every call returns the stored output; the input image only has to match
/// its spatial shape. Used to run the reconstruction on saved predictions.
#[derive(Clone, Debug)]
pub struct Precomputed {
    output: NetworkOutput,
}

impl Precomputed {
    pub fn new(output: NetworkOutput) -> Result<Self> {
        output.validate()?;
        Ok(Self { output })
    }

    pub fn output(&self) -> &NetworkOutput {
        &self.output
    }
}

impl FlowNetwork for Precomputed {
    fn predict(&self, image: &Image) -> Result<NetworkOutput> {
        if image.dims() != self.output.dims() {
            return Err(SegmentError::ShapeMismatch {
                what: "precomputed network input",
                expected: self.output.dims(),
                found: image.dims(),
            });
        }
        Ok(self.output.clone())
    }

    fn style_len(&self) -> usize {
        self.output.style.len()
    }
}

/// Regresses an object diameter from a style vector.
pub trait SizeEstimator {
    /// Estimated diameter in pixels at native resolution. Implementations
    /// clamp to a small positive minimum.
    fn estimate(&self, style: &[f32]) -> f32;
}

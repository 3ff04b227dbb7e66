//! Network-predicted fields consumed by the reconstruction pipeline.
//!
//! A [`FlowField`] stores one component grid per spatial axis in `z, y, x`
//! order: `[dy, dx]` for a plane, `[dz, dy, dx]` for a volume. Fields are
//! read-only inputs to integration; helpers that rescale or resample always
//! return new fields.
use crate::error::{Result, SegmentError};
use crate::image::resize::resize_bilinear;
use crate::image::{Dims, Grid, ScalarField};

#[derive(Clone, Debug, PartialEq)]
pub struct FlowField {
    dims: Dims,
    components: Vec<Grid<f32>>,
}

impl FlowField {
    /// Build from per-axis components. Two components require a single plane.
    pub fn new(components: Vec<Grid<f32>>) -> Result<Self> {
        let first = components.first().ok_or_else(|| {
            SegmentError::InvalidDims("flow field needs at least one component".to_string())
        })?;
        let dims = first.dims();
        match components.len() {
            2 if dims.depth != 1 => {
                return Err(SegmentError::InvalidDims(format!(
                    "2-component flow field must be a single plane, got {:?}",
                    dims
                )))
            }
            2 | 3 => {}
            n => {
                return Err(SegmentError::InvalidDims(format!(
                    "flow field must have 2 or 3 components, got {n}"
                )))
            }
        }
        for c in &components[1..] {
            if c.dims() != dims {
                return Err(SegmentError::ShapeMismatch {
                    what: "flow component",
                    expected: dims,
                    found: c.dims(),
                });
            }
        }
        Ok(Self { dims, components })
    }

    pub fn zeros(dims: Dims, ndim: usize) -> Result<Self> {
        Self::new(vec![Grid::new(dims); ndim])
    }

    #[inline]
    pub fn dims(&self) -> Dims {
        self.dims
    }

    /// Number of spatial components (2 or 3).
    #[inline]
    pub fn ndim(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> &[Grid<f32>] {
        &self.components
    }

    pub fn component(&self, axis: usize) -> &Grid<f32> {
        &self.components[axis]
    }

    /// Flow at linear index `idx` as `[dz, dy, dx]` (`dz = 0` for planes).
    #[inline]
    pub fn vector_at(&self, idx: usize) -> [f32; 3] {
        match self.components.as_slice() {
            [dy, dx] => [0.0, dy.data()[idx], dx.data()[idx]],
            [dz, dy, dx] => [dz.data()[idx], dy.data()[idx], dx.data()[idx]],
            _ => [0.0; 3],
        }
    }

    /// Multiply every component by `factor`.
    pub fn scaled(&self, factor: f32) -> FlowField {
        FlowField {
            dims: self.dims,
            components: self
                .components
                .iter()
                .map(|c| c.map(|v| v * factor))
                .collect(),
        }
    }

    /// Euclidean norm per pixel.
    pub fn magnitude(&self) -> Grid<f32> {
        let mut out = Grid::new(self.dims);
        for (i, m) in out.data_mut().iter_mut().enumerate() {
            let v = self.vector_at(i);
            *m = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        }
        out
    }

    /// Copy of plane `z`, keeping only the in-plane `[dy, dx]` components.
    pub fn extract_plane(&self, z: usize) -> FlowField {
        let n = self.components.len();
        FlowField {
            dims: self.dims.plane_dims(),
            components: self.components[n - 2..]
                .iter()
                .map(|c| c.extract_plane(z))
                .collect(),
        }
    }

    /// Bilinear resample of every plane to `height × width`. Vector magnitudes
    /// are kept as-is; callers rescale explicitly when units must change.
    pub fn resized(&self, height: usize, width: usize) -> FlowField {
        let components: Vec<Grid<f32>> = self
            .components
            .iter()
            .map(|c| resize_bilinear(c, height, width))
            .collect();
        FlowField {
            dims: components[0].dims(),
            components,
        }
    }
}

/// Everything the network collaborator returns for one image.
#[derive(Clone, Debug)]
pub struct NetworkOutput {
    pub flows: FlowField,
    /// Cell probability logits (classic) or distance-to-boundary (density mode).
    pub scalar: ScalarField,
    /// Boundary logits, present for networks with four or more output classes.
    pub boundary: Option<ScalarField>,
    /// Fixed-length image summary used for diameter regression.
    pub style: Vec<f32>,
}

impl NetworkOutput {
    pub fn dims(&self) -> Dims {
        self.flows.dims()
    }

    /// Flow, scalar and boundary fields must share one spatial shape.
    pub fn validate(&self) -> Result<()> {
        let dims = self.flows.dims();
        if self.scalar.dims() != dims {
            return Err(SegmentError::ShapeMismatch {
                what: "scalar field",
                expected: dims,
                found: self.scalar.dims(),
            });
        }
        if let Some(bd) = &self.boundary {
            if bd.dims() != dims {
                return Err(SegmentError::ShapeMismatch {
                    what: "boundary field",
                    expected: dims,
                    found: bd.dims(),
                });
            }
        }
        Ok(())
    }

    /// Bilinear resample of all fields to `height × width`.
    pub fn resized(&self, height: usize, width: usize) -> NetworkOutput {
        NetworkOutput {
            flows: self.flows.resized(height, width),
            scalar: resize_bilinear(&self.scalar, height, width),
            boundary: self
                .boundary
                .as_ref()
                .map(|b| resize_bilinear(b, height, width)),
            style: self.style.clone(),
        }
    }
}

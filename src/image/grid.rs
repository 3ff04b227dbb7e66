//! Owned dense arrays in `z, y, x` order.
//!
//! A 2D image is a grid with `depth == 1`; every stage of the pipeline works
//! on the same container so 2D and 3D code paths share indexing. Storage is
//! row-major within a plane and planes are contiguous.
use crate::error::{Result, SegmentError};
use serde::{Deserialize, Serialize};

/// Spatial extent of a grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dims {
    pub depth: usize,
    pub height: usize,
    pub width: usize,
}

impl Dims {
    /// Single plane of `height × width` pixels.
    pub const fn plane(height: usize, width: usize) -> Self {
        Self {
            depth: 1,
            height,
            width,
        }
    }

    pub const fn volume(depth: usize, height: usize, width: usize) -> Self {
        Self {
            depth,
            height,
            width,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.depth * self.height * self.width
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn plane_len(&self) -> usize {
        self.height * self.width
    }

    /// `[depth, height, width]`, the axis order used by positions and flows.
    #[inline]
    pub fn extent(&self) -> [usize; 3] {
        [self.depth, self.height, self.width]
    }

    /// Same `height × width` with a single plane.
    pub fn plane_dims(&self) -> Dims {
        Dims::plane(self.height, self.width)
    }

    #[inline]
    pub fn index(&self, z: usize, y: usize, x: usize) -> usize {
        (z * self.height + y) * self.width + x
    }

    #[inline]
    pub fn coords(&self, idx: usize) -> [usize; 3] {
        let plane = self.plane_len();
        let z = idx / plane;
        let rem = idx - z * plane;
        [z, rem / self.width, rem % self.width]
    }
}

/// Dense array over [`Dims`].
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    dims: Dims,
    data: Vec<T>,
}

/// Per-pixel float values (probability, distance, boundary logits).
pub type ScalarField = Grid<f32>;

/// Instance labels: 0 is background, `k > 0` is instance `k`.
pub type LabelMask = Grid<u32>;

impl<T: Copy + Default> Grid<T> {
    /// Zero (default) initialised grid.
    pub fn new(dims: Dims) -> Self {
        Self::filled(dims, T::default())
    }

    pub fn filled(dims: Dims, value: T) -> Self {
        Self {
            dims,
            data: vec![value; dims.len()],
        }
    }

    pub fn from_vec(dims: Dims, data: Vec<T>) -> Result<Self> {
        if data.len() != dims.len() {
            return Err(SegmentError::InvalidDims(format!(
                "buffer of {} elements does not fit {:?}",
                data.len(),
                dims
            )));
        }
        Ok(Self { dims, data })
    }

    /// Stack single planes into a volume. All planes must share `height × width`.
    pub fn stack(planes: &[Grid<T>]) -> Result<Self> {
        let first = planes
            .first()
            .ok_or_else(|| SegmentError::InvalidDims("cannot stack zero planes".to_string()))?;
        let expected = first.dims;
        let mut data = Vec::with_capacity(expected.len() * planes.len());
        let mut depth = 0;
        for (plane, grid) in planes.iter().enumerate() {
            if grid.dims.height != expected.height || grid.dims.width != expected.width {
                return Err(SegmentError::PlaneShapeMismatch {
                    plane,
                    expected,
                    found: grid.dims,
                });
            }
            depth += grid.dims.depth;
            data.extend_from_slice(&grid.data);
        }
        Ok(Self {
            dims: Dims::volume(depth, expected.height, expected.width),
            data,
        })
    }

    #[inline]
    pub fn dims(&self) -> Dims {
        self.dims
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    pub fn get(&self, z: usize, y: usize, x: usize) -> T {
        self.data[self.dims.index(z, y, x)]
    }

    #[inline]
    pub fn set(&mut self, z: usize, y: usize, x: usize, v: T) {
        let i = self.dims.index(z, y, x);
        self.data[i] = v;
    }

    /// Borrow plane `z` as a contiguous row-major slice.
    pub fn plane(&self, z: usize) -> &[T] {
        let n = self.dims.plane_len();
        &self.data[z * n..(z + 1) * n]
    }

    pub fn plane_mut(&mut self, z: usize) -> &mut [T] {
        let n = self.dims.plane_len();
        &mut self.data[z * n..(z + 1) * n]
    }

    /// Copy plane `z` into its own single-plane grid.
    pub fn extract_plane(&self, z: usize) -> Grid<T> {
        Grid {
            dims: self.dims.plane_dims(),
            data: self.plane(z).to_vec(),
        }
    }

    /// Split into single planes.
    pub fn planes(&self) -> Vec<Grid<T>> {
        (0..self.dims.depth).map(|z| self.extract_plane(z)).collect()
    }

    pub fn map<U: Copy + Default>(&self, f: impl Fn(T) -> U) -> Grid<U> {
        Grid {
            dims: self.dims,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }
}

impl LabelMask {
    /// Largest label present (0 for an empty mask).
    pub fn max_label(&self) -> u32 {
        self.data.iter().copied().max().unwrap_or(0)
    }

    /// Number of distinct nonzero labels.
    pub fn count_instances(&self) -> usize {
        let mut seen: Vec<u32> = self.data.iter().copied().filter(|&l| l != 0).collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }
}

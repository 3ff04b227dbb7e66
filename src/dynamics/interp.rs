//! Sampling of per-step displacement fields at sub-pixel positions.
use crate::image::Dims;

/// Dense displacement field in `z, y, x` component order. For planar inputs
/// the `z` component is all zeros and depth is one.
pub(crate) struct StepField {
    pub dims: Dims,
    pub comps: [Vec<f32>; 3],
}

impl StepField {
    /// Displacement of the pixel containing `p` (truncation, no blending).
    #[inline]
    pub fn nearest(&self, p: [f32; 3]) -> [f32; 3] {
        let [d, h, w] = self.dims.extent();
        let z = (p[0] as usize).min(d - 1);
        let y = (p[1] as usize).min(h - 1);
        let x = (p[2] as usize).min(w - 1);
        let i = self.dims.index(z, y, x);
        [self.comps[0][i], self.comps[1][i], self.comps[2][i]]
    }

    /// Trilinear blend of the eight surrounding pixels. Planar fields reduce
    /// to bilinear since both `z` taps hit plane 0.
    #[inline]
    pub fn trilinear(&self, p: [f32; 3]) -> [f32; 3] {
        let [d, h, w] = self.dims.extent();
        let (z0, z1, tz) = taps(p[0], d);
        let (y0, y1, ty) = taps(p[1], h);
        let (x0, x1, tx) = taps(p[2], w);
        let mut out = [0.0f32; 3];
        for (zi, wz) in [(z0, 1.0 - tz), (z1, tz)] {
            if wz == 0.0 {
                continue;
            }
            for (yi, wy) in [(y0, 1.0 - ty), (y1, ty)] {
                if wy == 0.0 {
                    continue;
                }
                for (xi, wx) in [(x0, 1.0 - tx), (x1, tx)] {
                    let wgt = wz * wy * wx;
                    if wgt == 0.0 {
                        continue;
                    }
                    let i = self.dims.index(zi, yi, xi);
                    for (o, c) in out.iter_mut().zip(&self.comps) {
                        *o += wgt * c[i];
                    }
                }
            }
        }
        out
    }
}

#[inline]
fn taps(v: f32, len: usize) -> (usize, usize, f32) {
    let v = v.clamp(0.0, (len - 1) as f32);
    let i0 = v.floor() as usize;
    let i1 = (i0 + 1).min(len - 1);
    (i0, i1, v - i0 as f32)
}

//! Colour-wheel rendering of 2D flow fields.
//!
//! Direction sets the hue through three phase-shifted cosines; magnitude,
//! normalised between its 1st and 99th percentile, sets the brightness.
use crate::error::Result;
use crate::field::FlowField;
use crate::image::normalize::normalize99;
use crate::image::Grid;
use std::f32::consts::PI;

/// RGB in `[0, 1]` per pixel of every plane, row-major. Only the in-plane
/// `[dy, dx]` components are rendered.
pub fn flow_to_rgb(flows: &FlowField) -> Result<Vec<[f32; 3]>> {
    let dims = flows.dims();
    let n = flows.ndim();
    let dy = flows.component(n - 2).data();
    let dx = flows.component(n - 1).data();
    let mag: Vec<f32> = dy
        .iter()
        .zip(dx)
        .map(|(y, x)| (y * y + x * x).sqrt())
        .collect();
    let mag = normalize99(&Grid::from_vec(dims, mag)?);
    let rgb = dy
        .iter()
        .zip(dx)
        .zip(mag.data())
        .map(|((&y, &x), &m)| {
            let angle = x.atan2(y) + PI;
            let m = m.clamp(0.0, 1.0);
            [
                0.5 * (angle.cos() + 1.0) * m,
                0.5 * ((angle + 2.0 * PI / 3.0).cos() + 1.0) * m,
                0.5 * ((angle + 4.0 * PI / 3.0).cos() + 1.0) * m,
            ]
        })
        .collect();
    Ok(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Dims;

    #[test]
    fn zero_flow_is_black() {
        let f = FlowField::zeros(Dims::plane(3, 3), 2).unwrap();
        let rgb = flow_to_rgb(&f).unwrap();
        assert_eq!(rgb.len(), 9);
        assert!(rgb.iter().all(|p| p == &[0.0, 0.0, 0.0]));
    }

    #[test]
    fn opposite_directions_get_different_colours() {
        let dims = Dims::plane(1, 4);
        let dy = Grid::from_vec(dims, vec![0.0, 0.0, 0.0, 0.1]).unwrap();
        let dx = Grid::from_vec(dims, vec![1.0, -1.0, 0.5, 0.0]).unwrap();
        let rgb = flow_to_rgb(&FlowField::new(vec![dy, dx]).unwrap()).unwrap();
        assert_ne!(rgb[0], rgb[1]);
        assert!(rgb[3].iter().all(|c| (0.0..=1.0).contains(c)));
    }
}

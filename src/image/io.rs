//! I/O helpers for grayscale images, label masks and JSON.
//!
//! - `load_grayscale_image`: read a PNG into a single-plane grid in `[0, 1]`.
//! - `save_labels_png`: write a 2D label mask as a 16-bit grayscale PNG.
//! - `save_rgb_png`: write an RGB diagnostic rendering (flow colours).
//! - `write_json_file`: pretty-print a serializable value to disk.
use super::{Dims, Grid, LabelMask};
use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Load an image from disk and convert to grayscale `f32` in `[0, 1]`.
pub fn load_grayscale_image(path: &Path) -> crate::error::Result<Grid<f32>> {
    let img: GrayImage = image::open(path)?.into_luma8();
    let dims = Dims::plane(img.height() as usize, img.width() as usize);
    let data = img.into_raw().into_iter().map(|v| v as f32 / 255.0).collect();
    Grid::from_vec(dims, data)
}

/// Save a single-plane label mask as 16-bit grayscale.
pub fn save_labels_png(labels: &LabelMask, path: &Path) -> Result<(), String> {
    let dims = labels.dims();
    if dims.depth != 1 {
        return Err(format!(
            "Cannot save {} planes to a single PNG {}",
            dims.depth,
            path.display()
        ));
    }
    let max = labels.max_label();
    if max > u16::MAX as u32 {
        return Err(format!("Label {max} does not fit a 16-bit PNG"));
    }
    ensure_parent_dir(path)?;
    let data: Vec<u16> = labels.data().iter().map(|&l| l as u16).collect();
    let image: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(dims.width as u32, dims.height as u32, data)
            .ok_or_else(|| "Failed to create label buffer".to_string())?;
    image
        .save(path)
        .map_err(|e| format!("Failed to save {}: {e}", path.display()))
}

/// Save a row-major RGB rendering (values in `[0, 1]`).
pub fn save_rgb_png(rgb: &[[f32; 3]], dims: Dims, path: &Path) -> Result<(), String> {
    if rgb.len() != dims.plane_len() {
        return Err(format!(
            "RGB buffer has {} pixels, expected {}",
            rgb.len(),
            dims.plane_len()
        ));
    }
    ensure_parent_dir(path)?;
    let mut out = RgbImage::new(dims.width as u32, dims.height as u32);
    for (i, px) in rgb.iter().enumerate() {
        let to_u8 = |v: f32| (v * 255.0).clamp(0.0, 255.0) as u8;
        out.put_pixel(
            (i % dims.width) as u32,
            (i / dims.width) as u32,
            Rgb([to_u8(px[0]), to_u8(px[1]), to_u8(px[2])]),
        );
    }
    out.save(path)
        .map_err(|e| format!("Failed to save {}: {e}", path.display()))
}

/// Serialize a value as pretty JSON to `path`, creating parent directories.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize JSON for {}: {e}", path.display()))?;
    fs::write(path, json).map_err(|e| format!("Failed to write JSON {}: {e}", path.display()))
}

fn ensure_parent_dir(path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {e}", parent.display()))?;
        }
    }
    Ok(())
}

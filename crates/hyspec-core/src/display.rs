//! Conversion of normalized bands into an 8-bit RGB display image.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::{Array2, Array3, Axis, stack};

use crate::error::Result;

/// Stack three equally sized bands into a `(height, width, 3)` float cube.
pub fn stack_channels(channels: &[Array2<f32>; 3]) -> Result<Array3<f32>> {
    let views = [channels[0].view(), channels[1].view(), channels[2].view()];
    Ok(stack(Axis(2), &views)?)
}

/// Quantize a `(height, width, 3)` cube of `[0, 1]` values. Values outside
/// the unit range saturate, NaN becomes 0.
pub fn to_rgb8(rgb: &Array3<f32>) -> RgbImage {
    let (height, width, _) = rgb.dim();
    let quantize = |v: f32| {
        if v.is_nan() {
            0
        } else {
            (v.clamp(0.0, 1.0) * 255.0).round() as u8
        }
    };
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([
            quantize(rgb[[y, x, 0]]),
            quantize(rgb[[y, x, 1]]),
            quantize(rgb[[y, x, 2]]),
        ])
    })
}

/// Resize (when the size differs) and write `image`; the format follows the
/// file extension.
pub fn save_resized(image: &RgbImage, path: &Path, width: u32, height: u32) -> Result<()> {
    if image.dimensions() == (width, height) {
        image.save(path)?;
    } else {
        imageops::resize(image, width, height, FilterType::Triangle).save(path)?;
    }
    tracing::info!("wrote {}x{} image to {}", width, height, path.display());
    Ok(())
}

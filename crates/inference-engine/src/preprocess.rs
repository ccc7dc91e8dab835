//! Image loading and CLIP pixel preprocessing

use crate::InferenceError;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use std::path::Path;
use storage::ImageKind;

/// Loaded images are shrunk to fit inside this square
pub const THUMBNAIL_SIZE: u32 = 224;

/// CLIP image normalization constants
pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Decode an image from disk as 8-bit RGB and thumbnail it
pub fn load_image(path: &Path) -> Result<RgbImage, InferenceError> {
    let image = match ImageKind::from_path(path) {
        Some(ImageKind::Raw) => decode_raw(path)?,
        _ => image::open(path)
            .map_err(|e| InferenceError::ImageLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .to_rgb8(),
    };

    Ok(thumbnail(image, THUMBNAIL_SIZE))
}

fn decode_raw(path: &Path) -> Result<RgbImage, InferenceError> {
    let decoded = imagepipe::simple_decode_8bit(path, 0, 0).map_err(|reason| {
        InferenceError::ImageLoad {
            path: path.to_path_buf(),
            reason,
        }
    })?;

    RgbImage::from_raw(decoded.width as u32, decoded.height as u32, decoded.data).ok_or_else(|| {
        InferenceError::ImageLoad {
            path: path.to_path_buf(),
            reason: "raw decoder returned a truncated buffer".to_string(),
        }
    })
}

/// Shrink `image` to fit within `max`×`max`, keeping its aspect ratio.
/// Images that already fit are returned unchanged.
pub fn thumbnail(image: RgbImage, max: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if w <= max && h <= max {
        return image;
    }

    let scale = (max as f32 / w as f32).min(max as f32 / h as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, max);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, max);
    imageops::resize(&image, new_w, new_h, FilterType::CatmullRom)
}

/// Resize the shortest edge to `size`, then centre-crop to `size`×`size`
fn resize_and_crop(image: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let (new_w, new_h) = if w <= h {
        (size, ((h as f32 / w as f32) * size as f32) as u32)
    } else {
        (((w as f32 / h as f32) * size as f32) as u32, size)
    };
    let (new_w, new_h) = (new_w.max(size), new_h.max(size));

    let resized = imageops::resize(image, new_w, new_h, FilterType::CatmullRom);
    let x = (new_w - size) / 2;
    let y = (new_h - size) / 2;
    imageops::crop_imm(&resized, x, y, size, size).to_image()
}

/// Build the NCHW `pixel_values` tensor for a batch of images
pub fn pixel_values(images: &[RgbImage], size: u32) -> Array4<f32> {
    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((images.len(), 3, side, side));

    for (n, image) in images.iter().enumerate() {
        let cropped = resize_and_crop(image, size);
        for (x, y, pixel) in cropped.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                tensor[[n, c, y as usize, x as usize]] = (value - CLIP_MEAN[c]) / CLIP_STD[c];
            }
        }
    }

    tensor
}

//! Frame preprocessing: intensity conversion, cropping, bilinear resize.

use crate::types::FaceBox;
use image::{GrayImage, RgbImage};

// BT.601 luma weights in Q14 fixed point (0.299, 0.587, 0.114).
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

/// Convert an RGB frame to single-channel intensity.
pub fn to_intensity(frame: &RgbImage) -> GrayImage {
    let (width, height) = frame.dimensions();
    let data: Vec<u8> = frame
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            let y = r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B + (1 << (LUMA_SHIFT - 1));
            (y >> LUMA_SHIFT).min(255) as u8
        })
        .collect();
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Crop `region` out of `gray`, clamped to the image bounds.
pub fn crop(gray: &GrayImage, region: &FaceBox) -> GrayImage {
    let (width, height) = gray.dimensions();
    let x = region.x.min(width);
    let y = region.y.min(height);
    let w = region.width.min(width - x);
    let h = region.height.min(height - y);
    image::imageops::crop_imm(gray, x, y, w, h).to_image()
}

/// Resize using bilinear interpolation with half-pixel centers.
pub fn resize_bilinear(src: &GrayImage, new_w: u32, new_h: u32) -> GrayImage {
    let (width, height) = (src.width() as usize, src.height() as usize);
    let (new_w, new_h) = (new_w as usize, new_h as usize);
    if width == 0 || height == 0 || new_w == 0 || new_h == 0 {
        return GrayImage::new(new_w as u32, new_h as u32);
    }

    let frame = src.as_raw();
    let scale_x = width as f32 / new_w as f32;
    let scale_y = height as f32 / new_h as f32;

    let mut resized = vec![0u8; new_w * new_h];
    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);
        let fy = if src_y < 0.0 { 0.0 } else { fy };

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);
            let fx = if src_x < 0.0 { 0.0 } else { fx };

            let tl = frame[y0 * width + x0] as f32;
            let tr = frame[y0 * width + x1] as f32;
            let bl = frame[y1 * width + x0] as f32;
            let br = frame[y1 * width + x1] as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            resized[y * new_w + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    GrayImage::from_raw(new_w as u32, new_h as u32, resized)
        .unwrap_or_else(|| GrayImage::new(new_w as u32, new_h as u32))
}

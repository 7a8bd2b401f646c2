use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};

use crate::ScalePolicy;

/// Resize a source frame to exactly `target_w x target_h` under the policy.
/// FIT letterboxes on black, FILL center-crops, STRETCH ignores aspect.
pub fn scale(frame: &DynamicImage, target_w: u32, target_h: u32, policy: ScalePolicy) -> RgbaImage {
    match policy {
        ScalePolicy::Stretch => frame
            .resize_exact(target_w, target_h, FilterType::Triangle)
            .to_rgba8(),
        ScalePolicy::Fill => frame
            .resize_to_fill(target_w, target_h, FilterType::Triangle)
            .to_rgba8(),
        ScalePolicy::Fit => {
            let inner = frame.resize(target_w, target_h, FilterType::Triangle).to_rgba8();
            let mut canvas = RgbaImage::from_pixel(target_w, target_h, Rgba([0, 0, 0, 255]));
            let x = (target_w.saturating_sub(inner.width())) / 2;
            let y = (target_h.saturating_sub(inner.height())) / 2;
            imageops::overlay(&mut canvas, &inner, x as i64, y as i64);
            canvas
        }
    }
}

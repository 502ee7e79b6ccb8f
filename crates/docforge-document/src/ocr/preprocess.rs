// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image cleanup ahead of recognition: grayscale, light denoise and a
// percentile contrast stretch.

use image::{DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use tracing::{debug, instrument};

/// Share of pixels clipped at each end of the histogram.
const CLIP_FRACTION: f64 = 0.01;
const DENOISE_SIGMA: f32 = 0.6;

/// The darkest and brightest levels after clipping `CLIP_FRACTION` of the
/// pixels at each end.
fn clip_levels(gray: &GrayImage) -> (u8, u8) {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    let clip = (total as f64 * CLIP_FRACTION) as u64;

    let mut seen = 0;
    let mut low = 0u8;
    for (level, count) in histogram.iter().enumerate() {
        seen += count;
        if seen > clip {
            low = level as u8;
            break;
        }
    }
    seen = 0;
    let mut high = 255u8;
    for (level, count) in histogram.iter().enumerate().rev() {
        seen += count;
        if seen > clip {
            high = level as u8;
            break;
        }
    }
    (low, high)
}

/// Map `[low, high]` linearly onto the full range.
pub fn stretch_contrast(gray: &GrayImage) -> GrayImage {
    let (low, high) = clip_levels(gray);
    if high <= low {
        return gray.clone();
    }
    let span = f32::from(high - low);
    let mut out = gray.clone();
    for pixel in out.pixels_mut() {
        let v = pixel.0[0].clamp(low, high);
        *pixel = Luma([((f32::from(v - low) / span) * 255.0).round() as u8]);
    }
    out
}

/// Grayscale, denoise and stretch `image` for recognition.
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn prepare(image: &RgbImage) -> GrayImage {
    let gray = DynamicImage::ImageRgb8(image.clone()).to_luma8();
    let smoothed = gaussian_blur_f32(&gray, DENOISE_SIGMA);
    let stretched = stretch_contrast(&smoothed);
    debug!("image prepared for recognition");
    stretched
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn washed_out_scans_gain_full_range() {
        let mut gray = GrayImage::new(20, 20);
        for (x, _, pixel) in gray.enumerate_pixels_mut() {
            *pixel = Luma([if x < 10 { 110 } else { 150 }]);
        }
        let out = stretch_contrast(&gray);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(19, 0).0[0], 255);
    }

    #[test]
    fn flat_images_are_left_alone() {
        let gray = GrayImage::from_pixel(8, 8, Luma([90]));
        assert_eq!(stretch_contrast(&gray), gray);
    }

    #[test]
    fn prepare_keeps_dimensions() {
        let rgb = RgbImage::from_pixel(31, 17, image::Rgb([200, 180, 160]));
        let out = prepare(&rgb);
        assert_eq!(out.dimensions(), (31, 17));
    }
}

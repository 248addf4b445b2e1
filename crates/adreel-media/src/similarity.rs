//! Frame similarity scoring.
//!
//! Primary metric: windowed grayscale SSIM (1.0 = identical). When SSIM
//! cannot be computed, falls back to PSNR remapped from a 20–50 dB range
//! onto [0,1]. When both fail the score is 0.0; callers must treat that
//! as "no information" for control flow, worst case numerically.

use image::GrayImage;
use std::path::Path;
use tracing::warn;

/// SSIM window edge in pixels.
const SSIM_WINDOW: u32 = 8;

/// PSNR remap range: 20 dB → 0.0, 50 dB → 1.0.
const PSNR_FLOOR_DB: f64 = 20.0;
const PSNR_CEIL_DB: f64 = 50.0;

/// Stabilization constants for 8-bit dynamic range.
const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

/// Score two frame files. Never errors; returns 0.0 when no metric could
/// be computed.
pub fn score_frames(frame_a: impl AsRef<Path>, frame_b: impl AsRef<Path>) -> f64 {
    let a = match image::open(frame_a.as_ref()) {
        Ok(img) => img.to_luma8(),
        Err(e) => {
            warn!("failed to decode {}: {}", frame_a.as_ref().display(), e);
            return 0.0;
        }
    };
    let b = match image::open(frame_b.as_ref()) {
        Ok(img) => img.to_luma8(),
        Err(e) => {
            warn!("failed to decode {}: {}", frame_b.as_ref().display(), e);
            return 0.0;
        }
    };

    score_images(&a, &b)
}

/// Score two decoded grayscale frames.
pub fn score_images(a: &GrayImage, b: &GrayImage) -> f64 {
    if let Some(score) = ssim(a, b) {
        return score.clamp(0.0, 1.0);
    }

    if let Some(score) = psnr_score(a, b) {
        return score;
    }

    warn!("both SSIM and PSNR failed; reporting 0.0 (no information)");
    0.0
}

/// Windowed mean SSIM. Requires equal dimensions at least one window
/// large; returns `None` otherwise so the caller can fall back.
pub fn ssim(a: &GrayImage, b: &GrayImage) -> Option<f64> {
    if a.dimensions() != b.dimensions() {
        return None;
    }
    let (width, height) = a.dimensions();
    if width < SSIM_WINDOW || height < SSIM_WINDOW {
        return None;
    }

    let mut total = 0.0;
    let mut windows = 0u64;

    let mut wy = 0;
    while wy + SSIM_WINDOW <= height {
        let mut wx = 0;
        while wx + SSIM_WINDOW <= width {
            total += window_ssim(a, b, wx, wy);
            windows += 1;
            wx += SSIM_WINDOW;
        }
        wy += SSIM_WINDOW;
    }

    if windows == 0 {
        return None;
    }
    Some(total / windows as f64)
}

/// SSIM over a single aligned window at (wx, wy).
fn window_ssim(a: &GrayImage, b: &GrayImage, wx: u32, wy: u32) -> f64 {
    let n = (SSIM_WINDOW * SSIM_WINDOW) as f64;

    let mut sum_a = 0.0;
    let mut sum_b = 0.0;
    for y in wy..wy + SSIM_WINDOW {
        for x in wx..wx + SSIM_WINDOW {
            sum_a += a.get_pixel(x, y)[0] as f64;
            sum_b += b.get_pixel(x, y)[0] as f64;
        }
    }
    let mean_a = sum_a / n;
    let mean_b = sum_b / n;

    let mut var_a = 0.0;
    let mut var_b = 0.0;
    let mut covar = 0.0;
    for y in wy..wy + SSIM_WINDOW {
        for x in wx..wx + SSIM_WINDOW {
            let da = a.get_pixel(x, y)[0] as f64 - mean_a;
            let db = b.get_pixel(x, y)[0] as f64 - mean_b;
            var_a += da * da;
            var_b += db * db;
            covar += da * db;
        }
    }
    var_a /= n - 1.0;
    var_b /= n - 1.0;
    covar /= n - 1.0;

    ((2.0 * mean_a * mean_b + C1) * (2.0 * covar + C2))
        / ((mean_a * mean_a + mean_b * mean_b + C1) * (var_a + var_b + C2))
}

/// PSNR-based fallback score, remapped onto [0,1]. Frames with differing
/// dimensions are resized to the smaller common geometry first.
pub fn psnr_score(a: &GrayImage, b: &GrayImage) -> Option<f64> {
    let (aw, ah) = a.dimensions();
    let (bw, bh) = b.dimensions();
    let width = aw.min(bw);
    let height = ah.min(bh);
    if width == 0 || height == 0 {
        return None;
    }

    let resized_a;
    let resized_b;
    let (a, b) = if (aw, ah) != (width, height) || (bw, bh) != (width, height) {
        resized_a = image::imageops::resize(a, width, height, image::imageops::FilterType::Triangle);
        resized_b = image::imageops::resize(b, width, height, image::imageops::FilterType::Triangle);
        (&resized_a, &resized_b)
    } else {
        (a, b)
    };

    let mut mse = 0.0;
    for (pa, pb) in a.pixels().zip(b.pixels()) {
        let d = pa[0] as f64 - pb[0] as f64;
        mse += d * d;
    }
    mse /= (width * height) as f64;

    if mse == 0.0 {
        // Identical frames: infinite PSNR, best score
        return Some(1.0);
    }

    let psnr_db = 10.0 * (255.0 * 255.0 / mse).log10();
    Some(remap_psnr(psnr_db))
}

/// Linear remap of decibels onto [0,1], clamped outside 20–50 dB.
pub fn remap_psnr(psnr_db: f64) -> f64 {
    ((psnr_db - PSNR_FLOOR_DB) / (PSNR_CEIL_DB - PSNR_FLOOR_DB)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn solid(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([value]))
    }

    fn gradient(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([((x + y) % 256) as u8]))
    }

    #[test]
    fn identical_frames_score_near_one() {
        let img = gradient(64, 64);
        let score = score_images(&img, &img);
        assert!(score > 0.95, "identical frames scored {}", score);
    }

    #[test]
    fn dissimilar_frames_score_low() {
        let black = solid(64, 64, 0);
        let white = solid(64, 64, 255);
        let score = score_images(&black, &white);
        assert!(score < 0.1, "opposite frames scored {}", score);
    }

    #[test]
    fn scores_are_always_in_unit_range() {
        let cases = [
            (gradient(64, 64), gradient(64, 64)),
            (solid(64, 64, 0), solid(64, 64, 255)),
            (gradient(64, 64), solid(64, 64, 128)),
            (gradient(32, 64), gradient(64, 64)), // dim mismatch → PSNR path
        ];
        for (a, b) in &cases {
            let score = score_images(a, b);
            assert!((0.0..=1.0).contains(&score), "out of range: {}", score);
        }
    }

    #[test]
    fn dimension_mismatch_falls_back_to_psnr() {
        let a = gradient(32, 32);
        let b = gradient(64, 64);
        assert!(ssim(&a, &b).is_none());
        assert!(psnr_score(&a, &b).is_some());
    }

    #[test]
    fn tiny_frames_fall_back_to_psnr() {
        let a = solid(4, 4, 100);
        let b = solid(4, 4, 100);
        assert!(ssim(&a, &b).is_none());
        // Identical tiny frames: PSNR path reports best case
        assert!((score_images(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn psnr_remap_is_clamped() {
        assert_eq!(remap_psnr(10.0), 0.0);
        assert_eq!(remap_psnr(20.0), 0.0);
        assert!((remap_psnr(35.0) - 0.5).abs() < 1e-9);
        assert_eq!(remap_psnr(50.0), 1.0);
        assert_eq!(remap_psnr(80.0), 1.0);
    }

    #[test]
    fn undecodable_frame_scores_zero() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("not_an_image.png");
        std::fs::write(&bogus, b"definitely not a png").unwrap();
        let good = dir.path().join("good.png");
        gradient(16, 16).save(&good).unwrap();

        assert_eq!(score_frames(&bogus, &good), 0.0);
    }
}

use crate::common::LivenessConfig;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::filter::laplacian_filter;
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::HashMap;

/// The five independent anti-spoofing heuristics, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LivenessCheck {
    /// Concentrated bright spots from screen backlight or flash.
    Specular,
    /// Unnaturally sharp pixel-level edges from screens or prints.
    Sharpness,
    /// Blue-shifted or clipped color distribution typical of screens.
    Color,
    /// Flat brightness across the face grid, lacking 3D structure.
    Reflection,
    /// Missing high-frequency micro-texture (pores) in reproductions.
    Texture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpoofType {
    Screen,
    Print,
    Unknown,
}

impl std::fmt::Display for SpoofType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SpoofType::Screen => "screen",
            SpoofType::Print => "print",
            SpoofType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct LivenessReport {
    pub is_live: bool,
    /// Fraction of checks passed, in [0, 1].
    pub confidence: f32,
    pub failed_checks: Vec<LivenessCheck>,
    /// Classification of the reproduction, present only when not live.
    pub spoof_type: Option<SpoofType>,
}

impl LivenessReport {
    fn live(confidence: f32) -> Self {
        Self {
            is_live: true,
            confidence,
            failed_checks: Vec::new(),
            spoof_type: None,
        }
    }
}

const TOTAL_CHECKS: u32 = 5;

/// Classifies a cropped face as live or spoofed by majority voting over
/// five independent heuristics.
///
/// Faces below the configured minimum size cannot be analyzed reliably
/// and report live at reduced confidence rather than blocking a valid
/// detection.
pub struct LivenessVoter {
    config: LivenessConfig,
}

impl LivenessVoter {
    pub fn new(config: LivenessConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, face: &DynamicImage) -> LivenessReport {
        if !self.config.enabled {
            return LivenessReport::live(1.0);
        }

        if face.width() < self.config.min_face_size || face.height() < self.config.min_face_size {
            return LivenessReport::live(0.5);
        }

        let rgb = face.to_rgb8();
        let gray = face.to_luma8();

        let mut failed_checks = Vec::new();
        let checks: [(LivenessCheck, bool); TOTAL_CHECKS as usize] = [
            (LivenessCheck::Specular, specular_highlights(&rgb, &self.config)),
            (LivenessCheck::Sharpness, edge_sharpness(&gray, &self.config)),
            (LivenessCheck::Color, color_anomaly(&rgb, &self.config)),
            (LivenessCheck::Reflection, reflection_pattern(&gray, &self.config)),
            (LivenessCheck::Texture, texture_variance(&gray, &self.config)),
        ];
        for (check, spoofed) in checks {
            if spoofed {
                failed_checks.push(check);
            }
        }

        let num_failed = failed_checks.len() as u32;
        let is_live = num_failed < self.config.min_checks_to_fail;
        let confidence = (TOTAL_CHECKS - num_failed) as f32 / TOTAL_CHECKS as f32;

        let spoof_type = if is_live {
            None
        } else if failed_checks.contains(&LivenessCheck::Specular)
            || failed_checks.contains(&LivenessCheck::Color)
        {
            Some(SpoofType::Screen)
        } else if failed_checks.contains(&LivenessCheck::Reflection)
            || failed_checks.contains(&LivenessCheck::Texture)
        {
            Some(SpoofType::Print)
        } else {
            Some(SpoofType::Unknown)
        };

        LivenessReport { is_live, confidence, failed_checks, spoof_type }
    }
}

/// Screens produce concentrated bright spots from backlight; real skin
/// scatters light diffusely. Fails on a high fraction of near-saturated
/// pixels or several large contiguous bright blobs.
fn specular_highlights(rgb: &image::RgbImage, config: &LivenessConfig) -> bool {
    let total_pixels = (rgb.width() * rgb.height()) as f32;
    let intensity = config.specular_intensity;

    // Brightness as the max channel, independent of saturation.
    let mut brightness = GrayImage::new(rgb.width(), rgb.height());
    let mut bright_pixels = 0u32;
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let v = pixel.0[0].max(pixel.0[1]).max(pixel.0[2]);
        brightness.put_pixel(x, y, Luma([v]));
        if v > intensity {
            bright_pixels += 1;
        }
    }

    let bright_ratio = bright_pixels as f32 / total_pixels;
    if bright_ratio > config.specular_threshold {
        return true;
    }

    // Count contiguous hot spots of meaningful area.
    let mask = threshold(&brightness, intensity, ThresholdType::Binary);
    let labelled = connected_components(&mask, Connectivity::Four, Luma([0u8]));
    let mut areas: HashMap<u32, u32> = HashMap::new();
    for Luma([label]) in labelled.pixels() {
        if *label != 0 {
            *areas.entry(*label).or_insert(0) += 1;
        }
    }
    let significant_regions = areas.values().filter(|&&area| area > 20).count();
    significant_regions >= 3
}

/// Screens and high-resolution prints show uniform pixel-sharp edges;
/// webcam captures of real faces carry natural depth-of-field blur.
fn edge_sharpness(gray: &GrayImage, config: &LivenessConfig) -> bool {
    let laplacian = laplacian_filter(gray);
    let mut sum = 0f64;
    for Luma([v]) in laplacian.pixels() {
        sum += (*v as f64).abs();
    }
    let count = (laplacian.width() * laplacian.height()) as f64;
    if count == 0.0 {
        return false;
    }
    let edge_mean = sum / count;
    edge_mean > config.edge_sharpness_max as f64
}

/// LCD/OLED panels skew blue and cluster values at the extremes.
fn color_anomaly(rgb: &image::RgbImage, config: &LivenessConfig) -> bool {
    let total_pixels = (rgb.width() * rgb.height()) as f64;
    if total_pixels == 0.0 {
        return false;
    }

    let (mut r_sum, mut g_sum, mut b_sum) = (0u64, 0u64, 0u64);
    let mut clipped = 0u64;
    for pixel in rgb.pixels() {
        let [r, g, b] = pixel.0;
        r_sum += r as u64;
        g_sum += g as u64;
        b_sum += b as u64;
        for channel in [r, g, b] {
            if channel < 10 || channel > 250 {
                clipped += 1;
            }
        }
    }

    let r_mean = r_sum as f64 / total_pixels;
    let g_mean = g_sum as f64 / total_pixels;
    let b_mean = b_sum as f64 / total_pixels;

    let blue_ratio = b_mean / ((r_mean + g_mean) / 2.0 + 1e-6);
    let clipping_ratio = clipped as f64 / (3.0 * total_pixels);

    blue_ratio > config.color_blue_shift_max as f64
        || clipping_ratio > config.color_clipping_max as f64
}

/// Real 3D faces vary in brightness across regions (nose brighter than
/// cheeks); flat reproductions do not. Compares variance across the
/// means of a 3x3 grid.
fn reflection_pattern(gray: &GrayImage, config: &LivenessConfig) -> bool {
    let (w, h) = (gray.width(), gray.height());
    if w < 3 || h < 3 {
        return false;
    }

    let mut cell_means = [0f64; 9];
    for i in 0..3u32 {
        for j in 0..3u32 {
            let y1 = i * h / 3;
            let y2 = (i + 1) * h / 3;
            let x1 = j * w / 3;
            let x2 = (j + 1) * w / 3;
            let mut sum = 0u64;
            let mut count = 0u64;
            for y in y1..y2 {
                for x in x1..x2 {
                    sum += gray.get_pixel(x, y).0[0] as u64;
                    count += 1;
                }
            }
            cell_means[(i * 3 + j) as usize] = sum as f64 / count.max(1) as f64;
        }
    }

    let mean = cell_means.iter().sum::<f64>() / 9.0;
    let variance = cell_means.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / 9.0;
    variance < config.reflection_variance_min as f64
}

/// Live skin has micro-texture that survives downscaling; photos and
/// screens look over-smoothed. Measures Laplacian variance at a fixed
/// small resolution so sensor noise does not dominate.
fn texture_variance(gray: &GrayImage, config: &LivenessConfig) -> bool {
    let resized = image::imageops::resize(gray, 100, 100, FilterType::Triangle);
    let laplacian = laplacian_filter(&resized);

    let count = (laplacian.width() * laplacian.height()) as f64;
    let mut sum = 0f64;
    let mut sum_sq = 0f64;
    for Luma([v]) in laplacian.pixels() {
        let v = *v as f64;
        sum += v;
        sum_sq += v * v;
    }
    let mean = sum / count;
    let variance = sum_sq / count - mean * mean;
    variance < config.texture_variance_min as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Uniform mid-gray square: no region variance, no texture.
    fn flat_gray(size: u32) -> DynamicImage {
        let img = RgbImage::from_pixel(size, size, Rgb([128, 128, 128]));
        DynamicImage::ImageRgb8(img)
    }

    /// Gradient across a 3x3 grid plus a moderate sinusoidal texture:
    /// region variance and micro-texture without sharp pixel edges.
    fn textured_face(size: u32) -> DynamicImage {
        let mut img = RgbImage::new(size, size);
        for y in 0..size {
            for x in 0..size {
                let base = 60.0
                    + 30.0 * (x * 3 / size) as f32
                    + 20.0 * (y * 3 / size) as f32;
                let phase_x = x as f32 * std::f32::consts::TAU / 10.0;
                let phase_y = y as f32 * std::f32::consts::TAU / 10.0;
                let ripple = 35.0 * phase_x.sin() * phase_y.sin();
                let v = (base + ripple).clamp(0.0, 255.0) as u8;
                img.put_pixel(x, y, Rgb([v, v, v]));
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn flat_image_is_flagged_as_print_spoof() {
        let voter = LivenessVoter::new(LivenessConfig::default());
        let report = voter.evaluate(&flat_gray(120));

        assert!(!report.is_live);
        assert!(report.failed_checks.contains(&LivenessCheck::Reflection));
        assert!(report.failed_checks.contains(&LivenessCheck::Texture));
        assert_eq!(report.spoof_type, Some(SpoofType::Print));
        assert!(report.confidence < 1.0);
    }

    #[test]
    fn textured_image_is_live() {
        let voter = LivenessVoter::new(LivenessConfig::default());
        let report = voter.evaluate(&textured_face(120));

        assert!(report.is_live, "failed checks: {:?}", report.failed_checks);
        assert!(report.spoof_type.is_none());
    }

    #[test]
    fn blue_shifted_flat_image_is_a_screen_spoof() {
        let voter = LivenessVoter::new(LivenessConfig::default());
        let img = RgbImage::from_pixel(120, 120, Rgb([100, 100, 150]));
        let report = voter.evaluate(&DynamicImage::ImageRgb8(img));

        assert!(!report.is_live);
        assert!(report.failed_checks.contains(&LivenessCheck::Color));
        // Screen classification takes priority over print.
        assert_eq!(report.spoof_type, Some(SpoofType::Screen));
    }

    #[test]
    fn small_faces_fail_open() {
        let voter = LivenessVoter::new(LivenessConfig::default());
        let report = voter.evaluate(&flat_gray(30));

        assert!(report.is_live);
        assert_eq!(report.confidence, 0.5);
        assert!(report.failed_checks.is_empty());
    }

    #[test]
    fn disabled_voter_reports_full_confidence() {
        let config = LivenessConfig { enabled: false, ..LivenessConfig::default() };
        let voter = LivenessVoter::new(config);
        let report = voter.evaluate(&flat_gray(120));

        assert!(report.is_live);
        assert_eq!(report.confidence, 1.0);
    }

    #[test]
    fn single_check_threshold_flags_flat_image_harder() {
        let config = LivenessConfig { min_checks_to_fail: 1, ..LivenessConfig::default() };
        let voter = LivenessVoter::new(config);
        // Smooth ramp: region variance without any micro-texture, so
        // only the texture check fails.
        let mut img = RgbImage::new(120, 120);
        for y in 0..120 {
            for x in 0..120 {
                let v = (40 + x) as u8;
                img.put_pixel(x, y, Rgb([v, v, v]));
            }
        }
        let report = voter.evaluate(&DynamicImage::ImageRgb8(img));
        assert!(!report.is_live);
        assert_eq!(report.failed_checks, vec![LivenessCheck::Texture]);
    }
}

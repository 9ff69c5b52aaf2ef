//! Read-only quality assessment.
//!
//! Four metrics drive both the issue list shown to the user and the
//! adaptive enhancement plan:
//! - brightness: mean grayscale intensity, 0..1
//! - contrast: grayscale standard deviation / 128, ~0..2
//! - sharpness: mean gradient magnitude (central differences)
//! - noise: mean per-channel standard deviation, 0..~127

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

/// Quality scores for an image, computed before enhancement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub brightness: f32,
    pub contrast: f32,
    pub sharpness: f32,
    pub noise: f32,
}

/// Thresholds tuned for radiography-style grayscale content.
const LOW_BRIGHTNESS: f32 = 0.3;
const POOR_CONTRAST: f32 = 0.4;
const LOW_SHARPNESS: f32 = 30.0;
const HIGH_NOISE: f32 = 25.0;

/// Quality problems worth surfacing, each with a capture-side fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityIssue {
    LowBrightness,
    PoorContrast,
    LowSharpness,
    HighNoise,
}

impl QualityIssue {
    pub fn label(&self) -> &'static str {
        match self {
            QualityIssue::LowBrightness => "Low brightness",
            QualityIssue::PoorContrast => "Poor contrast",
            QualityIssue::LowSharpness => "Low sharpness",
            QualityIssue::HighNoise => "High noise levels",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            QualityIssue::LowBrightness => {
                "Consider adjusting exposure settings during image capture"
            }
            QualityIssue::PoorContrast => "Adjust X-ray intensity or detector settings",
            QualityIssue::LowSharpness => "Check for motion blur or focus issues",
            QualityIssue::HighNoise => {
                "Consider using noise reduction techniques or updating equipment"
            }
        }
    }
}

/// Compute all four metrics in one pass over the decoded image.
pub fn analyze_quality(img: &DynamicImage) -> QualityMetrics {
    let gray = img.to_luma8();
    let (mean, stdev) = mean_stdev(&gray);

    QualityMetrics {
        brightness: mean / 255.0,
        contrast: stdev / 128.0,
        sharpness: gradient_sharpness(&gray),
        noise: channel_noise(img),
    }
}

/// Issues derived from metric thresholds, in a stable order.
pub fn derive_issues(metrics: &QualityMetrics) -> Vec<QualityIssue> {
    let mut issues = Vec::new();
    if metrics.brightness < LOW_BRIGHTNESS {
        issues.push(QualityIssue::LowBrightness);
    }
    if metrics.contrast < POOR_CONTRAST {
        issues.push(QualityIssue::PoorContrast);
    }
    if metrics.sharpness < LOW_SHARPNESS {
        issues.push(QualityIssue::LowSharpness);
    }
    if metrics.noise > HIGH_NOISE {
        issues.push(QualityIssue::HighNoise);
    }
    issues
}

fn mean_stdev(gray: &GrayImage) -> (f32, f32) {
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for pixel in gray.pixels() {
        let v = pixel.0[0] as f64;
        sum += v;
        sum_sq += v * v;
        count += 1;
    }

    if count == 0 {
        return (0.0, 0.0);
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - mean * mean;
    (mean as f32, variance.max(0.0).sqrt() as f32)
}

/// Mean gradient magnitude via central differences.
///
/// Sharp edges push the average up; uniform or blurred regions pull it
/// toward zero. Averaged over the full pixel count so the score is
/// comparable across image sizes. Crisp radiographs land well above 30,
/// motion-blurred captures below it.
fn gradient_sharpness(gray: &GrayImage) -> f32 {
    let (w, h) = (gray.width(), gray.height());
    let total = (w as u64) * (h as u64);
    if w < 3 || h < 3 || total == 0 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let dx = (gray.get_pixel(x + 1, y).0[0] as f64
                - gray.get_pixel(x - 1, y).0[0] as f64)
                .abs();
            let dy = (gray.get_pixel(x, y + 1).0[0] as f64
                - gray.get_pixel(x, y - 1).0[0] as f64)
                .abs();
            sum += (dx * dx + dy * dy).sqrt();
        }
    }

    (sum / total as f64) as f32
}

/// Mean per-channel standard deviation.
fn channel_noise(img: &DynamicImage) -> f32 {
    let rgb = img.to_rgb8();
    let count = (rgb.width() as u64) * (rgb.height() as u64);
    if count == 0 {
        return 0.0;
    }

    let mut sum = [0.0f64; 3];
    let mut sum_sq = [0.0f64; 3];
    for pixel in rgb.pixels() {
        for c in 0..3 {
            let v = pixel.0[c] as f64;
            sum[c] += v;
            sum_sq[c] += v * v;
        }
    }

    let mut total = 0.0f64;
    for c in 0..3 {
        let mean = sum[c] / count as f64;
        let variance = (sum_sq[c] / count as f64) - mean * mean;
        total += variance.max(0.0).sqrt();
    }
    (total / 3.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn gray_image(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([value])))
    }

    #[test]
    fn uniform_midgray_scores() {
        let metrics = analyze_quality(&gray_image(64, 64, 128));
        assert!((metrics.brightness - 128.0 / 255.0).abs() < 0.01);
        assert!(metrics.contrast < 0.01);
        assert!(metrics.sharpness < 0.01);
        assert!(metrics.noise < 0.01);
    }

    #[test]
    fn dark_image_has_low_brightness() {
        let metrics = analyze_quality(&gray_image(64, 64, 20));
        assert!(metrics.brightness < 0.1);
        let issues = derive_issues(&metrics);
        assert!(issues.contains(&QualityIssue::LowBrightness));
    }

    #[test]
    fn striped_image_is_sharp_and_contrasty() {
        // Vertical stripes two pixels wide: every interior pixel sees a
        // full-range central difference.
        let mut img = GrayImage::new(64, 64);
        for (x, _y, p) in img.enumerate_pixels_mut() {
            p.0[0] = if (x / 2) % 2 == 0 { 0 } else { 255 };
        }
        let metrics = analyze_quality(&DynamicImage::ImageLuma8(img));
        assert!(metrics.sharpness > 100.0, "got {}", metrics.sharpness);
        assert!(metrics.contrast > 0.9);
        let issues = derive_issues(&metrics);
        assert!(!issues.contains(&QualityIssue::LowSharpness));
        assert!(!issues.contains(&QualityIssue::PoorContrast));
    }

    #[test]
    fn speckled_image_scores_noisy() {
        // Deterministic pseudo-noise: wide per-pixel spread in every channel.
        let mut img = RgbImage::new(64, 64);
        let mut state = 0x12345678u32;
        for p in img.pixels_mut() {
            for c in 0..3 {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                p.0[c] = (state >> 24) as u8;
            }
        }
        let metrics = analyze_quality(&DynamicImage::ImageRgb8(img));
        assert!(metrics.noise > HIGH_NOISE, "got {}", metrics.noise);
        assert!(derive_issues(&metrics).contains(&QualityIssue::HighNoise));
    }

    #[test]
    fn tiny_images_do_not_panic() {
        let metrics = analyze_quality(&gray_image(1, 1, 200));
        assert_eq!(metrics.sharpness, 0.0);
        let metrics = analyze_quality(&gray_image(100, 1, 10));
        assert_eq!(metrics.sharpness, 0.0);
    }

    #[test]
    fn issue_order_is_stable() {
        let metrics = QualityMetrics {
            brightness: 0.1,
            contrast: 0.1,
            sharpness: 1.0,
            noise: 90.0,
        };
        let issues = derive_issues(&metrics);
        assert_eq!(
            issues,
            vec![
                QualityIssue::LowBrightness,
                QualityIssue::PoorContrast,
                QualityIssue::LowSharpness,
                QualityIssue::HighNoise,
            ]
        );
    }

    #[test]
    fn labels_and_recommendations_pair_up() {
        for issue in [
            QualityIssue::LowBrightness,
            QualityIssue::PoorContrast,
            QualityIssue::LowSharpness,
            QualityIssue::HighNoise,
        ] {
            assert!(!issue.label().is_empty());
            assert!(!issue.recommendation().is_empty());
        }
    }
}

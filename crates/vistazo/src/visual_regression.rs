//! Image comparison for visual regression.
//!
//! Divergence is the fraction of pixels whose summed RGB channel difference
//! exceeds a per-pixel color threshold. Images of different dimensions are
//! maximally divergent.

use crate::result::{VistazoError, VistazoResult};
use image::{Rgba, RgbaImage};
use std::path::Path;

/// Default tolerated fraction of differing pixels
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// Default per-pixel color difference threshold (sum of RGB deltas)
pub const DEFAULT_COLOR_THRESHOLD: u8 = 10;

/// Configuration for visual regression testing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualRegressionConfig {
    /// Per-pixel color difference threshold (0-255)
    pub color_threshold: u8,
}

impl Default for VisualRegressionConfig {
    fn default() -> Self {
        Self {
            color_threshold: DEFAULT_COLOR_THRESHOLD,
        }
    }
}

impl VisualRegressionConfig {
    /// Set the color threshold
    #[must_use]
    pub const fn with_color_threshold(mut self, threshold: u8) -> Self {
        self.color_threshold = threshold;
        self
    }
}

/// Result of comparing two images
#[derive(Debug, Clone)]
pub struct ImageDiffResult {
    /// Fraction of differing pixels (0.0-1.0)
    pub divergence: f64,
    /// Number of pixels that differ
    pub diff_pixel_count: usize,
    /// Total number of pixels compared
    pub total_pixels: usize,
    /// Maximum color difference found
    pub max_color_diff: u32,
    /// Average color difference for differing pixels
    pub avg_color_diff: f64,
    /// Whether both images had the same dimensions
    pub same_dimensions: bool,
    /// Differences in red over a dimmed copy of the actual image
    pub diff_image: RgbaImage,
}

impl ImageDiffResult {
    /// Check if images are identical (no differences)
    #[must_use]
    pub const fn is_identical(&self) -> bool {
        self.same_dimensions && self.diff_pixel_count == 0
    }

    /// Whether divergence strictly exceeds `tolerance`
    #[must_use]
    pub fn exceeds(&self, tolerance: f64) -> bool {
        self.divergence > tolerance
    }

    /// Write the diff image as PNG
    pub fn save_diff(&self, path: &Path) -> VistazoResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.diff_image.save(path).map_err(|e| VistazoError::ImageComparisonError {
            message: format!("Failed to write diff image {}: {e}", path.display()),
        })
    }
}

/// Visual regression tester
#[derive(Debug, Clone, Default)]
pub struct VisualRegressionTester {
    config: VisualRegressionConfig,
}

impl VisualRegressionTester {
    /// Create a new tester with configuration
    #[must_use]
    pub const fn new(config: VisualRegressionConfig) -> Self {
        Self { config }
    }

    /// Compare two images from byte arrays (any format the image crate decodes)
    pub fn compare_bytes(&self, actual: &[u8], expected: &[u8]) -> VistazoResult<ImageDiffResult> {
        let actual = image::load_from_memory(actual).map_err(|e| {
            VistazoError::ImageComparisonError {
                message: format!("Failed to decode actual image: {e}"),
            }
        })?;
        let expected = image::load_from_memory(expected).map_err(|e| {
            VistazoError::ImageComparisonError {
                message: format!("Failed to decode expected image: {e}"),
            }
        })?;
        Ok(self.compare(&actual.to_rgba8(), &expected.to_rgba8()))
    }

    /// Compare two image files
    pub fn compare_files(&self, actual: &Path, expected: &Path) -> VistazoResult<ImageDiffResult> {
        let actual = image::open(actual)?.to_rgba8();
        let expected = image::open(expected)?.to_rgba8();
        Ok(self.compare(&actual, &expected))
    }

    /// Compare decoded images
    #[must_use]
    pub fn compare(&self, actual: &RgbaImage, expected: &RgbaImage) -> ImageDiffResult {
        let same_dimensions = actual.dimensions() == expected.dimensions();
        let width = actual.width().max(expected.width());
        let height = actual.height().max(expected.height());

        let mut diff_pixel_count = 0usize;
        let mut max_color_diff: u32 = 0;
        let mut total_color_diff: u64 = 0;
        let mut diff_img = RgbaImage::new(width, height);

        for y in 0..height {
            for x in 0..width {
                let pair = (
                    (x < actual.width() && y < actual.height()).then(|| *actual.get_pixel(x, y)),
                    (x < expected.width() && y < expected.height())
                        .then(|| *expected.get_pixel(x, y)),
                );
                let differs = match pair {
                    (Some(a), Some(e)) => {
                        let color_diff = pixel_diff(a, e);
                        if color_diff > u32::from(self.config.color_threshold) {
                            total_color_diff += u64::from(color_diff);
                            max_color_diff = max_color_diff.max(color_diff);
                            true
                        } else {
                            let Rgba([r, g, b, _]) = a;
                            diff_img.put_pixel(x, y, Rgba([r / 2, g / 2, b / 2, 128]));
                            false
                        }
                    }
                    _ => true,
                };
                if differs {
                    diff_pixel_count += 1;
                    diff_img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
                }
            }
        }

        let total_pixels = (width as usize) * (height as usize);
        let divergence = if !same_dimensions {
            1.0
        } else if total_pixels > 0 {
            diff_pixel_count as f64 / total_pixels as f64
        } else {
            0.0
        };
        let avg_color_diff = if diff_pixel_count > 0 {
            total_color_diff as f64 / diff_pixel_count as f64
        } else {
            0.0
        };

        ImageDiffResult {
            divergence,
            diff_pixel_count,
            total_pixels,
            max_color_diff,
            avg_color_diff,
            same_dimensions,
            diff_image: diff_img,
        }
    }

    /// Get configuration
    #[must_use]
    pub const fn config(&self) -> &VisualRegressionConfig {
        &self.config
    }
}

/// Calculate pixel difference (sum of RGB channel differences)
fn pixel_diff(a: Rgba<u8>, b: Rgba<u8>) -> u32 {
    let Rgba([r1, g1, b1, _]) = a;
    let Rgba([r2, g2, b2, _]) = b;

    let dr = i32::from(r1) - i32::from(r2);
    let dg = i32::from(g1) - i32::from(g2);
    let db = i32::from(b1) - i32::from(b2);

    dr.unsigned_abs() + dg.unsigned_abs() + db.unsigned_abs()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(color))
    }

    #[test]
    fn test_identical_images_have_zero_divergence() {
        let img = solid(10, 10, [40, 80, 120, 255]);
        let result = VisualRegressionTester::default().compare(&img, &img);
        assert!(result.is_identical());
        assert_eq!(result.divergence, 0.0);
        assert!(!result.exceeds(0.0));
    }

    #[test]
    fn test_fraction_of_differing_pixels() {
        let expected = solid(10, 10, [0, 0, 0, 255]);
        let mut actual = expected.clone();
        for x in 0..10 {
            actual.put_pixel(x, 0, Rgba([255, 255, 255, 255]));
        }
        let result = VisualRegressionTester::default().compare(&actual, &expected);
        assert_eq!(result.diff_pixel_count, 10);
        assert!((result.divergence - 0.1).abs() < f64::EPSILON);
        assert!(result.exceeds(0.05));
        assert!(!result.exceeds(0.1));
        assert_eq!(result.max_color_diff, 765);
    }

    #[test]
    fn test_small_color_jitter_is_ignored() {
        let expected = solid(4, 4, [100, 100, 100, 255]);
        let actual = solid(4, 4, [103, 102, 101, 255]);
        let result = VisualRegressionTester::default().compare(&actual, &expected);
        assert!(result.is_identical());

        let strict = VisualRegressionTester::new(VisualRegressionConfig::default().with_color_threshold(0));
        assert_eq!(strict.compare(&actual, &expected).divergence, 1.0);
    }

    #[test]
    fn test_dimension_mismatch_is_full_divergence() {
        let result =
            VisualRegressionTester::default().compare(&solid(4, 4, [0; 4]), &solid(4, 5, [0; 4]));
        assert!(!result.same_dimensions);
        assert_eq!(result.divergence, 1.0);
        assert_eq!(result.diff_image.dimensions(), (4, 5));
    }

    #[test]
    fn test_compare_bytes_rejects_garbage() {
        let err = VisualRegressionTester::default()
            .compare_bytes(b"not an image", b"nor this")
            .unwrap_err();
        assert!(matches!(err, VistazoError::ImageComparisonError { .. }));
    }

    #[test]
    fn test_save_diff_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let result = VisualRegressionTester::default()
            .compare(&solid(2, 2, [0, 0, 0, 255]), &solid(2, 2, [255, 0, 0, 255]));
        let path = dir.path().join("nested").join("x-diff.png");
        result.save_diff(&path).unwrap();
        assert!(path.is_file());
    }
}

//! Pixel-level image signals
//!
//! The heuristic scorers do not look at pixels directly. They read a small
//! set of statistics computed once per image: Sobel edge density and
//! gradient variance, RGB variance, quadrant brightness spread and Laplacian
//! variance. Large images are downscaled before the statistics are taken.
//!
//! [`seeded_unit`] turns a content hash into reproducible pseudo-random
//! values so that every score is a pure function of the image bytes.

use image::{DynamicImage, GenericImageView, GrayImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Longest side, in pixels, that signal extraction works on
pub const ANALYSIS_MAX_SIDE: u32 = 512;

/// Sobel magnitude above which a pixel counts as an edge
pub const EDGE_MAGNITUDE_THRESHOLD: f64 = 100.0;

/// Statistics extracted from a decoded image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageSignals {
    /// Original width in pixels
    pub width: u32,
    /// Original height in pixels
    pub height: u32,
    /// Fraction of pixels whose Sobel magnitude exceeds the edge threshold
    pub edge_density: f64,
    /// Variance over every RGB channel value
    pub color_variance: f64,
    /// Variance of the Sobel gradient magnitude
    pub gradient_variance: f64,
    /// Variance of the four quadrant brightness means
    pub lighting_variance: f64,
    /// Variance of the Laplacian response
    pub sharpness: f64,
}

impl ImageSignals {
    /// Decodes the bytes and extracts signals
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory(bytes)?;
        Ok(Self::from_image(&img))
    }

    /// Extracts signals from an already decoded image
    pub fn from_image(img: &DynamicImage) -> Self {
        let (width, height) = img.dimensions();

        let working = if width > ANALYSIS_MAX_SIDE || height > ANALYSIS_MAX_SIDE {
            img.thumbnail(ANALYSIS_MAX_SIDE, ANALYSIS_MAX_SIDE)
        } else {
            img.clone()
        };

        let rgb = working.to_rgb8();
        let color_variance = variance(rgb.as_raw().iter().map(|&v| v as f64));

        let luma = working.to_luma8();
        let magnitudes = sobel_magnitudes(&luma);
        let edge_density = if magnitudes.is_empty() {
            0.0
        } else {
            let edges = magnitudes
                .iter()
                .filter(|&&m| m > EDGE_MAGNITUDE_THRESHOLD)
                .count();
            edges as f64 / (luma.width() as f64 * luma.height() as f64)
        };
        let gradient_variance = variance(magnitudes.iter().copied());

        Self {
            width,
            height,
            edge_density,
            color_variance,
            gradient_variance,
            lighting_variance: quadrant_variance(&luma),
            sharpness: variance(laplacian(&luma).into_iter()),
        }
    }

    /// Width divided by height
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }
}

/// Maps a content hash and a salt to a reproducible value in `[0, 1]`
pub fn seeded_unit(content_hash: &str, salt: &str) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(content_hash.as_bytes());
    hasher.update(b":");
    hasher.update(salt.as_bytes());
    let digest = hasher.finalize();

    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(word) as f64 / u64::MAX as f64
}

/// Maps a content hash and a salt to a reproducible value in `[low, high]`
pub fn seeded_range(content_hash: &str, salt: &str, low: f64, high: f64) -> f64 {
    low + (high - low) * seeded_unit(content_hash, salt)
}

/// Lower-case hex SHA-256 of the bytes
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn variance(values: impl Iterator<Item = f64>) -> f64 {
    let mut count = 0u64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for v in values {
        count += 1;
        sum += v;
        sum_sq += v * v;
    }
    if count == 0 {
        return 0.0;
    }
    let mean = sum / count as f64;
    (sum_sq / count as f64 - mean * mean).max(0.0)
}

fn sobel_magnitudes(luma: &GrayImage) -> Vec<f64> {
    let (w, h) = luma.dimensions();
    if w < 3 || h < 3 {
        return Vec::new();
    }

    let px = |x: u32, y: u32| luma.get_pixel(x, y)[0] as f64;
    let mut out = Vec::with_capacity(((w - 2) * (h - 2)) as usize);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = (px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x - 1, y) + px(x - 1, y + 1));
            let gy = (px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x, y - 1) + px(x + 1, y - 1));
            out.push((gx * gx + gy * gy).sqrt());
        }
    }
    out
}

fn laplacian(luma: &GrayImage) -> Vec<f64> {
    let (w, h) = luma.dimensions();
    if w < 3 || h < 3 {
        return Vec::new();
    }

    let px = |x: u32, y: u32| luma.get_pixel(x, y)[0] as f64;
    let mut out = Vec::with_capacity(((w - 2) * (h - 2)) as usize);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            out.push(px(x, y - 1) + px(x, y + 1) + px(x - 1, y) + px(x + 1, y) - 4.0 * px(x, y));
        }
    }
    out
}

fn quadrant_variance(luma: &GrayImage) -> f64 {
    let (w, h) = luma.dimensions();
    if w < 2 || h < 2 {
        return 0.0;
    }

    let (mx, my) = (w / 2, h / 2);
    let quadrants = [(0, 0, mx, my), (mx, 0, w, my), (0, my, mx, h), (mx, my, w, h)];
    let means = quadrants.iter().map(|&(x0, y0, x1, y1)| {
        let mut sum = 0.0;
        for y in y0..y1 {
            for x in x0..x1 {
                sum += luma.get_pixel(x, y)[0] as f64;
            }
        }
        sum / ((x1 - x0) as f64 * (y1 - y0) as f64)
    });
    variance(means)
}

use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use std::io::Cursor;
use thiserror::Error;

// ── Normalization parameters ──────────────────────────────────────────────────

/// Linear contrast gain applied after grayscale conversion.
pub const CONTRAST_ALPHA: f32 = 2.0;
/// Offset added after the gain.
pub const CONTRAST_BETA: f32 = 0.0;
/// Side of the square neighborhood used for the adaptive threshold (odd).
pub const THRESHOLD_BLOCK_SIZE: usize = 11;
/// Subtracted from the local Gaussian mean before comparing.
pub const THRESHOLD_C: i32 = 2;
/// Side of the square speckle-suppression blur kernel (odd).
pub const BLUR_KERNEL_SIZE: usize = 3;

const INK: u8 = 0;
const BACKGROUND: u8 = 255;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
}

/// Grayscale → contrast ×2 → Gaussian adaptive threshold → 3×3 Gaussian blur.
///
/// Every step is full-frame and returns a fresh buffer; the output always has
/// the source's dimensions.
pub fn normalize(img: &DynamicImage) -> GrayImage {
    let gray = to_grayscale(img);
    let contrast = scale_contrast(&gray);
    let binary = adaptive_threshold(&contrast);
    gaussian_blur(&binary)
}

/// Rec.601 luma weights for R, G, B.
pub const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// `0.299·R + 0.587·G + 0.114·B`, rounded.
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    let rgb = img.to_rgb8();
    ImageBuffer::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = LUMA_WEIGHTS[0] * r as f32
            + LUMA_WEIGHTS[1] * g as f32
            + LUMA_WEIGHTS[2] * b as f32;
        Luma([saturate(luma)])
    })
}

/// `|p · α + β|`, saturated to `0..=255`.
pub fn scale_contrast(gray: &GrayImage) -> GrayImage {
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let p = gray.get_pixel(x, y)[0] as f32;
        let v = (p * CONTRAST_ALPHA + CONTRAST_BETA).abs().round().min(255.0);
        Luma([v as u8])
    })
}

/// Binarize against a Gaussian-weighted local mean minus [`THRESHOLD_C`].
///
/// A pixel is background when `p > mean - C`, ink otherwise. Borders replicate
/// the edge pixel, so a uniform image thresholds to all background.
pub fn adaptive_threshold(gray: &GrayImage) -> GrayImage {
    let kernel = gaussian_kernel(THRESHOLD_BLOCK_SIZE);
    let mean = convolve_separable(gray, &kernel, Border::Replicate);
    let width = gray.width() as usize;

    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let p = gray.get_pixel(x, y)[0] as i32;
        let m = saturate(mean[y as usize * width + x as usize]) as i32;
        Luma([if p - m > -THRESHOLD_C { BACKGROUND } else { INK }])
    })
}

/// Small Gaussian blur that softens isolated flipped pixels left by thresholding.
pub fn gaussian_blur(gray: &GrayImage) -> GrayImage {
    let kernel = gaussian_kernel(BLUR_KERNEL_SIZE);
    let blurred = convolve_separable(gray, &kernel, Border::Reflect101);
    let width = gray.width() as usize;

    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([saturate(blurred[y as usize * width + x as usize])])
    })
}

/// Encode a normalized image as PNG for the recognizer.
pub fn encode_as_png(img: &GrayImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}

// ── Convolution helpers ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Border {
    /// `aaa|abcd|ddd`
    Replicate,
    /// `cb|abcd|cb`
    Reflect101,
}

impl Border {
    fn index(self, i: i64, n: i64) -> usize {
        match self {
            Border::Replicate => i.clamp(0, n - 1) as usize,
            Border::Reflect101 => {
                if n == 1 {
                    return 0;
                }
                let mut i = i;
                while i < 0 || i >= n {
                    if i < 0 {
                        i = -i;
                    }
                    if i >= n {
                        i = 2 * (n - 1) - i;
                    }
                }
                i as usize
            }
        }
    }
}

/// Normalized 1-D Gaussian weights for an odd `size`.
///
/// Sizes up to 7 use the fixed binomial tables; larger sizes derive sigma as
/// `0.3·((size−1)/2 − 1) + 0.8`.
fn gaussian_kernel(size: usize) -> Vec<f32> {
    match size {
        1 => return vec![1.0],
        3 => return vec![0.25, 0.5, 0.25],
        5 => return vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
        7 => {
            return vec![0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125]
        }
        _ => {}
    }

    let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size as f64 - 1.0) / 2.0;
    let raw: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - center;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|w| (w / sum) as f32).collect()
}

/// Horizontal then vertical pass; returns a row-major `f32` plane.
fn convolve_separable(gray: &GrayImage, kernel: &[f32], border: Border) -> Vec<f32> {
    let (w, h) = (gray.width() as i64, gray.height() as i64);
    let radius = (kernel.len() / 2) as i64;
    let src = gray.as_raw();

    let mut horizontal = vec![0f32; src.len()];
    for y in 0..h {
        let row = (y * w) as usize;
        for x in 0..w {
            horizontal[row + x as usize] = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    let sx = border.index(x + k as i64 - radius, w);
                    src[row + sx] as f32 * weight
                })
                .sum();
        }
    }

    let mut out = vec![0f32; src.len()];
    for y in 0..h {
        for x in 0..w {
            out[(y * w + x) as usize] = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    let sy = border.index(y + k as i64 - radius, h) as i64;
                    horizontal[(sy * w + x) as usize] * weight
                })
                .sum();
        }
    }
    out
}

fn saturate(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

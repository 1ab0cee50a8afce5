//! Image cleanup applied to every page before OCR.

use crate::error::LedgerError;
use image::{imageops::FilterType, DynamicImage, GenericImageView, GrayImage, Luma};
use std::str::FromStr;
use std::time::Instant;

/// Images whose shorter side is below this are scaled up to it.
const MIN_SHORT_SIDE: u32 = 600;
/// Maximum dimension to avoid memory issues
const MAX_DIMENSION: u32 = 4000;

/// Preprocessing preset names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// Hand the image to the engine untouched
    None,
    /// grayscale, resize, denoise, normalize
    #[default]
    Default,
}

impl Preset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Default => "default",
        }
    }

    pub fn apply(&self, image: DynamicImage) -> DynamicImage {
        if *self == Preset::None {
            return image;
        }

        let start = Instant::now();
        let image = run_step("grayscale", image, grayscale);
        let image = run_step("resize", image, resize);
        let image = run_step("denoise", image, denoise);
        let image = run_step("normalize", image, normalize);
        tracing::debug!(
            "Preprocessing ({}) took {}ms",
            self.as_str(),
            start.elapsed().as_millis()
        );
        image
    }
}

impl FromStr for Preset {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "default" => Ok(Self::Default),
            other => Err(LedgerError::InvalidRequest(format!(
                "Unknown preprocessing preset '{}'. Use 'none' or 'default'",
                other
            ))),
        }
    }
}

fn run_step(
    name: &str,
    image: DynamicImage,
    step: fn(DynamicImage) -> DynamicImage,
) -> DynamicImage {
    let start = Instant::now();
    let image = step(image);
    tracing::trace!("{} step: {}us", name, start.elapsed().as_micros());
    image
}

fn grayscale(image: DynamicImage) -> DynamicImage {
    DynamicImage::ImageLuma8(image.to_luma8())
}

/// Target size for `(width, height)`, or `None` when it is already fine.
fn target_size(width: u32, height: u32) -> Option<(u32, u32)> {
    let short = width.min(height).max(1);
    let long = width.max(height).max(1);

    let mut scale = 1.0f64;
    if short < MIN_SHORT_SIDE {
        scale = MIN_SHORT_SIDE as f64 / short as f64;
    }
    if long as f64 * scale > MAX_DIMENSION as f64 {
        scale = MAX_DIMENSION as f64 / long as f64;
    }

    if (scale - 1.0).abs() < 0.01 {
        return None;
    }

    let scaled = |v: u32| ((v as f64 * scale).round() as u32).max(1);
    Some((scaled(width), scaled(height)))
}

fn resize(image: DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    match target_size(width, height) {
        Some((w, h)) => image.resize_exact(w, h, FilterType::Lanczos3),
        None => image,
    }
}

/// 3x3 median, enough to drop scanner speckle without eating strokes
fn denoise(image: DynamicImage) -> DynamicImage {
    let gray = image.to_luma8();
    DynamicImage::ImageLuma8(imageproc::filter::median_filter(&gray, 1, 1))
}

/// Stretch the histogram so pixel values use the full 0-255 range
fn normalize(image: DynamicImage) -> DynamicImage {
    let gray = image.to_luma8();
    let (min_val, max_val) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(min, max), p| (min.min(p.0[0]), max.max(p.0[0])));

    if max_val <= min_val {
        return DynamicImage::ImageLuma8(gray);
    }

    let range = (max_val - min_val) as f32;
    let stretched = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let pixel = gray.get_pixel(x, y).0[0];
        Luma([((pixel - min_val) as f32 / range * 255.0).round() as u8])
    });

    DynamicImage::ImageLuma8(stretched)
}

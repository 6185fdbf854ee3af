//! The bouncing logo: a one-bit bitmap, built in or loaded from an image.
//!
//! ## Rust concepts
//! - `impl Iterator` return types
//! - `#[from]` conversions so `?` turns library errors into `LogoError`

use crate::bounce::Extent;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageReader};
use std::path::Path;
use thiserror::Error;

/// Size of the built-in logo, matching the classic 46x26 icon.
pub const BUILTIN_WIDTH: u32 = 46;
pub const BUILTIN_HEIGHT: u32 = 26;

/// Pixels darker than this (0-255 luma) are treated as background.
const LUMA_THRESHOLD: u8 = 64;
/// Pixels more transparent than this are treated as background.
const ALPHA_THRESHOLD: u8 = 128;

#[derive(Debug, Error)]
pub enum LogoError {
    #[error("failed to read logo: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode logo: {0}")]
    Decode(#[from] image::ImageError),
    #[error("logo has no visible pixels")]
    Empty,
}

/// A monochrome bitmap. Lit pixels are drawn, the rest are left black.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Logo {
    width: u32,
    height: u32,
    mask: Vec<bool>,
}

impl Logo {
    /// The default logo: an elliptical ring around a solid disc.
    pub fn builtin() -> Self {
        let (w, h) = (BUILTIN_WIDTH, BUILTIN_HEIGHT);
        let cx = (w as f32 - 1.0) / 2.0;
        let cy = (h as f32 - 1.0) / 2.0;

        // Normalised squared distance from the centre: 1.0 on the outer edge.
        let dist = |x: u32, y: u32| {
            let nx = (x as f32 - cx) / (w as f32 / 2.0);
            let ny = (y as f32 - cy) / (h as f32 / 2.0);
            nx * nx + ny * ny
        };

        let mut mask = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                let d = dist(x, y);
                let ring = (0.70..=1.0).contains(&d);
                let disc = d <= 0.25;
                mask.push(ring || disc);
            }
        }

        Self {
            width: w,
            height: h,
            mask,
        }
    }

    /// Load a logo from an image file, shrinking it to fit `max` if needed.
    ///
    /// Bright, opaque pixels are lit. Transparent or dark pixels are not.
    pub fn load(path: &Path, max: Extent) -> Result<Self, LogoError> {
        let img = ImageReader::open(path)?.decode()?;
        Self::from_image(&img, max)
    }

    pub fn from_image(img: &DynamicImage, max: Extent) -> Result<Self, LogoError> {
        let (w, h) = img.dimensions();
        let img = if w > max.width || h > max.height {
            // `resize` keeps the aspect ratio and fits inside the box.
            img.resize(max.width, max.height, FilterType::Lanczos3)
        } else {
            img.clone()
        };

        let rgba = img.to_rgba8();
        let mask: Vec<bool> = rgba
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0;
                let luma = (r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000;
                a >= ALPHA_THRESHOLD && luma >= LUMA_THRESHOLD as u32
            })
            .collect();

        if !mask.iter().any(|&lit| lit) {
            return Err(LogoError::Empty);
        }

        Ok(Self {
            width: rgba.width(),
            height: rgba.height(),
            mask,
        })
    }

    pub fn extent(&self) -> Extent {
        Extent::new(self.width, self.height)
    }

    pub fn is_lit(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.mask[(y * self.width + x) as usize]
    }

    /// Coordinates of every lit pixel, relative to the logo's top-left.
    pub fn lit_pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.width;
        self.mask
            .iter()
            .enumerate()
            .filter(|&(_, &lit)| lit)
            .map(move |(i, _)| (i as u32 % width, i as u32 / width))
    }
}

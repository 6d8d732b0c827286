//! Equipment Photo Pro - Local Enhancement Filters
//!
//! Used when the AI is unconfigured, over quota, failing, or answers with
//! text instead of an image.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

pub const JPEG_QUALITY: u8 = 95;

/// One adjustment in a filter chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterStep {
    /// Brightness and saturation are multipliers, hue is degrees
    Modulate {
        brightness: f32,
        saturation: f32,
        hue: i32,
    },
    /// Multiplier around mid-grey
    Contrast(f32),
    Gamma(f32),
    Sharpen { sigma: f32, threshold: i32 },
    /// Per-channel median over a `(2r+1)²` window
    Median(u32),
}

impl FilterStep {
    pub fn brightness(factor: f32) -> Self {
        FilterStep::Modulate {
            brightness: factor,
            saturation: 1.0,
            hue: 0,
        }
    }

    pub fn saturation(factor: f32) -> Self {
        FilterStep::Modulate {
            brightness: 1.0,
            saturation: factor,
            hue: 0,
        }
    }

    pub fn apply(&self, img: DynamicImage) -> DynamicImage {
        match *self {
            FilterStep::Modulate {
                brightness,
                saturation,
                hue,
            } => {
                let mut rgb = img.into_rgb8();
                modulate(&mut rgb, brightness, saturation);
                let img = DynamicImage::ImageRgb8(rgb);
                if hue != 0 {
                    img.huerotate(hue)
                } else {
                    img
                }
            }
            FilterStep::Contrast(factor) => img.adjust_contrast((factor - 1.0) * 100.0),
            FilterStep::Gamma(gamma) => {
                let mut rgb = img.into_rgb8();
                apply_gamma(&mut rgb, gamma);
                DynamicImage::ImageRgb8(rgb)
            }
            FilterStep::Sharpen { sigma, threshold } => img.unsharpen(sigma, threshold),
            FilterStep::Median(radius) => {
                if radius == 0 {
                    return img;
                }
                DynamicImage::ImageRgb8(median(&img.into_rgb8(), radius))
            }
        }
    }
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn modulate(img: &mut RgbImage, brightness: f32, saturation: f32) {
    for Rgb(px) in img.pixels_mut() {
        let [r, g, b] = px.map(|c| c as f32 * brightness);
        let luma = 0.299 * r + 0.587 * g + 0.114 * b;
        *px = [r, g, b].map(|c| clamp_u8(luma + (c - luma) * saturation));
    }
}

fn apply_gamma(img: &mut RgbImage, gamma: f32) {
    if gamma <= 0.0 {
        return;
    }

    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = clamp_u8(255.0 * (i as f32 / 255.0).powf(1.0 / gamma));
    }

    for Rgb(px) in img.pixels_mut() {
        *px = px.map(|c| lut[c as usize]);
    }
}

fn median(src: &RgbImage, radius: u32) -> RgbImage {
    let (w, h) = src.dimensions();
    let r = radius as i64;
    let mut window: [Vec<u8>; 3] = Default::default();

    RgbImage::from_fn(w, h, |x, y| {
        for channel in window.iter_mut() {
            channel.clear();
        }
        for dy in -r..=r {
            for dx in -r..=r {
                let sx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
                let sy = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
                let Rgb(px) = src.get_pixel(sx, sy);
                for (channel, value) in window.iter_mut().zip(px) {
                    channel.push(*value);
                }
            }
        }
        Rgb(window.each_mut().map(|channel| {
            channel.sort_unstable();
            channel[channel.len() / 2]
        }))
    })
}

/// Run `steps` in order
pub fn apply_steps(img: DynamicImage, steps: &[FilterStep]) -> DynamicImage {
    steps.iter().fold(img, |img, step| step.apply(img))
}

/// Encode as baseline JPEG
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> AppResult<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), quality);
    DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
    Ok(buf)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRESETS
// ═══════════════════════════════════════════════════════════════════════════════

/// Manual enhancement switches (read from the `promptSettings` form field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSettings {
    pub enhance_lighting: bool,
    pub improve_colors: bool,
    pub sharpen_details: bool,
    pub remove_scratches: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            enhance_lighting: true,
            improve_colors: true,
            sharpen_details: true,
            remove_scratches: false,
        }
    }
}

/// Chain used when no AI result is available
pub fn manual_steps(settings: &FilterSettings) -> Vec<FilterStep> {
    let mut steps = Vec::new();

    if settings.enhance_lighting {
        steps.push(FilterStep::brightness(1.3));
        steps.push(FilterStep::Contrast(1.4));
        steps.push(FilterStep::Gamma(1.15));
    }
    if settings.improve_colors {
        steps.push(FilterStep::saturation(1.4));
    }
    if settings.sharpen_details {
        steps.push(FilterStep::Sharpen {
            sigma: 1.5,
            threshold: 2,
        });
    }

    steps.extend(scratch_steps(settings));
    steps
}

const GUIDED_BRIGHTNESS: f32 = 1.3;
const GUIDED_SATURATION: f32 = 1.5;
const GUIDED_SHARPNESS: f32 = 1.6;
/// Warm shift for the concrete-lot backdrop
const GUIDED_HUE: i32 = 5;

/// Stronger chain used when the AI described the photo but returned no image.
///
/// Lighting, colour and sharpening passes, then a background pass that
/// pushes each further, then a final polish. Scratch removal runs last
/// when enabled.
pub fn ai_guided_steps(settings: &FilterSettings) -> Vec<FilterStep> {
    let mut steps = vec![
        FilterStep::brightness(GUIDED_BRIGHTNESS),
        FilterStep::Contrast(1.4),
        FilterStep::Gamma(1.2),
        FilterStep::Modulate {
            brightness: 1.0,
            saturation: GUIDED_SATURATION,
            hue: GUIDED_HUE,
        },
        FilterStep::Sharpen {
            sigma: GUIDED_SHARPNESS,
            threshold: 2,
        },
        // background
        FilterStep::Modulate {
            brightness: GUIDED_BRIGHTNESS * 1.2,
            saturation: GUIDED_SATURATION * 1.25,
            hue: GUIDED_HUE,
        },
        FilterStep::Sharpen {
            sigma: GUIDED_SHARPNESS * 1.2,
            threshold: 2,
        },
        FilterStep::Gamma(1.15),
        // polish
        FilterStep::Modulate {
            brightness: 1.15,
            saturation: 1.1,
            hue: 0,
        },
        FilterStep::Contrast(1.2),
        FilterStep::Sharpen {
            sigma: 1.3,
            threshold: 2,
        },
    ];

    steps.extend(scratch_steps(settings));
    steps
}

fn scratch_steps(settings: &FilterSettings) -> Vec<FilterStep> {
    if !settings.remove_scratches {
        return Vec::new();
    }
    vec![
        FilterStep::Median(1),
        FilterStep::Sharpen {
            sigma: 0.5,
            threshold: 1,
        },
    ]
}

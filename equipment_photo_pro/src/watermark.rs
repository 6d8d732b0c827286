//! Equipment Photo Pro - Disclosure Watermark
//!
//! Two-line notice in the bottom-left corner of every enhanced image,
//! drawn from a built-in 5x7 bitmap font.

use std::sync::OnceLock;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};

pub const HEADLINE: &str = "ENHANCED BY AI FOR VISUAL PRESENTATION";
pub const SUBLINE: &str = "CERTAIN ARTIFACTS MAY HAVE BEEN MODIFIED DURING PROCESSING";

/// Distance from the left and bottom edges
pub const MARGIN: u32 = 15;
/// Upper bound on the rendered width
pub const MAX_WIDTH: u32 = 500;
/// Narrower than this is unreadable, so it is skipped
const MIN_WIDTH: u32 = 60;

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
const PADDING: u32 = 6;
const LINE_GAP: u32 = 6;

const TEXT_BRIGHT: Rgba<u8> = Rgba([255, 255, 255, 230]);
const TEXT_DIM: Rgba<u8> = Rgba([255, 255, 255, 204]);
const SHADOW: Rgba<u8> = Rgba([0, 0, 0, 77]);

/// Rows top to bottom, low 5 bits, MSB is the leftmost column
fn glyph(c: char) -> [u8; 7] {
    match c.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        _ => [0; 7],
    }
}

/// Pixel width of `text` at `scale` (one blank column between glyphs)
fn text_width(text: &str, scale: u32) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 {
        return 0;
    }
    (n * (GLYPH_W + 1) - 1) * scale
}

fn draw_text(img: &mut RgbaImage, text: &str, x: u32, y: u32, scale: u32, color: Rgba<u8>) {
    let (w, h) = img.dimensions();

    for (i, c) in text.chars().enumerate() {
        let gx = x + i as u32 * (GLYPH_W + 1) * scale;

        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }
                let px = gx + col * scale;
                let py = y + row as u32 * scale;

                for dy in 0..scale {
                    for dx in 0..scale {
                        if px + dx < w && py + dy < h {
                            img.put_pixel(px + dx, py + dy, color);
                        }
                    }
                }
            }
        }
    }
}

/// Full-size notice on a transparent background
fn banner() -> &'static RgbaImage {
    static BANNER: OnceLock<RgbaImage> = OnceLock::new();

    BANNER.get_or_init(|| {
        let (big, small) = (3, 2);
        let width = text_width(HEADLINE, big).max(text_width(SUBLINE, small)) + 2 * PADDING + 1;
        let height = GLYPH_H * big + LINE_GAP + GLYPH_H * small + 2 * PADDING + 1;

        let mut img = RgbaImage::new(width, height);
        let line2_y = PADDING + GLYPH_H * big + LINE_GAP;

        draw_text(&mut img, HEADLINE, PADDING + 1, PADDING + 1, big, SHADOW);
        draw_text(&mut img, SUBLINE, PADDING + 1, line2_y + 1, small, SHADOW);
        draw_text(&mut img, HEADLINE, PADDING, PADDING, big, TEXT_BRIGHT);
        draw_text(&mut img, SUBLINE, PADDING, line2_y, small, TEXT_DIM);

        img
    })
}

/// Width the notice gets on an image `image_width` wide
pub fn target_width(image_width: u32) -> u32 {
    MAX_WIDTH.min((image_width as f32 * 0.4) as u32)
}

/// Stamp the notice; returns false (and the image untouched) when it does not fit
pub fn apply_watermark(img: DynamicImage) -> (DynamicImage, bool) {
    let (w, h) = img.dimensions();
    let banner = banner();

    let target_w = target_width(w);
    if target_w < MIN_WIDTH {
        tracing::debug!(width = w, height = h, "image too small for watermark");
        return (img, false);
    }

    let target_h = ((banner.height() as u64 * target_w as u64) / banner.width() as u64).max(1) as u32;
    if target_h + 2 * MARGIN > h {
        tracing::debug!(width = w, height = h, "image too short for watermark");
        return (img, false);
    }

    let scaled = imageops::resize(banner, target_w, target_h, FilterType::Triangle);

    let mut canvas = img.into_rgba8();
    imageops::overlay(
        &mut canvas,
        &scaled,
        MARGIN as i64,
        (h - target_h - MARGIN) as i64,
    );

    (DynamicImage::ImageRgba8(canvas), true)
}

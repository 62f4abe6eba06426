//! Client-side watermarking of still images
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use tracing::debug;

use crate::error::SubmissionError;
use crate::glyphs::{is_lit, GLYPH_HEIGHT, GLYPH_WIDTH};

const LOGO_OPACITY: f32 = 0.6;
const BAND_OPACITY: f32 = 0.45;
const TEXT_OPACITY: f32 = 0.85;

/// A photographer's studio mark
#[derive(Debug, Clone)]
pub struct Branding {
    pub studio_name: String,
    pub logo: Option<Bytes>,
}

impl Branding {
    pub fn text(studio_name: impl Into<String>) -> Self {
        Self {
            studio_name: studio_name.into(),
            logo: None,
        }
    }
}

/// Stamp `branding` into the bottom-right corner and re-encode as JPEG.
///
/// The logo is used only when `allow_logo` is set and a logo is present;
/// otherwise the studio name is drawn as text.
pub fn apply_watermark(image: &[u8], branding: &Branding, allow_logo: bool) -> Result<Vec<u8>, SubmissionError> {
    let base = image::load_from_memory(image).map_err(|e| SubmissionError::Watermark(e.to_string()))?;
    let mut canvas = base.to_rgba8();

    match branding.logo.as_ref().filter(|_| allow_logo) {
        Some(logo) => overlay_logo(&mut canvas, logo)?,
        None => draw_text(&mut canvas, &branding.studio_name),
    }

    debug!(
        width = canvas.width(),
        height = canvas.height(),
        logo = allow_logo && branding.logo.is_some(),
        "Watermark applied"
    );

    let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(rgb)
        .write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|e| SubmissionError::Watermark(e.to_string()))?;
    Ok(out.into_inner())
}

fn margin(canvas: &RgbaImage) -> u32 {
    (canvas.width().min(canvas.height()) / 50).max(2)
}

fn overlay_logo(canvas: &mut RgbaImage, logo: &[u8]) -> Result<(), SubmissionError> {
    let logo = image::load_from_memory(logo).map_err(|e| SubmissionError::Watermark(format!("logo: {}", e)))?;

    let max_width = (canvas.width() / 5).max(1);
    let max_height = (canvas.height() / 5).max(1);
    let mut logo = logo.resize(max_width, max_height, FilterType::Triangle).to_rgba8();
    for pixel in logo.pixels_mut() {
        pixel.0[3] = (pixel.0[3] as f32 * LOGO_OPACITY).round() as u8;
    }

    let margin = margin(canvas);
    let x = canvas.width().saturating_sub(logo.width() + margin);
    let y = canvas.height().saturating_sub(logo.height() + margin);
    imageops::overlay(canvas, &logo, x as i64, y as i64);
    Ok(())
}

fn draw_text(canvas: &mut RgbaImage, text: &str) {
    let scale = (canvas.width() / 320).max(1);
    let advance = (GLYPH_WIDTH + 1) * scale;
    let padding = 2 * scale;
    let margin = margin(canvas);

    let room = canvas.width().saturating_sub(2 * margin + 2 * padding);
    let fits = ((room + scale) / advance) as usize;
    let chars: Vec<char> = text.trim().chars().take(fits).collect();
    if chars.is_empty() {
        return;
    }

    let text_width = chars.len() as u32 * advance - scale;
    let text_height = GLYPH_HEIGHT * scale;
    if canvas.height() < text_height + 2 * padding + margin {
        return;
    }

    let band_x = canvas.width() - margin - text_width - 2 * padding;
    let band_y = canvas.height() - margin - text_height - 2 * padding;
    for y in band_y..band_y + text_height + 2 * padding {
        for x in band_x..band_x + text_width + 2 * padding {
            blend(canvas, x, y, [0, 0, 0], BAND_OPACITY);
        }
    }

    let origin_x = band_x + padding;
    let origin_y = band_y + padding;
    for (index, c) in chars.iter().enumerate() {
        let glyph_x = origin_x + index as u32 * advance;
        for row in 0..GLYPH_HEIGHT {
            for col in 0..GLYPH_WIDTH {
                if !is_lit(*c, col, row) {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        blend(
                            canvas,
                            glyph_x + col * scale + dx,
                            origin_y + row * scale + dy,
                            [255, 255, 255],
                            TEXT_OPACITY,
                        );
                    }
                }
            }
        }
    }
}

fn blend(canvas: &mut RgbaImage, x: u32, y: u32, color: [u8; 3], alpha: f32) {
    let pixel = canvas.get_pixel_mut(x, y);
    for (channel, target) in pixel.0.iter_mut().zip(color) {
        *channel = (*channel as f32 * (1.0 - alpha) + target as f32 * alpha).round() as u8;
    }
}

// src/render.rs
//
// Frame annotation and encoding: bounding boxes with labels, zone outlines,
// JPEG/base64 snapshots and width-capped stream frames.

use crate::geometry::PolygonZone;
use crate::types::{Frame, ObjectLabel};
use anyhow::{Context, Result};
use base64::Engine;
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

const NORMAL_COLOR: Rgb<u8> = Rgb([30, 144, 255]);
const FLAGGED_COLOR: Rgb<u8> = Rgb([220, 20, 60]);
const ZONE_COLOR: Rgb<u8> = Rgb([255, 215, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const STAMP_BG: Rgb<u8> = Rgb([0, 0, 0]);

const CHAR_WIDTH: i32 = 6;
const CHAR_HEIGHT: i32 = 7;

pub trait FrameRenderer: Send + Sync {
    /// Boxes and labels for every object, plus the zone outline if any.
    fn annotate(&self, image: &RgbImage, labels: &[ObjectLabel], zone: Option<&PolygonZone>)
        -> RgbImage;

    /// Base64 JPEG of the frame with only `label` and the zone outline
    /// drawn, width-capped.
    fn snapshot(
        &self,
        frame: &Frame,
        label: &ObjectLabel,
        zone: Option<&PolygonZone>,
    ) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct BoxRenderer {
    pub max_width: u32,
    pub jpeg_quality: u8,
    pub thickness: i32,
}

impl Default for BoxRenderer {
    fn default() -> Self {
        Self {
            max_width: 640,
            jpeg_quality: 80,
            thickness: 2,
        }
    }
}

impl BoxRenderer {
    pub fn new(max_width: u32, jpeg_quality: u8) -> Self {
        Self {
            max_width,
            jpeg_quality,
            ..Default::default()
        }
    }

    fn draw_label(&self, img: &mut RgbImage, label: &ObjectLabel) {
        let color = if label.flagged {
            FLAGGED_COLOR
        } else {
            NORMAL_COLOR
        };
        let [x1, y1, x2, y2] = label.bbox;
        draw_box(img, x1 as i32, y1 as i32, (x2 - x1) as u32, (y2 - y1) as u32, color, self.thickness);
        let text_y = (y1 as i32 - CHAR_HEIGHT - 3).max(0);
        draw_text(img, &label.text, x1 as i32, text_y, TEXT_COLOR, Some(color));
    }

    /// Full-resolution evidence frame for one object.
    fn evidence(&self, image: &RgbImage, label: &ObjectLabel, zone: Option<&PolygonZone>) -> RgbImage {
        let mut img = image.clone();
        if let Some(zone) = zone {
            draw_polygon(&mut img, zone, ZONE_COLOR);
        }
        self.draw_label(&mut img, label);
        img
    }
}

impl FrameRenderer for BoxRenderer {
    fn annotate(
        &self,
        image: &RgbImage,
        labels: &[ObjectLabel],
        zone: Option<&PolygonZone>,
    ) -> RgbImage {
        let mut out = image.clone();
        if let Some(zone) = zone {
            draw_polygon(&mut out, zone, ZONE_COLOR);
        }
        for label in labels {
            self.draw_label(&mut out, label);
        }
        out
    }

    fn snapshot(
        &self,
        frame: &Frame,
        label: &ObjectLabel,
        zone: Option<&PolygonZone>,
    ) -> Result<String> {
        let img = self.evidence(&frame.image, label, zone);
        let img = resize_to_max_width(&img, self.max_width);
        let jpeg = encode_jpeg(&img, self.jpeg_quality)
            .with_context(|| format!("snapshot of object #{}", label.object_id))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(jpeg))
    }
}

// ============================================================================
// ENCODING
// ============================================================================

pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = std::io::Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    img.write_with_encoder(encoder)
        .context("JPEG encoding failed")?;
    Ok(buf.into_inner())
}

/// Downscale (aspect preserved) so the width is at most `max_width`.
pub fn resize_to_max_width(img: &RgbImage, max_width: u32) -> RgbImage {
    if max_width == 0 || img.width() <= max_width {
        return img.clone();
    }
    let scale = max_width as f32 / img.width() as f32;
    let height = ((img.height() as f32 * scale).round() as u32).max(1);
    imageops::resize(img, max_width, height, imageops::FilterType::Triangle)
}

// ============================================================================
// DRAWING
// ============================================================================

pub fn draw_box(
    img: &mut RgbImage,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    color: Rgb<u8>,
    thickness: i32,
) {
    if width == 0 || height == 0 {
        return;
    }
    for offset in 0..thickness.max(1) {
        let rect = Rect::at(x - offset, y - offset)
            .of_size(width + (offset * 2) as u32, height + (offset * 2) as u32);
        draw_hollow_rect_mut(img, rect, color);
    }
}

pub fn draw_polygon(img: &mut RgbImage, zone: &PolygonZone, color: Rgb<u8>) {
    let v = zone.vertices();
    for i in 0..v.len() {
        let a = v[i];
        let b = v[(i + 1) % v.len()];
        draw_line_segment_mut(img, (a.x, a.y), (b.x, b.y), color);
    }
}

/// Source id in the top-left corner, white on black.
pub fn stamp(img: &mut RgbImage, text: &str) {
    draw_text(img, text, 10, 10, TEXT_COLOR, Some(STAMP_BG));
}

/// Draw text with the built-in 5x7 bitmap font.
pub fn draw_text(
    img: &mut RgbImage,
    text: &str,
    x: i32,
    y: i32,
    color: Rgb<u8>,
    bg_color: Option<Rgb<u8>>,
) {
    if let Some(bg) = bg_color {
        let w = text.chars().count() as i32 * CHAR_WIDTH + 2;
        let h = CHAR_HEIGHT + 2;
        for dy in 0..h {
            for dx in 0..w {
                put(img, x + dx, y + dy, bg);
            }
        }
    }

    for (i, ch) in text.to_uppercase().chars().enumerate() {
        let cx = x + 1 + i as i32 * CHAR_WIDTH;
        let cy = y + 1;
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..5 {
                if (bits >> (4 - col)) & 1 == 1 {
                    put(img, cx + col, cy + row as i32, color);
                }
            }
        }
    }
}

fn put(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn glyph(ch: char) -> [u8; 7] {
    match ch {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
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
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
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
        ' ' => [0x00; 7],
        '#' => [0x0A, 0x0A, 0x1F, 0x0A, 0x1F, 0x0A, 0x0A],
        '[' => [0x0E, 0x08, 0x08, 0x08, 0x08, 0x08, 0x0E],
        ']' => [0x0E, 0x02, 0x02, 0x02, 0x02, 0x02, 0x0E],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        _ => [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F],
    }
}

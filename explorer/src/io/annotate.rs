//! Screenshot annotation: numbered element tags or a numbered grid overlay.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::core::gesture::Grid;
use crate::core::types::{ElementList, Point};

/// Edge of a `font8x8` glyph cell, in unscaled pixels.
const GLYPH_PX: i32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Palette {
    tag_fill: Rgba<u8>,
    tag_text: Rgba<u8>,
    outline: Rgba<u8>,
}

const LIGHT: Palette = Palette {
    tag_fill: Rgba([200, 200, 200, 255]),
    tag_text: Rgba([0, 0, 0, 255]),
    outline: Rgba([220, 40, 40, 255]),
};

const DARK: Palette = Palette {
    tag_fill: Rgba([45, 45, 45, 255]),
    tag_text: Rgba([255, 255, 255, 255]),
    outline: Rgba([255, 200, 60, 255]),
};

/// Draws model-facing labels onto screenshots.
#[derive(Debug, Clone, Copy)]
pub struct LabelRenderer {
    palette: Palette,
}

impl LabelRenderer {
    pub fn new(dark_mode: bool) -> Self {
        Self {
            palette: if dark_mode { DARK } else { LIGHT },
        }
    }

    /// Outline every element and tag it with its 1-based label at its center.
    pub fn label_elements(&self, src: &Path, dst: &Path, elements: &ElementList) -> Result<()> {
        let mut img = open_rgba(src)?;
        let scale = glyph_scale(&img);
        for (label, element) in elements.labeled() {
            let b = element.bounds;
            if let Some(rect) = clipped_rect(&img, b.left, b.top, b.width(), b.height()) {
                draw_hollow_rect_mut(&mut img, rect, self.palette.outline);
            }
            self.draw_tag(&mut img, element.center(), &label.to_string(), scale);
        }
        save(&img, dst)?;
        debug!(elements = elements.len(), dst = %dst.display(), "labeled screenshot");
        Ok(())
    }

    /// Draw grid lines and each area's number near its top-left corner.
    pub fn draw_grid(&self, src: &Path, dst: &Path, grid: &Grid) -> Result<()> {
        let mut img = open_rgba(src)?;
        let (width, height) = (img.width() as f32, img.height() as f32);
        for col in 1..grid.cols {
            let x = (col * grid.cell_width) as f32;
            draw_line_segment_mut(&mut img, (x, 0.0), (x, height), self.palette.outline);
        }
        for row in 1..grid.rows {
            let y = (row * grid.cell_height) as f32;
            draw_line_segment_mut(&mut img, (0.0, y), (width, y), self.palette.outline);
        }
        let scale = glyph_scale(&img);
        for area in 1..=grid.area_count() {
            if let Some(origin) = grid.cell_origin(area) {
                let text = area.to_string();
                let (tw, th) = text_size(&text, scale);
                let anchor = Point::new(origin.x + tw / 2 + 2 * scale, origin.y + th / 2 + 2 * scale);
                self.draw_tag(&mut img, anchor, &text, scale);
            }
        }
        save(&img, dst)?;
        debug!(areas = grid.area_count(), dst = %dst.display(), "grid screenshot");
        Ok(())
    }

    fn draw_tag(&self, img: &mut RgbaImage, center: Point, text: &str, scale: i32) {
        let (tw, th) = text_size(text, scale);
        let pad = scale * 2;
        let left = center.x - tw / 2;
        let top = center.y - th / 2;
        if let Some(rect) = clipped_rect(img, left - pad, top - pad, tw + 2 * pad, th + 2 * pad) {
            draw_filled_rect_mut(img, rect, self.palette.tag_fill);
        }
        draw_text(img, left, top, text, scale, self.palette.tag_text);
    }
}

/// Label `before` into `dst`, or hand back `before` unchanged when drawing fails.
pub fn labeled_or_raw<F>(before: &Path, dst: &Path, draw: F) -> PathBuf
where
    F: FnOnce(&Path, &Path) -> Result<()>,
{
    match draw(before, dst) {
        Ok(()) => dst.to_path_buf(),
        Err(err) => {
            warn!(error = %format!("{err:#}"), src = %before.display(), "annotation failed, using raw screenshot");
            before.to_path_buf()
        }
    }
}

fn open_rgba(path: &Path) -> Result<RgbaImage> {
    let img = image::open(path).with_context(|| format!("decode {}", path.display()))?;
    Ok(img.to_rgba8())
}

fn save(img: &RgbaImage, path: &Path) -> Result<()> {
    img.save(path)
        .with_context(|| format!("write {}", path.display()))
}

fn glyph_scale(img: &RgbaImage) -> i32 {
    i32::try_from(img.width() / 540).unwrap_or(1).max(1)
}

fn text_size(text: &str, scale: i32) -> (i32, i32) {
    let chars = i32::try_from(text.chars().count()).unwrap_or(0);
    (chars * GLYPH_PX * scale, GLYPH_PX * scale)
}

/// Intersect a rectangle with the image, or `None` when nothing is left.
fn clipped_rect(img: &RgbaImage, left: i32, top: i32, width: i32, height: i32) -> Option<Rect> {
    let max_x = i32::try_from(img.width()).ok()?;
    let max_y = i32::try_from(img.height()).ok()?;
    let x0 = left.clamp(0, max_x);
    let y0 = top.clamp(0, max_y);
    let x1 = (left + width).clamp(0, max_x);
    let y1 = (top + height).clamp(0, max_y);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Rect::at(x0, y0).of_size((x1 - x0) as u32, (y1 - y0) as u32))
}

/// Draw `text` with `font8x8` glyphs, each set bit as a `scale`-sized block.
fn draw_text(img: &mut RgbaImage, left: i32, top: i32, text: &str, scale: i32, color: Rgba<u8>) {
    let mut pen_x = left;
    for ch in text.chars() {
        if let Some(glyph) = BASIC_FONTS.get(ch) {
            for (row, bits) in (0i32..).zip(glyph) {
                for col in 0..GLYPH_PX {
                    if (bits >> col) & 1 == 0 {
                        continue;
                    }
                    let (x, y) = (pen_x + col * scale, top + row * scale);
                    if let Some(block) = clipped_rect(img, x, y, scale, scale) {
                        draw_filled_rect_mut(img, block, color);
                    }
                }
            }
        }
        pen_x += GLYPH_PX * scale;
    }
}

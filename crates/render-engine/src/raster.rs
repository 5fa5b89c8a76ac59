//! Raster drawing surface backed by tiny-skia and fontdue.
//!
//! Shapes and scaled video frames go through tiny-skia. Glyphs are
//! rasterized by fontdue, cached per (char, size), and blended into the
//! pixmap's premultiplied RGBA buffer directly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use capburn_caption_model::Color;
use capburn_common::config::RenderDefaults;
use capburn_common::error::{CapburnError, CapburnResult};
use capburn_media::VideoFrame;
use fontdue::{Font, FontSettings, Metrics};
use tiny_skia::{
    FillRule, FilterQuality, IntSize, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Transform,
};

use crate::surface::{approximate_text_width, DrawingSurface};

/// Bold sans-serif faces tried in order when no font is configured.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// Control-point distance for a quarter circle drawn as one cubic.
const KAPPA: f32 = 0.552_284_8;

/// Load the caption font.
///
/// An explicit path must load. Without one, the first usable system
/// candidate is taken, and `None` means text will not be drawn.
pub fn load_font(path: Option<&Path>) -> CapburnResult<Option<Font>> {
    if let Some(path) = path {
        return read_font(path).map(Some);
    }
    for candidate in FONT_CANDIDATES {
        let path = PathBuf::from(candidate);
        if !path.exists() {
            continue;
        }
        match read_font(&path) {
            Ok(font) => {
                tracing::debug!(font = %path.display(), "Caption font loaded");
                return Ok(Some(font));
            }
            Err(e) => tracing::debug!(font = %path.display(), error = %e, "Skipping font"),
        }
    }
    tracing::warn!("No caption font found; captions will render without text");
    Ok(None)
}

fn read_font(path: &Path) -> CapburnResult<Font> {
    if !path.exists() {
        return Err(CapburnError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let bytes = std::fs::read(path)?;
    Font::from_bytes(bytes, FontSettings::default()).map_err(|e| {
        CapburnError::render(format!("failed to parse font {}: {e}", path.display()))
    })
}

/// Pixel surface for real output.
pub struct PixmapSurface {
    pixmap: Option<Pixmap>,
    font: Option<Font>,
    glyphs: HashMap<(char, u32), (Metrics, Vec<u8>)>,
}

impl PixmapSurface {
    pub fn new(font: Option<Font>) -> Self {
        Self {
            pixmap: None,
            font,
            glyphs: HashMap::new(),
        }
    }

    /// Surface using the configured (or discovered) font.
    pub fn from_config(render: &RenderDefaults) -> CapburnResult<Self> {
        Ok(Self::new(load_font(render.font_path.as_deref())?))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn glyph(&mut self, c: char, px: f32) -> Option<&(Metrics, Vec<u8>)> {
        let font = self.font.as_ref()?;
        Some(
            self.glyphs
                .entry((c, px.to_bits()))
                .or_insert_with(|| font.rasterize(c, px)),
        )
    }
}

impl DrawingSurface for PixmapSurface {
    fn width(&self) -> u32 {
        self.pixmap.as_ref().map_or(0, Pixmap::width)
    }

    fn height(&self) -> u32 {
        self.pixmap.as_ref().map_or(0, Pixmap::height)
    }

    fn resize(&mut self, width: u32, height: u32) -> CapburnResult<()> {
        let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
            CapburnError::render(format!("cannot allocate a {width}x{height} surface"))
        })?;
        pixmap.fill(tiny_skia::Color::BLACK);
        self.pixmap = Some(pixmap);
        Ok(())
    }

    fn clear(&mut self) {
        if let Some(pixmap) = self.pixmap.as_mut() {
            pixmap.fill(tiny_skia::Color::BLACK);
        }
    }

    fn draw_frame(&mut self, frame: &VideoFrame) {
        let Some(pixmap) = self.pixmap.as_mut() else {
            return;
        };
        if !frame.is_well_formed() {
            tracing::warn!(?frame, "Skipping malformed video frame");
            return;
        }
        let premultiplied = premultiply(&frame.pixels);

        if (frame.width, frame.height) == (pixmap.width(), pixmap.height()) {
            pixmap.data_mut().copy_from_slice(&premultiplied);
            return;
        }

        let Some(source) = IntSize::from_wh(frame.width, frame.height)
            .and_then(|size| Pixmap::from_vec(premultiplied, size))
        else {
            return;
        };
        pixmap.fill(tiny_skia::Color::BLACK);
        let scale_x = pixmap.width() as f32 / frame.width as f32;
        let scale_y = pixmap.height() as f32 / frame.height as f32;
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        pixmap.draw_pixmap(
            0,
            0,
            source.as_ref(),
            &paint,
            Transform::from_scale(scale_x, scale_y),
            None,
        );
    }

    fn measure_text(&mut self, text: &str, font_px: f64) -> f64 {
        let Some(font) = self.font.as_ref() else {
            return approximate_text_width(text, font_px);
        };
        let px = font_px as f32;
        let mut width = 0.0f32;
        let mut prev: Option<char> = None;
        for c in text.chars() {
            if let Some(p) = prev {
                width += font.horizontal_kern(p, c, px).unwrap_or(0.0);
            }
            width += font.metrics(c, px).advance_width;
            prev = Some(c);
        }
        width as f64
    }

    fn fill_round_rect(&mut self, x: f64, y: f64, width: f64, height: f64, radius: f64, color: Color) {
        let Some(pixmap) = self.pixmap.as_mut() else {
            return;
        };
        if width <= 0.0 || height <= 0.0 || color.a == 0 {
            return;
        }
        let (x, y, w, h) = (x as f32, y as f32, width as f32, height as f32);
        let r = (radius as f32).clamp(0.0, w.min(h) / 2.0);

        let path = if r <= 0.0 {
            Rect::from_xywh(x, y, w, h).map(PathBuilder::from_rect)
        } else {
            let k = r * KAPPA;
            let mut pb = PathBuilder::new();
            pb.move_to(x + r, y);
            pb.line_to(x + w - r, y);
            pb.cubic_to(x + w - r + k, y, x + w, y + r - k, x + w, y + r);
            pb.line_to(x + w, y + h - r);
            pb.cubic_to(x + w, y + h - r + k, x + w - r + k, y + h, x + w - r, y + h);
            pb.line_to(x + r, y + h);
            pb.cubic_to(x + r - k, y + h, x, y + h - r + k, x, y + h - r);
            pb.line_to(x, y + r);
            pb.cubic_to(x, y + r - k, x + r - k, y, x + r, y);
            pb.close();
            pb.finish()
        };
        let Some(path) = path else {
            return;
        };

        let mut paint = Paint::default();
        paint.set_color_rgba8(color.r, color.g, color.b, color.a);
        paint.anti_alias = true;
        pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, font_px: f64, color: Color) {
        if self.pixmap.is_none() || text.is_empty() || color.a == 0 {
            return;
        }
        let Some((ascent, descent)) = self
            .font
            .as_ref()
            .and_then(|f| f.horizontal_line_metrics(font_px as f32))
            .map(|m| (m.ascent, m.descent))
        else {
            return;
        };

        let px = font_px as f32;
        let total = self.measure_text(text, font_px) as f32;
        // Vertical centre of the em box sits on `y`.
        let baseline = y as f32 + (ascent + descent) / 2.0;
        let mut pen_x = x as f32 - total / 2.0;
        let mut prev: Option<char> = None;

        for c in text.chars() {
            let kern = match (prev, self.font.as_ref()) {
                (Some(p), Some(font)) => font.horizontal_kern(p, c, px).unwrap_or(0.0),
                _ => 0.0,
            };
            pen_x += kern;
            let Some((metrics, coverage)) = self.glyph(c, px).cloned() else {
                return;
            };
            let gx = (pen_x + metrics.xmin as f32).round() as i64;
            let gy = (baseline - (metrics.ymin as f32 + metrics.height as f32)).round() as i64;
            if let Some(pixmap) = self.pixmap.as_mut() {
                blend_glyph(pixmap, gx, gy, &metrics, &coverage, color);
            }
            pen_x += metrics.advance_width;
            prev = Some(c);
        }
    }

    fn snapshot(&self) -> VideoFrame {
        let Some(pixmap) = self.pixmap.as_ref() else {
            return VideoFrame::new(0, 0, Vec::new());
        };
        let mut pixels = Vec::with_capacity(pixmap.data().len());
        for px in pixmap.pixels() {
            let c = px.demultiply();
            pixels.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        VideoFrame::new(pixmap.width(), pixmap.height(), pixels)
    }
}

fn premultiply(straight: &[u8]) -> Vec<u8> {
    let mut out = straight.to_vec();
    for px in out.chunks_exact_mut(4) {
        let a = px[3] as u32;
        if a == 255 {
            continue;
        }
        for c in px.iter_mut().take(3) {
            *c = ((*c as u32 * a + 127) / 255) as u8;
        }
    }
    out
}

fn blend_glyph(
    pixmap: &mut Pixmap,
    gx: i64,
    gy: i64,
    metrics: &Metrics,
    coverage: &[u8],
    color: Color,
) {
    let (pw, ph) = (pixmap.width() as i64, pixmap.height() as i64);
    let data = pixmap.data_mut();
    for row in 0..metrics.height {
        let py = gy + row as i64;
        if py < 0 || py >= ph {
            continue;
        }
        for col in 0..metrics.width {
            let px = gx + col as i64;
            if px < 0 || px >= pw {
                continue;
            }
            let cov = coverage[row * metrics.width + col] as u32;
            if cov == 0 {
                continue;
            }
            let i = ((py * pw + px) * 4) as usize;
            blend_premultiplied(&mut data[i..i + 4], color, cov);
        }
    }
}

/// Source-over of `color` at `coverage` onto a premultiplied pixel.
fn blend_premultiplied(dst: &mut [u8], color: Color, coverage: u32) {
    let a = (color.a as u32 * coverage + 127) / 255;
    if a == 0 {
        return;
    }
    let inv = 255 - a;
    let src = [color.r, color.g, color.b];
    for c in 0..3 {
        dst[c] = ((src[c] as u32 * a + dst[c] as u32 * inv + 127) / 255) as u8;
    }
    dst[3] = ((a * 255 + dst[3] as u32 * inv + 127) / 255).min(255) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(w: u32, h: u32) -> PixmapSurface {
        let mut s = PixmapSurface::new(None);
        s.resize(w, h).unwrap();
        s
    }

    #[test]
    fn test_unsized_surface_snapshot_is_empty() {
        let s = PixmapSurface::new(None);
        assert_eq!(s.width(), 0);
        assert!(s.snapshot().pixels.is_empty());
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let mut s = PixmapSurface::new(None);
        assert!(s.resize(0, 0).is_err());
    }

    #[test]
    fn test_same_size_frame_is_copied() {
        let mut s = surface(8, 4);
        s.draw_frame(&VideoFrame::solid(8, 4, [12, 34, 56, 255]));
        assert_eq!(s.snapshot().pixel(7, 3), Some([12, 34, 56, 255]));
    }

    #[test]
    fn test_smaller_frame_is_scaled_up() {
        let mut s = surface(16, 16);
        s.draw_frame(&VideoFrame::solid(4, 4, [90, 90, 90, 255]));
        let px = s.snapshot().pixel(8, 8).unwrap();
        assert!(px[..3].iter().all(|c| c.abs_diff(90) <= 1), "got {px:?}");
        assert_eq!(px[3], 255);
    }

    #[test]
    fn test_round_rect_covers_centre_not_corner() {
        let mut s = surface(40, 40);
        s.fill_round_rect(0.0, 0.0, 40.0, 40.0, 16.0, Color::WHITE);
        let snap = s.snapshot();
        assert_eq!(snap.pixel(20, 20), Some([255, 255, 255, 255]));
        assert_eq!(snap.pixel(0, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn test_translucent_rect_darkens() {
        let mut s = surface(10, 10);
        s.draw_frame(&VideoFrame::solid(10, 10, [200, 200, 200, 255]));
        s.fill_round_rect(0.0, 0.0, 10.0, 10.0, 0.0, Color::rgba(0, 0, 0, 0xaa));
        let px = s.snapshot().pixel(5, 5).unwrap();
        assert!(px[0] < 80, "expected darkened pixel, got {px:?}");
        assert_eq!(px[3], 255);
    }

    #[test]
    fn test_without_font_measure_is_approximate() {
        let mut s = surface(10, 10);
        assert!((s.measure_text("abcd", 10.0) - 24.0).abs() < 1e-9);
        // Drawing text without a font is a no-op rather than an error.
        s.fill_text("abcd", 5.0, 5.0, 10.0, Color::WHITE);
        assert_eq!(s.snapshot().pixel(5, 5), Some([0, 0, 0, 255]));
    }

    #[test]
    fn test_missing_explicit_font_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_font(Some(&dir.path().join("nope.ttf"))).unwrap_err();
        assert!(matches!(err, CapburnError::FileNotFound { .. }));
    }

    #[test]
    fn test_glyph_blend_is_full_at_full_coverage() {
        let mut px = [0, 0, 0, 255];
        blend_premultiplied(&mut px, Color::WHITE, 255);
        assert_eq!(px, [255, 255, 255, 255]);
        let mut px = [0, 0, 0, 255];
        blend_premultiplied(&mut px, Color::WHITE, 0);
        assert_eq!(px, [0, 0, 0, 255]);
    }
}

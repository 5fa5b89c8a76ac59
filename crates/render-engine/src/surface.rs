//! Drawing surfaces.
//!
//! The compositor draws through [`DrawingSurface`]. The raster
//! implementation lives in [`crate::raster`]; [`RecordingSurface`] keeps a
//! display list and a cheap pixel buffer for headless runs and tests.

use capburn_caption_model::Color;
use capburn_common::error::{CapburnError, CapburnResult};
use capburn_media::VideoFrame;

/// Average advance of a sans-serif glyph, as a fraction of the font size.
pub const APPROX_ADVANCE_EM: f64 = 0.6;

/// Width estimate used when no font metrics are available.
pub fn approximate_text_width(text: &str, font_px: f64) -> f64 {
    text.chars().count() as f64 * font_px * APPROX_ADVANCE_EM
}

/// A 2D drawing target the size of the output frame.
pub trait DrawingSurface: Send {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Resize the surface. Contents are cleared.
    fn resize(&mut self, width: u32, height: u32) -> CapburnResult<()>;

    /// Clear to opaque black.
    fn clear(&mut self);

    /// Draw `frame` scaled to cover the whole surface.
    fn draw_frame(&mut self, frame: &VideoFrame);

    /// Rendered width of `text` at `font_px`.
    fn measure_text(&mut self, text: &str, font_px: f64) -> f64;

    fn fill_round_rect(&mut self, x: f64, y: f64, width: f64, height: f64, radius: f64, color: Color);

    /// Draw `text` centred horizontally on `x` and vertically on `y`.
    fn fill_text(&mut self, text: &str, x: f64, y: f64, font_px: f64, color: Color);

    /// Copy the current contents out as a straight-alpha RGBA frame.
    fn snapshot(&self) -> VideoFrame;
}

/// Operations recorded by [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    Resize {
        width: u32,
        height: u32,
    },
    Clear,
    Frame {
        width: u32,
        height: u32,
    },
    RoundRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        radius: f64,
        color: Color,
    },
    Text {
        text: String,
        x: f64,
        y: f64,
        font_px: f64,
        color: Color,
    },
}

/// Display-list surface.
///
/// Text is measured with [`approximate_text_width`] and not rasterized.
/// Frames are scaled nearest-neighbour and rectangles are blended without
/// rounded corners, which is enough for snapshots to change when the
/// caption or frame does.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    ops: Vec<SurfaceOp>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        let mut surface = Self::new();
        surface.allocate(width, height);
        surface
    }

    /// Everything drawn since the last [`take_ops`](Self::take_ops).
    pub fn ops(&self) -> &[SurfaceOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<SurfaceOp> {
        std::mem::take(&mut self.ops)
    }

    /// Text drawn since the last [`take_ops`](Self::take_ops).
    pub fn texts(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                SurfaceOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn allocate(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels = opaque_black(width, height);
    }
}

fn opaque_black(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = vec![0u8; VideoFrame::byte_len(width, height)];
    for px in pixels.chunks_exact_mut(4) {
        px[3] = 255;
    }
    pixels
}

impl DrawingSurface for RecordingSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn resize(&mut self, width: u32, height: u32) -> CapburnResult<()> {
        if width == 0 || height == 0 {
            return Err(CapburnError::render(format!(
                "cannot resize surface to {width}x{height}"
            )));
        }
        self.allocate(width, height);
        self.ops.push(SurfaceOp::Resize { width, height });
        Ok(())
    }

    fn clear(&mut self) {
        self.pixels = opaque_black(self.width, self.height);
        self.ops.push(SurfaceOp::Clear);
    }

    fn draw_frame(&mut self, frame: &VideoFrame) {
        self.ops.push(SurfaceOp::Frame {
            width: frame.width,
            height: frame.height,
        });
        if !frame.is_well_formed() || frame.width == 0 || frame.height == 0 {
            return;
        }
        if (frame.width, frame.height) == (self.width, self.height) {
            self.pixels.copy_from_slice(&frame.pixels);
            return;
        }
        for y in 0..self.height {
            let sy = (y as u64 * frame.height as u64 / self.height as u64) as u32;
            for x in 0..self.width {
                let sx = (x as u64 * frame.width as u64 / self.width as u64) as u32;
                if let Some(px) = frame.pixel(sx, sy) {
                    let i = ((y * self.width + x) * 4) as usize;
                    self.pixels[i..i + 4].copy_from_slice(&px);
                }
            }
        }
    }

    fn measure_text(&mut self, text: &str, font_px: f64) -> f64 {
        approximate_text_width(text, font_px)
    }

    fn fill_round_rect(&mut self, x: f64, y: f64, width: f64, height: f64, radius: f64, color: Color) {
        self.ops.push(SurfaceOp::RoundRect {
            x,
            y,
            width,
            height,
            radius,
            color,
        });
        let x0 = x.max(0.0).floor() as u32;
        let y0 = y.max(0.0).floor() as u32;
        let x1 = ((x + width).ceil().max(0.0) as u32).min(self.width);
        let y1 = ((y + height).ceil().max(0.0) as u32).min(self.height);
        for py in y0..y1 {
            for px in x0..x1 {
                let i = ((py * self.width + px) * 4) as usize;
                blend_straight(&mut self.pixels[i..i + 4], color);
            }
        }
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, font_px: f64, color: Color) {
        self.ops.push(SurfaceOp::Text {
            text: text.to_string(),
            x,
            y,
            font_px,
            color,
        });
    }

    fn snapshot(&self) -> VideoFrame {
        VideoFrame::new(self.width, self.height, self.pixels.clone())
    }
}

/// Source-over blend of `color` onto one straight-alpha RGBA pixel.
pub(crate) fn blend_straight(dst: &mut [u8], color: Color) {
    let sa = color.a as u32;
    if sa == 0 {
        return;
    }
    let inv = 255 - sa;
    let src = [color.r, color.g, color.b];
    for c in 0..3 {
        dst[c] = ((src[c] as u32 * sa + dst[c] as u32 * inv + 127) / 255) as u8;
    }
    dst[3] = (sa + (dst[3] as u32 * inv + 127) / 255).min(255) as u8;
}

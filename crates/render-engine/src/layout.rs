//! Caption layout: word wrapping and box geometry.
//!
//! Layout is pure. It takes the caption text, the global style, the
//! output frame size, and a text measurer, and produces the draw
//! commands for one frame. All coordinates are output pixels with the
//! origin at the top-left corner.

use capburn_caption_model::{CaptionStyle, Color};
use capburn_common::config::RenderDefaults;
use serde::Serialize;

/// Tunables for wrapping and line spacing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayoutParams {
    /// Fraction of the frame width a wrapped line must stay under.
    pub max_line_width_ratio: f64,
    /// Line height as a multiple of the font size.
    pub line_height_factor: f64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            max_line_width_ratio: 0.85,
            line_height_factor: 1.2,
        }
    }
}

impl From<&RenderDefaults> for LayoutParams {
    fn from(render: &RenderDefaults) -> Self {
        Self {
            max_line_width_ratio: render.max_line_width_ratio,
            line_height_factor: render.line_height_factor,
        }
    }
}

/// One drawing primitive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    FillRoundRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        radius: f64,
        color: Color,
    },
    /// Text centred horizontally on `x` and vertically on `y`.
    FillText {
        text: String,
        x: f64,
        y: f64,
        font_px: f64,
        color: Color,
    },
}

/// Geometry of one laid-out caption.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptionLayout {
    pub lines: Vec<String>,
    pub line_widths: Vec<f64>,
    pub font_px: f64,
    pub line_height: f64,
    /// Caption block centre.
    pub anchor_x: f64,
    pub anchor_y: f64,
    pub box_x: f64,
    pub box_y: f64,
    pub box_width: f64,
    pub box_height: f64,
    /// Corner radius after clamping to the box.
    pub radius: f64,
    /// Vertical centre of each line.
    pub line_centers: Vec<f64>,
}

impl CaptionLayout {
    /// Background box first, then one text command per line.
    pub fn commands(&self, style: &CaptionStyle) -> Vec<DrawCommand> {
        let mut commands = Vec::with_capacity(self.lines.len() + 1);
        commands.push(DrawCommand::FillRoundRect {
            x: self.box_x,
            y: self.box_y,
            width: self.box_width,
            height: self.box_height,
            radius: self.radius,
            color: style.background_color,
        });
        for (line, y) in self.lines.iter().zip(&self.line_centers) {
            commands.push(DrawCommand::FillText {
                text: line.clone(),
                x: self.anchor_x,
                y: *y,
                font_px: self.font_px,
                color: style.color,
            });
        }
        commands
    }
}

/// Greedy word wrap.
///
/// A word joins the current line only while the joined line measures
/// strictly under `max_width`. A single word wider than `max_width` gets
/// a line of its own and overflows. Empty text yields one empty line.
pub fn wrap_text(text: &str, max_width: f64, mut measure: impl FnMut(&str) -> f64) -> Vec<String> {
    let mut words = text.split_whitespace();
    let Some(first) = words.next() else {
        return vec![String::new()];
    };

    let mut lines = Vec::new();
    let mut line = first.to_string();
    for word in words {
        let candidate = format!("{line} {word}");
        if measure(&candidate) < max_width {
            line = candidate;
        } else {
            lines.push(std::mem::replace(&mut line, word.to_string()));
        }
    }
    lines.push(line);
    lines
}

/// Lay out `text` with the default parameters.
pub fn layout_caption(
    text: &str,
    style: &CaptionStyle,
    frame_width: u32,
    frame_height: u32,
    measure: impl FnMut(&str) -> f64,
) -> CaptionLayout {
    layout_caption_with(
        &LayoutParams::default(),
        text,
        style,
        frame_width,
        frame_height,
        measure,
    )
}

/// Lay out `text` for a `frame_width` x `frame_height` frame.
///
/// `measure` must return the rendered width of a string at the style's
/// font size for this frame ([`CaptionStyle::font_px`]).
pub fn layout_caption_with(
    params: &LayoutParams,
    text: &str,
    style: &CaptionStyle,
    frame_width: u32,
    frame_height: u32,
    mut measure: impl FnMut(&str) -> f64,
) -> CaptionLayout {
    let (w, h) = (frame_width as f64, frame_height as f64);
    let font_px = style.font_px(h);
    let line_height = font_px * params.line_height_factor;
    let (anchor_x, anchor_y) = style.anchor_px(w, h);
    let padding = style.padding.max(0.0);

    let lines = wrap_text(text, w * params.max_line_width_ratio, &mut measure);
    let line_widths: Vec<f64> = lines.iter().map(|l| measure(l)).collect();
    let widest = line_widths.iter().copied().fold(0.0_f64, f64::max);

    let n = lines.len() as f64;
    let box_width = widest + 2.0 * padding;
    let box_height = n * line_height + 2.0 * padding;
    let box_x = anchor_x - box_width / 2.0;
    let box_y = anchor_y - n * line_height / 2.0 - padding;
    let radius = style
        .border_radius
        .min(box_width / 2.0)
        .min(box_height / 2.0)
        .max(0.0);

    let first_center = anchor_y - (n - 1.0) * line_height / 2.0;
    let line_centers = (0..lines.len())
        .map(|i| first_center + i as f64 * line_height)
        .collect();

    CaptionLayout {
        lines,
        line_widths,
        font_px,
        line_height,
        anchor_x,
        anchor_y,
        box_x,
        box_y,
        box_width,
        box_height,
        radius,
        line_centers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Every character is `px` wide.
    fn mono(px: f64) -> impl FnMut(&str) -> f64 {
        move |s: &str| s.chars().count() as f64 * px
    }

    fn style() -> CaptionStyle {
        CaptionStyle {
            padding: 10.0,
            border_radius: 8.0,
            ..CaptionStyle::default()
        }
    }

    #[test]
    fn test_short_text_is_one_line() {
        let layout = layout_caption("Hello world", &style(), 1000, 500, mono(10.0));
        assert_eq!(layout.lines, vec!["Hello world"]);
        assert_eq!(layout.line_widths, vec![110.0]);
        assert_eq!(layout.box_width, 130.0);
    }

    #[test]
    fn test_wraps_at_85_percent_of_width() {
        // 100px frame: lines must measure under 85px (8 chars at 10px).
        let lines = wrap_text("aaa bbb ccc ddd", 85.0, mono(10.0));
        assert_eq!(lines, vec!["aaa bbb", "ccc ddd"]);
    }

    #[test]
    fn test_exact_fit_wraps() {
        // "aaaa bbbb" is exactly 90 wide; the limit is strict.
        let lines = wrap_text("aaaa bbbb", 90.0, mono(10.0));
        assert_eq!(lines, vec!["aaaa", "bbbb"]);
    }

    #[test]
    fn test_long_word_overflows_alone() {
        let lines = wrap_text("a supercalifragilistic b", 50.0, mono(10.0));
        assert_eq!(lines, vec!["a", "supercalifragilistic", "b"]);
    }

    #[test]
    fn test_empty_text_has_one_empty_line_and_padded_box() {
        let layout = layout_caption("", &style(), 1000, 500, mono(10.0));
        assert_eq!(layout.lines, vec![String::new()]);
        assert_eq!(layout.box_width, 20.0);
        assert!(layout.box_height > 0.0);
    }

    #[test]
    fn test_box_is_centred_on_anchor() {
        let style = CaptionStyle {
            x: 50.0,
            y: 85.0,
            font_size: 5.0,
            padding: 20.0,
            ..CaptionStyle::default()
        };
        let layout = layout_caption("one two", &style, 1920, 1080, mono(20.0));
        assert!((layout.font_px - 54.0).abs() < 1e-9);
        assert!((layout.line_height - 64.8).abs() < 1e-9);
        assert!((layout.anchor_x - 960.0).abs() < 1e-9);
        assert!((layout.anchor_y - 918.0).abs() < 1e-9);
        assert!((layout.box_x + layout.box_width / 2.0 - 960.0).abs() < 1e-9);
        assert!((layout.box_y - (918.0 - 32.4 - 20.0)).abs() < 1e-9);
        assert_eq!(layout.line_centers.len(), 1);
        assert!((layout.line_centers[0] - 918.0).abs() < 1e-9);
    }

    #[test]
    fn test_multi_line_rows_are_spaced_by_line_height() {
        let layout = layout_caption("aaa bbb ccc", &style(), 100, 100, mono(10.0));
        assert_eq!(layout.lines.len(), 2);
        let lh = layout.line_height;
        assert!((layout.line_centers[1] - layout.line_centers[0] - lh).abs() < 1e-9);
        assert!((layout.line_centers[0] - (layout.anchor_y - lh / 2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_radius_is_clamped_to_box() {
        let style = CaptionStyle {
            padding: 0.0,
            border_radius: 500.0,
            ..CaptionStyle::default()
        };
        let layout = layout_caption("hi", &style, 1000, 500, mono(10.0));
        assert!(layout.radius <= layout.box_width / 2.0);
        assert!(layout.radius <= layout.box_height / 2.0);
    }

    #[test]
    fn test_commands_draw_box_before_text() {
        let style = style();
        let layout = layout_caption("aaa bbb ccc", &style, 100, 100, mono(10.0));
        let commands = layout.commands(&style);
        assert_eq!(commands.len(), 3);
        assert!(matches!(commands[0], DrawCommand::FillRoundRect { .. }));
        assert!(matches!(
            &commands[1],
            DrawCommand::FillText { text, .. } if text == "aaa bbb"
        ));
    }

    proptest! {
        #[test]
        fn prop_wrapped_lines_fit_or_are_single_words(
            words in proptest::collection::vec("[a-z]{1,12}", 0..20),
            width in 20u32..2000,
        ) {
            let text = words.join(" ");
            let layout = layout_caption(&text, &style(), width, 400, mono(9.0));
            let max = width as f64 * 0.85;
            for (line, w) in layout.lines.iter().zip(&layout.line_widths) {
                prop_assert!(*w < max || !line.contains(' '));
            }
            // Wrapping never loses or reorders words.
            let rejoined: Vec<&str> = layout.lines.iter().flat_map(|l| l.split_whitespace()).collect();
            let original: Vec<&str> = text.split_whitespace().collect();
            prop_assert_eq!(rejoined, original);
        }

        #[test]
        fn prop_box_contains_every_line(
            words in proptest::collection::vec("[a-z]{1,8}", 1..12),
            x in 0.0f64..100.0,
            y in 0.0f64..100.0,
        ) {
            let style = CaptionStyle { x, y, ..style() };
            let layout = layout_caption(&words.join(" "), &style, 640, 360, mono(7.0));
            let eps = 1e-6;
            for (w, cy) in layout.line_widths.iter().zip(&layout.line_centers) {
                prop_assert!(layout.anchor_x - w / 2.0 >= layout.box_x - eps);
                prop_assert!(layout.anchor_x + w / 2.0 <= layout.box_x + layout.box_width + eps);
                prop_assert!(cy - layout.line_height / 2.0 >= layout.box_y - eps);
                prop_assert!(cy + layout.line_height / 2.0 <= layout.box_y + layout.box_height + eps);
            }
        }
    }
}

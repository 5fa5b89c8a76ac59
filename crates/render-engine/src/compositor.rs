//! Frame compositor: combines the current video frame and the active
//! caption on a drawing surface.
//!
//! Rendering is idempotent for a given (time, captions, style, frame):
//! the surface is fully repainted every call.

use capburn_caption_model::{CaptionId, CaptionStore, CaptionStyle};
use capburn_common::error::CapburnResult;
use capburn_media::MediaElement;

use crate::layout::{layout_caption_with, CaptionLayout, DrawCommand, LayoutParams};
use crate::surface::DrawingSurface;

/// What was drawn for one frame.
#[derive(Debug, Clone)]
pub struct FrameComposition {
    /// Media time the frame was rendered for.
    pub time_secs: f64,

    /// Surface size at render time.
    pub width: u32,
    pub height: u32,

    /// Whether a decoded video frame was available.
    pub drew_video: bool,

    /// The caption drawn, if any.
    pub caption: Option<CaptionId>,

    /// Its layout.
    pub layout: Option<CaptionLayout>,
}

/// Stateless apart from bookkeeping; all inputs arrive per call.
#[derive(Debug, Default)]
pub struct Compositor {
    params: LayoutParams,
    frames_rendered: u64,
}

impl Compositor {
    pub fn new(params: LayoutParams) -> Self {
        Self {
            params,
            frames_rendered: 0,
        }
    }

    pub fn params(&self) -> &LayoutParams {
        &self.params
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Paint one frame for the element's current position.
    ///
    /// The surface is first resized to the element's native video size
    /// when that is known and differs. Before metadata arrives there is
    /// nothing to size against and an empty surface is left untouched.
    pub fn render_frame(
        &mut self,
        media: &dyn MediaElement,
        surface: &mut dyn DrawingSurface,
        captions: &CaptionStore,
        style: &CaptionStyle,
    ) -> CapburnResult<FrameComposition> {
        if let Some((w, h)) = media.video_size() {
            if w > 0 && h > 0 && (w, h) != (surface.width(), surface.height()) {
                surface.resize(w, h)?;
                tracing::debug!(width = w, height = h, "Surface resized to native video size");
            }
        }

        let (width, height) = (surface.width(), surface.height());
        let time_secs = media.current_time();
        let mut composition = FrameComposition {
            time_secs,
            width,
            height,
            drew_video: false,
            caption: None,
            layout: None,
        };
        if width == 0 || height == 0 {
            return Ok(composition);
        }

        match media.current_frame() {
            Some(frame) => {
                surface.draw_frame(&frame);
                composition.drew_video = true;
            }
            None => surface.clear(),
        }

        if let Some(caption) = captions.active_at(time_secs) {
            let font_px = style.font_px(height as f64);
            let layout = layout_caption_with(&self.params, &caption.text, style, width, height, |s| {
                surface.measure_text(s, font_px)
            });
            for command in layout.commands(style) {
                paint(surface, command);
            }
            composition.caption = Some(caption.id.clone());
            composition.layout = Some(layout);
        }

        self.frames_rendered += 1;
        Ok(composition)
    }
}

fn paint(surface: &mut dyn DrawingSurface, command: DrawCommand) {
    match command {
        DrawCommand::FillRoundRect {
            x,
            y,
            width,
            height,
            radius,
            color,
        } => surface.fill_round_rect(x, y, width, height, radius, color),
        DrawCommand::FillText {
            text,
            x,
            y,
            font_px,
            color,
        } => surface.fill_text(&text, x, y, font_px, color),
    }
}

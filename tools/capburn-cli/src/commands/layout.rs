//! Print the caption layout for one frame.

use std::path::PathBuf;

use capburn_common::config::AppConfig;
use capburn_render_engine::layout::layout_caption_with;
use capburn_render_engine::surface::approximate_text_width;
use capburn_render_engine::{CaptionLayout, DrawCommand, LayoutParams};
use serde::Serialize;

use super::read_style;

#[derive(Serialize)]
struct LayoutReport {
    frame_width: u32,
    frame_height: u32,
    params: LayoutParams,
    layout: CaptionLayout,
    commands: Vec<DrawCommand>,
}

pub fn run(
    config: &AppConfig,
    text: String,
    width: u32,
    height: u32,
    style: Option<PathBuf>,
) -> anyhow::Result<()> {
    let style = read_style(style.as_deref())?;
    let params = LayoutParams::from(&config.render);
    let font_px = style.font_px(f64::from(height));
    let layout = layout_caption_with(&params, &text, &style, width, height, |s| {
        approximate_text_width(s, font_px)
    });

    let report = LayoutReport {
        frame_width: width,
        frame_height: height,
        params,
        commands: layout.commands(&style),
        layout,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

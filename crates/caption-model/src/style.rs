//! Global caption style.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::caption::CaptionError;

/// An 8-bit RGBA colour, written as `#rgb`, `#rrggbb`, or `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }
}

impl FromStr for Color {
    type Err = CaptionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || CaptionError::InvalidStyleValue {
            field: "color".to_string(),
            value: raw.to_string(),
        };
        let hex = raw.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
        match hex.len() {
            3 => {
                let expand = |i: usize| channel(&hex[i..i + 1].repeat(2));
                Ok(Color::rgba(expand(0)?, expand(1)?, expand(2)?, 255))
            }
            6 => Ok(Color::rgba(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                255,
            )),
            8 => Ok(Color::rgba(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                channel(&hex[6..8])?,
            )),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = CaptionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(
                f,
                "#{:02x}{:02x}{:02x}{:02x}",
                self.r, self.g, self.b, self.a
            )
        }
    }
}

/// Style applied to every caption.
///
/// `x`/`y` place the centre of the caption block as a percentage of the
/// frame; `font_size` is a percentage of the frame height. `padding` and
/// `border_radius` are in output pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptionStyle {
    pub x: f64,
    pub y: f64,
    pub font_size: f64,
    pub color: Color,
    pub background_color: Color,
    pub padding: f64,
    pub border_radius: f64,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            x: 50.0,
            y: 85.0,
            font_size: 5.0,
            color: Color::WHITE,
            background_color: Color::rgba(0, 0, 0, 0xaa),
            padding: 20.0,
            border_radius: 8.0,
        }
    }
}

/// A style field addressable from a style control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleField {
    X,
    Y,
    FontSize,
    Color,
    BackgroundColor,
    Padding,
    BorderRadius,
}

impl StyleField {
    pub fn name(&self) -> &'static str {
        match self {
            StyleField::X => "x",
            StyleField::Y => "y",
            StyleField::FontSize => "fontSize",
            StyleField::Color => "color",
            StyleField::BackgroundColor => "backgroundColor",
            StyleField::Padding => "padding",
            StyleField::BorderRadius => "borderRadius",
        }
    }
}

impl FromStr for StyleField {
    type Err = CaptionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "x" => Ok(StyleField::X),
            "y" => Ok(StyleField::Y),
            "fontSize" | "font-size" | "font_size" => Ok(StyleField::FontSize),
            "color" => Ok(StyleField::Color),
            "backgroundColor" | "background-color" | "background_color" => {
                Ok(StyleField::BackgroundColor)
            }
            "padding" => Ok(StyleField::Padding),
            "borderRadius" | "border-radius" | "border_radius" => Ok(StyleField::BorderRadius),
            _ => Err(CaptionError::InvalidStyleValue {
                field: "field".to_string(),
                value: raw.to_string(),
            }),
        }
    }
}

impl CaptionStyle {
    /// Font size in pixels for a frame of the given height.
    pub fn font_px(&self, frame_height: f64) -> f64 {
        (self.font_size / 100.0) * frame_height
    }

    /// Anchor point (centre of the caption block) in pixels.
    pub fn anchor_px(&self, frame_width: f64, frame_height: f64) -> (f64, f64) {
        (
            (self.x / 100.0) * frame_width,
            (self.y / 100.0) * frame_height,
        )
    }

    /// Set one field from raw control input, coercing numbers and colours.
    pub fn set_field(&mut self, field: StyleField, raw: &str) -> Result<(), CaptionError> {
        let number = || {
            raw.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| CaptionError::InvalidStyleValue {
                    field: field.name().to_string(),
                    value: raw.to_string(),
                })
        };

        match field {
            StyleField::X => self.x = number()?,
            StyleField::Y => self.y = number()?,
            StyleField::FontSize => self.font_size = number()?,
            StyleField::Padding => self.padding = number()?,
            StyleField::BorderRadius => self.border_radius = number()?,
            StyleField::Color => self.color = raw.parse()?,
            StyleField::BackgroundColor => self.background_color = raw.parse()?,
        }
        Ok(())
    }
}

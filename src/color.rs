// src/color.rs

//! Defines the `Color` value type and the colour arithmetic the engine relies on:
//! string parsing, hex formatting, alpha compositing, sRGB relative luminance and
//! the achromatic (grey) test.
//!
//! `Color::parse` is total: an unrecognised value resolves to opaque white.

use log::trace;
use std::fmt;

/// Opaque white, the fallback for any colour string that cannot be parsed.
pub const WHITE: Color = Color::rgb(255, 255, 255);
/// Opaque black.
pub const BLACK: Color = Color::rgb(0, 0, 0);
/// Fully transparent black, the result of compositing two transparent colours.
pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0.0);

// sRGB linearisation constants
const SRGB_LINEAR_THRESHOLD: f64 = 0.03928;
const SRGB_LINEAR_SCALE: f64 = 12.92;
const SRGB_GAMMA: f64 = 2.4;

// Rec. 709 luminance weights
const LUMA_R: f64 = 0.2126;
const LUMA_G: f64 = 0.7152;
const LUMA_B: f64 = 0.0722;

/// An RGBA colour with 8-bit channels and a floating point alpha in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Default for Color {
    fn default() -> Self {
        WHITE
    }
}

impl Color {
    /// Creates an opaque colour.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b, a: 1.0 }
    }

    /// Creates a colour with an explicit alpha. Alpha is expected in `[0, 1]`.
    pub const fn rgba(r: u8, g: u8, b: u8, a: f32) -> Self {
        Color { r, g, b, a }
    }

    /// Parses a CSS-style colour string, falling back to opaque white.
    ///
    /// Accepted forms are `rgb(r, g, b)`, `rgba(r, g, b, a)`, `#rgb`, `#rrggbb`
    /// and the keyword `transparent`.
    pub fn parse(input: &str) -> Color {
        match Self::try_parse(input) {
            Some(color) => color,
            None => {
                trace!("Color: unparseable value {:?}, using white", input);
                WHITE
            }
        }
    }

    /// Parses a CSS-style colour string, returning `None` when it is not recognised.
    pub fn try_parse(input: &str) -> Option<Color> {
        let s = input.trim();
        if s.eq_ignore_ascii_case("transparent") {
            return Some(TRANSPARENT);
        }
        if s.starts_with('#') {
            return Self::from_hex(s);
        }
        parse_functional(s)
    }

    /// Parses `#rgb` or `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Option<Color> {
        let digits = hex.trim().trim_start_matches('#');
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let expanded: String = match digits.len() {
            3 => digits.chars().flat_map(|c| [c, c]).collect(),
            6 => digits.to_string(),
            _ => return None,
        };
        let value = u32::from_str_radix(&expanded, 16).ok()?;
        Some(Color::rgb(
            ((value >> 16) & 0xFF) as u8,
            ((value >> 8) & 0xFF) as u8,
            (value & 0xFF) as u8,
        ))
    }

    /// Formats the RGB channels as `#RRGGBB`. Alpha is not represented.
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Packs the RGB channels into a single key. Alpha is ignored, so only
    /// opaque colours should be keyed this way.
    pub fn key(&self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    pub fn is_opaque(&self) -> bool {
        self.a >= 1.0
    }

    pub fn is_transparent(&self) -> bool {
        self.a <= 0.0
    }

    /// Returns the same colour with full opacity.
    pub fn opaque(self) -> Color {
        Color { a: 1.0, ..self }
    }

    /// Moves each channel towards 0 by `factor`.
    pub fn darken(&self, factor: f64) -> Color {
        let scale = |c: u8| (c as f64 * (1.0 - factor)).round().clamp(0.0, 255.0) as u8;
        Color::rgba(scale(self.r), scale(self.g), scale(self.b), self.a)
    }

    /// Moves each channel towards 255 by `factor`.
    pub fn lighten(&self, factor: f64) -> Color {
        let scale =
            |c: u8| (c as f64 + (255.0 - c as f64) * factor).round().clamp(0.0, 255.0) as u8;
        Color::rgba(scale(self.r), scale(self.g), scale(self.b), self.a)
    }

    /// Perceived brightness on a 0..255 scale (ITU-R BT.601 weights).
    pub fn brightness(&self) -> f64 {
        0.299 * self.r as f64 + 0.587 * self.g as f64 + 0.114 * self.b as f64
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_opaque() {
            write!(f, "{}", self.to_hex())
        } else {
            write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
        }
    }
}

/// Parses `rgb(...)` / `rgba(...)`. Channel values above 255 are clamped and
/// alpha is clamped to `[0, 1]`.
fn parse_functional(s: &str) -> Option<Color> {
    let lower = s.to_ascii_lowercase();
    let body = lower
        .strip_prefix("rgba")
        .or_else(|| lower.strip_prefix("rgb"))?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')?;

    let parts: Vec<&str> = body.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }

    let channel = |p: &str| -> Option<u8> {
        let v: f64 = p.parse().ok()?;
        if !v.is_finite() || v < 0.0 {
            return None;
        }
        Some(v.round().min(255.0) as u8)
    };

    let r = channel(parts[0])?;
    let g = channel(parts[1])?;
    let b = channel(parts[2])?;
    let a = match parts.get(3) {
        Some(p) => {
            let a: f32 = p.parse().ok()?;
            if !a.is_finite() {
                return None;
            }
            a.clamp(0.0, 1.0)
        }
        None => 1.0,
    };
    Some(Color::rgba(r, g, b, a))
}

/// Composites `top` over `bottom` (standard alpha-over).
///
/// Channels are averaged with premultiplied weights and divided by the resulting
/// alpha. Two fully transparent inputs give transparent black.
pub fn compose(top: Color, bottom: Color) -> Color {
    let ta = top.a as f64;
    let ba = bottom.a as f64;
    let alpha = ta + ba * (1.0 - ta);
    if alpha <= 0.0 {
        return TRANSPARENT;
    }
    let channel = |t: u8, b: u8| -> u8 {
        let v = (t as f64 * ta + b as f64 * ba * (1.0 - ta)) / alpha;
        v.round().clamp(0.0, 255.0) as u8
    };
    Color::rgba(
        channel(top.r, bottom.r),
        channel(top.g, bottom.g),
        channel(top.b, bottom.b),
        alpha as f32,
    )
}

/// sRGB relative luminance in `[0, 1]`. Alpha is ignored.
pub fn relative_luminance(color: Color) -> f64 {
    let linear = |c: u8| -> f64 {
        let v = c as f64 / 255.0;
        if v <= SRGB_LINEAR_THRESHOLD {
            v / SRGB_LINEAR_SCALE
        } else {
            ((v + 0.055) / 1.055).powf(SRGB_GAMMA)
        }
    };
    LUMA_R * linear(color.r) + LUMA_G * linear(color.g) + LUMA_B * linear(color.b)
}

/// True when every pair of RGB channels differs by at most `tolerance`.
pub fn is_achromatic(color: Color, tolerance: u8) -> bool {
    let (r, g, b) = (color.r as i16, color.g as i16, color.b as i16);
    let t = tolerance as i16;
    (r - g).abs() <= t && (r - b).abs() <= t && (g - b).abs() <= t
}

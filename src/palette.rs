// src/palette.rs

//! The target palette: an ordered set of replacement colours with
//! non-decreasing luminance.
//!
//! A palette is built from a base list (configuration, or the built-in fallback)
//! and then extended with one synthesised endpoint darker than the darkest entry
//! and one lighter than the lightest, so that source greys beyond the base range
//! still have somewhere to go.

use crate::color::{relative_luminance, Color};
use crate::config::PaletteSource;
use log::{debug, error, warn};
use once_cell::sync::Lazy;

/// Default amount by which the synthesised endpoints extend the base range.
pub const DEFAULT_EXTENSION_FACTOR: f64 = 0.2;

/// Hex strings of the built-in fallback palette, dark to light.
pub const BUILTIN_PALETTE_HEX: [&str; 8] = [
    "#282828", "#3c3836", "#504945", "#665c54", "#bdae93", "#d5c4a1", "#ebdbb2", "#fbf1c7",
];

static BUILTIN_PALETTE: Lazy<Vec<Color>> = Lazy::new(|| {
    BUILTIN_PALETTE_HEX
        .iter()
        .filter_map(|hex| Color::from_hex(hex))
        .collect()
});

/// A palette entry together with its cached luminance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaletteEntry {
    pub color: Color,
    pub luminance: f64,
}

/// An ordered palette of opaque colours, sorted by ascending luminance.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    entries: Vec<PaletteEntry>,
}

impl Palette {
    /// Returns the unextended built-in base colours.
    pub fn builtin_base() -> Vec<Color> {
        BUILTIN_PALETTE.clone()
    }

    /// Builds the extended built-in palette.
    pub fn builtin(factor: f64) -> Palette {
        Self::extend(&BUILTIN_PALETTE, factor)
    }

    /// Builds an extended palette from hex strings.
    ///
    /// Entries that fail to parse are dropped. If nothing usable remains the
    /// built-in palette is used instead; this never fails.
    pub fn from_hex_strings<S: AsRef<str>>(hex: &[S], factor: f64) -> Palette {
        let base: Vec<Color> = hex
            .iter()
            .filter_map(|s| {
                let parsed = Color::from_hex(s.as_ref());
                if parsed.is_none() {
                    warn!("Palette: ignoring unparseable entry {:?}", s.as_ref());
                }
                parsed
            })
            .collect();

        if base.is_empty() {
            warn!("Palette: no usable base colours, using built-in palette");
            return Self::builtin(factor);
        }
        Self::extend(&base, factor)
    }

    /// Loads base colours from `source`, falling back to the built-in palette
    /// when the source is unavailable.
    pub fn from_source(source: &dyn PaletteSource, factor: f64) -> Palette {
        match source.load() {
            Ok(hex) => Self::from_hex_strings(&hex, factor),
            Err(e) => {
                error!("Palette: failed to load palette ({:#}), using built-in palette", e);
                Self::builtin(factor)
            }
        }
    }

    /// Sorts `base` by luminance and adds a darker and a lighter endpoint.
    ///
    /// `base` must not be empty. The darker endpoint moves the darkest entry's
    /// channels towards 0 by `factor`; the lighter one moves the lightest entry's
    /// channels towards 255.
    pub fn extend(base: &[Color], factor: f64) -> Palette {
        let mut sorted: Vec<PaletteEntry> = base
            .iter()
            .map(|c| {
                let color = c.opaque();
                PaletteEntry {
                    color,
                    luminance: relative_luminance(color),
                }
            })
            .collect();
        sorted.sort_by(|a, b| a.luminance.total_cmp(&b.luminance));

        let (Some(first), Some(last)) = (sorted.first().copied(), sorted.last().copied()) else {
            // Only reachable through a caller ignoring the precondition.
            return Self::builtin(factor);
        };

        let darker = first.color.darken(factor);
        let lighter = last.color.lighten(factor);
        debug!(
            "Palette: extending {} base entries with {} and {}",
            sorted.len(),
            darker,
            lighter
        );

        let mut entries = Vec::with_capacity(sorted.len() + 2);
        entries.push(PaletteEntry {
            color: darker,
            luminance: relative_luminance(darker),
        });
        entries.extend(sorted);
        entries.push(PaletteEntry {
            color: lighter,
            luminance: relative_luminance(lighter),
        });
        Palette { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PaletteEntry] {
        &self.entries
    }

    pub fn colors(&self) -> impl Iterator<Item = Color> + '_ {
        self.entries.iter().map(|e| e.color)
    }

    /// Lowest and highest luminance in the palette.
    pub fn luminance_range(&self) -> (f64, f64) {
        let min = self.entries.first().map_or(0.0, |e| e.luminance);
        let max = self.entries.last().map_or(1.0, |e| e.luminance);
        (min, max)
    }

    /// Returns the entry whose luminance is closest to `target`.
    ///
    /// Exact ties resolve to the lower-luminance entry: entries are visited in
    /// ascending order and only a strictly smaller distance replaces the
    /// current best.
    pub fn nearest(&self, target: f64) -> Color {
        let mut best = match self.entries.first() {
            Some(e) => e,
            None => return crate::color::WHITE,
        };
        let mut best_diff = (best.luminance - target).abs();
        for entry in &self.entries[1..] {
            let diff = (entry.luminance - target).abs();
            if diff < best_diff {
                best = entry;
                best_diff = diff;
            }
        }
        best.color
    }
}

// src/mapper.rs

//! Memoized mapping from observed grey colours to palette entries.
//!
//! The mapping is insert-only: once a source colour has been assigned a
//! replacement, that assignment never changes for the lifetime of the mapper.
//! Re-selecting on every scan would make elements flicker between neighbouring
//! palette entries as the set of observed colours grows.

use crate::color::{relative_luminance, Color};
use crate::palette::Palette;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a source luminance is matched against the palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MappingPolicy {
    /// Pick the palette entry with the closest luminance to the source.
    #[default]
    Direct,
    /// Linearly rescale the observed source luminance range onto the palette's
    /// luminance range, then pick the closest entry to the rescaled value.
    RangeRemapped,
}

/// Frozen source luminance range used by `MappingPolicy::RangeRemapped`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SourceRange {
    min: f64,
    max: f64,
}

impl SourceRange {
    fn observe<I: IntoIterator<Item = Color>>(colors: I) -> SourceRange {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for c in colors {
            let lum = relative_luminance(c);
            min = min.min(lum);
            max = max.max(lum);
        }
        if min > max {
            // Nothing observed: treat sources as spanning the full range.
            return SourceRange { min: 0.0, max: 1.0 };
        }
        SourceRange { min, max }
    }

    fn relative(&self, lum: f64) -> f64 {
        let span = self.max - self.min;
        let span = if span == 0.0 { 1.0 } else { span };
        (lum - self.min) / span
    }
}

/// Maps achromatic source colours to palette entries, memoizing every result.
#[derive(Debug, Clone)]
pub struct LuminanceMapper {
    palette: Palette,
    policy: MappingPolicy,
    source_range: SourceRange,
    mapping: HashMap<u32, Color>,
}

impl LuminanceMapper {
    /// Creates a mapper and seeds it with the colours observed so far.
    ///
    /// For `RangeRemapped` the observed range of `initial` is frozen here, so
    /// colours added later are mapped against the same range.
    pub fn new<I>(palette: Palette, policy: MappingPolicy, initial: I) -> Self
    where
        I: IntoIterator<Item = Color>,
    {
        let initial: Vec<Color> = initial.into_iter().map(Color::opaque).collect();
        let source_range = SourceRange::observe(initial.iter().copied());
        let mut mapper = LuminanceMapper {
            palette,
            policy,
            source_range,
            mapping: HashMap::with_capacity(initial.len()),
        };
        mapper.extend(initial);
        debug!(
            "LuminanceMapper: {:?} policy, {} seeded colours, source range [{:.4}, {:.4}]",
            mapper.policy,
            mapper.mapping.len(),
            mapper.source_range.min,
            mapper.source_range.max
        );
        mapper
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn policy(&self) -> MappingPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Returns the memoized replacement for `source` without inserting.
    pub fn lookup(&self, source: Color) -> Option<Color> {
        self.mapping.get(&source.key()).copied()
    }

    /// Returns the replacement for `source`, computing and storing it on first use.
    pub fn map(&mut self, source: Color) -> Color {
        let key = source.key();
        if let Some(existing) = self.mapping.get(&key) {
            return *existing;
        }
        let replacement = self.select(source);
        trace!("LuminanceMapper: {} -> {}", source.opaque(), replacement);
        self.mapping.insert(key, replacement);
        replacement
    }

    /// Adds mappings for any colours not already present. Existing entries are untouched.
    pub fn extend<I: IntoIterator<Item = Color>>(&mut self, colors: I) {
        for c in colors {
            self.map(c);
        }
    }

    /// Iterates over `(source, replacement)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (Color, Color)> + '_ {
        self.mapping.iter().map(|(key, replacement)| {
            let source = Color::rgb((key >> 16) as u8, (key >> 8) as u8, *key as u8);
            (source, *replacement)
        })
    }

    fn select(&self, source: Color) -> Color {
        let lum = relative_luminance(source);
        let target = match self.policy {
            MappingPolicy::Direct => lum,
            MappingPolicy::RangeRemapped => {
                let (pmin, pmax) = self.palette.luminance_range();
                pmin + self.source_range.relative(lum) * (pmax - pmin)
            }
        };
        self.palette.nearest(target)
    }
}

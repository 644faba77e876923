// src/classify.rs

//! Greyscale classification of resolved colours.

use crate::color::{is_achromatic, Color};

/// Default maximum channel spread for a grey.
pub const DEFAULT_TOLERANCE: u8 = 20;

/// Decides whether an effective (composited) colour is a grey that should be remapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreyClassifier {
    tolerance: u8,
}

impl Default for GreyClassifier {
    fn default() -> Self {
        GreyClassifier::new(DEFAULT_TOLERANCE)
    }
}

impl GreyClassifier {
    pub fn new(tolerance: u8) -> Self {
        GreyClassifier { tolerance }
    }

    pub fn tolerance(&self) -> u8 {
        self.tolerance
    }

    /// Returns the opaque grey to remap, or `None` if `color` is not a candidate.
    ///
    /// Fully transparent colours are never candidates: nothing of them is rendered.
    pub fn classify(&self, color: Color) -> Option<Color> {
        if color.is_transparent() {
            return None;
        }
        let opaque = color.opaque();
        is_achromatic(opaque, self.tolerance).then_some(opaque)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::TRANSPARENT;

    #[test]
    fn greys_within_tolerance_are_candidates() {
        let classifier = GreyClassifier::new(10);
        assert_eq!(
            classifier.classify(Color::rgb(128, 128, 128)),
            Some(Color::rgb(128, 128, 128))
        );
        assert_eq!(classifier.classify(Color::rgb(128, 90, 128)), None);
    }

    #[test]
    fn tolerance_is_respected() {
        let c = Color::rgb(100, 115, 100);
        assert!(GreyClassifier::new(10).classify(c).is_none());
        assert!(GreyClassifier::new(20).classify(c).is_some());
    }

    #[test]
    fn transparent_is_never_a_candidate() {
        assert_eq!(GreyClassifier::default().classify(TRANSPARENT), None);
    }
}

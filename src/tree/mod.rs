// src/tree/mod.rs

//! The host-tree boundary.
//!
//! The engine never owns visual elements. It sees them through the
//! `VisualTree` trait: structure (parent/children), resolved colour strings per
//! tracked attribute, geometry, and a way to write a colour override. Element
//! handles are plain ids so side tables keyed by them never extend an element's
//! lifetime.

pub mod memory;

#[cfg(test)]
mod tests;

use crate::error::TreeError;
use crate::color::Color;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Stable identity of an element in the host tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u64);

/// A colour-bearing attribute the engine can track and override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorAttribute {
    Background,
    Foreground,
    Border,
}

impl ColorAttribute {
    pub const ALL: [ColorAttribute; 3] = [
        ColorAttribute::Background,
        ColorAttribute::Foreground,
        ColorAttribute::Border,
    ];

    /// The CSS property name for this attribute.
    pub fn css_name(self) -> &'static str {
        match self {
            ColorAttribute::Background => "background-color",
            ColorAttribute::Foreground => "color",
            ColorAttribute::Border => "border-color",
        }
    }

    pub fn from_css_name(name: &str) -> Option<ColorAttribute> {
        ColorAttribute::ALL
            .into_iter()
            .find(|attr| attr.css_name() == name)
    }

    pub fn flag(self) -> TrackedAttributes {
        match self {
            ColorAttribute::Background => TrackedAttributes::BACKGROUND,
            ColorAttribute::Foreground => TrackedAttributes::FOREGROUND,
            ColorAttribute::Border => TrackedAttributes::BORDER,
        }
    }
}

bitflags! {
    /// The set of colour attributes the scanner inspects.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TrackedAttributes: u8 {
        const BACKGROUND = 1 << 0;
        const FOREGROUND = 1 << 1;
        const BORDER     = 1 << 2;
    }
}

impl Default for TrackedAttributes {
    fn default() -> Self {
        TrackedAttributes::all()
    }
}

impl TrackedAttributes {
    /// Iterates the tracked attributes in background, foreground, border order.
    pub fn attributes(self) -> impl Iterator<Item = ColorAttribute> {
        ColorAttribute::ALL
            .into_iter()
            .filter(move |attr| self.contains(attr.flag()))
    }
}

/// Rendered geometry of an element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// False when the element is not rendered at all (e.g. `display: none`).
    pub displayed: bool,
}

impl Default for Bounds {
    fn default() -> Self {
        Bounds {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 20.0,
            displayed: true,
        }
    }
}

impl Bounds {
    pub fn is_visible(&self) -> bool {
        self.displayed && self.width > 0.0 && self.height > 0.0
    }
}

/// A change notification delivered by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationRecord {
    /// Subtrees were inserted and/or removed. Only the root of each inserted
    /// subtree is listed.
    ChildList {
        added: Vec<ElementId>,
        removed: Vec<ElementId>,
    },
    /// An attribute on `target` changed.
    Attribute { target: ElementId, name: String },
}

/// Access to the host's visual tree.
pub trait VisualTree {
    fn root(&self) -> Option<ElementId>;

    fn parent(&self, id: ElementId) -> Option<ElementId>;

    /// Children in document order. Empty for unknown ids.
    fn children(&self, id: ElementId) -> Vec<ElementId>;

    fn contains(&self, id: ElementId) -> bool;

    /// The resolved (post-cascade) value of `attr`, as the host formats it.
    fn resolved_color(&self, id: ElementId, attr: ColorAttribute) -> Result<String, TreeError>;

    fn bounds(&self, id: ElementId) -> Result<Bounds, TreeError>;

    /// Overrides `attr` on `id` with `color`, taking precedence over all styles.
    fn set_color(&mut self, id: ElementId, attr: ColorAttribute, color: Color) -> Result<(), TreeError>;

    /// Orders two elements by document (pre-order) position. Ancestors sort
    /// before their descendants.
    fn compare_document_order(&self, a: ElementId, b: ElementId) -> Ordering {
        document_path(self, a).cmp(&document_path(self, b))
    }

    /// `id` followed by all of its descendants, in document order.
    fn subtree(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            let children = self.children(next);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Descendants of `id` in document order, excluding `id` itself.
    fn descendants(&self, id: ElementId) -> Vec<ElementId> {
        let mut all = self.subtree(id);
        if !all.is_empty() {
            all.remove(0);
        }
        all
    }

    /// Parent, grandparent, ... up to the root.
    fn ancestors(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            out.push(p);
            current = self.parent(p);
        }
        out
    }
}

/// Child indices from the root down to `id`. Comparing two paths
/// lexicographically gives document order, with an ancestor's path being a
/// prefix of its descendants'.
pub fn document_path<T: VisualTree + ?Sized>(tree: &T, id: ElementId) -> Vec<usize> {
    let mut path = Vec::new();
    let mut current = id;
    while let Some(parent) = tree.parent(current) {
        let index = tree
            .children(parent)
            .iter()
            .position(|c| *c == current)
            .unwrap_or(usize::MAX);
        path.push(index);
        current = parent;
    }
    path.reverse();
    path
}

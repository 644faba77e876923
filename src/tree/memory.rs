// src/tree/memory.rs

//! An in-memory `VisualTree` host.
//!
//! `MemoryTree` stands in for a real document: elements carry inline styles and
//! classes, a small class-based stylesheet supplies cascaded values, and every
//! structural or attribute change is appended to a mutation log that a driver
//! can hand to the coordinator. Engine overrides are kept in their own layer and
//! are not logged, the same way a host filters out the engine's own writes.

use super::{Bounds, ColorAttribute, ElementId, MutationRecord, VisualTree};
use crate::color::Color;
use crate::error::TreeError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

const DEFAULT_BACKGROUND: &str = "rgba(0, 0, 0, 0)";
const DEFAULT_FOREGROUND: &str = "rgb(0, 0, 0)";
const CURRENT_COLOR: &str = "currentcolor";

/// Serializable description of an element and its subtree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSpec {
    pub tag: String,
    pub classes: Vec<String>,
    /// Inline style declarations, keyed by CSS property name.
    pub style: HashMap<String, String>,
    pub bounds: Bounds,
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(tag: &str) -> Self {
        NodeSpec {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn with_style(mut self, property: &str, value: &str) -> Self {
        self.style.insert(property.to_string(), value.to_string());
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn with_bounds(mut self, width: f64, height: f64) -> Self {
        self.bounds.width = width;
        self.bounds.height = height;
        self
    }

    pub fn with_child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// A stylesheet rule: elements with `class` get `property: value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRule {
    pub class: String,
    pub property: String,
    pub value: String,
}

/// Serializable description of a whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSpec {
    pub stylesheet: Vec<StyleRule>,
    pub root: NodeSpec,
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    tag: String,
    classes: Vec<String>,
    style: HashMap<String, String>,
    attributes: HashMap<String, String>,
    overrides: HashMap<ColorAttribute, Color>,
    bounds: Bounds,
    unresolvable: bool,
}

/// In-memory host tree with a mutation log.
#[derive(Debug, Default)]
pub struct MemoryTree {
    nodes: HashMap<ElementId, Node>,
    root: Option<ElementId>,
    next_id: u64,
    stylesheet: Vec<StyleRule>,
    mutations: Vec<MutationRecord>,
    writes: Vec<(ElementId, ColorAttribute, Color)>,
}

impl MemoryTree {
    /// Builds a tree from `root`. Building does not log mutations.
    pub fn new(root: NodeSpec) -> Self {
        let mut tree = MemoryTree::default();
        let id = tree.insert_spec(None, root);
        tree.root = Some(id);
        tree
    }

    pub fn from_document(doc: DocumentSpec) -> Self {
        let mut tree = MemoryTree::new(doc.root);
        tree.stylesheet = doc.stylesheet;
        tree
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let doc: DocumentSpec =
            serde_json::from_str(json).context("Failed to parse document JSON")?;
        Ok(Self::from_document(doc))
    }

    fn insert_spec(&mut self, parent: Option<ElementId>, spec: NodeSpec) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                parent,
                children: Vec::with_capacity(spec.children.len()),
                tag: spec.tag,
                classes: spec.classes,
                style: spec.style,
                attributes: HashMap::new(),
                overrides: HashMap::new(),
                bounds: spec.bounds,
                unresolvable: false,
            },
        );
        for child in spec.children {
            let child_id = self.insert_spec(Some(id), child);
            if let Some(node) = self.nodes.get_mut(&id) {
                node.children.push(child_id);
            }
        }
        id
    }

    // --- Host-side mutations (logged) ---

    /// Inserts `spec` as the last child of `parent` and logs a structural mutation.
    pub fn append_child(&mut self, parent: ElementId, spec: NodeSpec) -> Option<ElementId> {
        if !self.nodes.contains_key(&parent) {
            return None;
        }
        let id = self.insert_spec(Some(parent), spec);
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(id);
        }
        self.mutations.push(MutationRecord::ChildList {
            added: vec![id],
            removed: Vec::new(),
        });
        Some(id)
    }

    /// Detaches `id` and its subtree and logs a structural mutation.
    pub fn remove(&mut self, id: ElementId) -> bool {
        let Some(parent) = self.nodes.get(&id).and_then(|n| n.parent) else {
            return false;
        };
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|c| *c != id);
        }
        for gone in self.subtree(id) {
            self.nodes.remove(&gone);
        }
        self.mutations.push(MutationRecord::ChildList {
            added: Vec::new(),
            removed: vec![id],
        });
        true
    }

    /// Sets an inline style property and logs a `style` attribute mutation.
    pub fn set_style(&mut self, id: ElementId, property: &str, value: &str) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        node.style.insert(property.to_string(), value.to_string());
        self.mutations.push(MutationRecord::Attribute {
            target: id,
            name: "style".to_string(),
        });
        true
    }

    /// Replaces the class list and logs a `class` attribute mutation.
    pub fn set_classes(&mut self, id: ElementId, classes: &[&str]) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        node.classes = classes.iter().map(|c| c.to_string()).collect();
        self.mutations.push(MutationRecord::Attribute {
            target: id,
            name: "class".to_string(),
        });
        true
    }

    /// Sets an arbitrary attribute with no styling effect and logs it.
    pub fn set_attribute(&mut self, id: ElementId, name: &str, value: &str) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        node.attributes.insert(name.to_string(), value.to_string());
        self.mutations.push(MutationRecord::Attribute {
            target: id,
            name: name.to_string(),
        });
        true
    }

    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.mutations)
    }

    // --- Silent changes (no mutation records) ---

    /// Adds a stylesheet rule without logging anything, as an external
    /// stylesheet finishing its load would.
    pub fn load_stylesheet_rule(&mut self, class: &str, property: &str, value: &str) {
        self.stylesheet.push(StyleRule {
            class: class.to_string(),
            property: property.to_string(),
            value: value.to_string(),
        });
    }

    pub fn set_bounds(&mut self, id: ElementId, bounds: Bounds) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.bounds = bounds;
        }
    }

    /// Makes every query on `id` fail, to simulate an element the host cannot resolve.
    pub fn set_unresolvable(&mut self, id: ElementId, unresolvable: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.unresolvable = unresolvable;
        }
    }

    // --- Inspection ---

    pub fn override_of(&self, id: ElementId, attr: ColorAttribute) -> Option<Color> {
        self.nodes.get(&id)?.overrides.get(&attr).copied()
    }

    pub fn tag(&self, id: ElementId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.tag.as_str())
    }

    /// Every engine write since the last call, in order.
    pub fn take_writes(&mut self) -> Vec<(ElementId, ColorAttribute, Color)> {
        std::mem::take(&mut self.writes)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Finds the first element (document order) with `tag`.
    pub fn find_by_tag(&self, tag: &str) -> Option<ElementId> {
        let root = self.root?;
        self.subtree(root)
            .into_iter()
            .find(|id| self.tag(*id) == Some(tag))
    }

    fn declared(&self, node: &Node, property: &str) -> Option<String> {
        if let Some(v) = node.style.get(property) {
            return Some(v.clone());
        }
        let classes: HashSet<&str> = node.classes.iter().map(String::as_str).collect();
        self.stylesheet
            .iter()
            .rev()
            .find(|rule| rule.property == property && classes.contains(rule.class.as_str()))
            .map(|rule| rule.value.clone())
    }

    fn resolve(&self, id: ElementId, attr: ColorAttribute) -> Result<String, TreeError> {
        let node = self.nodes.get(&id).ok_or(TreeError::Detached(id))?;
        if node.unresolvable {
            return Err(TreeError::Unresolvable {
                id,
                attr,
                reason: "host refused style query".to_string(),
            });
        }
        if let Some(color) = node.overrides.get(&attr) {
            return Ok(color.to_string());
        }
        let declared = self.declared(node, attr.css_name());
        match attr {
            ColorAttribute::Background => {
                Ok(declared.unwrap_or_else(|| DEFAULT_BACKGROUND.to_string()))
            }
            ColorAttribute::Foreground => match declared {
                Some(v) if !v.eq_ignore_ascii_case("inherit") => Ok(v),
                _ => match node.parent {
                    Some(parent) => self.resolve(parent, ColorAttribute::Foreground),
                    None => Ok(DEFAULT_FOREGROUND.to_string()),
                },
            },
            ColorAttribute::Border => match declared {
                Some(v) if !v.eq_ignore_ascii_case(CURRENT_COLOR) => Ok(v),
                _ => self.resolve(id, ColorAttribute::Foreground),
            },
        }
    }
}

impl VisualTree for MemoryTree {
    fn root(&self) -> Option<ElementId> {
        self.root
    }

    fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    fn children(&self, id: ElementId) -> Vec<ElementId> {
        self.nodes
            .get(&id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn contains(&self, id: ElementId) -> bool {
        self.nodes.contains_key(&id)
    }

    fn resolved_color(&self, id: ElementId, attr: ColorAttribute) -> Result<String, TreeError> {
        self.resolve(id, attr)
    }

    fn bounds(&self, id: ElementId) -> Result<Bounds, TreeError> {
        let node = self.nodes.get(&id).ok_or(TreeError::Detached(id))?;
        if node.unresolvable {
            return Err(TreeError::Unmeasurable(id));
        }
        Ok(node.bounds)
    }

    fn set_color(&mut self, id: ElementId, attr: ColorAttribute, color: Color) -> Result<(), TreeError> {
        let node = self.nodes.get_mut(&id).ok_or(TreeError::Detached(id))?;
        if node.unresolvable {
            return Err(TreeError::WriteRejected { id, attr });
        }
        node.overrides.insert(attr, color);
        self.writes.push((id, attr, color));
        Ok(())
    }
}

/// A `MemoryTree` shared between a host thread and the coordinator thread.
#[derive(Debug, Clone, Default)]
pub struct SharedTree(Arc<Mutex<MemoryTree>>);

impl SharedTree {
    pub fn new(tree: MemoryTree) -> Self {
        SharedTree(Arc::new(Mutex::new(tree)))
    }

    /// Locks the tree for host-side changes.
    pub fn lock(&self) -> MutexGuard<'_, MemoryTree> {
        // A panic on another thread leaves the tree structurally valid.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl VisualTree for SharedTree {
    fn root(&self) -> Option<ElementId> {
        self.lock().root()
    }

    fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.lock().parent(id)
    }

    fn children(&self, id: ElementId) -> Vec<ElementId> {
        self.lock().children(id)
    }

    fn contains(&self, id: ElementId) -> bool {
        self.lock().contains(id)
    }

    fn resolved_color(&self, id: ElementId, attr: ColorAttribute) -> Result<String, TreeError> {
        self.lock().resolved_color(id, attr)
    }

    fn bounds(&self, id: ElementId) -> Result<Bounds, TreeError> {
        self.lock().bounds(id)
    }

    fn set_color(&mut self, id: ElementId, attr: ColorAttribute, color: Color) -> Result<(), TreeError> {
        self.lock().set_color(id, attr, color)
    }

    fn subtree(&self, id: ElementId) -> Vec<ElementId> {
        self.lock().subtree(id)
    }
}

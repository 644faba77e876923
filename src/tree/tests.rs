// src/tree/tests.rs

use super::memory::{MemoryTree, NodeSpec};
use super::*;
use crate::color::Color;

fn sample() -> MemoryTree {
    // body
    // ├── header
    // │   └── title
    // └── main
    //     └── para
    MemoryTree::new(
        NodeSpec::new("body")
            .with_style("background-color", "rgb(255, 255, 255)")
            .with_child(NodeSpec::new("header").with_child(NodeSpec::new("title")))
            .with_child(NodeSpec::new("main").with_child(NodeSpec::new("para"))),
    )
}

#[test]
fn subtree_is_preorder() {
    let tree = sample();
    let root = tree.root().unwrap();
    let tags: Vec<_> = tree
        .subtree(root)
        .into_iter()
        .map(|id| tree.tag(id).unwrap().to_string())
        .collect();
    assert_eq!(tags, ["body", "header", "title", "main", "para"]);
}

#[test]
fn document_order_puts_ancestors_first() {
    let tree = sample();
    let header = tree.find_by_tag("header").unwrap();
    let title = tree.find_by_tag("title").unwrap();
    let para = tree.find_by_tag("para").unwrap();
    assert_eq!(tree.compare_document_order(header, title), Ordering::Less);
    assert_eq!(tree.compare_document_order(para, title), Ordering::Greater);
    assert_eq!(tree.compare_document_order(para, para), Ordering::Equal);
}

#[test]
fn foreground_inherits_and_border_follows_current_color() {
    let mut tree = sample();
    let root = tree.root().unwrap();
    let para = tree.find_by_tag("para").unwrap();
    tree.set_style(root, "color", "rgb(10, 10, 10)");
    assert_eq!(
        tree.resolved_color(para, ColorAttribute::Foreground).unwrap(),
        "rgb(10, 10, 10)"
    );
    assert_eq!(
        tree.resolved_color(para, ColorAttribute::Border).unwrap(),
        "rgb(10, 10, 10)"
    );
    assert_eq!(
        tree.resolved_color(para, ColorAttribute::Background).unwrap(),
        "rgba(0, 0, 0, 0)"
    );
}

#[test]
fn overrides_win_and_are_not_logged() {
    let mut tree = sample();
    let para = tree.find_by_tag("para").unwrap();
    tree.set_color(para, ColorAttribute::Background, Color::rgb(1, 2, 3))
        .unwrap();
    assert_eq!(
        tree.resolved_color(para, ColorAttribute::Background).unwrap(),
        "#010203"
    );
    assert!(tree.take_mutations().is_empty());
    assert_eq!(tree.take_writes().len(), 1);
}

#[test]
fn stylesheet_rules_apply_silently() {
    let mut tree = sample();
    let main = tree.find_by_tag("main").unwrap();
    tree.set_classes(main, &["panel"]);
    tree.take_mutations();
    tree.load_stylesheet_rule("panel", "background-color", "rgb(40, 40, 40)");
    assert!(tree.take_mutations().is_empty());
    assert_eq!(
        tree.resolved_color(main, ColorAttribute::Background).unwrap(),
        "rgb(40, 40, 40)"
    );
}

#[test]
fn structural_mutations_are_logged() {
    let mut tree = sample();
    let main = tree.find_by_tag("main").unwrap();
    let added = tree.append_child(main, NodeSpec::new("aside")).unwrap();
    assert!(tree.remove(main));
    assert!(!tree.contains(added));
    assert_eq!(
        tree.take_mutations(),
        vec![
            MutationRecord::ChildList {
                added: vec![added],
                removed: vec![]
            },
            MutationRecord::ChildList {
                added: vec![],
                removed: vec![main]
            },
        ]
    );
}

#[test]
fn unresolvable_elements_report_errors() {
    let mut tree = sample();
    let title = tree.find_by_tag("title").unwrap();
    tree.set_unresolvable(title, true);
    assert!(matches!(
        tree.resolved_color(title, ColorAttribute::Foreground),
        Err(TreeError::Unresolvable { .. })
    ));
    assert_eq!(tree.bounds(title), Err(TreeError::Unmeasurable(title)));
}

#[test]
fn tracked_attributes_iterate_in_fixed_order() {
    let set = TrackedAttributes::BORDER | TrackedAttributes::BACKGROUND;
    assert_eq!(
        set.attributes().collect::<Vec<_>>(),
        vec![ColorAttribute::Background, ColorAttribute::Border]
    );
    assert_eq!(
        ColorAttribute::from_css_name("border-color"),
        Some(ColorAttribute::Border)
    );
}

#[test]
fn documents_load_from_json() {
    let json = r#"{
        "stylesheet": [{ "class": "dim", "property": "color", "value": "rgb(90, 90, 90)" }],
        "root": { "tag": "body", "children": [{ "tag": "p", "classes": ["dim"] }] }
    }"#;
    let tree = MemoryTree::from_json(json).unwrap();
    let p = tree.find_by_tag("p").unwrap();
    assert_eq!(
        tree.resolved_color(p, ColorAttribute::Foreground).unwrap(),
        "rgb(90, 90, 90)"
    );
}

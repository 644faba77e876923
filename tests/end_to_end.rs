use greyshift::color::{relative_luminance, Color};
use greyshift::config::Config;
use greyshift::coordinator::{
    create_coordinator_channel, Coordinator, CoordinatorActor, CoordinatorEvent, CoordinatorState, CycleKind,
};
use greyshift::engine::Engine;
use greyshift::mapper::MappingPolicy;
use greyshift::palette::Palette;
use greyshift::settings::{MemoryBackend, Settings, SettingsBackend, SettingsService};
use greyshift::tree::memory::{MemoryTree, NodeSpec, SharedTree};
use greyshift::tree::{ColorAttribute, ElementId, MutationRecord, VisualTree};
use serde_json::json;
use std::collections::HashSet;
use std::sync::mpsc;
use std::time::Duration;

const REPORT_TIMEOUT: Duration = Duration::from_secs(10);

fn grey_page() -> MemoryTree {
    MemoryTree::new(
        NodeSpec::new("body")
            .with_style("background-color", "rgb(255, 255, 255)")
            .with_child(NodeSpec::new("div").with_style("background-color", "rgb(128, 128, 128)")),
    )
}

fn resolved_colors(tree: &MemoryTree, ids: &[ElementId]) -> Vec<String> {
    ids.iter()
        .flat_map(|id| ColorAttribute::ALL.iter().map(move |attr| (*id, *attr)))
        .map(|(id, attr)| tree.resolved_color(id, attr).unwrap())
        .collect()
}

#[test]
fn builtin_palette_keeps_a_mid_grey_stable_across_rescans() {
    let palette = Palette::builtin(0.2);
    assert_eq!(palette.len(), 10);
    let lums: Vec<f64> = palette.colors().map(relative_luminance).collect();
    assert!(lums.windows(2).all(|w| w[0] <= w[1]));

    let mut tree = grey_page();
    let mut engine = Engine::new(Config::default(), palette);
    engine.start(&mut tree);

    let div = tree.find_by_tag("div").unwrap();
    let first = tree.override_of(div, ColorAttribute::Background).unwrap();
    let expected = engine
        .palette()
        .nearest(relative_luminance(Color::rgb(128, 128, 128)));
    assert_eq!(first, expected);

    for _ in 0..100 {
        engine.rescan_all(&mut tree);
        assert_eq!(tree.override_of(div, ColorAttribute::Background), Some(first));
    }
}

#[test]
fn range_remapped_overrides_are_stable_across_batches_and_rescans() {
    let mut tree = MemoryTree::new(
        NodeSpec::new("body")
            .with_style("background-color", "rgb(255, 255, 255)")
            .with_style("color", "rgb(75, 75, 75)")
            .with_child(
                NodeSpec::new("div")
                    .with_style("background-color", "rgb(128, 128, 128)")
                    .with_child(NodeSpec::new("p")),
            ),
    );
    let mut config = Config::default();
    config.mapping.policy = MappingPolicy::RangeRemapped;
    let mut engine = Engine::from_config(config);
    let mut coordinator = Coordinator::new();
    coordinator.start(&mut engine, &mut tree);
    tree.take_mutations();

    let div = tree.find_by_tag("div").unwrap();
    let span = tree.append_child(div, NodeSpec::new("span")).unwrap();
    coordinator.notify(tree.take_mutations());
    coordinator.flush(&mut engine, &mut tree);

    let body = tree.root().unwrap();
    let fg = tree.resolved_color(body, ColorAttribute::Foreground).unwrap();
    assert_eq!(tree.resolved_color(span, ColorAttribute::Foreground).unwrap(), fg);

    let snapshot = resolved_colors(&tree, &[body, div, span]);
    tree.take_writes();
    for _ in 0..100 {
        assert_eq!(engine.rescan_all(&mut tree).recolored, 0);
    }
    assert!(tree.take_writes().is_empty());
    assert_eq!(resolved_colors(&tree, &[body, div, span]), snapshot);
}

#[test]
fn inserted_subtree_is_recoloured_exactly_once() {
    const N: usize = 12;
    let mut tree = grey_page();
    let mut engine = Engine::from_config(Config::default());
    let mut coordinator = Coordinator::new();
    coordinator.start(&mut engine, &mut tree);
    tree.take_writes();

    let div = tree.find_by_tag("div").unwrap();
    let items = (0..N).fold(NodeSpec::new("ul"), |ul, i| {
        let shade = format!("rgb({0}, {0}, {0})", 40 + i * 15);
        ul.with_child(NodeSpec::new("li").with_style("border-color", &shade))
    });
    let list = tree.append_child(div, items).unwrap();

    let mut records = tree.take_mutations();
    records.push(MutationRecord::ChildList {
        added: vec![list],
        removed: vec![],
    });
    coordinator.notify(records);
    coordinator.flush(&mut engine, &mut tree);
    assert_eq!(coordinator.state(), CoordinatorState::Idle);

    let borders: Vec<_> = tree
        .take_writes()
        .into_iter()
        .filter(|(_, attr, _)| *attr == ColorAttribute::Border)
        .map(|(id, _, _)| id)
        .collect();
    let unique: HashSet<_> = borders.iter().copied().collect();
    assert_eq!(borders.len(), unique.len());
    for li in tree.children(list) {
        assert!(unique.contains(&li));
    }
}

#[test]
fn stylesheet_load_triggers_a_full_rescan() {
    let mut tree = MemoryTree::new(
        NodeSpec::new("body")
            .with_style("background-color", "rgb(255, 255, 255)")
            .with_child(NodeSpec::new("aside").with_class("late"))
            .with_child(NodeSpec::new("footer").with_class("late")),
    );
    let mut engine = Engine::from_config(Config::default());
    let mut coordinator = Coordinator::new();
    coordinator.start(&mut engine, &mut tree);

    tree.load_stylesheet_rule("late", "background-color", "rgb(90, 90, 90)");
    coordinator.stylesheet_loaded(&mut engine, &mut tree);

    for tag in ["aside", "footer"] {
        let id = tree.find_by_tag(tag).unwrap();
        assert!(tree.override_of(id, ColorAttribute::Background).is_some());
    }
    assert_eq!(coordinator.stats().rescans, 1);
}

struct BrokenBackend;

impl SettingsBackend for BrokenBackend {
    fn read(&mut self) -> anyhow::Result<Settings> {
        anyhow::bail!("disk unavailable")
    }

    fn write(&mut self, _settings: &Settings) -> anyhow::Result<()> {
        anyhow::bail!("disk unavailable")
    }
}

#[test]
fn broken_settings_leave_configuration_untouched() {
    let service = SettingsService::spawn(BrokenBackend).unwrap();
    let handle = service.handle();
    let settings = handle.get();
    assert!(settings.is_empty());
    assert!(!handle.set(Settings::new()));

    let mut config = Config::default();
    assert!(!config.apply_settings(&settings));
    assert_eq!(config, Config::default());
}

#[test]
fn settings_change_reconfigures_running_actor() {
    let shared = SharedTree::new(grey_page());
    let (sender, event_rx) = create_coordinator_channel();
    let (report_tx, report_rx) = mpsc::channel();
    let actor = CoordinatorActor::spawn(
        Engine::from_config(Config::default()),
        shared.clone(),
        event_rx,
        Some(report_tx),
    )
    .unwrap();
    assert_eq!(
        report_rx.recv_timeout(REPORT_TIMEOUT).unwrap().kind,
        CycleKind::Startup
    );

    let service = SettingsService::spawn(MemoryBackend::default()).unwrap();
    let handle = service.handle();
    let update = json!({ "palette": ["#1d2021", "#f9f5d7"] });
    assert!(handle.set(update.as_object().cloned().unwrap()));

    let mut config = Config::default();
    assert!(config.apply_settings(&handle.get()));
    let new_palette = config.palette.build();
    sender.send(config).unwrap();

    let report = report_rx.recv_timeout(REPORT_TIMEOUT).unwrap();
    assert_eq!(report.kind, CycleKind::Reconfigure);

    let host = shared.lock();
    let div = host.find_by_tag("div").unwrap();
    let replacement = host.override_of(div, ColorAttribute::Background).unwrap();
    assert!(new_palette.colors().any(|c| c == replacement));
    drop(host);

    sender.send(CoordinatorEvent::Shutdown).unwrap();
    drop(actor);
}

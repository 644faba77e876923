// src/main.rs

//! Demo driver: recolours a JSON document fixture and prints the overrides.
//!
//! Usage: `greyshift [document.json] [config.json]`. Without a document a small
//! built-in page is used.

use anyhow::{Context, Result};
use greyshift::config::Config;
use greyshift::coordinator::{create_coordinator_channel, CoordinatorActor, CoordinatorEvent};
use greyshift::engine::Engine;
use greyshift::settings::{JsonFileBackend, MemoryBackend, SettingsService};
use greyshift::tree::memory::{MemoryTree, SharedTree};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

const SAMPLE_DOCUMENT: &str = r##"{
    "stylesheet": [
        { "class": "muted", "property": "color", "value": "rgb(119, 119, 119)" },
        { "class": "card", "property": "background-color", "value": "#f4f4f4" }
    ],
    "root": {
        "tag": "body",
        "style": { "background-color": "rgb(255, 255, 255)", "color": "rgb(34, 34, 34)" },
        "children": [
            { "tag": "header", "style": { "background-color": "rgb(51, 51, 51)", "color": "#eeeeee" } },
            { "tag": "section", "classes": ["card"], "children": [
                { "tag": "p", "classes": ["muted"] },
                { "tag": "a", "style": { "color": "rgb(0, 102, 204)" } },
                { "tag": "hr", "style": { "border-color": "rgba(0, 0, 0, 0.25)" } }
            ] }
        ]
    }
}"##;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let mut args = std::env::args().skip(1);
    let document_path = args.next().map(PathBuf::from);
    let config_path = args.next().map(PathBuf::from);

    let mut config = Config::load_or_default(config_path.as_deref());

    // Persisted settings take precedence over the config file.
    let settings_service = match &config.settings.path {
        Some(path) => SettingsService::spawn(JsonFileBackend::new(path.clone())),
        None => SettingsService::spawn(MemoryBackend::default()),
    }
    .context("Failed to start settings service")?;
    let settings = settings_service.handle().get();
    if config.apply_settings(&settings) {
        info!("Applied {} persisted settings", settings.len());
    }

    let tree = match &document_path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read document {}", path.display()))?;
            MemoryTree::from_json(&json)?
        }
        None => {
            warn!("No document given, using the built-in sample page");
            MemoryTree::from_json(SAMPLE_DOCUMENT)?
        }
    };
    info!("Loaded document with {} elements", tree.len());

    let shared = SharedTree::new(tree);
    let engine = Engine::from_config(config);
    let (sender, event_rx) = create_coordinator_channel();
    let (report_tx, report_rx) = mpsc::channel();
    let actor = CoordinatorActor::spawn(engine, shared.clone(), event_rx, Some(report_tx))?;

    let startup = report_rx
        .recv_timeout(STARTUP_TIMEOUT)
        .context("Coordinator did not finish the startup scan")?;
    info!(
        "Startup scan: {} elements visited, {} overrides written",
        startup.scan.visited, startup.scan.recolored
    );

    if sender.send(CoordinatorEvent::Shutdown).is_err() {
        warn!("Coordinator already stopped");
    }
    drop(actor);

    let mut host = shared.lock();
    for (id, attr, color) in host.take_writes() {
        println!(
            "{:>4} {:<8} {:<16} {}",
            id.0,
            host.tag(id).unwrap_or("?"),
            attr.css_name(),
            color
        );
    }
    Ok(())
}

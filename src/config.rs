// src/config.rs

//! Configuration structures for the greyshift engine.
//!
//! Every struct deserializes with `#[serde(default)]`, so a config file only
//! needs to name the values it changes. Default values mirror the engine's
//! built-in behaviour: the built-in palette, a tolerance of 20, and the direct
//! mapping policy.

use crate::classify::DEFAULT_TOLERANCE;
use crate::mapper::MappingPolicy;
use crate::palette::{Palette, DEFAULT_EXTENSION_FACTOR};
use crate::settings::Settings;
use crate::tree::TrackedAttributes;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

// --- Top-Level Configuration Structure ---

/// The complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub palette: PaletteConfig,
    pub classifier: ClassifierConfig,
    pub mapping: MappingConfig,
    pub scan: ScanConfig,
    pub settings: SettingsConfig,
}

// --- Palette Configuration ---

/// Where the target palette comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PaletteConfig {
    /// Inline base colours as hex strings. Ignored when `file` is set.
    pub colors: Vec<String>,
    /// A JSON file holding an array of hex strings.
    pub file: Option<PathBuf>,
    /// How far the synthesised darker/lighter endpoints reach past the base range.
    pub extension_factor: f64,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        PaletteConfig {
            colors: Vec::new(),
            file: None,
            extension_factor: DEFAULT_EXTENSION_FACTOR,
        }
    }
}

impl PaletteConfig {
    /// The configured palette source, or `None` to use the built-in palette.
    pub fn source(&self) -> Option<Box<dyn PaletteSource>> {
        if let Some(path) = &self.file {
            return Some(Box::new(PaletteFile::new(path.clone())));
        }
        if self.colors.is_empty() {
            return None;
        }
        Some(Box::new(InlinePalette(self.colors.clone())))
    }

    /// Builds the extended palette. Never fails; falls back to the built-in palette.
    pub fn build(&self) -> Palette {
        match self.source() {
            Some(source) => Palette::from_source(source.as_ref(), self.extension_factor),
            None => {
                debug!("PaletteConfig: no palette configured, using built-in palette");
                Palette::builtin(self.extension_factor)
            }
        }
    }
}

/// A provider of base palette colours as hex strings.
pub trait PaletteSource {
    fn load(&self) -> Result<Vec<String>>;
}

/// Palette colours given directly in configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct InlinePalette(pub Vec<String>);

impl PaletteSource for InlinePalette {
    fn load(&self) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// Palette colours stored in a JSON file as an array of hex strings.
#[derive(Debug, Clone, PartialEq)]
pub struct PaletteFile {
    path: PathBuf,
}

impl PaletteFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        PaletteFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PaletteSource for PaletteFile {
    fn load(&self) -> Result<Vec<String>> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read palette file {}", self.path.display()))?;
        let colors: Vec<String> = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse palette file {}", self.path.display()))?;
        Ok(colors)
    }
}

// --- Classifier / Mapping Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Maximum channel spread for a colour to count as grey.
    pub tolerance: u8,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct MappingConfig {
    pub policy: MappingPolicy,
}

// --- Scan Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    /// Which colour attributes are inspected and overridden.
    pub tracked: TrackedAttributes,
    /// Leave trees whose median background is already dark untouched.
    pub skip_dark_trees: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            tracked: TrackedAttributes::all(),
            skip_dark_trees: false,
        }
    }
}

// --- Settings Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct SettingsConfig {
    /// Persisted settings file. In-memory settings are used when unset.
    pub path: Option<PathBuf>,
}

// --- Loading ---

impl Config {
    /// Reads a JSON config file.
    pub fn load(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reads `path` if given, falling back to defaults on any error.
    pub fn load_or_default(path: Option<&Path>) -> Config {
        let Some(path) = path else {
            info!("No config file given, using defaults.");
            return Config::default();
        };
        match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{:#}; using default configuration", e);
                Config::default()
            }
        }
    }

    /// Overlays persisted settings onto this configuration.
    ///
    /// Known keys are `palette` (array of hex strings), `tolerance` (0-255) and
    /// `policy` (`"direct"` or `"range_remapped"`). Values of the wrong shape
    /// are ignored with a warning. Returns true if anything changed.
    pub fn apply_settings(&mut self, settings: &Settings) -> bool {
        let before = self.clone();

        if let Some(value) = settings.get("palette") {
            match serde_json::from_value::<Vec<String>>(value.clone()) {
                Ok(colors) => {
                    self.palette.colors = colors;
                    self.palette.file = None;
                }
                Err(e) => warn!("Settings: ignoring 'palette': {}", e),
            }
        }

        if let Some(value) = settings.get("tolerance") {
            match value.as_u64().and_then(|t| u8::try_from(t).ok()) {
                Some(tolerance) => self.classifier.tolerance = tolerance,
                None => warn!("Settings: ignoring 'tolerance': {}", value),
            }
        }

        if let Some(value) = settings.get("policy") {
            match serde_json::from_value::<MappingPolicy>(value.clone()) {
                Ok(policy) => self.mapping.policy = policy,
                Err(e) => warn!("Settings: ignoring 'policy': {}", e),
            }
        }

        let changed = *self != before;
        if changed {
            debug!("Settings: configuration updated: {:?}", self);
        }
        changed
    }

    /// The settings keys this configuration can be driven by, with current values.
    pub fn to_settings(&self) -> Settings {
        let mut settings = Settings::new();
        if !self.palette.colors.is_empty() {
            settings.insert(
                "palette".to_string(),
                Value::from(self.palette.colors.clone()),
            );
        }
        settings.insert(
            "tolerance".to_string(),
            Value::from(self.classifier.tolerance),
        );
        if let Ok(policy) = serde_json::to_value(self.mapping.policy) {
            settings.insert("policy".to_string(), policy);
        }
        settings
    }
}

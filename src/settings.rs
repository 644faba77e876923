// src/settings.rs

//! Persisted key/value settings behind a message-driven service.
//!
//! A `SettingsService` owns a `SettingsBackend` on its own thread. Callers talk
//! to it through a cloneable `SettingsHandle`: each request carries its own
//! reply channel, so many callers can share one service. Failures never reach
//! the caller as errors. Reads fail closed to an empty map and writes report
//! `false`; the cause is logged with `error!`.

use anyhow::{Context, Result};
use log::*;
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

/// A flat map of setting keys to JSON values.
pub type Settings = Map<String, Value>;

/// Storage for settings.
pub trait SettingsBackend: Send + 'static {
    fn read(&mut self) -> Result<Settings>;

    /// Merges `settings` into the stored map. Keys not named are kept.
    fn write(&mut self, settings: &Settings) -> Result<()>;
}

/// Settings kept in memory for the lifetime of the backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    settings: Settings,
}

impl MemoryBackend {
    pub fn new(settings: Settings) -> Self {
        MemoryBackend { settings }
    }
}

impl SettingsBackend for MemoryBackend {
    fn read(&mut self) -> Result<Settings> {
        Ok(self.settings.clone())
    }

    fn write(&mut self, settings: &Settings) -> Result<()> {
        for (key, value) in settings {
            self.settings.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

/// Settings stored as a JSON object in a file. A missing file reads as empty.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileBackend { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsBackend for JsonFileBackend {
    fn read(&mut self) -> Result<Settings> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Settings::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read settings {}", self.path.display()))
            }
        };
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse settings {}", self.path.display()))
    }

    fn write(&mut self, settings: &Settings) -> Result<()> {
        let mut merged = self.read()?;
        for (key, value) in settings {
            merged.insert(key.clone(), value.clone());
        }
        let text = serde_json::to_string_pretty(&merged).context("Failed to encode settings")?;
        fs::write(&self.path, text)
            .with_context(|| format!("Failed to write settings {}", self.path.display()))
    }
}

enum SettingsRequest {
    Get { reply: Sender<Settings> },
    Set { settings: Settings, reply: Sender<bool> },
    Shutdown,
}

/// Cloneable client side of a `SettingsService`.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    request_tx: Sender<SettingsRequest>,
}

impl std::fmt::Debug for SettingsRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsRequest::Get { .. } => write!(f, "Get"),
            SettingsRequest::Set { settings, .. } => write!(f, "Set({} keys)", settings.len()),
            SettingsRequest::Shutdown => write!(f, "Shutdown"),
        }
    }
}

impl SettingsHandle {
    /// Sends a read request and returns the pending reply.
    ///
    /// If the service has stopped, the returned receiver is already disconnected.
    pub fn request_get(&self) -> Receiver<Settings> {
        let (reply, rx) = mpsc::channel();
        if self.request_tx.send(SettingsRequest::Get { reply }).is_err() {
            warn!("SettingsHandle: service is not running");
        }
        rx
    }

    /// Sends a write request and returns the pending reply.
    pub fn request_set(&self, settings: Settings) -> Receiver<bool> {
        let (reply, rx) = mpsc::channel();
        if self
            .request_tx
            .send(SettingsRequest::Set { settings, reply })
            .is_err()
        {
            warn!("SettingsHandle: service is not running");
        }
        rx
    }

    /// Reads all settings, or an empty map if they cannot be read.
    pub fn get(&self) -> Settings {
        self.request_get().recv().unwrap_or_default()
    }

    /// Merges `settings` into storage. Returns false if the write failed.
    pub fn set(&self, settings: Settings) -> bool {
        self.request_set(settings).recv().unwrap_or(false)
    }
}

/// Owns a settings backend on a background thread.
pub struct SettingsService {
    handle: SettingsHandle,
    thread_handle: Option<JoinHandle<()>>,
}

impl SettingsService {
    pub fn spawn<B: SettingsBackend>(backend: B) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::channel();

        let thread_handle = thread::Builder::new()
            .name("settings".to_string())
            .spawn(move || Self::service_thread_main(backend, request_rx))
            .context("Failed to spawn settings service thread")?;

        debug!("SettingsService spawned");
        Ok(SettingsService {
            handle: SettingsHandle { request_tx },
            thread_handle: Some(thread_handle),
        })
    }

    pub fn handle(&self) -> SettingsHandle {
        self.handle.clone()
    }

    fn service_thread_main<B: SettingsBackend>(mut backend: B, request_rx: Receiver<SettingsRequest>) {
        while let Ok(request) = request_rx.recv() {
            trace!("SettingsService: {:?}", request);
            match request {
                SettingsRequest::Get { reply } => {
                    let settings = backend.read().unwrap_or_else(|e| {
                        error!("SettingsService: read failed: {:#}", e);
                        Settings::new()
                    });
                    // The caller may have given up waiting.
                    let _ = reply.send(settings);
                }
                SettingsRequest::Set { settings, reply } => {
                    let ok = match backend.write(&settings) {
                        Ok(()) => true,
                        Err(e) => {
                            error!("SettingsService: write failed: {:#}", e);
                            false
                        }
                    };
                    let _ = reply.send(ok);
                }
                SettingsRequest::Shutdown => break,
            }
        }
        debug!("SettingsService: shutting down");
    }
}

impl Drop for SettingsService {
    fn drop(&mut self) {
        let _ = self.handle.request_tx.send(SettingsRequest::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                error!("SettingsService thread panicked: {:?}", e);
            }
        }
    }
}

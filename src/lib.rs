// src/lib.rs

//! greyshift: recolours the greys of a live visual tree onto a target palette.
//!
//! A full scan at startup collects every grey in use and maps each onto the
//! palette entry of closest luminance; after that, host mutations are applied
//! incrementally so only changed subtrees are revisited.

pub mod classify;
pub mod color;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod palette;
pub mod resolve;
pub mod scanner;
pub mod settings;
pub mod tree;

pub use color::Color;
pub use config::Config;
pub use engine::Engine;
pub use error::TreeError;
pub use palette::Palette;
pub use tree::{ColorAttribute, ElementId, MutationRecord, VisualTree};

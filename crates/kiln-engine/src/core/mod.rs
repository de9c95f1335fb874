//! Engine-facing contracts.
//!
//! The runtime drives an [`Engine`] through an [`App`]; scenes see the engine
//! through a [`Context`] during their hooks.

mod app;
mod config;
mod context;
mod engine;

pub use app::{App, AppControl};
pub use config::{EngineConfig, WindowConfig};
pub use context::Context;
pub use engine::Engine;

//! Kiln: a small single-threaded rendering engine.
//!
//! The `device` layer owns the GPU, uploads resources and keeps one pipeline
//! per [`pipeline::PipelineKind`]. Above it, `render` objects draw themselves
//! into a frame, and `scene` stacks organize them with deferred mutation.
//! `core` and `window` tie everything to a winit event loop.

pub mod core;
pub mod device;
pub mod input;
pub mod logging;
pub mod paint;
pub mod pipeline;
pub mod render;
pub mod scene;
pub mod time;
pub mod window;

#[cfg(test)]
mod testing;

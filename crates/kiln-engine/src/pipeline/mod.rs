//! Graphics pipelines.
//!
//! A pipeline kind is a zero-sized tag type implementing [`PipelineKind`]; the
//! `Gpu` keeps at most one [`Pipeline`] per kind and builds it on first request.

mod builtin;
mod kind;
mod registry;
mod shader;

pub use builtin::{builtin_shader, ColorPipeline, ObjectPipeline, TrianglePipeline};
pub use kind::{PipelineKind, PipelineState};
pub use registry::Pipeline;
pub use shader::{SHADER_ENTRY_POINT, load_shader};

pub(crate) use registry::PipelineRegistry;

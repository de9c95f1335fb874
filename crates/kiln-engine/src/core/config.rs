use std::path::PathBuf;

use winit::dpi::LogicalSize;

use crate::device::GpuInit;
use crate::paint::Color;
use crate::pipeline::ObjectPipeline;

/// Window configuration.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "kiln".to_string(),
            initial_size: LogicalSize::new(1024.0, 720.0),
            resizable: true,
        }
    }
}

/// Everything needed to bring an engine up.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub gpu: GpuInit,

    /// Color every frame is cleared to.
    pub clear_color: Color,

    /// Upper bound on updates per second; `0` disables the limit.
    pub fps_limit: u32,

    /// Vertex and fragment shader of the object pipeline, registered at startup.
    pub object_shaders: (PathBuf, PathBuf),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            gpu: GpuInit::default(),
            clear_color: Color::BLACK,
            fps_limit: 144,
            object_shaders: ObjectPipeline::shaders(),
        }
    }
}

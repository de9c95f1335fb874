//! GPU device layer.
//!
//! This module owns the graphics device and everything created on it:
//! - `Backend`: raw device primitives (wgpu or headless)
//! - `Gpu`: device/surface owner, staged uploader, pipeline registry
//! - `Frame`: the command buffer, swapchain target and render pass of one frame

mod backend;
mod error;
mod frame;
mod gpu;
mod handle;
mod headless;
mod init;
mod native;
mod surface;
mod upload;

pub use backend::{
    Backend, BufferDesc, BufferUsage, CopyOp, PipelineDesc, SamplerDesc, ShaderDesc, ShaderFormat,
    ShaderResources, ShaderStage, TextureDesc, VertexLayout,
};
pub use error::{BackendError, FrameError, ResourceError, SurfaceErrorAction};
pub use frame::Frame;
pub use gpu::Gpu;
pub use handle::{
    BufferHandle, CommandBufferHandle, CopyPassHandle, DeviceId, PipelineHandle,
    RenderPassHandle, SamplerHandle, ShaderHandle, StagingHandle, TargetHandle, TextureHandle,
};
pub use headless::{Call, HeadlessBackend, HeadlessRecorder, Op};
pub use init::GpuInit;
pub use native::WgpuBackend;
pub use upload::{TEXTURE_FORMAT, TextureSource};

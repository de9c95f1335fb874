//! Hardware abstraction consumed by [`Gpu`](super::Gpu).
//!
//! A backend exposes raw, unguarded primitives: allocation, release, command
//! recording and presentation. Ordering rules (staging before copy, release
//! before device teardown, one frame in flight) are enforced one level up by
//! `Gpu`, `Frame` and the uploader; implementations only validate handles.
//!
//! Implementations:
//! - [`WgpuBackend`](super::WgpuBackend): wgpu device bound to a window surface
//! - [`HeadlessBackend`](super::HeadlessBackend): in-memory recorder used by tests

use std::ops::Range;

use crate::paint::Color;

use super::error::BackendError;
use super::handle::{
    BufferHandle, CommandBufferHandle, CopyPassHandle, PipelineHandle, RenderPassHandle,
    SamplerHandle, ShaderHandle, StagingHandle, TargetHandle, TextureHandle,
};

/// Intended use of a device-local buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Storage,
}

impl BufferUsage {
    pub(crate) fn to_wgpu(self) -> wgpu::BufferUsages {
        let usage = match self {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
            BufferUsage::Storage => wgpu::BufferUsages::STORAGE,
        };
        usage | wgpu::BufferUsages::COPY_DST
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex buffer",
            BufferUsage::Index => "index buffer",
            BufferUsage::Storage => "storage buffer",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    /// Size in bytes, already padded to the copy alignment.
    pub size: u64,
    pub usage: BufferUsage,
}

/// 2D sampled texture, always a copy destination.
#[derive(Debug, Clone)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

/// Sampler state. Defaults to nearest filtering with clamp-to-edge addressing.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SamplerDesc {
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub address_mode: wgpu::AddressMode,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            address_mode: wgpu::AddressMode::ClampToEdge,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Resource counts a shader stage declares.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct ShaderResources {
    pub samplers: u32,
    pub uniform_buffers: u32,
    pub storage_buffers: u32,
    pub storage_textures: u32,
}

impl ShaderResources {
    pub const NONE: Self = Self {
        samplers: 0,
        uniform_buffers: 0,
        storage_buffers: 0,
        storage_textures: 0,
    };

    pub const fn samplers(count: u32) -> Self {
        Self {
            samplers: count,
            ..Self::NONE
        }
    }

    /// Bit mask with one bit per declared sampler slot.
    pub const fn sampler_mask(&self) -> u32 {
        if self.samplers >= u32::BITS {
            u32::MAX
        } else {
            (1 << self.samplers) - 1
        }
    }
}

/// Encoding of shader code handed to the backend.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ShaderFormat {
    Wgsl,
    SpirV,
}

impl ShaderFormat {
    /// Format selected for this build.
    pub const fn native() -> Self {
        if cfg!(feature = "spirv") {
            ShaderFormat::SpirV
        } else {
            ShaderFormat::Wgsl
        }
    }

    /// File extension appended to shader paths of this format.
    pub const fn extension(self) -> &'static str {
        match self {
            ShaderFormat::Wgsl => "wgsl",
            ShaderFormat::SpirV => "spv",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShaderDesc<'a> {
    pub label: &'a str,
    pub stage: ShaderStage,
    pub format: ShaderFormat,
    pub code: &'a [u8],
    pub entry_point: &'a str,
    pub resources: ShaderResources,
}

/// Layout of one per-vertex buffer slot.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct VertexLayout {
    pub stride: u64,
    pub attributes: &'static [wgpu::VertexAttribute],
}

#[derive(Debug, Clone)]
pub struct PipelineDesc<'a> {
    pub label: &'a str,
    pub vertex: ShaderHandle,
    pub fragment: ShaderHandle,
    pub vertex_layouts: &'a [VertexLayout],
    pub topology: wgpu::PrimitiveTopology,
    pub cull_mode: Option<wgpu::Face>,
    pub front_face: wgpu::FrontFace,
    pub blend: Option<wgpu::BlendState>,
    pub color_format: wgpu::TextureFormat,
}

/// A transfer recorded inside a copy pass.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum CopyOp {
    /// `size` bytes from offset 0 of `src` to offset 0 of `dst`.
    Buffer {
        src: StagingHandle,
        dst: BufferHandle,
        size: u64,
    },
    /// Whole-texture upload; `bytes_per_row` is already padded.
    Texture {
        src: StagingHandle,
        bytes_per_row: u32,
        dst: TextureHandle,
        width: u32,
        height: u32,
    },
}

/// Raw device primitives.
///
/// Release functions return `false` for unknown handles instead of failing;
/// callers log and continue.
pub trait Backend {
    fn name(&self) -> &'static str;

    fn surface_format(&self) -> wgpu::TextureFormat;
    fn surface_size(&self) -> (u32, u32);

    /// Reconfigures the presentation surface. Zero sizes are recorded and the
    /// reconfiguration is deferred.
    fn resize(&mut self, width: u32, height: u32);

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<BufferHandle, BackendError>;
    fn release_buffer(&mut self, buffer: BufferHandle) -> bool;

    fn create_staging_buffer(&mut self, label: &str, size: u64)
    -> Result<StagingHandle, BackendError>;
    /// Maps the staging buffer, copies `bytes` from offset 0 and unmaps it.
    fn write_staging_buffer(
        &mut self,
        staging: StagingHandle,
        bytes: &[u8],
    ) -> Result<(), BackendError>;
    fn release_staging_buffer(&mut self, staging: StagingHandle) -> bool;

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureHandle, BackendError>;
    fn release_texture(&mut self, texture: TextureHandle) -> bool;

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle, BackendError>;
    fn release_sampler(&mut self, sampler: SamplerHandle) -> bool;

    fn create_shader(&mut self, desc: &ShaderDesc<'_>) -> Result<ShaderHandle, BackendError>;
    fn release_shader(&mut self, shader: ShaderHandle) -> bool;

    fn create_pipeline(&mut self, desc: &PipelineDesc<'_>)
    -> Result<PipelineHandle, BackendError>;
    fn release_pipeline(&mut self, pipeline: PipelineHandle) -> bool;

    fn acquire_command_buffer(&mut self) -> Result<CommandBufferHandle, BackendError>;
    /// Submits recorded work and presents any swapchain target acquired on it.
    fn submit(&mut self, cmd: CommandBufferHandle) -> Result<(), BackendError>;
    /// Drops recorded work without submitting it.
    fn discard_command_buffer(&mut self, cmd: CommandBufferHandle);

    fn begin_copy_pass(&mut self, cmd: CommandBufferHandle)
    -> Result<CopyPassHandle, BackendError>;
    fn copy(&mut self, pass: CopyPassHandle, op: &CopyOp) -> Result<(), BackendError>;
    fn end_copy_pass(&mut self, pass: CopyPassHandle);

    /// Blocks until a swapchain image is available.
    fn acquire_swapchain_target(
        &mut self,
        cmd: CommandBufferHandle,
    ) -> Result<TargetHandle, BackendError>;
    /// Begins a pass that clears `target` to `clear` and stores the result.
    fn begin_render_pass(
        &mut self,
        cmd: CommandBufferHandle,
        target: TargetHandle,
        clear: Color,
    ) -> Result<RenderPassHandle, BackendError>;
    fn end_render_pass(&mut self, pass: RenderPassHandle);

    fn bind_pipeline(
        &mut self,
        pass: RenderPassHandle,
        pipeline: PipelineHandle,
    ) -> Result<(), BackendError>;
    fn bind_vertex_buffer(
        &mut self,
        pass: RenderPassHandle,
        slot: u32,
        buffer: BufferHandle,
    ) -> Result<(), BackendError>;
    /// Binds a buffer of `u32` indices.
    fn bind_index_buffer(
        &mut self,
        pass: RenderPassHandle,
        buffer: BufferHandle,
    ) -> Result<(), BackendError>;
    /// Binds a texture and sampler pair to fragment sampler `slot` of the bound pipeline.
    fn bind_fragment_sampler(
        &mut self,
        pass: RenderPassHandle,
        slot: u32,
        texture: TextureHandle,
        sampler: SamplerHandle,
    ) -> Result<(), BackendError>;
    fn draw(
        &mut self,
        pass: RenderPassHandle,
        vertices: Range<u32>,
        instances: Range<u32>,
    ) -> Result<(), BackendError>;
    fn draw_indexed(
        &mut self,
        pass: RenderPassHandle,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    ) -> Result<(), BackendError>;

    /// Blocks until all submitted work has completed.
    fn wait_idle(&mut self);

    /// Number of buffers, textures, samplers, shaders and pipelines still alive.
    fn live_resources(&self) -> usize;

    /// Releases every remaining resource and returns how many there were.
    fn release_all(&mut self) -> usize;

    /// Detaches and drops the presentation surface.
    fn release_surface(&mut self);
}

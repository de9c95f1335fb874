//! In-memory backend.
//!
//! Allocates fake resources in slot maps, validates every handle it is given,
//! and records successful calls in order. A [`HeadlessRecorder`] shares the state
//! so callers can inspect the call log and inject failures after the backend
//! has been moved into a `Gpu`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;

use slotmap::SlotMap;

use crate::paint::Color;

use super::backend::{
    Backend, BufferDesc, BufferUsage, CopyOp, PipelineDesc, SamplerDesc, ShaderDesc,
    ShaderResources, ShaderStage, TextureDesc,
};
use super::error::{BackendError, SurfaceErrorAction};
use super::handle::{
    BufferHandle, CommandBufferHandle, CopyPassHandle, PipelineHandle, RenderPassHandle,
    SamplerHandle, ShaderHandle, StagingHandle, TargetHandle, TextureHandle,
};

/// Fallible operations that can be made to fail on demand.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Op {
    CreateBuffer,
    CreateStagingBuffer,
    WriteStagingBuffer,
    CreateTexture,
    CreateSampler,
    CreateShader,
    CreatePipeline,
    AcquireCommandBuffer,
    Submit,
    BeginCopyPass,
    Copy,
    AcquireSwapchainTarget,
    BeginRenderPass,
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Resize { width: u32, height: u32 },
    CreateBuffer { buffer: BufferHandle, size: u64, usage: BufferUsage },
    ReleaseBuffer(BufferHandle),
    CreateStagingBuffer { staging: StagingHandle, size: u64 },
    WriteStagingBuffer { staging: StagingHandle, len: usize },
    ReleaseStagingBuffer(StagingHandle),
    CreateTexture { texture: TextureHandle, width: u32, height: u32 },
    ReleaseTexture(TextureHandle),
    CreateSampler(SamplerHandle),
    ReleaseSampler(SamplerHandle),
    CreateShader { shader: ShaderHandle, label: String, stage: ShaderStage },
    ReleaseShader(ShaderHandle),
    CreatePipeline { pipeline: PipelineHandle, label: String },
    ReleasePipeline(PipelineHandle),
    AcquireCommandBuffer(CommandBufferHandle),
    Submit(CommandBufferHandle),
    DiscardCommandBuffer(CommandBufferHandle),
    BeginCopyPass(CopyPassHandle),
    Copy(CopyOp),
    EndCopyPass(CopyPassHandle),
    AcquireSwapchainTarget(TargetHandle),
    BeginRenderPass { pass: RenderPassHandle, clear: Color },
    EndRenderPass(RenderPassHandle),
    BindPipeline(PipelineHandle),
    BindVertexBuffer { slot: u32, buffer: BufferHandle },
    BindIndexBuffer(BufferHandle),
    BindFragmentSampler { slot: u32, texture: TextureHandle, sampler: SamplerHandle },
    Draw { vertices: Range<u32>, instances: Range<u32> },
    DrawIndexed { indices: Range<u32>, base_vertex: i32, instances: Range<u32> },
    WaitIdle,
    ReleaseAll(usize),
    ReleaseSurface,
}

#[derive(Debug, Copy, Clone)]
enum Injected {
    Platform,
    Surface(SurfaceErrorAction),
}

#[derive(Debug)]
struct FailPoint {
    remaining: u32,
    error: Injected,
}

struct RenderPassState {
    cmd: CommandBufferHandle,
    pipeline: Option<PipelineHandle>,
    index_buffer: Option<BufferHandle>,
    // One bit per sampler slot bound since the last pipeline bind.
    samplers_bound: u32,
}

struct HeadlessState {
    surface_format: wgpu::TextureFormat,
    size: (u32, u32),
    surface_attached: bool,

    buffers: SlotMap<BufferHandle, u64>,
    staging: SlotMap<StagingHandle, Vec<u8>>,
    textures: SlotMap<TextureHandle, (u32, u32)>,
    samplers: SlotMap<SamplerHandle, SamplerDesc>,
    shaders: SlotMap<ShaderHandle, (ShaderStage, ShaderResources)>,
    // Fragment resources per pipeline.
    pipelines: SlotMap<PipelineHandle, ShaderResources>,

    commands: SlotMap<CommandBufferHandle, ()>,
    copy_passes: SlotMap<CopyPassHandle, CommandBufferHandle>,
    targets: SlotMap<TargetHandle, CommandBufferHandle>,
    render_passes: SlotMap<RenderPassHandle, RenderPassState>,

    failures: HashMap<Op, FailPoint>,
    calls: Vec<Call>,
}

impl HeadlessState {
    fn new(width: u32, height: u32) -> Self {
        Self {
            surface_format: wgpu::TextureFormat::Bgra8UnormSrgb,
            size: (width, height),
            surface_attached: true,
            buffers: SlotMap::with_key(),
            staging: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            commands: SlotMap::with_key(),
            copy_passes: SlotMap::with_key(),
            targets: SlotMap::with_key(),
            render_passes: SlotMap::with_key(),
            failures: HashMap::new(),
            calls: Vec::new(),
        }
    }

    fn check(&mut self, op: Op) -> Result<(), BackendError> {
        let Some(point) = self.failures.get_mut(&op) else {
            return Ok(());
        };
        point.remaining = point.remaining.saturating_sub(1);
        if point.remaining > 0 {
            return Ok(());
        }
        let error = point.error;
        self.failures.remove(&op);

        log::debug!("headless: injected failure in {op:?}");
        Err(match error {
            Injected::Platform => BackendError::Platform(format!("injected failure in {op:?}")),
            Injected::Surface(action) => BackendError::Surface {
                action,
                reason: format!("injected failure in {op:?}"),
            },
        })
    }

    fn live(&self) -> usize {
        self.buffers.len()
            + self.staging.len()
            + self.textures.len()
            + self.samplers.len()
            + self.shaders.len()
            + self.pipelines.len()
    }

    fn pass_mut(&mut self, pass: RenderPassHandle) -> Result<&mut RenderPassState, BackendError> {
        self.render_passes
            .get_mut(pass)
            .ok_or_else(|| BackendError::invalid("render pass"))
    }

    fn bound_pipeline(&mut self, pass: RenderPassHandle) -> Result<PipelineHandle, BackendError> {
        self.pass_mut(pass)?
            .pipeline
            .ok_or_else(|| BackendError::Platform("no pipeline bound".into()))
    }

    /// Fails unless every sampler slot of the bound pipeline has a binding.
    fn check_draw_state(&mut self, pass: RenderPassHandle) -> Result<(), BackendError> {
        let pipeline = self.bound_pipeline(pass)?;
        let required = self
            .pipelines
            .get(pipeline)
            .map(ShaderResources::sampler_mask)
            .unwrap_or(0);
        let bound = self.pass_mut(pass)?.samplers_bound;
        if bound & required != required {
            return Err(BackendError::Platform(format!(
                "sampler slots {:#b} of the bound pipeline are unbound",
                required & !bound
            )));
        }
        Ok(())
    }
}

/// Backend that never touches a GPU.
pub struct HeadlessBackend {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessBackend {
    pub const DEFAULT_SIZE: (u32, u32) = (1024, 720);

    pub fn new() -> Self {
        let (width, height) = Self::DEFAULT_SIZE;
        Self::with_size(width, height)
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            state: Rc::new(RefCell::new(HeadlessState::new(width, height))),
        }
    }

    /// Returns a handle observing this backend.
    pub fn recorder(&self) -> HeadlessRecorder {
        HeadlessRecorder {
            state: Rc::clone(&self.state),
        }
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Inspection and failure-injection handle for a [`HeadlessBackend`].
#[derive(Clone)]
pub struct HeadlessRecorder {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessRecorder {
    /// Makes the next call of `op` fail.
    pub fn fail(&self, op: Op) {
        self.fail_nth(op, 1);
    }

    /// Makes the `n`-th upcoming call of `op` fail (1 = next call).
    pub fn fail_nth(&self, op: Op, n: u32) {
        self.state.borrow_mut().failures.insert(
            op,
            FailPoint {
                remaining: n.max(1),
                error: Injected::Platform,
            },
        );
    }

    /// Makes the next swapchain acquisition fail with a surface error.
    pub fn fail_surface(&self, action: SurfaceErrorAction) {
        self.state.borrow_mut().failures.insert(
            Op::AcquireSwapchainTarget,
            FailPoint {
                remaining: 1,
                error: Injected::Surface(action),
            },
        );
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn live_resources(&self) -> usize {
        self.state.borrow().live()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn live_staging_buffers(&self) -> usize {
        self.state.borrow().staging.len()
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.state.borrow().pipelines.len()
    }

    pub fn open_command_buffers(&self) -> usize {
        self.state.borrow().commands.len()
    }

    pub fn surface_attached(&self) -> bool {
        self.state.borrow().surface_attached
    }
}

impl Backend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn surface_format(&self) -> wgpu::TextureFormat {
        self.state.borrow().surface_format
    }

    fn surface_size(&self) -> (u32, u32) {
        self.state.borrow().size
    }

    fn resize(&mut self, width: u32, height: u32) {
        let mut s = self.state.borrow_mut();
        s.size = (width, height);
        s.calls.push(Call::Resize { width, height });
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<BufferHandle, BackendError> {
        let mut s = self.state.borrow_mut();
        s.check(Op::CreateBuffer)?;
        let buffer = s.buffers.insert(desc.size);
        s.calls.push(Call::CreateBuffer {
            buffer,
            size: desc.size,
            usage: desc.usage,
        });
        Ok(buffer)
    }

    fn release_buffer(&mut self, buffer: BufferHandle) -> bool {
        let mut s = self.state.borrow_mut();
        let released = s.buffers.remove(buffer).is_some();
        if released {
            s.calls.push(Call::ReleaseBuffer(buffer));
        }
        released
    }

    fn create_staging_buffer(
        &mut self,
        _label: &str,
        size: u64,
    ) -> Result<StagingHandle, BackendError> {
        let mut s = self.state.borrow_mut();
        s.check(Op::CreateStagingBuffer)?;
        let staging = s.staging.insert(vec![0; size as usize]);
        s.calls.push(Call::CreateStagingBuffer { staging, size });
        Ok(staging)
    }

    fn write_staging_buffer(
        &mut self,
        staging: StagingHandle,
        bytes: &[u8],
    ) -> Result<(), BackendError> {
        let mut s = self.state.borrow_mut();
        s.check(Op::WriteStagingBuffer)?;
        let data = s
            .staging
            .get_mut(staging)
            .ok_or_else(|| BackendError::invalid("staging buffer"))?;
        if bytes.len() > data.len() {
            return Err(BackendError::Platform(format!(
                "write of {} bytes overflows staging buffer of {} bytes",
                bytes.len(),
                data.len()
            )));
        }
        data[..bytes.len()].copy_from_slice(bytes);
        s.calls.push(Call::WriteStagingBuffer {
            staging,
            len: bytes.len(),
        });
        Ok(())
    }

    fn release_staging_buffer(&mut self, staging: StagingHandle) -> bool {
        let mut s = self.state.borrow_mut();
        let released = s.staging.remove(staging).is_some();
        if released {
            s.calls.push(Call::ReleaseStagingBuffer(staging));
        }
        released
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureHandle, BackendError> {
        let mut s = self.state.borrow_mut();
        s.check(Op::CreateTexture)?;
        let texture = s.textures.insert((desc.width, desc.height));
        s.calls.push(Call::CreateTexture {
            texture,
            width: desc.width,
            height: desc.height,
        });
        Ok(texture)
    }

    fn release_texture(&mut self, texture: TextureHandle) -> bool {
        let mut s = self.state.borrow_mut();
        let released = s.textures.remove(texture).is_some();
        if released {
            s.calls.push(Call::ReleaseTexture(texture));
        }
        released
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle, BackendError> {
        let mut s = self.state.borrow_mut();
        s.check(Op::CreateSampler)?;
        let sampler = s.samplers.insert(*desc);
        s.calls.push(Call::CreateSampler(sampler));
        Ok(sampler)
    }

    fn release_sampler(&mut self, sampler: SamplerHandle) -> bool {
        let mut s = self.state.borrow_mut();
        let released = s.samplers.remove(sampler).is_some();
        if released {
            s.calls.push(Call::ReleaseSampler(sampler));
        }
        released
    }

    fn create_shader(&mut self, desc: &ShaderDesc<'_>) -> Result<ShaderHandle, BackendError> {
        let mut s = self.state.borrow_mut();
        s.check(Op::CreateShader)?;
        if desc.code.is_empty() {
            return Err(BackendError::Shader {
                label: desc.label.to_string(),
                message: "empty shader code".into(),
            });
        }
        let shader = s.shaders.insert((desc.stage, desc.resources));
        s.calls.push(Call::CreateShader {
            shader,
            label: desc.label.to_string(),
            stage: desc.stage,
        });
        Ok(shader)
    }

    fn release_shader(&mut self, shader: ShaderHandle) -> bool {
        let mut s = self.state.borrow_mut();
        let released = s.shaders.remove(shader).is_some();
        if released {
            s.calls.push(Call::ReleaseShader(shader));
        }
        released
    }

    fn create_pipeline(
        &mut self,
        desc: &PipelineDesc<'_>,
    ) -> Result<PipelineHandle, BackendError> {
        let mut s = self.state.borrow_mut();
        s.check(Op::CreatePipeline)?;
        let Some(&(ShaderStage::Vertex, _)) = s.shaders.get(desc.vertex) else {
            return Err(BackendError::invalid("vertex shader"));
        };
        let Some(&(ShaderStage::Fragment, fragment)) = s.shaders.get(desc.fragment) else {
            return Err(BackendError::invalid("fragment shader"));
        };
        let pipeline = s.pipelines.insert(fragment);
        s.calls.push(Call::CreatePipeline {
            pipeline,
            label: desc.label.to_string(),
        });
        Ok(pipeline)
    }

    fn release_pipeline(&mut self, pipeline: PipelineHandle) -> bool {
        let mut s = self.state.borrow_mut();
        let released = s.pipelines.remove(pipeline).is_some();
        if released {
            s.calls.push(Call::ReleasePipeline(pipeline));
        }
        released
    }

    fn acquire_command_buffer(&mut self) -> Result<CommandBufferHandle, BackendError> {
        let mut s = self.state.borrow_mut();
        s.check(Op::AcquireCommandBuffer)?;
        let cmd = s.commands.insert(());
        s.calls.push(Call::AcquireCommandBuffer(cmd));
        Ok(cmd)
    }

    fn submit(&mut self, cmd: CommandBufferHandle) -> Result<(), BackendError> {
        let mut s = self.state.borrow_mut();
        if !s.commands.contains_key(cmd) {
            return Err(BackendError::invalid("command buffer"));
        }
        // A failed submit still consumes the command buffer.
        s.commands.remove(cmd);
        s.targets.retain(|_, owner| *owner != cmd);
        s.check(Op::Submit)?;
        s.calls.push(Call::Submit(cmd));
        Ok(())
    }

    fn discard_command_buffer(&mut self, cmd: CommandBufferHandle) {
        let mut s = self.state.borrow_mut();
        if s.commands.remove(cmd).is_some() {
            s.targets.retain(|_, owner| *owner != cmd);
            s.calls.push(Call::DiscardCommandBuffer(cmd));
        }
    }

    fn begin_copy_pass(
        &mut self,
        cmd: CommandBufferHandle,
    ) -> Result<CopyPassHandle, BackendError> {
        let mut s = self.state.borrow_mut();
        s.check(Op::BeginCopyPass)?;
        if !s.commands.contains_key(cmd) {
            return Err(BackendError::invalid("command buffer"));
        }
        let pass = s.copy_passes.insert(cmd);
        s.calls.push(Call::BeginCopyPass(pass));
        Ok(pass)
    }

    fn copy(&mut self, pass: CopyPassHandle, op: &CopyOp) -> Result<(), BackendError> {
        let mut s = self.state.borrow_mut();
        s.check(Op::Copy)?;
        if !s.copy_passes.contains_key(pass) {
            return Err(BackendError::invalid("copy pass"));
        }
        match *op {
            CopyOp::Buffer { src, dst, size } => {
                let src_len = s
                    .staging
                    .get(src)
                    .ok_or_else(|| BackendError::invalid("staging buffer"))?
                    .len() as u64;
                let dst_len = *s
                    .buffers
                    .get(dst)
                    .ok_or_else(|| BackendError::invalid("buffer"))?;
                if size > src_len || size > dst_len {
                    return Err(BackendError::Platform("copy out of bounds".into()));
                }
            }
            CopyOp::Texture {
                src,
                bytes_per_row,
                dst,
                width,
                height,
            } => {
                let src_len = s
                    .staging
                    .get(src)
                    .ok_or_else(|| BackendError::invalid("staging buffer"))?
                    .len() as u64;
                let extent = *s
                    .textures
                    .get(dst)
                    .ok_or_else(|| BackendError::invalid("texture"))?;
                if extent != (width, height) || (bytes_per_row as u64) * (height as u64) > src_len
                {
                    return Err(BackendError::Platform("texture copy out of bounds".into()));
                }
            }
        }
        s.calls.push(Call::Copy(*op));
        Ok(())
    }

    fn end_copy_pass(&mut self, pass: CopyPassHandle) {
        let mut s = self.state.borrow_mut();
        if s.copy_passes.remove(pass).is_some() {
            s.calls.push(Call::EndCopyPass(pass));
        }
    }

    fn acquire_swapchain_target(
        &mut self,
        cmd: CommandBufferHandle,
    ) -> Result<TargetHandle, BackendError> {
        let mut s = self.state.borrow_mut();
        if !s.surface_attached {
            return Err(BackendError::Surface {
                action: SurfaceErrorAction::Fatal,
                reason: "surface released".into(),
            });
        }
        s.check(Op::AcquireSwapchainTarget)?;
        if !s.commands.contains_key(cmd) {
            return Err(BackendError::invalid("command buffer"));
        }
        let target = s.targets.insert(cmd);
        s.calls.push(Call::AcquireSwapchainTarget(target));
        Ok(target)
    }

    fn begin_render_pass(
        &mut self,
        cmd: CommandBufferHandle,
        target: TargetHandle,
        clear: Color,
    ) -> Result<RenderPassHandle, BackendError> {
        let mut s = self.state.borrow_mut();
        s.check(Op::BeginRenderPass)?;
        if s.targets.get(target) != Some(&cmd) {
            return Err(BackendError::invalid("swapchain target"));
        }
        let pass = s.render_passes.insert(RenderPassState {
            cmd,
            pipeline: None,
            index_buffer: None,
            samplers_bound: 0,
        });
        s.calls.push(Call::BeginRenderPass { pass, clear });
        Ok(pass)
    }

    fn end_render_pass(&mut self, pass: RenderPassHandle) {
        let mut s = self.state.borrow_mut();
        if s.render_passes.remove(pass).is_some() {
            s.calls.push(Call::EndRenderPass(pass));
        }
    }

    fn bind_pipeline(
        &mut self,
        pass: RenderPassHandle,
        pipeline: PipelineHandle,
    ) -> Result<(), BackendError> {
        let mut s = self.state.borrow_mut();
        if !s.pipelines.contains_key(pipeline) {
            return Err(BackendError::invalid("pipeline"));
        }
        let cmd = s.pass_mut(pass)?.cmd;
        if !s.commands.contains_key(cmd) {
            return Err(BackendError::invalid("command buffer"));
        }
        let state = s.pass_mut(pass)?;
        state.pipeline = Some(pipeline);
        state.samplers_bound = 0;
        s.calls.push(Call::BindPipeline(pipeline));
        Ok(())
    }

    fn bind_vertex_buffer(
        &mut self,
        pass: RenderPassHandle,
        slot: u32,
        buffer: BufferHandle,
    ) -> Result<(), BackendError> {
        let mut s = self.state.borrow_mut();
        if !s.buffers.contains_key(buffer) {
            return Err(BackendError::invalid("vertex buffer"));
        }
        s.pass_mut(pass)?;
        s.calls.push(Call::BindVertexBuffer { slot, buffer });
        Ok(())
    }

    fn bind_index_buffer(
        &mut self,
        pass: RenderPassHandle,
        buffer: BufferHandle,
    ) -> Result<(), BackendError> {
        let mut s = self.state.borrow_mut();
        if !s.buffers.contains_key(buffer) {
            return Err(BackendError::invalid("index buffer"));
        }
        s.pass_mut(pass)?.index_buffer = Some(buffer);
        s.calls.push(Call::BindIndexBuffer(buffer));
        Ok(())
    }

    fn bind_fragment_sampler(
        &mut self,
        pass: RenderPassHandle,
        slot: u32,
        texture: TextureHandle,
        sampler: SamplerHandle,
    ) -> Result<(), BackendError> {
        let mut s = self.state.borrow_mut();
        if !s.textures.contains_key(texture) {
            return Err(BackendError::invalid("texture"));
        }
        if !s.samplers.contains_key(sampler) {
            return Err(BackendError::invalid("sampler"));
        }
        let pipeline = s.bound_pipeline(pass)?;
        let declared = s.pipelines.get(pipeline).map_or(0, |r| r.samplers);
        if slot >= declared {
            return Err(BackendError::Platform(format!(
                "sampler slot {slot} not declared by bound pipeline ({declared} slots)"
            )));
        }
        s.pass_mut(pass)?.samplers_bound |= 1 << slot;
        s.calls.push(Call::BindFragmentSampler {
            slot,
            texture,
            sampler,
        });
        Ok(())
    }

    fn draw(
        &mut self,
        pass: RenderPassHandle,
        vertices: Range<u32>,
        instances: Range<u32>,
    ) -> Result<(), BackendError> {
        let mut s = self.state.borrow_mut();
        s.check_draw_state(pass)?;
        s.calls.push(Call::Draw {
            vertices,
            instances,
        });
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        pass: RenderPassHandle,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    ) -> Result<(), BackendError> {
        let mut s = self.state.borrow_mut();
        s.check_draw_state(pass)?;
        if s.pass_mut(pass)?.index_buffer.is_none() {
            return Err(BackendError::Platform("no index buffer bound".into()));
        }
        s.calls.push(Call::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
        Ok(())
    }

    fn wait_idle(&mut self) {
        self.state.borrow_mut().calls.push(Call::WaitIdle);
    }

    fn live_resources(&self) -> usize {
        self.state.borrow().live()
    }

    fn release_all(&mut self) -> usize {
        let mut s = self.state.borrow_mut();
        let count = s.live();
        s.buffers.clear();
        s.staging.clear();
        s.textures.clear();
        s.samplers.clear();
        s.shaders.clear();
        s.pipelines.clear();
        s.calls.push(Call::ReleaseAll(count));
        count
    }

    fn release_surface(&mut self) {
        let mut s = self.state.borrow_mut();
        if s.surface_attached {
            s.surface_attached = false;
            s.calls.push(Call::ReleaseSurface);
        }
    }
}

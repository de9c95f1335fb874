use crate::paint::Color;
use crate::pipeline::PipelineKind;

use super::error::FrameError;
use super::gpu::Gpu;
use super::handle::{
    BufferHandle, CommandBufferHandle, DeviceId, RenderPassHandle, SamplerHandle, TargetHandle,
    TextureHandle,
};

/// One frame in flight.
///
/// Holds the command buffer, the acquired swapchain target and the open
/// render pass. Exists only between a successful [`Gpu::begin`] and
/// [`Frame::end`]; while it is alive the `Gpu` is mutably borrowed, so no
/// second frame can start and nothing else can touch the device.
///
/// Draw calls never fail loudly: misuse (unknown pipeline, zero counts,
/// released handles) is logged and the call is skipped.
pub struct Frame<'f, 'w> {
    gpu: &'f mut Gpu<'w>,
    cmd: CommandBufferHandle,
    target: TargetHandle,
    pass: RenderPassHandle,
    bound: Option<BoundPipeline>,
    ended: bool,
}

/// Pipeline bound in the open render pass and the sampler slots filled since.
#[derive(Debug, Copy, Clone)]
struct BoundPipeline {
    label: &'static str,
    required_samplers: u32,
    bound_samplers: u32,
}

impl<'w> Gpu<'w> {
    /// Opens a frame: command buffer, swapchain target, then a render pass
    /// that clears to `clear`.
    ///
    /// Blocks until a swapchain image is available. On failure everything
    /// acquired so far is discarded.
    pub fn begin(&mut self, clear: Color) -> Result<Frame<'_, 'w>, FrameError> {
        if self.is_shut_down() {
            return Err(FrameError::TornDown);
        }
        // The `&mut` borrow of `Frame` rules out overlap, except after a
        // `mem::forget`ed frame left its pass open.
        if self.frame_in_flight {
            return Err(FrameError::FrameInFlight);
        }

        let backend = self.backend_mut();
        let cmd = backend
            .acquire_command_buffer()
            .map_err(FrameError::CommandBuffer)?;

        let target = match backend.acquire_swapchain_target(cmd) {
            Ok(target) => target,
            Err(e) => {
                backend.discard_command_buffer(cmd);
                return Err(FrameError::Swapchain(e));
            }
        };

        let pass = match backend.begin_render_pass(cmd, target, clear) {
            Ok(pass) => pass,
            Err(e) => {
                backend.discard_command_buffer(cmd);
                return Err(FrameError::RenderPass(e));
            }
        };

        self.frame_in_flight = true;
        Ok(Frame {
            gpu: self,
            cmd,
            target,
            pass,
            bound: None,
            ended: false,
        })
    }
}

impl<'w> Frame<'_, 'w> {
    /// Device this frame renders with.
    pub fn device_id(&self) -> DeviceId {
        self.gpu.id()
    }

    pub fn target(&self) -> TargetHandle {
        self.target
    }

    /// Size of the swapchain target in physical pixels.
    pub fn size(&self) -> (u32, u32) {
        self.gpu.size()
    }

    /// Binds the registered pipeline of kind `K`.
    ///
    /// Returns `false` (and logs) when `K` is not registered or failed to build.
    pub fn bind_pipeline<K: PipelineKind>(&mut self) -> bool {
        let Some(pipeline) = self.gpu.get_pipeline::<K>() else {
            log::warn!("bind of unregistered pipeline `{}`", K::LABEL);
            return false;
        };
        let Some(handle) = pipeline.handle() else {
            log::warn!("bind of pipeline `{}` that failed to build", K::LABEL);
            return false;
        };
        let required_samplers = pipeline.fragment_resources().sampler_mask();

        match self.gpu.backend_mut().bind_pipeline(self.pass, handle) {
            Ok(()) => {
                self.bound = Some(BoundPipeline {
                    label: K::LABEL,
                    required_samplers,
                    bound_samplers: 0,
                });
                true
            }
            Err(e) => {
                log::error!("failed to bind pipeline `{}`: {e}", K::LABEL);
                false
            }
        }
    }

    /// Binds a texture/sampler pair to fragment sampler `slot` of the bound pipeline.
    pub fn bind_texture(
        &mut self,
        slot: u32,
        texture: TextureHandle,
        sampler: SamplerHandle,
    ) -> bool {
        let Some(bound) = self.bound.as_mut() else {
            log::warn!("texture bind skipped: no pipeline bound");
            return false;
        };
        let bit = 1u32.checked_shl(slot).unwrap_or(0);
        if bound.required_samplers & bit == 0 {
            log::warn!(
                "texture bind skipped: pipeline `{}` declares no sampler slot {slot}",
                bound.label
            );
            return false;
        }
        match self
            .gpu
            .backend_mut()
            .bind_fragment_sampler(self.pass, slot, texture, sampler)
        {
            Ok(()) => {
                bound.bound_samplers |= bit;
                true
            }
            Err(e) => {
                log::error!("failed to bind texture to sampler slot {slot}: {e}");
                false
            }
        }
    }

    /// Draws `vertex_count` vertices from `vertices`.
    pub fn draw(&mut self, vertices: BufferHandle, vertex_count: u32) {
        if !self.ready_to_draw("draw", vertex_count) {
            return;
        }
        let backend = self.gpu.backend_mut();
        let result = backend
            .bind_vertex_buffer(self.pass, 0, vertices)
            .and_then(|()| backend.draw(self.pass, 0..vertex_count, 0..1));
        if let Err(e) = result {
            log::error!("draw failed: {e}");
        }
    }

    /// Draws `index_count` indices from `indices` over `vertices`.
    pub fn draw_indexed(
        &mut self,
        vertices: BufferHandle,
        indices: BufferHandle,
        index_count: u32,
    ) {
        if !self.ready_to_draw("indexed draw", index_count) {
            return;
        }
        let backend = self.gpu.backend_mut();
        let result = backend
            .bind_vertex_buffer(self.pass, 0, vertices)
            .and_then(|()| backend.bind_index_buffer(self.pass, indices))
            .and_then(|()| backend.draw_indexed(self.pass, 0..index_count, 0, 0..1));
        if let Err(e) = result {
            log::error!("indexed draw failed: {e}");
        }
    }

    /// Indexed draw sampling `texture` through `sampler` at fragment slot 0.
    pub fn draw_textured(
        &mut self,
        vertices: BufferHandle,
        indices: BufferHandle,
        index_count: u32,
        texture: TextureHandle,
        sampler: SamplerHandle,
    ) {
        if index_count == 0 {
            log::warn!("textured draw skipped: zero count");
            return;
        }
        if self.bind_texture(0, texture, sampler) {
            self.draw_indexed(vertices, indices, index_count);
        }
    }

    /// Draws `vertex_count` vertices with no vertex buffer bound, for
    /// pipelines that generate positions in the shader.
    pub fn draw_generated(&mut self, vertex_count: u32) {
        if !self.ready_to_draw("generated draw", vertex_count) {
            return;
        }
        if let Err(e) = self
            .gpu
            .backend_mut()
            .draw(self.pass, 0..vertex_count, 0..1)
        {
            log::error!("generated draw failed: {e}");
        }
    }

    fn ready_to_draw(&self, what: &str, count: u32) -> bool {
        if count == 0 {
            log::warn!("{what} skipped: zero count");
            return false;
        }
        let Some(bound) = self.bound else {
            log::warn!("{what} skipped: no pipeline bound");
            return false;
        };
        let missing = bound.required_samplers & !bound.bound_samplers;
        if missing != 0 {
            log::warn!(
                "{what} skipped: pipeline `{}` has unbound sampler slots {missing:#b}",
                bound.label
            );
            return false;
        }
        true
    }

    /// Ends the render pass and submits the frame, presenting the target.
    pub fn end(mut self) -> Result<(), FrameError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<(), FrameError> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;
        self.gpu.frame_in_flight = false;

        let backend = self.gpu.backend_mut();
        backend.end_render_pass(self.pass);
        backend.submit(self.cmd).map_err(FrameError::Submit)
    }
}

impl Drop for Frame<'_, '_> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::error!("frame dropped without end() failed to submit: {e}");
        }
    }
}

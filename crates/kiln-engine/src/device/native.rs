//! wgpu implementation of [`Backend`].
//!
//! Responsibilities:
//! - creates Instance/Adapter/Device/Queue and the window surface
//! - stores every created object in a slot map keyed by handle
//! - records copies and draws into per-command-buffer encoders
//! - presents the acquired swapchain texture on submit
//!
//! Fragment sampler slot `i` of a pipeline is bind group `i`, with the texture
//! at binding 0 and the sampler at binding 1.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use anyhow::{Context, Result};
use slotmap::SlotMap;
use winit::window::Window;

use crate::paint::Color;

use super::backend::{
    Backend, BufferDesc, CopyOp, PipelineDesc, SamplerDesc, ShaderDesc, ShaderFormat,
    ShaderResources, ShaderStage, TextureDesc,
};
use super::error::{BackendError, SurfaceErrorAction};
use super::handle::{
    BufferHandle, CommandBufferHandle, CopyPassHandle, PipelineHandle, RenderPassHandle,
    SamplerHandle, ShaderHandle, StagingHandle, TargetHandle, TextureHandle,
};
use super::init::GpuInit;
use super::surface::{choose_alpha_mode, choose_surface_format, map_surface_error};

struct StagingEntry {
    buffer: wgpu::Buffer,
    mapped: bool,
}

struct TextureEntry {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct ShaderEntry {
    module: wgpu::ShaderModule,
    stage: ShaderStage,
    entry_point: String,
    resources: ShaderResources,
}

struct PipelineEntry {
    pipeline: wgpu::RenderPipeline,
    sampler_layouts: Vec<wgpu::BindGroupLayout>,
}

struct CommandEntry {
    encoder: wgpu::CommandEncoder,
    target: Option<TargetHandle>,
}

struct TargetEntry {
    cmd: CommandBufferHandle,
    surface_texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

struct RenderPassEntry {
    cmd: CommandBufferHandle,
    pass: wgpu::RenderPass<'static>,
    pipeline: Option<PipelineHandle>,
}

type BindGroupKey = (PipelineHandle, u32, TextureHandle, SamplerHandle);

/// Backend driving a real GPU through wgpu.
pub struct WgpuBackend<'w> {
    /// Dropped by `release_surface`, strictly before the device.
    surface: Option<wgpu::Surface<'w>>,
    adapter_info: wgpu::AdapterInfo,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,

    buffers: SlotMap<BufferHandle, wgpu::Buffer>,
    staging: SlotMap<StagingHandle, StagingEntry>,
    textures: SlotMap<TextureHandle, TextureEntry>,
    samplers: SlotMap<SamplerHandle, wgpu::Sampler>,
    shaders: SlotMap<ShaderHandle, ShaderEntry>,
    pipelines: SlotMap<PipelineHandle, PipelineEntry>,
    bind_groups: HashMap<BindGroupKey, wgpu::BindGroup>,

    commands: SlotMap<CommandBufferHandle, CommandEntry>,
    copy_passes: SlotMap<CopyPassHandle, CommandBufferHandle>,
    targets: SlotMap<TargetHandle, TargetEntry>,
    render_passes: SlotMap<RenderPassHandle, RenderPassEntry>,
}

impl<'w> WgpuBackend<'w> {
    /// Creates the device and a surface bound to `window`.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(window: &'w Window, init: &GpuInit) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: init.backends,
            ..Default::default()
        });

        // Surface lifetime is tied to `window` via `'w`.
        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a GPU adapter compatible with the window surface")?;

        let adapter_info = adapter.get_info();
        log::info!(
            "using adapter `{}` ({:?}, {:?})",
            adapter_info.name,
            adapter_info.backend,
            adapter_info.device_type
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("kiln device"),
                required_features: init.required_features,
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        // Anything outside an error scope is logged instead of panicking.
        device.on_uncaptured_error(Arc::new(|e: wgpu::Error| {
            log::error!("uncaptured wgpu error: {e}");
        }));

        let caps = surface.get_capabilities(&adapter);
        let format = choose_surface_format(&caps, init.prefer_srgb)
            .context("no supported surface formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: init.present_mode,
            alpha_mode: choose_alpha_mode(&caps, init.alpha_mode),
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };

        surface.configure(&device, &config);
        log::debug!("surface configured: {format:?} {}x{}", size.width, size.height);

        Ok(Self {
            surface: Some(surface),
            adapter_info,
            device,
            queue,
            config,
            buffers: SlotMap::with_key(),
            staging: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            bind_groups: HashMap::new(),
            commands: SlotMap::with_key(),
            copy_passes: SlotMap::with_key(),
            targets: SlotMap::with_key(),
            render_passes: SlotMap::with_key(),
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    fn pass_mut(&mut self, pass: RenderPassHandle) -> Result<&mut RenderPassEntry, BackendError> {
        self.render_passes
            .get_mut(pass)
            .ok_or_else(|| BackendError::invalid("render pass"))
    }

    /// Ends every render pass still recording into `cmd`.
    fn close_passes_of(&mut self, cmd: CommandBufferHandle) {
        self.render_passes.retain(|_, p| p.cmd != cmd);
        self.copy_passes.retain(|_, owner| *owner != cmd);
    }
}

/// Runs `f` inside an error scope and reports the first captured error.
fn scoped<T>(
    device: &wgpu::Device,
    filter: wgpu::ErrorFilter,
    f: impl FnOnce() -> T,
) -> std::result::Result<T, wgpu::Error> {
    let scope = device.push_error_scope(filter);
    let out = f();
    match pollster::block_on(scope.pop()) {
        Some(err) => Err(err),
        None => Ok(out),
    }
}

fn oom(_: wgpu::Error) -> BackendError {
    BackendError::OutOfMemory
}

impl Backend for WgpuBackend<'_> {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    // wgpu does not accept a 0x0 surface; reconfiguration waits for a real size.
    fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width;
        self.config.height = height;
        if width == 0 || height == 0 {
            return;
        }
        if let Some(surface) = self.surface.as_ref() {
            surface.configure(&self.device, &self.config);
        }
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<BufferHandle, BackendError> {
        let buffer = scoped(&self.device, wgpu::ErrorFilter::OutOfMemory, || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(desc.label),
                size: desc.size,
                usage: desc.usage.to_wgpu(),
                mapped_at_creation: false,
            })
        })
        .map_err(oom)?;
        Ok(self.buffers.insert(buffer))
    }

    fn release_buffer(&mut self, buffer: BufferHandle) -> bool {
        match self.buffers.remove(buffer) {
            Some(b) => {
                b.destroy();
                true
            }
            None => false,
        }
    }

    fn create_staging_buffer(
        &mut self,
        label: &str,
        size: u64,
    ) -> Result<StagingHandle, BackendError> {
        let buffer = scoped(&self.device, wgpu::ErrorFilter::OutOfMemory, || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::MAP_WRITE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: true,
            })
        })
        .map_err(oom)?;
        Ok(self.staging.insert(StagingEntry {
            buffer,
            mapped: true,
        }))
    }

    fn write_staging_buffer(
        &mut self,
        staging: StagingHandle,
        bytes: &[u8],
    ) -> Result<(), BackendError> {
        let entry = self
            .staging
            .get_mut(staging)
            .ok_or_else(|| BackendError::invalid("staging buffer"))?;
        if !entry.mapped {
            return Err(BackendError::Platform("staging buffer is no longer mapped".into()));
        }
        if bytes.len() as u64 != entry.buffer.size() {
            return Err(BackendError::Platform(format!(
                "staging write of {} bytes does not match buffer size {}",
                bytes.len(),
                entry.buffer.size()
            )));
        }
        {
            let mut view = entry.buffer.slice(..).get_mapped_range_mut();
            view.copy_from_slice(bytes);
        }
        entry.buffer.unmap();
        entry.mapped = false;
        Ok(())
    }

    fn release_staging_buffer(&mut self, staging: StagingHandle) -> bool {
        match self.staging.remove(staging) {
            Some(entry) => {
                entry.buffer.destroy();
                true
            }
            None => false,
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureHandle, BackendError> {
        let texture = scoped(&self.device, wgpu::ErrorFilter::OutOfMemory, || {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(desc.label),
                size: wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: desc.format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        })
        .map_err(oom)?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(self.textures.insert(TextureEntry { texture, view }))
    }

    fn release_texture(&mut self, texture: TextureHandle) -> bool {
        self.bind_groups.retain(|k, _| k.2 != texture);
        match self.textures.remove(texture) {
            Some(entry) => {
                entry.texture.destroy();
                true
            }
            None => false,
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle, BackendError> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("kiln sampler"),
            address_mode_u: desc.address_mode,
            address_mode_v: desc.address_mode,
            address_mode_w: desc.address_mode,
            mag_filter: desc.mag_filter,
            min_filter: desc.min_filter,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });
        Ok(self.samplers.insert(sampler))
    }

    fn release_sampler(&mut self, sampler: SamplerHandle) -> bool {
        self.bind_groups.retain(|k, _| k.3 != sampler);
        self.samplers.remove(sampler).is_some()
    }

    fn create_shader(&mut self, desc: &ShaderDesc<'_>) -> Result<ShaderHandle, BackendError> {
        let r = desc.resources;
        if r.uniform_buffers + r.storage_buffers + r.storage_textures > 0 {
            return Err(BackendError::Unsupported {
                backend: "wgpu",
                what: format!("shader `{}` declares buffer or storage bindings", desc.label),
            });
        }
        if desc.stage == ShaderStage::Vertex && r.samplers > 0 {
            return Err(BackendError::Unsupported {
                backend: "wgpu",
                what: format!("vertex shader `{}` declares samplers", desc.label),
            });
        }

        let shader_err = |message: String| BackendError::Shader {
            label: desc.label.to_string(),
            message,
        };

        let source = match desc.format {
            ShaderFormat::Wgsl => {
                let text = std::str::from_utf8(desc.code)
                    .map_err(|e| shader_err(format!("source is not UTF-8: {e}")))?;
                wgpu::ShaderSource::Wgsl(text.into())
            }
            #[cfg(feature = "spirv")]
            ShaderFormat::SpirV => wgpu::util::make_spirv(desc.code),
            #[cfg(not(feature = "spirv"))]
            ShaderFormat::SpirV => {
                return Err(BackendError::Unsupported {
                    backend: "wgpu",
                    what: "SPIR-V input without the `spirv` feature".into(),
                });
            }
        };

        let module = scoped(&self.device, wgpu::ErrorFilter::Validation, || {
            self.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(desc.label),
                    source,
                })
        })
        .map_err(|e| shader_err(e.to_string()))?;

        Ok(self.shaders.insert(ShaderEntry {
            module,
            stage: desc.stage,
            entry_point: desc.entry_point.to_string(),
            resources: desc.resources,
        }))
    }

    fn release_shader(&mut self, shader: ShaderHandle) -> bool {
        self.shaders.remove(shader).is_some()
    }

    fn create_pipeline(
        &mut self,
        desc: &PipelineDesc<'_>,
    ) -> Result<PipelineHandle, BackendError> {
        let vertex = self
            .shaders
            .get(desc.vertex)
            .filter(|s| s.stage == ShaderStage::Vertex)
            .ok_or_else(|| BackendError::invalid("vertex shader"))?;
        let fragment = self
            .shaders
            .get(desc.fragment)
            .filter(|s| s.stage == ShaderStage::Fragment)
            .ok_or_else(|| BackendError::invalid("fragment shader"))?;

        let sampler_layouts: Vec<wgpu::BindGroupLayout> = (0..fragment.resources.samplers)
            .map(|slot| {
                self.device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some(&format!("{} sampler {slot} bgl", desc.label)),
                        entries: &[
                            wgpu::BindGroupLayoutEntry {
                                binding: 0,
                                visibility: wgpu::ShaderStages::FRAGMENT,
                                ty: wgpu::BindingType::Texture {
                                    sample_type: wgpu::TextureSampleType::Float {
                                        filterable: true,
                                    },
                                    view_dimension: wgpu::TextureViewDimension::D2,
                                    multisampled: false,
                                },
                                count: None,
                            },
                            wgpu::BindGroupLayoutEntry {
                                binding: 1,
                                visibility: wgpu::ShaderStages::FRAGMENT,
                                ty: wgpu::BindingType::Sampler(
                                    wgpu::SamplerBindingType::Filtering,
                                ),
                                count: None,
                            },
                        ],
                    })
            })
            .collect();
        let layout_refs: Vec<&wgpu::BindGroupLayout> = sampler_layouts.iter().collect();

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &layout_refs,
                immediate_size: 0,
            });

        let buffers: Vec<wgpu::VertexBufferLayout<'static>> = desc
            .vertex_layouts
            .iter()
            .map(|l| wgpu::VertexBufferLayout {
                array_stride: l.stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: l.attributes,
            })
            .collect();

        let pipeline = scoped(&self.device, wgpu::ErrorFilter::Validation, || {
            self.device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(desc.label),
                    layout: Some(&pipeline_layout),

                    vertex: wgpu::VertexState {
                        module: &vertex.module,
                        entry_point: Some(vertex.entry_point.as_str()),
                        compilation_options: Default::default(),
                        buffers: &buffers,
                    },

                    fragment: Some(wgpu::FragmentState {
                        module: &fragment.module,
                        entry_point: Some(fragment.entry_point.as_str()),
                        compilation_options: Default::default(),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: desc.color_format,
                            blend: desc.blend,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                    }),

                    primitive: wgpu::PrimitiveState {
                        topology: desc.topology,
                        strip_index_format: None,
                        front_face: desc.front_face,
                        cull_mode: desc.cull_mode,
                        polygon_mode: wgpu::PolygonMode::Fill,
                        unclipped_depth: false,
                        conservative: false,
                    },

                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview_mask: None,
                    cache: None,
                })
        })
        .map_err(|e| BackendError::Pipeline {
            label: desc.label.to_string(),
            message: e.to_string(),
        })?;

        Ok(self.pipelines.insert(PipelineEntry {
            pipeline,
            sampler_layouts,
        }))
    }

    fn release_pipeline(&mut self, pipeline: PipelineHandle) -> bool {
        self.bind_groups.retain(|k, _| k.0 != pipeline);
        self.pipelines.remove(pipeline).is_some()
    }

    fn acquire_command_buffer(&mut self) -> Result<CommandBufferHandle, BackendError> {
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kiln command encoder"),
            });
        Ok(self.commands.insert(CommandEntry {
            encoder,
            target: None,
        }))
    }

    fn submit(&mut self, cmd: CommandBufferHandle) -> Result<(), BackendError> {
        self.close_passes_of(cmd);
        let entry = self
            .commands
            .remove(cmd)
            .ok_or_else(|| BackendError::invalid("command buffer"))?;

        // Errors recorded into the encoder surface at `finish`.
        let encoder = entry.encoder;
        let queue = &self.queue;
        let submitted = scoped(&self.device, wgpu::ErrorFilter::Validation, || {
            queue.submit(std::iter::once(encoder.finish()));
        });

        let target = entry.target.and_then(|t| self.targets.remove(t));
        if let Err(e) = submitted {
            // The unpresented texture goes back to the swapchain on drop.
            return Err(BackendError::Platform(e.to_string()));
        }
        if let Some(target) = target {
            drop(target.view);
            target.surface_texture.present();
        }
        Ok(())
    }

    fn discard_command_buffer(&mut self, cmd: CommandBufferHandle) {
        self.close_passes_of(cmd);
        if let Some(entry) = self.commands.remove(cmd) {
            // Dropping an unpresented surface texture hands it back to the swapchain.
            if let Some(target) = entry.target {
                self.targets.remove(target);
            }
        }
    }

    fn begin_copy_pass(
        &mut self,
        cmd: CommandBufferHandle,
    ) -> Result<CopyPassHandle, BackendError> {
        if !self.commands.contains_key(cmd) {
            return Err(BackendError::invalid("command buffer"));
        }
        Ok(self.copy_passes.insert(cmd))
    }

    fn copy(&mut self, pass: CopyPassHandle, op: &CopyOp) -> Result<(), BackendError> {
        let cmd = *self
            .copy_passes
            .get(pass)
            .ok_or_else(|| BackendError::invalid("copy pass"))?;
        let encoder = self
            .commands
            .get_mut(cmd)
            .map(|c| &mut c.encoder)
            .ok_or_else(|| BackendError::invalid("command buffer"))?;

        match *op {
            CopyOp::Buffer { src, dst, size } => {
                let src = &self
                    .staging
                    .get(src)
                    .ok_or_else(|| BackendError::invalid("staging buffer"))?
                    .buffer;
                let dst = self
                    .buffers
                    .get(dst)
                    .ok_or_else(|| BackendError::invalid("buffer"))?;
                encoder.copy_buffer_to_buffer(src, 0, dst, 0, size);
            }
            CopyOp::Texture {
                src,
                bytes_per_row,
                dst,
                width,
                height,
            } => {
                let src = &self
                    .staging
                    .get(src)
                    .ok_or_else(|| BackendError::invalid("staging buffer"))?
                    .buffer;
                let dst = &self
                    .textures
                    .get(dst)
                    .ok_or_else(|| BackendError::invalid("texture"))?
                    .texture;
                encoder.copy_buffer_to_texture(
                    wgpu::TexelCopyBufferInfo {
                        buffer: src,
                        layout: wgpu::TexelCopyBufferLayout {
                            offset: 0,
                            bytes_per_row: Some(bytes_per_row),
                            rows_per_image: Some(height),
                        },
                    },
                    wgpu::TexelCopyTextureInfo {
                        texture: dst,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                );
            }
        }
        Ok(())
    }

    fn end_copy_pass(&mut self, pass: CopyPassHandle) {
        self.copy_passes.remove(pass);
    }

    fn acquire_swapchain_target(
        &mut self,
        cmd: CommandBufferHandle,
    ) -> Result<TargetHandle, BackendError> {
        let Some(surface) = self.surface.as_ref() else {
            return Err(BackendError::Surface {
                action: SurfaceErrorAction::Fatal,
                reason: "surface released".into(),
            });
        };
        if !self.commands.contains_key(cmd) {
            return Err(BackendError::invalid("command buffer"));
        }
        if self.config.width == 0 || self.config.height == 0 {
            return Err(BackendError::Surface {
                action: SurfaceErrorAction::SkipFrame,
                reason: "surface has zero size".into(),
            });
        }

        let surface_texture = surface
            .get_current_texture()
            .map_err(|e| map_surface_error(surface, &self.device, &self.config, e))?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let target = self.targets.insert(TargetEntry {
            cmd,
            surface_texture,
            view,
        });
        if let Some(entry) = self.commands.get_mut(cmd) {
            entry.target = Some(target);
        }
        Ok(target)
    }

    fn begin_render_pass(
        &mut self,
        cmd: CommandBufferHandle,
        target: TargetHandle,
        clear: Color,
    ) -> Result<RenderPassHandle, BackendError> {
        let view = &self
            .targets
            .get(target)
            .filter(|t| t.cmd == cmd)
            .ok_or_else(|| BackendError::invalid("swapchain target"))?
            .view;
        let encoder = self
            .commands
            .get_mut(cmd)
            .map(|c| &mut c.encoder)
            .ok_or_else(|| BackendError::invalid("command buffer"))?;

        let pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("kiln frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear.to_wgpu()),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            })
            .forget_lifetime();

        Ok(self.render_passes.insert(RenderPassEntry {
            cmd,
            pass,
            pipeline: None,
        }))
    }

    fn end_render_pass(&mut self, pass: RenderPassHandle) {
        self.render_passes.remove(pass);
    }

    fn bind_pipeline(
        &mut self,
        pass: RenderPassHandle,
        pipeline: PipelineHandle,
    ) -> Result<(), BackendError> {
        let entry = self
            .pipelines
            .get(pipeline)
            .ok_or_else(|| BackendError::invalid("pipeline"))?;
        let rp = self
            .render_passes
            .get_mut(pass)
            .ok_or_else(|| BackendError::invalid("render pass"))?;
        rp.pass.set_pipeline(&entry.pipeline);
        rp.pipeline = Some(pipeline);
        Ok(())
    }

    fn bind_vertex_buffer(
        &mut self,
        pass: RenderPassHandle,
        slot: u32,
        buffer: BufferHandle,
    ) -> Result<(), BackendError> {
        let buffer = self
            .buffers
            .get(buffer)
            .ok_or_else(|| BackendError::invalid("vertex buffer"))?;
        let rp = self
            .render_passes
            .get_mut(pass)
            .ok_or_else(|| BackendError::invalid("render pass"))?;
        rp.pass.set_vertex_buffer(slot, buffer.slice(..));
        Ok(())
    }

    fn bind_index_buffer(
        &mut self,
        pass: RenderPassHandle,
        buffer: BufferHandle,
    ) -> Result<(), BackendError> {
        let buffer = self
            .buffers
            .get(buffer)
            .ok_or_else(|| BackendError::invalid("index buffer"))?;
        let rp = self
            .render_passes
            .get_mut(pass)
            .ok_or_else(|| BackendError::invalid("render pass"))?;
        rp.pass.set_index_buffer(buffer.slice(..), wgpu::IndexFormat::Uint32);
        Ok(())
    }

    fn bind_fragment_sampler(
        &mut self,
        pass: RenderPassHandle,
        slot: u32,
        texture: TextureHandle,
        sampler: SamplerHandle,
    ) -> Result<(), BackendError> {
        let pipeline = self
            .pass_mut(pass)?
            .pipeline
            .ok_or_else(|| BackendError::Platform("no pipeline bound".into()))?;

        let key = (pipeline, slot, texture, sampler);
        if !self.bind_groups.contains_key(&key) {
            let layout = self
                .pipelines
                .get(pipeline)
                .and_then(|p| p.sampler_layouts.get(slot as usize))
                .ok_or_else(|| {
                    BackendError::Platform(format!("sampler slot {slot} not declared by pipeline"))
                })?;
            let view = &self
                .textures
                .get(texture)
                .ok_or_else(|| BackendError::invalid("texture"))?
                .view;
            let sampler_obj = self
                .samplers
                .get(sampler)
                .ok_or_else(|| BackendError::invalid("sampler"))?;

            let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("kiln sampler bind group"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler_obj),
                    },
                ],
            });
            self.bind_groups.insert(key, group);
        }

        let Some(group) = self.bind_groups.get(&key) else {
            return Err(BackendError::invalid("bind group"));
        };
        let rp = self
            .render_passes
            .get_mut(pass)
            .ok_or_else(|| BackendError::invalid("render pass"))?;
        rp.pass.set_bind_group(slot, group, &[]);
        Ok(())
    }

    fn draw(
        &mut self,
        pass: RenderPassHandle,
        vertices: Range<u32>,
        instances: Range<u32>,
    ) -> Result<(), BackendError> {
        self.pass_mut(pass)?.pass.draw(vertices, instances);
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        pass: RenderPassHandle,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    ) -> Result<(), BackendError> {
        self.pass_mut(pass)?
            .pass
            .draw_indexed(indices, base_vertex, instances);
        Ok(())
    }

    fn wait_idle(&mut self) {
        if let Err(e) = self.device.poll(wgpu::PollType::wait_indefinitely()) {
            log::warn!("device poll failed while waiting for idle: {e}");
        }
    }

    fn live_resources(&self) -> usize {
        self.buffers.len()
            + self.staging.len()
            + self.textures.len()
            + self.samplers.len()
            + self.shaders.len()
            + self.pipelines.len()
    }

    fn release_all(&mut self) -> usize {
        let count = self.live_resources();

        self.render_passes.clear();
        self.copy_passes.clear();
        self.commands.clear();
        self.targets.clear();
        self.bind_groups.clear();

        self.pipelines.clear();
        self.shaders.clear();
        self.samplers.clear();
        for (_, entry) in self.textures.drain() {
            entry.texture.destroy();
        }
        for (_, entry) in self.staging.drain() {
            entry.buffer.destroy();
        }
        for (_, buffer) in self.buffers.drain() {
            buffer.destroy();
        }
        count
    }

    fn release_surface(&mut self) {
        if self.surface.take().is_some() {
            log::debug!("surface released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_device() -> (wgpu::Device, wgpu::Queue) {
        wgpu::Device::noop(&wgpu::DeviceDescriptor::default())
    }

    fn buffer(device: &wgpu::Device, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size: 16,
            usage,
            mapped_at_creation: false,
        })
    }

    #[test]
    fn scoped_passes_valid_calls_through() {
        let (device, _queue) = noop_device();
        let out = scoped(&device, wgpu::ErrorFilter::Validation, || {
            buffer(&device, wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST);
            7
        });
        assert_eq!(out.ok(), Some(7));
    }

    #[test]
    fn scoped_returns_validation_errors() {
        let (device, _queue) = noop_device();
        let out = scoped(&device, wgpu::ErrorFilter::Validation, || {
            buffer(&device, wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::VERTEX);
        });
        assert!(matches!(out, Err(wgpu::Error::Validation { .. })));
    }

    #[test]
    fn encoder_errors_surface_at_submit() {
        let (device, queue) = noop_device();
        let src = buffer(&device, wgpu::BufferUsages::COPY_SRC);
        let dst = buffer(&device, wgpu::BufferUsages::COPY_DST);
        let mut encoder = device.create_command_encoder(&Default::default());
        // Copy sizes must be a multiple of four.
        encoder.copy_buffer_to_buffer(&src, 0, &dst, 0, 3);

        let submitted = scoped(&device, wgpu::ErrorFilter::Validation, || {
            queue.submit(std::iter::once(encoder.finish()));
        });
        assert!(submitted.is_err());
    }
}

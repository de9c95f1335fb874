use std::path::Path;

use anyhow::Result;
use winit::window::Window;

use crate::pipeline::{Pipeline, PipelineKind, PipelineRegistry};

use super::backend::{Backend, ShaderFormat, ShaderResources, ShaderStage};
use super::error::ResourceError;
use super::handle::{DeviceId, ShaderHandle};
use super::headless::{HeadlessBackend, HeadlessRecorder};
use super::init::GpuInit;
use super::native::WgpuBackend;

/// Owner of the graphics device, its presentation surface and every pipeline.
///
/// This type is the low-level rendering context:
/// - creates the backend (device + surface) once and destroys it once
/// - is the only path through which GPU resources are created and released
/// - opens frames (see [`Gpu::begin`](Gpu::begin))
///
/// Teardown runs pipelines, then remaining resources, then the surface, then
/// the device, either through [`shutdown`](Self::shutdown) or on drop.
pub struct Gpu<'w> {
    backend: Box<dyn Backend + 'w>,
    pub(super) pipelines: PipelineRegistry,
    shader_format: ShaderFormat,
    id: DeviceId,

    /// Set while a render pass is open. Stays set if a `Frame` is forgotten.
    pub(super) frame_in_flight: bool,
    shut_down: bool,
}

impl<'w> Gpu<'w> {
    /// Creates a GPU context bound to a window.
    pub async fn new(window: &'w Window, init: GpuInit) -> Result<Self> {
        let backend = WgpuBackend::new(window, &init).await?;
        Ok(Self::with_backend(Box::new(backend), ShaderFormat::native()))
    }

    /// Wraps an already created backend.
    pub fn with_backend(backend: Box<dyn Backend + 'w>, shader_format: ShaderFormat) -> Self {
        let id = DeviceId::next();
        log::info!(
            "gpu {id:?} on {} backend, {:?} surface, {:?} shaders",
            backend.name(),
            backend.surface_format(),
            shader_format
        );
        Self {
            backend,
            pipelines: PipelineRegistry::default(),
            shader_format,
            id,
            frame_in_flight: false,
            shut_down: false,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn shader_format(&self) -> ShaderFormat {
        self.shader_format
    }

    /// Returns the active surface format.
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.backend.surface_format()
    }

    /// Returns the current drawable size (physical pixels).
    pub fn size(&self) -> (u32, u32) {
        self.backend.surface_size()
    }

    /// Reconfigures the surface after a resize.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.shut_down {
            return;
        }
        self.backend.resize(width, height);
    }

    /// Number of resources the backend still holds.
    pub fn live_resources(&self) -> usize {
        self.backend.live_resources()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub(crate) fn backend_mut(&mut self) -> &mut dyn Backend {
        self.backend.as_mut()
    }

    pub(crate) fn ensure_alive(&self) -> Result<(), ResourceError> {
        if self.shut_down {
            Err(ResourceError::TornDown)
        } else {
            Ok(())
        }
    }

    /// Registers the pipeline of kind `K`, building it from the two shader files.
    ///
    /// Idempotent: when `K` is already registered the existing entry is returned
    /// and the paths are ignored. A failed build is registered too; see
    /// [`Pipeline::failure`].
    pub fn add_pipeline<K: PipelineKind>(
        &mut self,
        vertex: impl AsRef<Path>,
        fragment: impl AsRef<Path>,
    ) -> &Pipeline {
        let backend = self.backend.as_mut();
        let format = self.shader_format;
        let shut_down = self.shut_down;

        self.pipelines.get_or_init::<K>(|| {
            if shut_down {
                return Pipeline::failed(K::LABEL, "device has been shut down");
            }
            Pipeline::init::<K>(backend, format, vertex.as_ref(), fragment.as_ref())
        })
    }

    /// Returns the registered pipeline of kind `K`. Never builds one.
    pub fn get_pipeline<K: PipelineKind>(&self) -> Option<&Pipeline> {
        self.pipelines.get::<K>()
    }

    /// Releases and unregisters the pipeline of kind `K`, if any.
    pub fn remove_pipeline<K: PipelineKind>(&mut self) {
        if let Some(pipeline) = self.pipelines.remove::<K>() {
            log::debug!("removing pipeline `{}`", pipeline.label());
            pipeline.release(self.backend.as_mut());
        }
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Loads a standalone shader stage in this device's shader format.
    pub fn load_shader(
        &mut self,
        path: impl AsRef<Path>,
        stage: ShaderStage,
        resources: ShaderResources,
    ) -> Result<ShaderHandle, ResourceError> {
        self.ensure_alive()?;
        crate::pipeline::load_shader(
            self.backend.as_mut(),
            path.as_ref(),
            stage,
            resources,
            self.shader_format,
        )
    }

    pub fn release_shader(&mut self, shader: ShaderHandle) {
        if self.shut_down {
            return;
        }
        if !self.backend.release_shader(shader) {
            log::warn!("release of unknown shader {shader:?}");
        }
    }

    /// Tears the device down: pipelines, leftover resources, surface, device.
    ///
    /// Idempotent. Resources released here were leaked by their owners and are
    /// reported with a warning.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.backend.wait_idle();
        self.pipelines.clear(self.backend.as_mut());

        let leaked = self.backend.release_all();
        if leaked > 0 {
            log::warn!("{leaked} GPU resource(s) still alive at shutdown; released");
        }

        self.backend.release_surface();
        log::info!("gpu {:?} shut down", self.id);
    }
}

impl Gpu<'static> {
    /// Creates a context over a [`HeadlessBackend`], returning a recorder into it.
    pub fn headless() -> (Self, HeadlessRecorder) {
        let backend = HeadlessBackend::new();
        let recorder = backend.recorder();
        (
            Self::with_backend(Box::new(backend), ShaderFormat::Wgsl),
            recorder,
        )
    }
}

impl Drop for Gpu<'_> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::headless::{Call, Op};
    use crate::pipeline::{ColorPipeline, ObjectPipeline};
    use crate::testing::shader_pair as shader_files;

    #[test]
    fn get_before_add_is_none() {
        let (gpu, _recorder) = Gpu::headless();
        assert!(gpu.get_pipeline::<ObjectPipeline>().is_none());
        assert_eq!(gpu.pipeline_count(), 0);
    }

    #[test]
    fn add_pipeline_is_idempotent() {
        let (mut gpu, recorder) = Gpu::headless();
        let (vert, frag) = shader_files();

        let first = gpu.add_pipeline::<ObjectPipeline>(&vert, &frag).handle();
        assert!(first.is_some());

        let second = gpu
            .add_pipeline::<ObjectPipeline>("missing.vert", "missing.frag")
            .handle();
        assert_eq!(first, second);
        assert_eq!(gpu.pipeline_count(), 1);
        assert_eq!(
            recorder.count(|c| matches!(c, Call::CreatePipeline { .. })),
            1
        );
    }

    #[test]
    fn pipeline_build_releases_shaders() {
        let (mut gpu, recorder) = Gpu::headless();
        let (vert, frag) = shader_files();

        assert!(gpu.add_pipeline::<ColorPipeline>(&vert, &frag).is_ready());
        assert_eq!(recorder.count(|c| matches!(c, Call::CreateShader { .. })), 2);
        assert_eq!(recorder.count(|c| matches!(c, Call::ReleaseShader(_))), 2);
        assert_eq!(recorder.live_resources(), 1);
    }

    #[test]
    fn failed_pipeline_stays_flagged_until_removed() {
        let (mut gpu, recorder) = Gpu::headless();
        let (vert, frag) = shader_files();

        let missing = gpu.add_pipeline::<ObjectPipeline>("does/not/exist.wgsl", &frag);
        assert!(!missing.is_ready());
        assert!(missing.failure().is_some());

        // Not retried implicitly.
        assert!(!gpu.add_pipeline::<ObjectPipeline>(&vert, &frag).is_ready());

        gpu.remove_pipeline::<ObjectPipeline>();
        assert!(gpu.get_pipeline::<ObjectPipeline>().is_none());
        assert!(gpu.add_pipeline::<ObjectPipeline>(&vert, &frag).is_ready());
        assert_eq!(recorder.live_pipelines(), 1);
    }

    #[test]
    fn fragment_load_failure_releases_vertex_shader() {
        let (mut gpu, recorder) = Gpu::headless();
        let (vert, frag) = shader_files();

        recorder.fail_nth(Op::CreateShader, 2);
        let pipeline = gpu.add_pipeline::<ColorPipeline>(&vert, &frag);
        assert!(!pipeline.is_ready());
        assert_eq!(recorder.live_resources(), 0);
    }

    #[test]
    fn pipeline_compile_failure_is_flagged() {
        let (mut gpu, recorder) = Gpu::headless();
        let (vert, frag) = shader_files();

        recorder.fail(Op::CreatePipeline);
        let pipeline = gpu.add_pipeline::<ColorPipeline>(&vert, &frag);
        assert!(!pipeline.is_ready());
        assert!(pipeline.failure().unwrap().contains("kiln color pipeline"));
        assert_eq!(recorder.live_resources(), 0);
    }

    #[test]
    fn remove_pipeline_releases_it() {
        let (mut gpu, recorder) = Gpu::headless();
        let (vert, frag) = shader_files();

        gpu.add_pipeline::<ColorPipeline>(&vert, &frag);
        gpu.remove_pipeline::<ColorPipeline>();
        gpu.remove_pipeline::<ColorPipeline>();

        assert_eq!(recorder.live_pipelines(), 0);
        assert_eq!(recorder.count(|c| matches!(c, Call::ReleasePipeline(_))), 1);
    }

    #[test]
    fn shutdown_order_and_idempotence() {
        let (mut gpu, recorder) = Gpu::headless();
        let (vert, frag) = shader_files();
        gpu.add_pipeline::<ColorPipeline>(&vert, &frag);
        let _leaked = gpu
            .create_buffer(&[1.0f32, 2.0, 3.0], crate::device::BufferUsage::Vertex)
            .unwrap();
        recorder.clear_calls();

        gpu.shutdown();
        gpu.shutdown();

        let calls = recorder.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], Call::WaitIdle);
        assert!(matches!(calls[1], Call::ReleasePipeline(_)));
        assert_eq!(calls[2], Call::ReleaseAll(1));
        assert_eq!(calls[3], Call::ReleaseSurface);
        assert!(!recorder.surface_attached());
        assert!(gpu.is_shut_down());
    }

    #[test]
    fn drop_shuts_down() {
        let (gpu, recorder) = Gpu::headless();
        drop(gpu);
        assert!(!recorder.surface_attached());
    }

    #[test]
    fn pipelines_refused_after_shutdown() {
        let (mut gpu, recorder) = Gpu::headless();
        let (vert, frag) = shader_files();
        gpu.shutdown();

        let pipeline = gpu.add_pipeline::<ColorPipeline>(&vert, &frag);
        assert!(!pipeline.is_ready());
        assert_eq!(recorder.count(|c| matches!(c, Call::CreateShader { .. })), 0);
    }
}

use std::any::TypeId;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;

use crate::device::{
    Backend, PipelineDesc, PipelineHandle, ResourceError, ShaderFormat, ShaderResources,
    ShaderStage,
};

use super::kind::PipelineKind;
use super::shader::load_shader;

/// A registered graphics pipeline.
///
/// A pipeline whose construction failed stays registered with its failure
/// message; binding it is refused until it is removed and added again.
#[derive(Debug)]
pub struct Pipeline {
    label: &'static str,
    handle: Option<PipelineHandle>,
    failure: Option<String>,
    fragment_resources: ShaderResources,
}

impl Pipeline {
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// `true` once both shaders loaded and the pipeline compiled.
    pub fn is_ready(&self) -> bool {
        self.handle.is_some()
    }

    /// Why construction failed, if it did.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub(crate) fn handle(&self) -> Option<PipelineHandle> {
        self.handle
    }

    /// Resources the fragment stage expects bound before a draw.
    pub fn fragment_resources(&self) -> ShaderResources {
        self.fragment_resources
    }

    pub(crate) fn init<K: PipelineKind>(
        backend: &mut dyn Backend,
        format: ShaderFormat,
        vertex: &Path,
        fragment: &Path,
    ) -> Self {
        match build::<K>(backend, format, vertex, fragment) {
            Ok(handle) => {
                log::debug!("pipeline `{}` ready", K::LABEL);
                Self {
                    label: K::LABEL,
                    handle: Some(handle),
                    failure: None,
                    fragment_resources: K::FRAGMENT_RESOURCES,
                }
            }
            Err(e) => {
                let message = format!("{:#}", anyhow::Error::new(e));
                log::error!("pipeline `{}` failed to initialize: {message}", K::LABEL);
                Self::failed(K::LABEL, message)
            }
        }
    }

    pub(crate) fn failed(label: &'static str, message: impl Into<String>) -> Self {
        Self {
            label,
            handle: None,
            failure: Some(message.into()),
            fragment_resources: ShaderResources::NONE,
        }
    }

    pub(crate) fn release(mut self, backend: &mut dyn Backend) {
        if let Some(handle) = self.handle.take() {
            if !backend.release_pipeline(handle) {
                log::warn!("pipeline `{}` was already released", self.label);
            }
        }
    }
}

/// Loads both stages, builds the pipeline and releases the shaders again.
fn build<K: PipelineKind>(
    backend: &mut dyn Backend,
    format: ShaderFormat,
    vertex: &Path,
    fragment: &Path,
) -> Result<PipelineHandle, ResourceError> {
    let vs = load_shader(backend, vertex, ShaderStage::Vertex, K::VERTEX_RESOURCES, format)?;
    let fs = match load_shader(
        backend,
        fragment,
        ShaderStage::Fragment,
        K::FRAGMENT_RESOURCES,
        format,
    ) {
        Ok(fs) => fs,
        Err(e) => {
            backend.release_shader(vs);
            return Err(e);
        }
    };

    let state = K::state();
    let color_format = backend.surface_format();
    let created = backend.create_pipeline(&PipelineDesc {
        label: K::LABEL,
        vertex: vs,
        fragment: fs,
        vertex_layouts: K::vertex_layouts(),
        topology: state.topology,
        cull_mode: state.cull_mode,
        front_face: state.front_face,
        blend: state.blend,
        color_format,
    });

    backend.release_shader(vs);
    backend.release_shader(fs);

    created.map_err(|source| ResourceError::Pipeline {
        label: K::LABEL,
        source,
    })
}

/// Pipelines keyed by kind. Owned by the `Gpu`.
#[derive(Debug, Default)]
pub(crate) struct PipelineRegistry {
    entries: HashMap<TypeId, Pipeline>,
}

impl PipelineRegistry {
    pub(crate) fn get<K: PipelineKind>(&self) -> Option<&Pipeline> {
        self.entries.get(&TypeId::of::<K>())
    }

    /// Returns the entry for `K`, running `init` only when there is none.
    pub(crate) fn get_or_init<K: PipelineKind>(
        &mut self,
        init: impl FnOnce() -> Pipeline,
    ) -> &Pipeline {
        match self.entries.entry(TypeId::of::<K>()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => v.insert(init()),
        }
    }

    pub(crate) fn remove<K: PipelineKind>(&mut self) -> Option<Pipeline> {
        self.entries.remove(&TypeId::of::<K>())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Releases every pipeline through `backend`.
    pub(crate) fn clear(&mut self, backend: &mut dyn Backend) {
        for (_, pipeline) in self.entries.drain() {
            pipeline.release(backend);
        }
    }
}

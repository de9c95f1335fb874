use crate::device::{ShaderResources, VertexLayout};

/// Fixed-function state of a pipeline.
///
/// The default draws back-face culled, counter-clockwise triangle lists with
/// blending disabled.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PipelineState {
    pub topology: wgpu::PrimitiveTopology,
    pub cull_mode: Option<wgpu::Face>,
    pub front_face: wgpu::FrontFace,
    pub blend: Option<wgpu::BlendState>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: Some(wgpu::Face::Back),
            front_face: wgpu::FrontFace::Ccw,
            blend: None,
        }
    }
}

/// Describes one kind of graphics pipeline.
///
/// Implementors are tag types; the registry keys on their `TypeId`.
pub trait PipelineKind: 'static {
    /// Debug label of the built pipeline.
    const LABEL: &'static str;

    const VERTEX_RESOURCES: ShaderResources = ShaderResources::NONE;
    const FRAGMENT_RESOURCES: ShaderResources = ShaderResources::NONE;

    /// Vertex buffer layouts, one per bound slot. Empty for pipelines that
    /// generate their vertices in the shader.
    fn vertex_layouts() -> &'static [VertexLayout] {
        &[]
    }

    fn state() -> PipelineState {
        PipelineState::default()
    }
}

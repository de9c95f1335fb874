//! Pipelines shipped with the engine.
//!
//! Shader sources live in the crate's `shaders/` directory, one file per stage.

use std::path::PathBuf;

use crate::device::{ShaderFormat, ShaderResources, VertexLayout};
use crate::render::{ColorVertex, TexturedVertex};

use super::kind::PipelineKind;

/// Path of a bundled shader stage (`"object.vert"` etc.) in this build's format.
pub fn builtin_shader(name: &str) -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders"))
        .join(format!("{name}.{}", ShaderFormat::native().extension()))
}

/// Textured geometry: [`TexturedVertex`] input, one fragment sampler.
///
/// Used by render objects that carry a texture.
pub struct ObjectPipeline;

impl ObjectPipeline {
    pub fn shaders() -> (PathBuf, PathBuf) {
        (builtin_shader("object.vert"), builtin_shader("object.frag"))
    }
}

impl PipelineKind for ObjectPipeline {
    const LABEL: &'static str = "kiln object pipeline";
    const FRAGMENT_RESOURCES: ShaderResources = ShaderResources::samplers(1);

    fn vertex_layouts() -> &'static [VertexLayout] {
        &[TexturedVertex::LAYOUT]
    }
}

/// Per-vertex colored geometry: [`ColorVertex`] input, no resources.
pub struct ColorPipeline;

impl ColorPipeline {
    pub fn shaders() -> (PathBuf, PathBuf) {
        (builtin_shader("color.vert"), builtin_shader("color.frag"))
    }
}

impl PipelineKind for ColorPipeline {
    const LABEL: &'static str = "kiln color pipeline";

    fn vertex_layouts() -> &'static [VertexLayout] {
        &[ColorVertex::LAYOUT]
    }
}

/// Single hard-coded triangle generated from the vertex index.
pub struct TrianglePipeline;

impl TrianglePipeline {
    pub fn shaders() -> (PathBuf, PathBuf) {
        (builtin_shader("triangle.vert"), builtin_shader("triangle.frag"))
    }
}

impl PipelineKind for TrianglePipeline {
    const LABEL: &'static str = "kiln triangle pipeline";
}

#[cfg(test)]
mod tests {
    use wgpu::naga::{self, front::wgsl, valid};

    use super::*;
    use crate::pipeline::SHADER_ENTRY_POINT;

    fn parse(path: &std::path::Path) -> naga::Module {
        // The WGSL sources are checked in every build, SPIR-V or not.
        let path = path.with_extension("wgsl");
        let source = std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("{}: {e}", path.display()));
        let module = wgsl::parse_str(&source)
            .unwrap_or_else(|e| panic!("{}:\n{}", path.display(), e.emit_to_string(&source)));
        valid::Validator::new(valid::ValidationFlags::all(), valid::Capabilities::default())
            .validate(&module)
            .unwrap_or_else(|e| panic!("{}: {e:?}", path.display()));
        module
    }

    fn entry_point(module: &naga::Module, stage: naga::ShaderStage) -> &naga::EntryPoint {
        assert_eq!(module.entry_points.len(), 1);
        let entry = &module.entry_points[0];
        assert_eq!(entry.name, SHADER_ENTRY_POINT);
        assert_eq!(entry.stage, stage);
        entry
    }

    /// Parses and validates both stages of `K` and checks them against its layout.
    fn check_kind<K: PipelineKind>((vert, frag): (PathBuf, PathBuf)) {
        let vs = parse(&vert);
        let entry = entry_point(&vs, naga::ShaderStage::Vertex);
        let inputs = entry
            .function
            .arguments
            .iter()
            .filter(|arg| matches!(arg.binding, Some(naga::Binding::Location { .. })))
            .count();
        let attributes: usize = K::vertex_layouts().iter().map(|l| l.attributes.len()).sum();
        assert_eq!(inputs, attributes, "{} vertex inputs", K::LABEL);

        let fs = parse(&frag);
        entry_point(&fs, naga::ShaderStage::Fragment);

        let mut bindings: Vec<(u32, u32, &naga::TypeInner)> = fs
            .global_variables
            .iter()
            .filter_map(|(_, var)| {
                let b = var.binding.as_ref()?;
                Some((b.group, b.binding, &fs.types[var.ty].inner))
            })
            .collect();
        bindings.sort_by_key(|&(group, binding, _)| (group, binding));

        let slots = K::FRAGMENT_RESOURCES.samplers;
        assert_eq!(bindings.len(), 2 * slots as usize, "{} bindings", K::LABEL);
        for slot in 0..slots {
            let texture = bindings[2 * slot as usize];
            let sampler = bindings[2 * slot as usize + 1];
            assert!(matches!(
                texture,
                (g, 0, naga::TypeInner::Image {
                    dim: naga::ImageDimension::D2,
                    class: naga::ImageClass::Sampled { .. },
                    ..
                }) if g == slot
            ));
            assert!(matches!(
                sampler,
                (g, 1, naga::TypeInner::Sampler { comparison: false }) if g == slot
            ));
        }
    }

    #[test]
    fn object_shaders_match_pipeline() {
        check_kind::<ObjectPipeline>(ObjectPipeline::shaders());
    }

    #[test]
    fn color_shaders_match_pipeline() {
        check_kind::<ColorPipeline>(ColorPipeline::shaders());
    }

    #[test]
    fn triangle_shaders_match_pipeline() {
        check_kind::<TrianglePipeline>(TrianglePipeline::shaders());
    }
}

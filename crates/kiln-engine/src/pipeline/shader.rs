use std::path::Path;

use crate::device::{
    Backend, ResourceError, ShaderDesc, ShaderFormat, ShaderHandle, ShaderResources, ShaderStage,
};

/// Entry point every shader stage must export.
pub const SHADER_ENTRY_POINT: &str = "main";

/// Reads a shader file and creates a shader object from it.
///
/// The code is handed to the backend in `format`; the caller owns the
/// returned handle and must release it.
pub fn load_shader(
    backend: &mut dyn Backend,
    path: &Path,
    stage: ShaderStage,
    resources: ShaderResources,
    format: ShaderFormat,
) -> Result<ShaderHandle, ResourceError> {
    let code = std::fs::read(path).map_err(|source| ResourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let label = path.display().to_string();
    let shader = backend
        .create_shader(&ShaderDesc {
            label: &label,
            stage,
            format,
            code: &code,
            entry_point: SHADER_ENTRY_POINT,
            resources,
        })
        .map_err(|source| ResourceError::Shader {
            path: path.to_path_buf(),
            source,
        })?;

    log::trace!("loaded {stage:?} shader {label}");
    Ok(shader)
}

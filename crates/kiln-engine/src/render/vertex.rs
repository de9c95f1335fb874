//! Vertex records consumed by the builtin pipelines.

use bytemuck::{Pod, Zeroable};

use crate::device::VertexLayout;

/// Position in normalized device coordinates plus a texture coordinate.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct TexturedVertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
}

impl TexturedVertex {
    const ATTRS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x2, // pos
        1 => Float32x2  // uv
    ];

    pub const LAYOUT: VertexLayout = VertexLayout {
        stride: std::mem::size_of::<TexturedVertex>() as u64,
        attributes: &Self::ATTRS,
    };

    pub const fn new(pos: [f32; 2], uv: [f32; 2]) -> Self {
        Self { pos, uv }
    }
}

/// Position in normalized device coordinates plus a linear RGB color.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    pub pos: [f32; 2],
    pub color: [f32; 3],
}

impl ColorVertex {
    const ATTRS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x2, // pos
        1 => Float32x3  // color
    ];

    pub const LAYOUT: VertexLayout = VertexLayout {
        stride: std::mem::size_of::<ColorVertex>() as u64,
        attributes: &Self::ATTRS,
    };

    pub const fn new(pos: [f32; 2], color: [f32; 3]) -> Self {
        Self { pos, color }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_match_record_sizes() {
        assert_eq!(TexturedVertex::LAYOUT.stride, 16);
        assert_eq!(ColorVertex::LAYOUT.stride, 20);
        assert_eq!(ColorVertex::LAYOUT.attributes[1].offset, 8);
    }
}

//! Screen-space textured rectangles.

use glam::Vec2;

use crate::device::TextureSource;

use super::object::RenderObject;
use super::vertex::TexturedVertex;

/// Axis-aligned rectangle in window pixels, origin at the top-left corner.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Quad {
    pub pos: Vec2,
    pub size: Vec2,
}

impl Quad {
    pub const DEFAULT_SIZE: Vec2 = Vec2::new(200.0, 200.0);

    /// Two counter-clockwise triangles over the corners returned by [`Quad::vertices`].
    pub const INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

    pub const fn new(pos: Vec2, size: Vec2) -> Self {
        Self { pos, size }
    }

    pub const fn at(pos: Vec2) -> Self {
        Self::new(pos, Self::DEFAULT_SIZE)
    }

    pub fn contains(&self, point: Vec2) -> bool {
        let max = self.pos + self.size;
        point.cmpge(self.pos).all() && point.cmplt(max).all()
    }

    /// Corners in normalized device coordinates for a `viewport` sized target:
    /// bottom-left, bottom-right, top-right, top-left.
    pub fn vertices(&self, viewport: Vec2) -> [TexturedVertex; 4] {
        let viewport = viewport.max(Vec2::ONE);
        let ndc = |p: Vec2| {
            let v = p / viewport * 2.0 - 1.0;
            [v.x, -v.y]
        };

        let min = self.pos;
        let max = self.pos + self.size;
        [
            TexturedVertex::new(ndc(Vec2::new(min.x, max.y)), [0.0, 1.0]),
            TexturedVertex::new(ndc(max), [1.0, 1.0]),
            TexturedVertex::new(ndc(Vec2::new(max.x, min.y)), [1.0, 0.0]),
            TexturedVertex::new(ndc(min), [0.0, 0.0]),
        ]
    }

    /// Builds an uninitialized render object showing `texture` over this quad.
    pub fn render_object(
        &self,
        viewport: Vec2,
        texture: impl Into<TextureSource>,
    ) -> RenderObject<TexturedVertex> {
        RenderObject::with_indices(self.vertices(viewport).to_vec(), Self::INDICES.to_vec())
            .with_texture(texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_viewport_quad_covers_ndc() {
        let viewport = Vec2::new(800.0, 600.0);
        let quad = Quad::new(Vec2::ZERO, viewport);

        let pos: Vec<[f32; 2]> = quad.vertices(viewport).iter().map(|v| v.pos).collect();
        assert_eq!(pos, [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]]);
    }

    #[test]
    fn top_left_texel_maps_to_top_left_corner() {
        let quad = Quad::at(Vec2::new(100.0, 50.0));
        let [bl, _, tr, tl] = quad.vertices(Vec2::new(400.0, 400.0));

        assert_eq!(tl.uv, [0.0, 0.0]);
        assert_eq!(tl.pos, [-0.5, 0.75]);
        assert_eq!(bl.uv, [0.0, 1.0]);
        assert_eq!(tr.pos, [0.5, 0.75]);
    }

    #[test]
    fn contains_is_half_open() {
        let quad = Quad::new(Vec2::new(10.0, 10.0), Vec2::new(5.0, 5.0));
        assert!(quad.contains(Vec2::new(10.0, 14.9)));
        assert!(!quad.contains(Vec2::new(15.0, 12.0)));
        assert!(!quad.contains(Vec2::new(9.0, 12.0)));
    }

    #[test]
    fn render_object_is_indexed_and_textured() {
        let obj = Quad::at(Vec2::ZERO)
            .render_object(Vec2::new(640.0, 480.0), image::RgbaImage::new(1, 1));
        assert_eq!(obj.vertices().len(), 4);
        assert_eq!(obj.indices(), Quad::INDICES);
        assert!(!obj.is_initialized());
    }
}

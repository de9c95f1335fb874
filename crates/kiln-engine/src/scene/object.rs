use glam::Vec2;

use crate::device::{Frame, Gpu, ResourceError, TextureSource};
use crate::render::{Drawable, Quad};

/// Named entity living in a scene, optionally carrying something to draw.
pub struct Object {
    name: String,
    remove: bool,
    drawable: Option<Box<dyn Drawable>>,
}

impl Object {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remove: false,
            drawable: None,
        }
    }

    pub fn with_drawable(mut self, drawable: impl Drawable + 'static) -> Self {
        self.drawable = Some(Box::new(drawable));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Flags the object; its scene drops it at the next processing point.
    pub fn mark_for_removal(&mut self) {
        self.remove = true;
    }

    pub fn needs_removal(&self) -> bool {
        self.remove
    }

    pub fn drawable(&self) -> Option<&dyn Drawable> {
        self.drawable.as_deref()
    }

    /// Replaces the drawable, releasing the previous one.
    pub fn set_drawable(&mut self, gpu: &mut Gpu<'_>, drawable: impl Drawable + 'static) {
        self.release(gpu);
        self.drawable = Some(Box::new(drawable));
    }

    /// Gives the object a textured quad sized for the current surface.
    ///
    /// The quad is uploaded immediately; on failure the object keeps whatever
    /// drawable it had.
    pub fn init_quad(
        &mut self,
        gpu: &mut Gpu<'_>,
        texture: impl Into<TextureSource>,
        quad: Quad,
    ) -> Result<(), ResourceError> {
        let (width, height) = gpu.size();
        let mut object = quad.render_object(Vec2::new(width as f32, height as f32), texture);
        object.init(gpu)?;
        self.set_drawable(gpu, object);
        Ok(())
    }

    pub fn draw(&self, frame: &mut Frame<'_, '_>) {
        if let Some(drawable) = &self.drawable {
            drawable.draw(frame);
        }
    }

    /// Releases the drawable's GPU resources and drops it.
    pub fn release(&mut self, gpu: &mut Gpu<'_>) {
        if let Some(mut drawable) = self.drawable.take() {
            drawable.release(gpu);
        }
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("name", &self.name)
            .field("remove", &self.remove)
            .field("drawable", &self.drawable.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Op;

    #[test]
    fn init_quad_uploads_and_release_frees() {
        let (mut gpu, recorder) = Gpu::headless();
        let mut obj = Object::new("tile");

        obj.init_quad(&mut gpu, image::RgbaImage::new(4, 4), Quad::at(Vec2::ZERO))
            .unwrap();
        assert!(obj.drawable().is_some());
        assert_eq!(recorder.live_resources(), 4);

        obj.release(&mut gpu);
        obj.release(&mut gpu);
        assert!(obj.drawable().is_none());
        assert_eq!(recorder.live_resources(), 0);
    }

    #[test]
    fn replacing_drawable_releases_old_one() {
        let (mut gpu, recorder) = Gpu::headless();
        let mut obj = Object::new("tile");
        let texture = image::RgbaImage::new(2, 2);

        obj.init_quad(&mut gpu, texture.clone(), Quad::at(Vec2::ZERO)).unwrap();
        obj.init_quad(&mut gpu, texture, Quad::at(Vec2::ONE)).unwrap();
        assert_eq!(recorder.live_resources(), 4);
        obj.release(&mut gpu);
    }

    #[test]
    fn failed_quad_keeps_object_empty() {
        let (mut gpu, recorder) = Gpu::headless();
        recorder.fail(Op::CreateTexture);
        let mut obj = Object::new("tile");

        assert!(obj
            .init_quad(&mut gpu, image::RgbaImage::new(2, 2), Quad::at(Vec2::ZERO))
            .is_err());
        assert!(obj.drawable().is_none());
        assert_eq!(recorder.live_resources(), 0);
    }
}

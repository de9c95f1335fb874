use crate::core::Context;
use crate::device::{Frame, Gpu};
use crate::input::InputEvent;

use super::object::Object;

/// Bookkeeping every scene carries: its name, live objects and the objects
/// waiting to join them.
///
/// Objects added with [`add_object`](Self::add_object) and objects flagged for
/// removal only take effect at [`apply_pending`](Self::apply_pending), which
/// the scene stack runs at the start of the scene's update. Nothing iterating
/// [`objects`](Self::objects) in between sees the collection change.
#[derive(Debug)]
pub struct SceneState {
    name: String,
    initialized: bool,
    objects: Vec<Object>,
    pending: Vec<Object>,
}

impl SceneState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initialized: false,
            objects: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Live objects, in insertion order.
    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    /// Objects queued for the next processing point.
    pub fn pending(&self) -> &[Object] {
        &self.pending
    }

    pub fn add_object(&mut self, object: Object) {
        self.pending.push(object);
    }

    /// First live object called `name`.
    pub fn get_object(&self, name: &str) -> Option<&Object> {
        self.objects.iter().find(|o| o.name() == name)
    }

    pub fn get_object_mut(&mut self, name: &str) -> Option<&mut Object> {
        self.objects.iter_mut().find(|o| o.name() == name)
    }

    /// Flags the first live object called `name` that is not flagged yet.
    ///
    /// Returns whether an object was flagged.
    pub fn remove_object(&mut self, name: &str) -> bool {
        match self
            .objects
            .iter_mut()
            .find(|o| o.name() == name && !o.needs_removal())
        {
            Some(object) => {
                object.mark_for_removal();
                true
            }
            None => false,
        }
    }

    /// Drops flagged objects, releasing their drawables, then appends the
    /// pending ones in the order they were added.
    pub fn apply_pending(&mut self, gpu: &mut Gpu<'_>) {
        self.objects.retain_mut(|object| {
            if !object.needs_removal() {
                return true;
            }
            log::trace!("scene `{}`: removing `{}`", self.name, object.name());
            object.release(gpu);
            false
        });
        self.objects.append(&mut self.pending);
    }

    /// Draws every live object.
    pub fn render(&self, frame: &mut Frame<'_, '_>) {
        for object in &self.objects {
            object.draw(frame);
        }
    }

    /// Releases and drops every object, live or pending, and marks the scene
    /// uninitialized.
    pub fn clear(&mut self, gpu: &mut Gpu<'_>) {
        for object in self.objects.iter_mut().chain(self.pending.iter_mut()) {
            object.release(gpu);
        }
        self.objects.clear();
        self.pending.clear();
        self.initialized = false;
    }
}

/// A screen of the application.
///
/// Implementors own a [`SceneState`] and override the hooks they need. The
/// scene stack drives them:
/// - `on_init` once, before the scene first becomes reachable
/// - `on_update` every tick while the scene is on top, after its pending
///   objects were applied
/// - `on_event` for each input event while the scene is on top
/// - `on_render` every frame while the scene is on the stack, after its
///   objects were drawn
pub trait Scene {
    fn state(&self) -> &SceneState;

    fn state_mut(&mut self) -> &mut SceneState;

    fn on_init(&mut self, ctx: &mut Context<'_, '_>) -> anyhow::Result<()> {
        let _ = ctx;
        Ok(())
    }

    fn on_update(&mut self, ctx: &mut Context<'_, '_>) {
        let _ = ctx;
    }

    fn on_event(&mut self, ctx: &mut Context<'_, '_>, event: &InputEvent) {
        let _ = (ctx, event);
    }

    fn on_render(&self, frame: &mut Frame<'_, '_>) {
        let _ = frame;
    }
}

/// A plain scene with no behavior of its own.
impl Scene for SceneState {
    fn state(&self) -> &SceneState {
        self
    }

    fn state_mut(&mut self) -> &mut SceneState {
        self
    }
}

impl dyn Scene + '_ {
    pub fn name(&self) -> &str {
        self.state().name()
    }

    pub(crate) fn init(&mut self, ctx: &mut Context<'_, '_>) -> anyhow::Result<()> {
        self.on_init(ctx)?;
        self.state_mut().initialized = true;
        log::trace!("scene `{}` initialized", self.name());
        Ok(())
    }

    pub(crate) fn update(&mut self, ctx: &mut Context<'_, '_>) {
        self.state_mut().apply_pending(ctx.gpu);
        self.on_update(ctx);
    }

    pub(crate) fn render(&self, frame: &mut Frame<'_, '_>) {
        self.state().render(frame);
        self.on_render(frame);
    }

    pub(crate) fn release(&mut self, gpu: &mut Gpu<'_>) {
        log::trace!("scene `{}` released", self.name());
        self.state_mut().clear(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Call;
    use crate::paint::Color;
    use crate::render::Quad;
    use crate::testing::gpu_with_object_pipeline;
    use glam::Vec2;

    fn names(objects: &[Object]) -> Vec<&str> {
        objects.iter().map(Object::name).collect()
    }

    fn quad_object(gpu: &mut Gpu<'_>, name: &str) -> Object {
        let mut object = Object::new(name);
        object
            .init_quad(gpu, image::RgbaImage::new(2, 2), Quad::at(Vec2::ZERO))
            .unwrap();
        object
    }

    #[test]
    fn added_objects_wait_for_processing_point() {
        let (mut gpu, _recorder) = gpu_with_object_pipeline();
        let mut scene = SceneState::new("test");
        scene.add_object(Object::new("live"));
        scene.apply_pending(&mut gpu);

        scene.add_object(Object::new("a"));
        scene.add_object(Object::new("b"));
        assert_eq!(names(scene.objects()), ["live"]);
        assert!(scene.get_object("a").is_none());

        scene.apply_pending(&mut gpu);
        assert_eq!(names(scene.objects()), ["live", "a", "b"]);
        assert!(scene.pending().is_empty());
    }

    #[test]
    fn flagged_objects_are_purged_and_released() {
        let (mut gpu, recorder) = gpu_with_object_pipeline();
        let mut scene = SceneState::new("test");
        scene.add_object(quad_object(&mut gpu, "a"));
        scene.add_object(quad_object(&mut gpu, "b"));
        scene.apply_pending(&mut gpu);
        assert_eq!(recorder.live_resources(), 9);

        assert!(scene.remove_object("a"));
        assert!(!scene.remove_object("a"));
        assert_eq!(scene.objects().len(), 2);

        scene.apply_pending(&mut gpu);
        assert_eq!(names(scene.objects()), ["b"]);
        assert_eq!(recorder.live_resources(), 5);

        assert!(!scene.remove_object("a"));
        scene.apply_pending(&mut gpu);
        scene.clear(&mut gpu);
    }

    #[test]
    fn remove_flags_duplicates_one_at_a_time() {
        let (mut gpu, _recorder) = gpu_with_object_pipeline();
        let mut scene = SceneState::new("test");
        for _ in 0..2 {
            scene.add_object(Object::new("aa"));
        }
        scene.apply_pending(&mut gpu);

        assert!(scene.remove_object("aa"));
        assert!(scene.remove_object("aa"));
        assert!(!scene.remove_object("aa"));
    }

    #[test]
    fn pending_objects_are_not_drawn() {
        let (mut gpu, recorder) = gpu_with_object_pipeline();
        let mut scene = SceneState::new("test");
        scene.add_object(quad_object(&mut gpu, "drawn"));
        scene.apply_pending(&mut gpu);
        scene.add_object(quad_object(&mut gpu, "waiting"));
        recorder.clear_calls();

        let mut frame = gpu.begin(Color::BLACK).unwrap();
        scene.render(&mut frame);
        frame.end().unwrap();

        assert_eq!(recorder.count(|c| matches!(c, Call::DrawIndexed { .. })), 1);
        scene.clear(&mut gpu);
    }

    #[test]
    fn clear_releases_live_and_pending() {
        let (mut gpu, recorder) = gpu_with_object_pipeline();
        let mut scene = SceneState::new("test");
        scene.add_object(quad_object(&mut gpu, "live"));
        scene.apply_pending(&mut gpu);
        scene.add_object(quad_object(&mut gpu, "pending"));
        scene.initialized = true;

        scene.clear(&mut gpu);
        assert!(scene.objects().is_empty() && scene.pending().is_empty());
        assert!(!scene.is_initialized());
        assert_eq!(recorder.live_resources(), 1);
    }

    #[test]
    fn get_object_mut_renames() {
        let (mut gpu, _recorder) = gpu_with_object_pipeline();
        let mut scene = SceneState::new("test");
        scene.add_object(Object::new("old"));
        scene.apply_pending(&mut gpu);

        scene.get_object_mut("old").unwrap().set_name("new");
        assert!(scene.get_object("new").is_some());
        assert_eq!(scene.name(), "test");
    }
}

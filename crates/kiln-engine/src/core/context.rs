use glam::Vec2;

use crate::device::Gpu;
use crate::input::ActionMap;
use crate::scene::{Scene, SceneRequests};
use crate::time::FrameTime;

/// What a scene hook gets to work with.
///
/// Scene changes requested here are applied by the scene stack at the end of
/// the current update tick.
pub struct Context<'a, 'w> {
    pub gpu: &'a mut Gpu<'w>,
    pub input: &'a ActionMap,
    pub time: FrameTime,
    requests: &'a mut SceneRequests,
}

impl<'a, 'w> Context<'a, 'w> {
    pub(crate) fn new(
        gpu: &'a mut Gpu<'w>,
        input: &'a ActionMap,
        time: FrameTime,
        requests: &'a mut SceneRequests,
    ) -> Self {
        Self {
            gpu,
            input,
            time,
            requests,
        }
    }

    /// Seconds since the previous tick.
    pub fn dt(&self) -> f32 {
        self.time.dt
    }

    /// Surface size in physical pixels.
    pub fn viewport(&self) -> Vec2 {
        let (width, height) = self.gpu.size();
        Vec2::new(width as f32, height as f32)
    }

    pub fn push_scene(&mut self, scene: impl Scene + 'static) {
        self.requests.push(Box::new(scene));
    }

    pub fn replace_scene(&mut self, scene: impl Scene + 'static) {
        self.requests.replace(Box::new(scene));
    }

    pub fn pop_scene(&mut self) {
        self.requests.pop();
    }

    /// Asks the runtime to close after this frame.
    pub fn exit(&mut self) {
        self.requests.exit();
    }
}

use std::mem;

use crate::core::Context;
use crate::device::{Frame, Gpu};
use crate::input::{ActionMap, InputEvent};
use crate::time::FrameTime;

use super::state::Scene;

#[derive(Default)]
enum PendingAction {
    #[default]
    None,
    Push(Box<dyn Scene>),
    Replace(Box<dyn Scene>),
    Pop,
}

/// Scene changes waiting for the next apply point, plus the exit flag.
///
/// Holds a single pending action: a request made before the previous one was
/// applied overwrites it. Scenes overwritten that way are released at the next
/// apply point.
#[derive(Default)]
pub struct SceneRequests {
    pending: PendingAction,
    discarded: Vec<Box<dyn Scene>>,
    exit: bool,
}

impl SceneRequests {
    pub fn push(&mut self, scene: Box<dyn Scene>) {
        self.set(PendingAction::Push(scene));
    }

    pub fn replace(&mut self, scene: Box<dyn Scene>) {
        self.set(PendingAction::Replace(scene));
    }

    pub fn pop(&mut self) {
        self.set(PendingAction::Pop);
    }

    pub fn exit(&mut self) {
        self.exit = true;
    }

    pub fn exit_requested(&self) -> bool {
        self.exit
    }

    pub fn has_pending(&self) -> bool {
        !matches!(self.pending, PendingAction::None)
    }

    fn set(&mut self, action: PendingAction) {
        match mem::replace(&mut self.pending, action) {
            PendingAction::None => {}
            PendingAction::Pop => log::warn!("pending scene pop overwritten"),
            PendingAction::Push(scene) | PendingAction::Replace(scene) => {
                log::warn!("pending scene `{}` overwritten before it was applied", scene.name());
                self.discarded.push(scene);
            }
        }
    }
}

/// Ordered stack of scenes with one pending mutation.
///
/// Only the top scene is updated and receives events; every scene is rendered,
/// bottom to top. Push, replace and pop are deferred to the end of
/// [`update`](Self::update), after the top scene's own update.
#[derive(Default)]
pub struct SceneStack {
    scenes: Vec<Box<dyn Scene>>,
    requests: SceneRequests,
}

impl SceneStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn top(&self) -> Option<&dyn Scene> {
        self.scenes.last().map(|s| s.as_ref())
    }

    pub fn top_mut(&mut self) -> Option<&mut (dyn Scene + 'static)> {
        self.scenes.last_mut().map(|s| s.as_mut())
    }

    /// Scene names, bottom to top.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenes.iter().map(|s| s.name())
    }

    pub fn push(&mut self, scene: impl Scene + 'static) {
        self.requests.push(Box::new(scene));
    }

    pub fn replace(&mut self, scene: impl Scene + 'static) {
        self.requests.replace(Box::new(scene));
    }

    pub fn pop(&mut self) {
        self.requests.pop();
    }

    pub fn has_pending(&self) -> bool {
        self.requests.has_pending()
    }

    pub fn exit_requested(&self) -> bool {
        self.requests.exit_requested()
    }

    /// Updates the top scene, then applies the pending action.
    pub fn update(&mut self, gpu: &mut Gpu<'_>, input: &ActionMap, time: FrameTime) {
        if let Some(top) = self.scenes.last_mut() {
            let mut ctx = Context::new(gpu, input, time, &mut self.requests);
            top.update(&mut ctx);
        }
        self.apply_pending(gpu, input, time);
    }

    /// Forwards one input event to the top scene.
    pub fn event(
        &mut self,
        gpu: &mut Gpu<'_>,
        input: &ActionMap,
        time: FrameTime,
        event: &InputEvent,
    ) {
        if let Some(top) = self.scenes.last_mut() {
            let mut ctx = Context::new(gpu, input, time, &mut self.requests);
            top.on_event(&mut ctx, event);
        }
    }

    pub fn render(&self, frame: &mut Frame<'_, '_>) {
        for scene in &self.scenes {
            scene.render(frame);
        }
    }

    /// Releases every scene, including pending and overwritten ones.
    pub fn clear(&mut self, gpu: &mut Gpu<'_>) {
        for mut scene in self.scenes.drain(..).rev() {
            scene.release(gpu);
        }
        if let PendingAction::Push(mut scene) | PendingAction::Replace(mut scene) =
            mem::take(&mut self.requests.pending)
        {
            scene.release(gpu);
        }
        for mut scene in self.requests.discarded.drain(..) {
            scene.release(gpu);
        }
    }

    fn apply_pending(&mut self, gpu: &mut Gpu<'_>, input: &ActionMap, time: FrameTime) {
        for mut scene in self.requests.discarded.drain(..) {
            scene.release(gpu);
        }

        match mem::take(&mut self.requests.pending) {
            PendingAction::None => {}
            PendingAction::Pop => match self.scenes.pop() {
                Some(mut scene) => {
                    log::trace!("popping scene `{}`", scene.name());
                    scene.release(gpu);
                }
                None => log::warn!("scene pop requested on an empty stack"),
            },
            PendingAction::Push(scene) => {
                log::trace!("pushing scene `{}`", scene.name());
                if let Some(scene) = self.ready(scene, gpu, input, time) {
                    self.scenes.push(scene);
                }
            }
            PendingAction::Replace(scene) => {
                log::trace!("replacing {} scene(s) with `{}`", self.scenes.len(), scene.name());
                for mut old in self.scenes.drain(..).rev() {
                    old.release(gpu);
                }
                if let Some(scene) = self.ready(scene, gpu, input, time) {
                    self.scenes.push(scene);
                }
            }
        }
    }

    /// Initializes `scene` unless it already is. A scene failing to
    /// initialize is released and dropped.
    fn ready(
        &mut self,
        mut scene: Box<dyn Scene>,
        gpu: &mut Gpu<'_>,
        input: &ActionMap,
        time: FrameTime,
    ) -> Option<Box<dyn Scene>> {
        if scene.state().is_initialized() {
            return Some(scene);
        }

        let mut ctx = Context::new(gpu, input, time, &mut self.requests);
        match scene.init(&mut ctx) {
            Ok(()) => Some(scene),
            Err(e) => {
                log::error!("scene `{}` failed to initialize: {e:#}", scene.name());
                scene.release(gpu);
                None
            }
        }
    }
}

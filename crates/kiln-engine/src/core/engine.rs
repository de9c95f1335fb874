use crate::device::{FrameError, Gpu, SurfaceErrorAction};
use crate::input::{ActionMap, InputEvent};
use crate::paint::Color;
use crate::pipeline::ObjectPipeline;
use crate::scene::{Scene, SceneStack};
use crate::time::{FrameClock, FrameTime};

use super::app::AppControl;
use super::config::EngineConfig;

/// The device, the scene stack, input actions and the frame clock.
///
/// One frame is [`update`](Self::update) followed by [`render`](Self::render).
/// Dropping the engine releases every scene before the device shuts down.
pub struct Engine<'w> {
    gpu: Gpu<'w>,
    scenes: SceneStack,
    input: ActionMap,
    clock: FrameClock,
    time: FrameTime,
    clear_color: Color,
}

impl<'w> Engine<'w> {
    /// Wraps `gpu` and registers the object pipeline.
    ///
    /// A pipeline that fails to build is logged; objects using it are skipped
    /// when drawn.
    pub fn new(mut gpu: Gpu<'w>, config: &EngineConfig) -> Self {
        let (vertex, fragment) = &config.object_shaders;
        if let Some(reason) = gpu.add_pipeline::<ObjectPipeline>(vertex, fragment).failure() {
            log::error!("object pipeline unavailable: {reason}");
        }

        Self {
            gpu,
            scenes: SceneStack::new(),
            input: ActionMap::default(),
            clock: FrameClock::new().with_fps_limit(config.fps_limit),
            time: FrameTime::fixed(0.0),
            clear_color: config.clear_color,
        }
    }

    pub fn gpu(&self) -> &Gpu<'w> {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut Gpu<'w> {
        &mut self.gpu
    }

    pub fn input(&self) -> &ActionMap {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut ActionMap {
        &mut self.input
    }

    pub fn scenes(&self) -> &SceneStack {
        &self.scenes
    }

    /// Timing of the last update.
    pub fn time(&self) -> FrameTime {
        self.time
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }

    pub fn push_scene(&mut self, scene: impl Scene + 'static) {
        self.scenes.push(scene);
    }

    pub fn replace_scene(&mut self, scene: impl Scene + 'static) {
        self.scenes.replace(scene);
    }

    pub fn pop_scene(&mut self) {
        self.scenes.pop();
    }

    /// Feeds one input event to the action map, then to the top scene.
    pub fn handle_event(&mut self, event: &InputEvent) {
        self.input.apply(event);
        self.scenes.event(&mut self.gpu, &self.input, self.time, event);
    }

    /// Advances the clock (sleeping out the frame limit) and runs one update tick.
    pub fn update(&mut self) {
        let time = self.clock.tick();
        self.step(time);
    }

    /// Runs one update tick with the given timing.
    pub fn step(&mut self, time: FrameTime) {
        self.time = time;
        self.scenes.update(&mut self.gpu, &self.input, time);
        self.input.advance();
    }

    /// Renders every scene into one frame and presents it.
    ///
    /// Transient surface problems skip the frame; fatal ones ask to exit.
    pub fn render(&mut self) -> AppControl {
        let mut frame = match self.gpu.begin(self.clear_color) {
            Ok(frame) => frame,
            Err(e) => return frame_failed(e),
        };
        self.scenes.render(&mut frame);
        match frame.end() {
            Ok(()) => AppControl::Continue,
            Err(e) => frame_failed(e),
        }
    }

    /// Whether input or a scene asked to quit.
    pub fn should_exit(&self) -> bool {
        self.input.quit_requested() || self.scenes.exit_requested()
    }

    /// Releases every scene, then shuts the device down. Idempotent.
    pub fn shutdown(&mut self) {
        self.scenes.clear(&mut self.gpu);
        self.gpu.shutdown();
    }
}

fn frame_failed(e: FrameError) -> AppControl {
    match e.action() {
        SurfaceErrorAction::Fatal => {
            log::error!("fatal frame error: {:#}", anyhow::Error::new(e));
            AppControl::Exit
        }
        SurfaceErrorAction::Reconfigured => {
            log::debug!("surface reconfigured, frame skipped");
            AppControl::Continue
        }
        SurfaceErrorAction::SkipFrame => {
            log::warn!("frame skipped: {:#}", anyhow::Error::new(e));
            AppControl::Continue
        }
    }
}

impl Drop for Engine<'_> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::core::Context;
    use crate::device::{Call, HeadlessRecorder, Op};
    use crate::input::{Action, ButtonState, Key};
    use crate::render::Quad;
    use crate::scene::{Object, SceneState};
    use crate::testing::shader_pair;

    fn engine() -> (Engine<'static>, HeadlessRecorder) {
        let (gpu, recorder) = Gpu::headless();
        let config = EngineConfig {
            object_shaders: shader_pair(),
            fps_limit: 0,
            ..EngineConfig::default()
        };
        (Engine::new(gpu, &config), recorder)
    }

    struct Tiles(SceneState);

    impl Scene for Tiles {
        fn state(&self) -> &SceneState {
            &self.0
        }

        fn state_mut(&mut self) -> &mut SceneState {
            &mut self.0
        }

        fn on_init(&mut self, ctx: &mut Context<'_, '_>) -> anyhow::Result<()> {
            for (name, x) in [("aa", 0.0), ("bb", 300.0)] {
                let mut object = Object::new(name);
                let quad = Quad::at(Vec2::new(x, 0.0));
                object.init_quad(ctx.gpu, image::RgbaImage::new(2, 2), quad)?;
                self.0.add_object(object);
            }
            Ok(())
        }

        fn on_update(&mut self, ctx: &mut Context<'_, '_>) {
            if ctx.input.is_pressed(Action::Attack) {
                self.0.remove_object("aa");
            }
        }
    }

    #[test]
    fn registers_object_pipeline() {
        let (engine, _recorder) = engine();
        assert!(engine.gpu().get_pipeline::<ObjectPipeline>().unwrap().is_ready());
    }

    #[test]
    fn missing_object_shaders_do_not_abort() {
        let (gpu, _recorder) = Gpu::headless();
        let config = EngineConfig {
            object_shaders: ("nope.vert".into(), "nope.frag".into()),
            ..EngineConfig::default()
        };
        let engine = Engine::new(gpu, &config);
        assert!(!engine.gpu().get_pipeline::<ObjectPipeline>().unwrap().is_ready());
    }

    #[test]
    fn update_then_render_draws_scene_objects() {
        let (mut engine, recorder) = engine();
        engine.push_scene(Tiles(SceneState::new("tiles")));

        engine.step(FrameTime::fixed(0.016));
        engine.step(FrameTime::fixed(0.016));
        recorder.clear_calls();

        assert_eq!(engine.render(), AppControl::Continue);
        assert_eq!(recorder.count(|c| matches!(c, Call::DrawIndexed { .. })), 2);
        assert_eq!(recorder.count(|c| matches!(c, Call::Submit(_))), 1);
    }

    #[test]
    fn input_reaches_scene_through_actions() {
        let (mut engine, recorder) = engine();
        engine.push_scene(Tiles(SceneState::new("tiles")));
        engine.step(FrameTime::fixed(0.016));
        engine.step(FrameTime::fixed(0.016));
        let before = recorder.live_resources();

        engine.handle_event(&InputEvent::PointerButton {
            button: crate::input::MouseButton::Left,
            state: ButtonState::Pressed,
        });
        engine.step(FrameTime::fixed(0.016));
        engine.step(FrameTime::fixed(0.016));

        let top = engine.scenes().top().unwrap();
        let names: Vec<&str> = top.state().objects().iter().map(Object::name).collect();
        assert_eq!(names, ["bb"]);
        assert_eq!(recorder.live_resources(), before - 4);
    }

    #[test]
    fn close_request_asks_to_exit() {
        let (mut engine, _recorder) = engine();
        assert!(!engine.should_exit());
        engine.handle_event(&InputEvent::Key {
            key: Key::Escape,
            state: ButtonState::Pressed,
            repeat: false,
        });
        assert!(!engine.should_exit());
        engine.handle_event(&InputEvent::CloseRequested);
        assert!(engine.should_exit());
    }

    #[test]
    fn skipped_and_fatal_frames() {
        let (mut engine, recorder) = engine();

        recorder.fail_surface(SurfaceErrorAction::SkipFrame);
        assert_eq!(engine.render(), AppControl::Continue);

        recorder.fail_surface(SurfaceErrorAction::Fatal);
        assert_eq!(engine.render(), AppControl::Exit);

        recorder.fail(Op::Submit);
        assert_eq!(engine.render(), AppControl::Continue);
        assert_eq!(engine.render(), AppControl::Continue);
    }

    #[test]
    fn shutdown_releases_scenes_before_device() {
        let (mut engine, recorder) = engine();
        engine.push_scene(Tiles(SceneState::new("tiles")));
        engine.step(FrameTime::fixed(0.016));
        recorder.clear_calls();

        drop(engine);

        let calls = recorder.calls();
        let wait_idle = calls.iter().position(|c| *c == Call::WaitIdle).unwrap();
        let last_release = calls
            .iter()
            .rposition(|c| matches!(c, Call::ReleaseTexture(_)))
            .unwrap();
        assert!(last_release < wait_idle);
        assert!(calls.contains(&Call::ReleaseAll(0)));
        assert!(!recorder.surface_attached());
    }
}

//! Three textured tiles on a stack of scenes.
//!
//! R removes tile "bb", Q opens an overlay with a colored triangle, E closes
//! it, Escape or closing the window quits.

use anyhow::Result;
use glam::Vec2;
use image::{Rgba, RgbaImage};

use kiln_engine::core::{App, Context, Engine, EngineConfig, WindowConfig};
use kiln_engine::input::{Action, ActionState, ButtonState, InputEvent, Key};
use kiln_engine::logging::{init_logging, LoggingConfig};
use kiln_engine::paint::Color;
use kiln_engine::pipeline::ColorPipeline;
use kiln_engine::render::{ColorVertex, Quad, RenderObject};
use kiln_engine::scene::{Object, Scene, SceneState};
use kiln_engine::window::Runtime;

fn checkerboard(size: u32, cell: u32) -> RgbaImage {
    RgbaImage::from_fn(size, size, |x, y| {
        if (x / cell + y / cell) % 2 == 0 {
            Rgba([230, 140, 40, 255])
        } else {
            Rgba([40, 40, 48, 255])
        }
    })
}

struct Tiles {
    state: SceneState,
}

impl Scene for Tiles {
    fn state(&self) -> &SceneState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SceneState {
        &mut self.state
    }

    fn on_init(&mut self, ctx: &mut Context<'_, '_>) -> Result<()> {
        let texture = checkerboard(64, 8);
        for (name, pos) in [
            ("aa", Vec2::new(412.0, 260.0)),
            ("bb", Vec2::new(100.0, 100.0)),
            ("cc", Vec2::new(700.0, 420.0)),
        ] {
            let mut object = Object::new(name);
            object.init_quad(ctx.gpu, texture.clone(), Quad::at(pos))?;
            self.state.add_object(object);
        }
        Ok(())
    }

    fn on_update(&mut self, ctx: &mut Context<'_, '_>) {
        if ctx.input.state(Action::ShowMenu) == ActionState::Press {
            ctx.push_scene(Overlay {
                state: SceneState::new("overlay"),
            });
        }
    }

    fn on_event(&mut self, ctx: &mut Context<'_, '_>, event: &InputEvent) {
        let InputEvent::Key { key, state: ButtonState::Pressed, repeat: false } = event else {
            return;
        };
        match key {
            Key::R => {
                if self.state.remove_object("bb") {
                    log::info!("removing tile bb");
                }
            }
            Key::Escape => ctx.exit(),
            _ => {}
        }
    }
}

struct Overlay {
    state: SceneState,
}

impl Scene for Overlay {
    fn state(&self) -> &SceneState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SceneState {
        &mut self.state
    }

    fn on_init(&mut self, ctx: &mut Context<'_, '_>) -> Result<()> {
        let mut triangle: RenderObject<ColorVertex, ColorPipeline> = RenderObject::new(vec![
            ColorVertex::new([0.0, 0.4], [1.0, 0.2, 0.2]),
            ColorVertex::new([-0.4, -0.4], [0.2, 1.0, 0.2]),
            ColorVertex::new([0.4, -0.4], [0.2, 0.2, 1.0]),
        ]);
        triangle.init(ctx.gpu)?;
        self.state
            .add_object(Object::new("triangle").with_drawable(triangle));
        Ok(())
    }

    fn on_update(&mut self, ctx: &mut Context<'_, '_>) {
        if ctx.input.state(Action::ShowInfo) == ActionState::Press {
            ctx.pop_scene();
        }
    }
}

struct Demo;

impl App for Demo {
    fn init(&mut self, engine: &mut Engine<'_>) -> Result<()> {
        let gpu = engine.gpu_mut();
        log::info!(
            "running on {} with a {:?} surface",
            gpu.backend_name(),
            gpu.surface_format()
        );

        let (vertex, fragment) = ColorPipeline::shaders();
        if let Some(reason) = gpu.add_pipeline::<ColorPipeline>(vertex, fragment).failure() {
            anyhow::bail!("color pipeline failed: {reason}");
        }

        engine.set_clear_color(Color::from_u8(18, 20, 28, 255));
        engine.push_scene(Tiles {
            state: SceneState::new("tiles"),
        });
        Ok(())
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = EngineConfig {
        window: WindowConfig {
            title: "kiln demo".to_string(),
            ..WindowConfig::default()
        },
        fps_limit: 60,
        ..EngineConfig::default()
    };

    Runtime::run(config, Demo)
}

use crate::input::InputEvent;

use super::engine::Engine;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract driven by the runtime.
pub trait App {
    /// Called once the engine exists, before the first frame. Push the first
    /// scene here. An error aborts startup.
    fn init(&mut self, engine: &mut Engine<'_>) -> anyhow::Result<()>;

    /// Called for every input event, before the top scene sees it.
    fn on_input(&mut self, engine: &mut Engine<'_>, event: &InputEvent) -> AppControl {
        let _ = (engine, event);
        AppControl::Continue
    }

    /// Called once per frame, before the engine updates and renders.
    fn on_frame(&mut self, engine: &mut Engine<'_>) -> AppControl {
        let _ = engine;
        AppControl::Continue
    }
}

//! Input subsystem.
//!
//! Public API is platform-agnostic and does not expose winit types.
//! The runtime translates platform events into `InputEvent`s and feeds them to
//! an [`ActionMap`].

mod actions;
mod types;

pub use actions::{Action, ActionMap, ActionState, Binding};
pub use types::{ButtonState, InputEvent, Key, MouseButton};

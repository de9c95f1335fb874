//! Scenes and their objects.
//!
//! Structural changes never happen mid-iteration: objects join and leave a
//! scene at its processing point, and scenes join and leave the stack at the
//! end of the update tick.

mod object;
mod stack;
mod state;

pub use object::Object;
pub use stack::{SceneRequests, SceneStack};
pub use state::{Scene, SceneState};

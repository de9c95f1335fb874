//! Color values shared by the frame API and scenes.

mod color;

pub use color::Color;

mod object;
mod quad;
mod vertex;

pub use object::{Drawable, ObjectState, RenderObject};
pub use quad::Quad;
pub use vertex::{ColorVertex, TexturedVertex};

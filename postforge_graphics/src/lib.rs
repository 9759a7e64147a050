//! Device-independent graphics model for the PostForge interpreter.
//!
//! Path construction transforms coordinates through the CTM at call time,
//! so paths, clip paths, and display-list geometry are always in device
//! space. Painting resolves the current color to device RGB lazily and
//! appends typed elements to the page's display list; a separate renderer
//! consumes the list.

pub mod color;
pub mod display_list;
pub mod gstate;
pub mod matrix;
pub mod path;

pub use color::{ColorSpace, Components, Rgb};
pub use display_list::{
    DisplayList, DlElement, ImageData, StrokeMethod, StrokeStyle, TextRenderingMode, WindingRule,
};
pub use gstate::{DashPattern, GraphicsState, LineCap, LineJoin};
pub use matrix::Matrix;
pub use path::{Path, PathSeg, Point, SubPath};

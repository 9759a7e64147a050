//! The display list: the interpreter's output interface.
//!
//! A flat, ordered list of typed elements in program order. Geometry is in
//! device space, colors are resolved device RGB. `showpage` hands the list
//! to the output device and clears it; `copypage` hands it and keeps it.

use crate::color::Rgb;
use crate::matrix::Matrix;
use crate::path::{Path, PathSeg};
use postforge_core::{Name, Object};

/// Fill rule for paint and clip elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindingRule {
    NonZero,
    EvenOdd,
}

/// How `show` renders text (page-device `/TextRenderingMode`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TextRenderingMode {
    /// Glyphs expand to filled paths inline in the display list.
    GlyphPaths,
    /// Structured `Text` elements preserving font identity and string.
    #[default]
    TextObjs,
}

/// How strokes reach the device (page-device `/StrokeMethod`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StrokeMethod {
    /// Stroke outlines are converted to fills before handoff.
    StrokePathFill,
    /// The device strokes with the recorded pen parameters.
    #[default]
    Stroke,
}

/// Pen parameters captured at stroke time. Line width and dashes are user
/// space; the CTM rides along so renderers can stroke anisotropically.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeStyle {
    pub line_width: f64,
    pub line_cap: i32,
    pub line_join: i32,
    pub miter_limit: f64,
    pub dashes: Vec<f64>,
    pub dash_offset: f64,
    pub stroke_adjust: bool,
    pub ctm: Matrix,
}

/// Sampled image data captured by `image` / `imagemask` / `colorimage`.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageData {
    pub width: i32,
    pub height: i32,
    pub bits_per_component: i32,
    pub components: i32,
    /// Image-space to unit-square matrix from the operand.
    pub matrix: Matrix,
    /// CTM at the time of the call.
    pub ctm: Matrix,
    pub decode: Vec<f64>,
    pub interpolate: bool,
    pub samples: Vec<u8>,
}

/// One element of the display list.
#[derive(Clone, Debug, PartialEq)]
pub enum DlElement {
    MoveTo {
        x: f64,
        y: f64,
    },
    LineTo {
        x: f64,
        y: f64,
    },
    CurveTo {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        x3: f64,
        y3: f64,
    },
    ClosePath,
    Fill {
        color: Rgb,
        rule: WindingRule,
    },
    Stroke {
        color: Rgb,
        style: StrokeStyle,
    },
    PatternFill {
        /// The pattern dictionary object (read-only reference).
        pattern: Object,
        rule: WindingRule,
        ctm: Matrix,
        /// Resolved underlying color for uncolored (PaintType 2) patterns.
        underlying: Option<Rgb>,
    },
    Clip {
        path: Path,
        rule: WindingRule,
        is_initclip: bool,
    },
    Image(ImageData),
    ImageMask {
        data: ImageData,
        color: Rgb,
        polarity: bool,
    },
    ColorImage {
        data: ImageData,
        color_space: &'static str,
    },
    Text {
        /// Original string bytes from the show operation.
        text: Vec<u8>,
        /// Baseline origin in device space.
        x: f64,
        y: f64,
        font: Object,
        font_name: Name,
        /// Effective size in device space.
        size: f64,
        color: Rgb,
        ctm: Matrix,
    },
    ActualTextStart {
        text: Vec<u8>,
        x: f64,
        y: f64,
    },
    ActualTextEnd,
    GlyphRef {
        glyph: Name,
        x: f64,
        y: f64,
    },
    GlyphStart {
        glyph: Name,
        x: f64,
        y: f64,
    },
    GlyphEnd,
    AxialShadingFill {
        coords: [f64; 4],
        stops: Vec<(f64, Rgb)>,
        extend: (bool, bool),
        ctm: Matrix,
    },
    RadialShadingFill {
        coords: [f64; 6],
        stops: Vec<(f64, Rgb)>,
        extend: (bool, bool),
        ctm: Matrix,
    },
    MeshShadingFill {
        triangles: Vec<[(f64, f64, Rgb); 3]>,
        ctm: Matrix,
    },
    PatchShadingFill {
        patches: Vec<(Vec<(f64, f64)>, [Rgb; 4])>,
        ctm: Matrix,
    },
    FunctionShadingFill {
        pixels: Vec<u8>,
        width: i32,
        height: i32,
        matrix: Matrix,
        ctm: Matrix,
    },
    ErasePage,
}

/// The accumulated page contents.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayList {
    pub elements: Vec<DlElement>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    #[inline]
    pub fn push(&mut self, element: DlElement) {
        self.elements.push(element);
    }

    /// Flatten a device-space path into MoveTo/LineTo/CurveTo/ClosePath
    /// elements preceding a paint element.
    pub fn push_path(&mut self, path: &Path) {
        for seg in path.segments() {
            self.elements.push(match *seg {
                PathSeg::MoveTo(p) => DlElement::MoveTo { x: p.x, y: p.y },
                PathSeg::LineTo(p) => DlElement::LineTo { x: p.x, y: p.y },
                PathSeg::CurveTo(c1, c2, p) => DlElement::CurveTo {
                    x1: c1.x,
                    y1: c1.y,
                    x2: c2.x,
                    y2: c2.y,
                    x3: p.x,
                    y3: p.y,
                },
                PathSeg::ClosePath => DlElement::ClosePath,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Point;

    #[test]
    fn push_path_flattens_in_order() {
        let mut path = Path::new();
        path.move_to(Point::new(0.0, 0.0));
        path.line_to(Point::new(100.0, 0.0));
        path.close();

        let mut dl = DisplayList::new();
        dl.push_path(&path);
        dl.push(DlElement::Fill {
            color: Rgb::BLACK,
            rule: WindingRule::NonZero,
        });

        assert!(matches!(dl.elements[0], DlElement::MoveTo { x, y } if x == 0.0 && y == 0.0));
        assert!(matches!(dl.elements[1], DlElement::LineTo { x, .. } if x == 100.0));
        assert!(matches!(dl.elements[2], DlElement::ClosePath));
        assert!(matches!(dl.elements[3], DlElement::Fill { .. }));
    }
}

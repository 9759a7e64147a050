//! The graphics state.
//!
//! `gsave` clones the whole state; composites referenced by `Object` fields
//! (the current font dictionary, transfer procedures, the page device
//! dictionary) are shared by handle, which matches PLRM sharing: the page
//! device is one dictionary across the whole gsave stack, while paths and
//! matrices are copied by value.

use crate::color::{ColorSpace, Components};
use crate::matrix::Matrix;
use crate::path::{Path, Point};
use postforge_core::Object;
use smallvec::SmallVec;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineCap {
    Butt = 0,
    Round = 1,
    Square = 2,
}

impl LineCap {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(LineCap::Butt),
            1 => Some(LineCap::Round),
            2 => Some(LineCap::Square),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineJoin {
    Miter = 0,
    Round = 1,
    Bevel = 2,
}

impl LineJoin {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(LineJoin::Miter),
            1 => Some(LineJoin::Round),
            2 => Some(LineJoin::Bevel),
            _ => None,
        }
    }
}

/// User-space dash array plus phase offset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DashPattern {
    pub dashes: SmallVec<[f64; 8]>,
    pub offset: f64,
}

/// The complete device-independent graphics state (PLRM Table 4.1).
#[derive(Clone, Debug)]
pub struct GraphicsState {
    pub ctm: Matrix,
    /// Inverse CTM, recomputed on every CTM change.
    pub ictm: Matrix,
    /// Current point in device space.
    pub current_point: Option<Point>,
    /// Current path, device space.
    pub path: Path,
    /// Clip path, device space.
    pub clip_path: Path,
    /// Monotonic clip version so saves/restores re-emit the right clip.
    pub clip_version: u64,
    pub color_space: ColorSpace,
    pub color: Components,
    /// Current pattern dictionary when the space is Pattern.
    pub pattern: Option<Object>,
    pub font: Option<Object>,
    pub line_width: f64,
    pub line_cap: LineCap,
    pub line_join: LineJoin,
    pub miter_limit: f64,
    pub dash: DashPattern,
    pub stroke_adjust: bool,
    pub flatness: f64,
    /// Transfer function procedure (stored, not applied at paint time).
    pub transfer: Option<Object>,
    /// Per-channel transfer procedures from `setcolortransfer`.
    pub color_transfer: Option<[Object; 4]>,
    pub black_generation: Option<Object>,
    pub undercolor_removal: Option<Object>,
    /// Halftone dictionary or screen tuple, stored only.
    pub halftone: Option<Object>,
    pub screen: Option<(f64, f64, Object)>,
    /// Page device dictionary; shared (not deep-copied) across gsave.
    pub page_device: Option<Object>,
    /// True when this entry on the gstate stack was pushed by `save`
    /// rather than `gsave`.
    pub saved_by_save: bool,
}

impl GraphicsState {
    pub fn new() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            ictm: Matrix::IDENTITY,
            current_point: None,
            path: Path::new(),
            clip_path: Path::new(),
            clip_version: 0,
            color_space: ColorSpace::DeviceGray,
            color: ColorSpace::DeviceGray.initial_components(),
            pattern: None,
            font: None,
            line_width: 1.0,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            miter_limit: 10.0,
            dash: DashPattern::default(),
            stroke_adjust: false,
            flatness: 1.0,
            transfer: None,
            color_transfer: None,
            black_generation: None,
            undercolor_removal: None,
            halftone: None,
            screen: None,
            page_device: None,
            saved_by_save: false,
        }
    }

    /// Install a new CTM and keep the inverse coherent. A singular matrix
    /// leaves the old inverse in place; `itransform` on it will then report
    /// through `undefinedresult` at use time.
    pub fn set_ctm(&mut self, m: Matrix) {
        self.ctm = m;
        if let Ok(inv) = m.invert() {
            self.ictm = inv;
        }
    }

    /// Reset everything `initgraphics` resets (PLRM: CTM, path, color,
    /// line parameters; the page device survives).
    pub fn init_graphics(&mut self, default_matrix: Matrix) {
        self.set_ctm(default_matrix);
        self.current_point = None;
        self.path.clear();
        self.color_space = ColorSpace::DeviceGray;
        self.color = self.color_space.initial_components();
        self.pattern = None;
        self.line_width = 1.0;
        self.line_cap = LineCap::Butt;
        self.line_join = LineJoin::Miter;
        self.miter_limit = 10.0;
        self.dash = DashPattern::default();
        self.stroke_adjust = false;
    }

    /// Update the clip path and bump the version counter.
    pub fn set_clip(&mut self, clip: Path) {
        self.clip_path = clip;
        self.clip_version += 1;
    }

    /// Snapshot for `gsave`; the clone shares composite handles.
    pub fn snapshot(&self, by_save: bool) -> GraphicsState {
        let mut copy = self.clone();
        copy.saved_by_save = by_save;
        copy
    }
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_ctm_keeps_inverse_coherent() {
        let mut gs = GraphicsState::new();
        gs.set_ctm(Matrix::scaling(2.0, 4.0));
        let (x, y) = gs.ictm.apply(8.0, 8.0);
        assert!((x - 4.0).abs() < 1e-9);
        assert!((y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn init_graphics_resets_line_state_but_not_clip_version() {
        let mut gs = GraphicsState::new();
        gs.line_width = 5.0;
        gs.set_clip(Path::new());
        let version = gs.clip_version;
        gs.init_graphics(Matrix::IDENTITY);
        assert_eq!(gs.line_width, 1.0);
        assert_eq!(gs.clip_version, version);
    }

    #[test]
    fn snapshot_marks_save_origin() {
        let gs = GraphicsState::new();
        assert!(gs.snapshot(true).saved_by_save);
        assert!(!gs.snapshot(false).saved_by_save);
    }
}

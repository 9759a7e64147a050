//! Color spaces and device-RGB resolution.
//!
//! Conversion is lazy: `setcolor` only records components in the graphics
//! state, and painting operators resolve to device RGB when they build a
//! display-list element. The pure PLRM formulas live here; spaces whose
//! resolution needs the interpreter (tint transforms, Indexed lookup
//! procedures, CIE decode procedures) keep their parameter objects and are
//! resolved by the VM crate's color driver.

use postforge_core::Object;
use smallvec::SmallVec;

/// A resolved device color.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self {
            r: clamp01(r),
            g: clamp01(g),
            b: clamp01(b),
        }
    }
}

/// Color components as stored in the graphics state.
pub type Components = SmallVec<[f64; 4]>;

/// CIE-based space parameter sets. Decode procedures and matrices are kept
/// as the PostScript objects handed to `setcolorspace`; the VM runs them.
#[derive(Clone, Debug, PartialEq)]
pub struct CieParams {
    /// WhitePoint [Xw Yw Zw].
    pub white_point: [f64; 3],
    /// RangeABC / RangeA flattened; pairs of (lo, hi) per component.
    pub range: SmallVec<[f64; 8]>,
    /// MatrixABC (or MatrixA broadcast) in row order.
    pub matrix_abc: [f64; 9],
    /// MatrixLMN in row order.
    pub matrix_lmn: [f64; 9],
    /// DecodeABC / DecodeA procedures, if supplied.
    pub decode_abc: Option<Object>,
    /// DecodeLMN procedures, if supplied.
    pub decode_lmn: Option<Object>,
}

impl CieParams {
    pub fn with_white_point(white_point: [f64; 3], components: usize) -> Self {
        let mut range = SmallVec::new();
        for _ in 0..components {
            range.push(0.0);
            range.push(1.0);
        }
        Self {
            white_point,
            range,
            matrix_abc: IDENTITY3,
            matrix_lmn: IDENTITY3,
            decode_abc: None,
            decode_lmn: None,
        }
    }
}

const IDENTITY3: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// The current color space (PLRM 4.8).
#[derive(Clone, Debug, PartialEq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRgb,
    DeviceCmyk,
    CieBasedA(Box<CieParams>),
    CieBasedAbc(Box<CieParams>),
    /// DEF/DEFG reduce through their table to the ABC/A pipeline; the
    /// lookup table object rides along unevaluated.
    CieBasedDef(Box<CieParams>),
    CieBasedDefg(Box<CieParams>),
    /// ICC profile streams are not interpreted; painting falls back to the
    /// declared alternate space.
    IccBased {
        components: usize,
        alternate: Box<ColorSpace>,
    },
    Indexed {
        base: Box<ColorSpace>,
        hival: i32,
        /// Lookup string or procedure object.
        lookup: Object,
    },
    Separation {
        name: postforge_core::Name,
        alternate: Box<ColorSpace>,
        /// Tint transform procedure.
        tint: Object,
    },
    DeviceN {
        names: Vec<postforge_core::Name>,
        alternate: Box<ColorSpace>,
        tint: Object,
    },
    Pattern {
        /// Underlying space for uncolored (PaintType 2) patterns.
        base: Option<Box<ColorSpace>>,
    },
}

impl ColorSpace {
    /// The PostScript family name.
    pub fn family(&self) -> &'static str {
        match self {
            ColorSpace::DeviceGray => "DeviceGray",
            ColorSpace::DeviceRgb => "DeviceRGB",
            ColorSpace::DeviceCmyk => "DeviceCMYK",
            ColorSpace::CieBasedA(_) => "CIEBasedA",
            ColorSpace::CieBasedAbc(_) => "CIEBasedABC",
            ColorSpace::CieBasedDef(_) => "CIEBasedDEF",
            ColorSpace::CieBasedDefg(_) => "CIEBasedDEFG",
            ColorSpace::IccBased { .. } => "ICCBased",
            ColorSpace::Indexed { .. } => "Indexed",
            ColorSpace::Separation { .. } => "Separation",
            ColorSpace::DeviceN { .. } => "DeviceN",
            ColorSpace::Pattern { .. } => "Pattern",
        }
    }

    /// Number of components `setcolor` expects.
    pub fn components(&self) -> usize {
        match self {
            ColorSpace::DeviceGray | ColorSpace::CieBasedA(_) => 1,
            ColorSpace::DeviceRgb
            | ColorSpace::CieBasedAbc(_)
            | ColorSpace::CieBasedDef(_) => 3,
            ColorSpace::DeviceCmyk | ColorSpace::CieBasedDefg(_) => 4,
            ColorSpace::IccBased { components, .. } => *components,
            ColorSpace::Indexed { .. } => 1,
            ColorSpace::Separation { .. } => 1,
            ColorSpace::DeviceN { names, .. } => names.len(),
            ColorSpace::Pattern { base } => {
                base.as_ref().map(|b| b.components()).unwrap_or(0)
            }
        }
    }

    /// The initial color when this space is installed (PLRM: black / all
    /// zeros / tint 1 for Separation and DeviceN).
    pub fn initial_components(&self) -> Components {
        match self {
            ColorSpace::Separation { .. } | ColorSpace::DeviceN { .. } => {
                let mut c = Components::new();
                for _ in 0..self.components() {
                    c.push(1.0);
                }
                c
            }
            _ => {
                let mut c = Components::new();
                for _ in 0..self.components() {
                    c.push(0.0);
                }
                c
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Device-space conversion formulas (PLRM 7.2)
// ---------------------------------------------------------------------------

#[inline]
pub fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// NTSC luminosity weighting.
pub fn rgb_to_gray(r: f64, g: f64, b: f64) -> f64 {
    clamp01(0.3 * r + 0.59 * g + 0.11 * b)
}

pub fn gray_to_rgb(gray: f64) -> Rgb {
    Rgb::new(gray, gray, gray)
}

pub fn cmyk_to_rgb(c: f64, m: f64, y: f64, k: f64) -> Rgb {
    Rgb::new(
        1.0 - (c + k).min(1.0),
        1.0 - (m + k).min(1.0),
        1.0 - (y + k).min(1.0),
    )
}

/// RGB → CMYK with full undercolor removal.
pub fn rgb_to_cmyk(r: f64, g: f64, b: f64) -> (f64, f64, f64, f64) {
    let c = 1.0 - r;
    let m = 1.0 - g;
    let y = 1.0 - b;
    let k = c.min(m).min(y);
    (c - k, m - k, y - k, k)
}

pub fn hsb_to_rgb(h: f64, s: f64, b: f64) -> Rgb {
    let h = clamp01(h);
    let s = clamp01(s);
    let v = clamp01(b);
    if s == 0.0 {
        return Rgb::new(v, v, v);
    }
    let h6 = if h >= 1.0 { 0.0 } else { h * 6.0 };
    let sector = h6.floor();
    let f = h6 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match sector as i32 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    Rgb::new(r, g, b)
}

pub fn rgb_to_hsb(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let v = max;
    let s = if max > 0.0 { delta / max } else { 0.0 };
    if delta == 0.0 {
        return (0.0, 0.0, v);
    }
    let mut h = if max == r {
        (g - b) / delta
    } else if max == g {
        2.0 + (b - r) / delta
    } else {
        4.0 + (r - g) / delta
    } / 6.0;
    if h < 0.0 {
        h += 1.0;
    }
    (h, s, v)
}

/// CIE XYZ (D50-ish, per the space's white point) to sRGB primaries.
pub fn xyz_to_srgb(x: f64, y: f64, z: f64) -> Rgb {
    let r = 3.2406 * x - 1.5372 * y - 0.4986 * z;
    let g = -0.9689 * x + 1.8758 * y + 0.0415 * z;
    let b = 0.0557 * x - 0.2040 * y + 1.0570 * z;
    let gamma = |v: f64| {
        let v = clamp01(v);
        if v <= 0.0031308 {
            12.92 * v
        } else {
            1.055 * v.powf(1.0 / 2.4) - 0.055
        }
    };
    Rgb::new(gamma(r), gamma(g), gamma(b))
}

/// Apply a 3×3 row-major matrix to a 3-vector.
pub fn mat3_apply(m: &[f64; 9], v: [f64; 3]) -> [f64; 3] {
    [
        m[0] * v[0] + m[1] * v[1] + m[2] * v[2],
        m[3] * v[0] + m[4] * v[1] + m[5] * v[2],
        m[6] * v[0] + m[7] * v[1] + m[8] * v[2],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn ntsc_weights_sum_to_one() {
        assert!(close(rgb_to_gray(1.0, 1.0, 1.0), 1.0));
        assert!(close(rgb_to_gray(0.0, 0.0, 0.0), 0.0));
    }

    #[test]
    fn cmyk_round_trip_for_pure_colors() {
        let (c, m, y, k) = rgb_to_cmyk(1.0, 0.0, 0.0);
        let rgb = cmyk_to_rgb(c, m, y, k);
        assert!(close(rgb.r, 1.0) && close(rgb.g, 0.0) && close(rgb.b, 0.0));
    }

    #[test]
    fn hsb_primaries() {
        let red = hsb_to_rgb(0.0, 1.0, 1.0);
        assert!(close(red.r, 1.0) && close(red.g, 0.0) && close(red.b, 0.0));
        let green = hsb_to_rgb(1.0 / 3.0, 1.0, 1.0);
        assert!(close(green.g, 1.0));
    }

    #[test]
    fn hsb_round_trip() {
        let (h, s, b) = rgb_to_hsb(0.2, 0.7, 0.4);
        let rgb = hsb_to_rgb(h, s, b);
        assert!((rgb.r - 0.2).abs() < 1e-6);
        assert!((rgb.g - 0.7).abs() < 1e-6);
        assert!((rgb.b - 0.4).abs() < 1e-6);
    }

    #[test]
    fn separation_initial_tint_is_one() {
        let sep = ColorSpace::Separation {
            name: postforge_core::Name::new(b"Spot"),
            alternate: Box::new(ColorSpace::DeviceGray),
            tint: Object::null(),
        };
        assert_eq!(sep.initial_components().as_slice(), &[1.0]);
        assert_eq!(
            ColorSpace::DeviceRgb.initial_components().as_slice(),
            &[0.0, 0.0, 0.0]
        );
    }
}

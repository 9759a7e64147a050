//! Font plumbing and the show family.
//!
//! Glyph rendering (charstring interpretation) is an external
//! collaborator; the interpreter manages font dictionaries, metrics, and
//! text placement, and emits structured `Text` display elements (or glyph
//! markers when a renderer supplies outlines). Widths come from a font's
//! `Metrics` dictionary when present, else from a nominal advance.

use crate::context::Context;
use crate::dict_stack;
use crate::engine::{ExecItem, LoopFrame};
use crate::ops::device::emit;
use postforge_core::{
    Access, ErrorKind, Name, Object, PsResult, Value,
};
use postforge_graphics::{DlElement, Matrix};
use postforge_runtime::DictKey;

/// Nominal glyph advance in 1000-unit glyph space when a font supplies no
/// metrics.
const DEFAULT_ADVANCE: f64 = 600.0;

fn key(n: &[u8]) -> DictKey {
    DictKey::Name(Name::new(n))
}

fn font_directory(ctx: &Context) -> PsResult<postforge_core::DictRef> {
    let name = if ctx.alloc_global {
        b"GlobalFontDirectory".as_slice()
    } else {
        b"FontDirectory".as_slice()
    };
    dict_stack::lookup_name(ctx, Name::new(name))
        .and_then(|o| o.as_dict())
        .ok_or_else(|| ErrorKind::Undefined.into())
}

/// The 256-entry StandardEncoding vector as interned names. Unmapped
/// codes are `.notdef`.
pub fn standard_encoding() -> Vec<Name> {
    let mut table = vec![Name::new(b".notdef"); 256];
    let defs: &[(u8, &str)] = &[
        (32, "space"), (33, "exclam"), (34, "quotedbl"), (35, "numbersign"),
        (36, "dollar"), (37, "percent"), (38, "ampersand"), (39, "quoteright"),
        (40, "parenleft"), (41, "parenright"), (42, "asterisk"), (43, "plus"),
        (44, "comma"), (45, "hyphen"), (46, "period"), (47, "slash"),
        (48, "zero"), (49, "one"), (50, "two"), (51, "three"),
        (52, "four"), (53, "five"), (54, "six"), (55, "seven"),
        (56, "eight"), (57, "nine"), (58, "colon"), (59, "semicolon"),
        (60, "less"), (61, "equal"), (62, "greater"), (63, "question"),
        (64, "at"), (91, "bracketleft"), (92, "backslash"),
        (93, "bracketright"), (94, "asciicircum"), (95, "underscore"),
        (96, "quoteleft"), (123, "braceleft"), (124, "bar"),
        (125, "braceright"), (126, "asciitilde"),
    ];
    for &(code, name) in defs {
        table[code as usize] = Name::from_str(name);
    }
    for code in b'A'..=b'Z' {
        table[code as usize] = Name::new(&[code]);
    }
    for code in b'a'..=b'z' {
        table[code as usize] = Name::new(&[code]);
    }
    table
}

/// Build the StandardEncoding array object during bootstrap.
pub fn build_standard_encoding(ctx: &mut Context) -> Object {
    let elems: Vec<Object> = standard_encoding()
        .into_iter()
        .map(Object::literal_name)
        .collect();
    ctx.new_array(elems).with_access(Access::ReadOnly)
}

/// Synthesize a minimal font dictionary for a name `findfont` cannot
/// resolve (font discovery is external).
fn synthesize_font(ctx: &mut Context, name: Name) -> PsResult<Object> {
    let font = ctx.new_dict(8);
    let dref = font.as_dict().ok_or(ErrorKind::VmError)?;
    let fm = ctx.new_array(vec![
        Object::real(0.001),
        Object::real(0.0),
        Object::real(0.0),
        Object::real(0.001),
        Object::real(0.0),
        Object::real(0.0),
    ]);
    let bbox = ctx.new_array(vec![
        Object::integer(0),
        Object::integer(-200),
        Object::integer(1000),
        Object::integer(900),
    ]);
    let encoding = dict_stack::lookup_name(ctx, Name::new(b"StandardEncoding"))
        .unwrap_or(Object::null());
    ctx.memory
        .dict_put(dref, key(b"FontName"), Object::literal_name(name))?;
    ctx.memory.dict_put(dref, key(b"FontType"), Object::integer(1))?;
    ctx.memory.dict_put(dref, key(b"FontMatrix"), fm)?;
    ctx.memory.dict_put(dref, key(b"FontBBox"), bbox)?;
    ctx.memory.dict_put(dref, key(b"Encoding"), encoding)?;
    Ok(font)
}

/// key `findfont` font
pub fn findfont(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let name = match ctx.peek(0)?.value {
        Value::Name(n) => n,
        Value::String(r) => Name::new(&ctx.memory.string_vec(r)?),
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    let dir = font_directory(ctx)?;
    let found = ctx.memory.dict_get(dir, DictKey::Name(name))?;
    ctx.pop()?;
    match found {
        Some(font) => ctx.push(font),
        None => {
            let font = synthesize_font(ctx, name)?;
            ctx.push(font)
        }
    }
}

fn font_matrix(ctx: &Context, font: postforge_core::DictRef) -> PsResult<Matrix> {
    let fm = ctx
        .memory
        .dict_get(font, key(b"FontMatrix"))?
        .ok_or(ErrorKind::InvalidFont)?;
    crate::ops::matrix::read_matrix(ctx, &fm)
}

/// Copy a font dict with a transformed FontMatrix.
fn derive_font(ctx: &mut Context, font: postforge_core::DictRef, by: Matrix) -> PsResult<Object> {
    let old_matrix = font_matrix(ctx, font)?;
    let entries: Vec<(DictKey, Object)> = ctx.memory.dict(font)?.iter_ordered().collect();
    let new_font = ctx.new_dict(entries.len() + 2);
    let new_ref = new_font.as_dict().ok_or(ErrorKind::VmError)?;
    for (k, v) in entries {
        ctx.memory.dict_put(new_ref, k, v)?;
    }
    let m = old_matrix.concat(by);
    let vals: Vec<Object> = m.to_array().iter().map(|&v| Object::real(v)).collect();
    let fm = ctx.new_array(vals);
    ctx.memory.dict_put(new_ref, key(b"FontMatrix"), fm)?;
    Ok(new_font)
}

/// font scale `scalefont` font'
pub fn scalefont(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let scale = ctx.peek_number(0)?;
    let font = ctx.peek_dict(1)?;
    let scaled = derive_font(ctx, font, Matrix::scaling(scale, scale))?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.push(scaled)
}

/// font matrix `makefont` font'
pub fn makefont(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let m = crate::ops::matrix::read_matrix(ctx, ctx.peek(0)?)?;
    let font = ctx.peek_dict(1)?;
    let derived = derive_font(ctx, font, m)?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.push(derived)
}

/// font `setfont` –
pub fn setfont(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let font = *ctx.peek(0)?;
    if font.as_dict().is_none() {
        return Err(ErrorKind::TypeCheck.into());
    }
    ctx.pop()?;
    ctx.gstate.font = Some(font);
    Ok(())
}

/// key scale `selectfont` – — findfont + scalefont + setfont.
pub fn selectfont(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let scale = *ctx.peek(0)?;
    let k = *ctx.peek(1)?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.push(k)?;
    findfont(ctx)?;
    match scale.value {
        Value::Integer(_) | Value::Real(_) => {
            ctx.push(scale)?;
            scalefont(ctx)?;
        }
        Value::Array(_) | Value::PackedArray(_) => {
            ctx.push(scale)?;
            makefont(ctx)?;
        }
        _ => return Err(ErrorKind::TypeCheck.into()),
    }
    setfont(ctx)
}

/// `currentfont` font
pub fn currentfont(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    match ctx.gstate.font {
        Some(font) => ctx.push(font),
        None => {
            let font = synthesize_font(ctx, Name::new(b"Courier"))?;
            ctx.gstate.font = Some(font);
            ctx.push(font)
        }
    }
}

/// key font `definefont` font — registers in FontDirectory and stamps a
/// FID.
pub fn definefont(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let font = ctx.peek_dict(0)?;
    let font_obj = *ctx.peek(0)?;
    let k = ctx.memory.dict_key(ctx.peek(1)?)?;
    let fid = ctx.next_font_id();
    ctx.memory
        .dict_put(font, key(b"FID"), Object::new(Value::Font(fid)))?;
    let dir = font_directory(ctx)?;
    ctx.memory.dict_put(dir, k, font_obj)?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.push(font_obj)
}

/// key `undefinefont` –
pub fn undefinefont(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let k = ctx.memory.dict_key(ctx.peek(0)?)?;
    let dir = font_directory(ctx)?;
    ctx.pop()?;
    ctx.memory.dict_mut(dir)?.remove(k);
    Ok(())
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

fn current_font_dict(ctx: &mut Context) -> PsResult<postforge_core::DictRef> {
    if ctx.gstate.font.is_none() {
        let font = synthesize_font(ctx, Name::new(b"Courier"))?;
        ctx.gstate.font = Some(font);
    }
    ctx.gstate
        .font
        .and_then(|f| f.as_dict())
        .ok_or_else(|| ErrorKind::InvalidFont.into())
}

/// Glyph name for a character code through the font's Encoding.
fn glyph_name(ctx: &Context, font: postforge_core::DictRef, code: u8) -> Name {
    let fallback = Name::new(b".notdef");
    let enc = match ctx.memory.dict_get(font, key(b"Encoding")).ok().flatten() {
        Some(e) => e,
        None => return fallback,
    };
    match enc.as_array() {
        Some(r) if (code as usize) < r.len => ctx
            .memory
            .array_get(r, code as usize)
            .ok()
            .and_then(|o| o.as_name())
            .unwrap_or(fallback),
        _ => fallback,
    }
}

/// Advance width of one character in user space.
pub fn char_width(ctx: &mut Context, code: u8) -> PsResult<(f64, f64)> {
    let font = current_font_dict(ctx)?;
    let fm = font_matrix(ctx, font)?;
    let glyph = glyph_name(ctx, font, code);

    // Metrics override, keyed by glyph name or by character code.
    let mut advance = DEFAULT_ADVANCE;
    if let Some(metrics) = ctx.memory.dict_get(font, key(b"Metrics"))? {
        if let Some(mref) = metrics.as_dict() {
            let by_name = ctx.memory.dict_get(mref, DictKey::Name(glyph))?;
            let by_code = ctx
                .memory
                .dict_get(mref, DictKey::Integer(code as i32))?;
            if let Some(w) = by_name.or(by_code) {
                match w.value {
                    Value::Integer(_) | Value::Real(_) => {
                        advance = w.number().unwrap_or(DEFAULT_ADVANCE);
                    }
                    Value::Array(r) if r.len >= 1 => {
                        if let Ok(first) = ctx.memory.array_get(r, 0) {
                            advance = first.number().unwrap_or(DEFAULT_ADVANCE);
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(fm.apply_distance(advance, 0.0))
}

/// string `stringwidth` wx wy
pub fn stringwidth(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let r = ctx.peek_string(0)?;
    ctx.require_access(ctx.peek(0)?, Access::ReadOnly)?;
    ctx.reserve(2)?;
    let bytes = ctx.memory.string_vec(r)?;
    ctx.pop()?;
    let mut wx = 0.0;
    let mut wy = 0.0;
    for b in bytes {
        let (cx, cy) = char_width(ctx, b)?;
        wx += cx;
        wy += cy;
    }
    ctx.push(Object::real(wx))?;
    ctx.push(Object::real(wy))
}

// ---------------------------------------------------------------------------
// Showing
// ---------------------------------------------------------------------------

/// Device-space text size derived from the font matrix and CTM.
fn effective_size(ctx: &Context, fm: &Matrix) -> f64 {
    let (ux, uy) = fm.apply_distance(0.0, 1000.0);
    let (dx, dy) = ctx.gstate.ctm.apply_distance(ux, uy);
    (dx * dx + dy * dy).sqrt()
}

/// Paint one character at the current point and advance it.
pub fn show_single_char(ctx: &mut Context, code: u8) -> PsResult<()> {
    crate::ops::device::sync_clip(ctx);
    let current = ctx
        .gstate
        .current_point
        .ok_or(ErrorKind::NoCurrentPoint)?;
    let font = current_font_dict(ctx)?;
    let fm = font_matrix(ctx, font)?;
    let font_obj = ctx.gstate.font.unwrap_or_else(Object::null);
    let font_name = ctx
        .memory
        .dict_get(font, key(b"FontName"))?
        .and_then(|o| o.as_name())
        .unwrap_or_else(|| Name::new(b"Unknown"));
    let color = crate::color_driver::current_rgb(ctx)?;
    let size = effective_size(ctx, &fm);
    let ctm = ctx.gstate.ctm;
    emit(
        ctx,
        DlElement::Text {
            text: vec![code],
            x: current.x,
            y: current.y,
            font: font_obj,
            font_name,
            size,
            color,
            ctm,
        },
    );
    advance_point(ctx, code)
}

fn advance_point(ctx: &mut Context, code: u8) -> PsResult<()> {
    let (wx, wy) = char_width(ctx, code)?;
    let (dx, dy) = ctx.gstate.ctm.apply_distance(wx, wy);
    if let Some(p) = &mut ctx.gstate.current_point {
        p.x += dx;
        p.y += dy;
    }
    Ok(())
}

/// Paint a whole string and advance the current point past it. In
/// TextObjs mode one structured Text element carries the string; in
/// GlyphPaths mode each character emits a glyph reference the renderer
/// resolves against its outline cache.
fn show_string(ctx: &mut Context, bytes: &[u8]) -> PsResult<()> {
    crate::ops::device::sync_clip(ctx);
    let current = ctx
        .gstate
        .current_point
        .ok_or(ErrorKind::NoCurrentPoint)?;
    let font = current_font_dict(ctx)?;

    if crate::ops::device::text_rendering_mode(ctx)
        == postforge_graphics::TextRenderingMode::GlyphPaths
    {
        for &b in bytes {
            let glyph = glyph_name(ctx, font, b);
            let at = ctx.gstate.current_point.unwrap_or(current);
            emit(
                ctx,
                DlElement::GlyphRef {
                    glyph,
                    x: at.x,
                    y: at.y,
                },
            );
            advance_point(ctx, b)?;
        }
        return Ok(());
    }

    let fm = font_matrix(ctx, font)?;
    let font_obj = ctx.gstate.font.unwrap_or_else(Object::null);
    let font_name = ctx
        .memory
        .dict_get(font, key(b"FontName"))?
        .and_then(|o| o.as_name())
        .unwrap_or_else(|| Name::new(b"Unknown"));
    let color = crate::color_driver::current_rgb(ctx)?;
    let size = effective_size(ctx, &fm);
    let ctm = ctx.gstate.ctm;
    emit(
        ctx,
        DlElement::Text {
            text: bytes.to_vec(),
            x: current.x,
            y: current.y,
            font: font_obj,
            font_name,
            size,
            color,
            ctm,
        },
    );
    for &b in bytes {
        advance_point(ctx, b)?;
    }
    Ok(())
}

/// string `show` –
pub fn show(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let r = ctx.peek_string(0)?;
    ctx.require_access(ctx.peek(0)?, Access::ReadOnly)?;
    if ctx.gstate.current_point.is_none() {
        return Err(ErrorKind::NoCurrentPoint.into());
    }
    let bytes = ctx.memory.string_vec(r)?;
    ctx.pop()?;
    show_string(ctx, &bytes)
}

/// ax ay string `ashow` –
pub fn ashow(ctx: &mut Context) -> PsResult<()> {
    ctx.need(3)?;
    let r = ctx.peek_string(0)?;
    let ay = ctx.peek_number(1)?;
    let ax = ctx.peek_number(2)?;
    if ctx.gstate.current_point.is_none() {
        return Err(ErrorKind::NoCurrentPoint.into());
    }
    let bytes = ctx.memory.string_vec(r)?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.pop()?;
    for b in bytes {
        show_string(ctx, &[b])?;
        let (dx, dy) = ctx.gstate.ctm.apply_distance(ax, ay);
        if let Some(p) = &mut ctx.gstate.current_point {
            p.x += dx;
            p.y += dy;
        }
    }
    Ok(())
}

/// cx cy char string `widthshow` –
pub fn widthshow(ctx: &mut Context) -> PsResult<()> {
    ctx.need(4)?;
    let r = ctx.peek_string(0)?;
    let target = ctx.peek_int(1)?;
    let cy = ctx.peek_number(2)?;
    let cx = ctx.peek_number(3)?;
    if ctx.gstate.current_point.is_none() {
        return Err(ErrorKind::NoCurrentPoint.into());
    }
    let bytes = ctx.memory.string_vec(r)?;
    for _ in 0..4 {
        ctx.pop()?;
    }
    for b in bytes {
        show_string(ctx, &[b])?;
        if b as i32 == target {
            let (dx, dy) = ctx.gstate.ctm.apply_distance(cx, cy);
            if let Some(p) = &mut ctx.gstate.current_point {
                p.x += dx;
                p.y += dy;
            }
        }
    }
    Ok(())
}

/// cx cy char ax ay string `awidthshow` –
pub fn awidthshow(ctx: &mut Context) -> PsResult<()> {
    ctx.need(6)?;
    let r = ctx.peek_string(0)?;
    let ay = ctx.peek_number(1)?;
    let ax = ctx.peek_number(2)?;
    let target = ctx.peek_int(3)?;
    let cy = ctx.peek_number(4)?;
    let cx = ctx.peek_number(5)?;
    if ctx.gstate.current_point.is_none() {
        return Err(ErrorKind::NoCurrentPoint.into());
    }
    let bytes = ctx.memory.string_vec(r)?;
    for _ in 0..6 {
        ctx.pop()?;
    }
    for b in bytes {
        show_string(ctx, &[b])?;
        let mut ex = ax;
        let mut ey = ay;
        if b as i32 == target {
            ex += cx;
            ey += cy;
        }
        let (dx, dy) = ctx.gstate.ctm.apply_distance(ex, ey);
        if let Some(p) = &mut ctx.gstate.current_point {
            p.x += dx;
            p.y += dy;
        }
    }
    Ok(())
}

/// proc string `kshow` –
pub fn kshow(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let r = ctx.peek_string(0)?;
    let body = *ctx.peek_proc(1)?;
    if ctx.gstate.current_point.is_none() {
        return Err(ErrorKind::NoCurrentPoint.into());
    }
    ctx.pop()?;
    ctx.pop()?;
    ctx.e_stack.push(ExecItem::Loop(Box::new(LoopFrame::Kshow {
        string: r,
        index: 0,
        body,
    })));
    Ok(())
}

/// proc string `cshow` –
pub fn cshow(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let r = ctx.peek_string(0)?;
    let body = *ctx.peek_proc(1)?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.e_stack.push(ExecItem::Loop(Box::new(LoopFrame::Cshow {
        string: r,
        index: 0,
        body,
    })));
    Ok(())
}

/// name `glyphshow` –
pub fn glyphshow(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let glyph = ctx.peek(0)?.as_name().ok_or(ErrorKind::TypeCheck)?;
    let current = ctx
        .gstate
        .current_point
        .ok_or(ErrorKind::NoCurrentPoint)?;
    ctx.pop()?;
    emit(
        ctx,
        DlElement::GlyphRef {
            glyph,
            x: current.x,
            y: current.y,
        },
    );
    Ok(())
}

/// string `charpath` variant: appends nominal glyph boxes to the current
/// path (outline interpretation is external).
pub fn charpath(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    ctx.peek_bool(0)?;
    let r = ctx.peek_string(1)?;
    let start = ctx
        .gstate
        .current_point
        .ok_or(ErrorKind::NoCurrentPoint)?;
    let bytes = ctx.memory.string_vec(r)?;
    ctx.pop()?;
    ctx.pop()?;

    let font = current_font_dict(ctx)?;
    let fm = font_matrix(ctx, font)?;
    let (_, asc) = fm.apply_distance(0.0, 700.0);
    let mut pen_x = start.x;
    for b in bytes {
        let (wx, wy) = char_width(ctx, b)?;
        let (dwx, _) = ctx.gstate.ctm.apply_distance(wx, wy);
        let (_, dasc) = ctx.gstate.ctm.apply_distance(0.0, asc);
        let p = &mut ctx.gstate.path;
        p.move_to(postforge_graphics::Point::new(pen_x, start.y));
        p.line_to(postforge_graphics::Point::new(pen_x + dwx, start.y));
        p.line_to(postforge_graphics::Point::new(pen_x + dwx, start.y + dasc));
        p.line_to(postforge_graphics::Point::new(pen_x, start.y + dasc));
        p.close();
        pen_x += dwx;
    }
    ctx.gstate.current_point = Some(postforge_graphics::Point::new(pen_x, start.y));
    Ok(())
}

/// wx wy llx lly urx ury `setcachedevice` – — accepted; the glyph cache
/// lives with the renderer.
pub fn setcachedevice(ctx: &mut Context) -> PsResult<()> {
    ctx.need(6)?;
    for i in 0..6 {
        ctx.peek_number(i)?;
    }
    for _ in 0..6 {
        ctx.pop()?;
    }
    Ok(())
}

/// w0x w0y llx lly urx ury w1x w1y vx vy `setcachedevice2` –
pub fn setcachedevice2(ctx: &mut Context) -> PsResult<()> {
    ctx.need(10)?;
    for i in 0..10 {
        ctx.peek_number(i)?;
    }
    for _ in 0..10 {
        ctx.pop()?;
    }
    Ok(())
}

/// wx wy `setcharwidth` –
pub fn setcharwidth(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    ctx.peek_number(0)?;
    ctx.peek_number(1)?;
    ctx.pop()?;
    ctx.pop()?;
    Ok(())
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "findfont", findfont);
    super::define_op(ctx, "scalefont", scalefont);
    super::define_op(ctx, "makefont", makefont);
    super::define_op(ctx, "setfont", setfont);
    super::define_op(ctx, "selectfont", selectfont);
    super::define_op(ctx, "currentfont", currentfont);
    super::define_op(ctx, "definefont", definefont);
    super::define_op(ctx, "undefinefont", undefinefont);
    super::define_op(ctx, "stringwidth", stringwidth);
    super::define_op(ctx, "show", show);
    super::define_op(ctx, "ashow", ashow);
    super::define_op(ctx, "widthshow", widthshow);
    super::define_op(ctx, "awidthshow", awidthshow);
    super::define_op(ctx, "kshow", kshow);
    super::define_op(ctx, "cshow", cshow);
    super::define_op(ctx, "glyphshow", glyphshow);
    super::define_op(ctx, "charpath", charpath);
    super::define_op(ctx, "setcachedevice", setcachedevice);
    super::define_op(ctx, "setcachedevice2", setcachedevice2);
    super::define_op(ctx, "setcharwidth", setcharwidth);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn findfont_scalefont_setfont_pipeline() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"/Helvetica findfont 12 scalefont setfont")
            .unwrap();
        assert!(ctx.gstate.font.is_some());
        let font = ctx.gstate.font.unwrap().as_dict().unwrap();
        let fm = font_matrix(&ctx, font).unwrap();
        assert!((fm.a - 0.012).abs() < 1e-9);
    }

    #[test]
    fn definefont_registers_and_stamps_fid() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"/MyFont 4 dict dup /FontMatrix [0.001 0 0 0.001 0 0] put definefont pop")
            .unwrap();
        ctx.run_bytes(b"/MyFont findfont /FID known").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }

    #[test]
    fn show_emits_text_and_advances() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"/Helvetica findfont 10 scalefont setfont 100 100 moveto (AB) show")
            .unwrap();
        let text = ctx
            .display_list
            .elements
            .iter()
            .find_map(|e| match e {
                DlElement::Text { text, x, y, .. } => Some((text.clone(), *x, *y)),
                _ => None,
            })
            .expect("text element");
        assert_eq!(text.0, b"AB");
        assert_eq!((text.1, text.2), (100.0, 100.0));
        // Nominal advance: 2 chars × 600/1000 × 10pt = 12pt.
        let p = ctx.gstate.current_point.unwrap();
        assert!((p.x - 112.0).abs() < 1e-9);
    }

    #[test]
    fn stringwidth_scales_with_font_size() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"/Helvetica findfont 20 scalefont setfont (AA) stringwidth")
            .unwrap();
        let wy = ctx.pop().unwrap().number().unwrap();
        let wx = ctx.pop().unwrap().number().unwrap();
        assert_eq!(wy, 0.0);
        assert!((wx - 24.0).abs() < 1e-9);
    }

    #[test]
    fn show_without_current_point_raises() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{ (x) show } stopped").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }

    #[test]
    fn kshow_runs_proc_between_characters() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"0 0 moveto (abc) {pop pop 1} exch kshow").unwrap();
        // Two gaps between three characters.
        assert_eq!(ctx.pop().unwrap().as_int(), Some(1));
        assert_eq!(ctx.pop().unwrap().as_int(), Some(1));
    }

    #[test]
    fn glyphpaths_mode_emits_glyph_refs() {
        let mut ctx = Context::new();
        ctx.run_bytes(
            b"<< /TextRenderingMode /GlyphPaths >> setpagedevice \
              0 0 moveto (Ab) show",
        )
        .unwrap();
        let glyphs: Vec<Name> = ctx
            .display_list
            .elements
            .iter()
            .filter_map(|e| match e {
                DlElement::GlyphRef { glyph, .. } => Some(*glyph),
                _ => None,
            })
            .collect();
        assert_eq!(glyphs, vec![Name::new(b"A"), Name::new(b"b")]);
        assert!(!ctx
            .display_list
            .elements
            .iter()
            .any(|e| matches!(e, DlElement::Text { .. })));
    }

    #[test]
    fn metrics_override_advance() {
        let mut ctx = Context::new();
        ctx.run_bytes(
            b"/F 6 dict dup /FontMatrix [0.001 0 0 0.001 0 0] put \
              dup /Metrics 1 dict dup /A 1000 put put definefont pop \
              /F findfont 10 scalefont setfont (A) stringwidth pop",
        )
        .unwrap();
        let wx = ctx.pop().unwrap().number().unwrap();
        assert!((wx - 10.0).abs() < 1e-9);
    }
}

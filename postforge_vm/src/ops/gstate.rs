//! Graphics-state operators: gsave/grestore, line parameters, color
//! setting, and the stored-only device-dependent parameters (halftone,
//! transfer, black generation, undercolor removal).

use crate::context::{Context, MAX_GSTATE_STACK};
use crate::ops::device::default_matrix;
use postforge_core::{
    Access, ErrorKind, GStateId, Name, Object, PsResult, Value,
};
use postforge_graphics::color::{self, ColorSpace, Components};
use postforge_graphics::{DashPattern, LineCap, LineJoin};

/// `gsave` –
pub fn gsave(ctx: &mut Context) -> PsResult<()> {
    if ctx.gstate_stack.len() >= MAX_GSTATE_STACK {
        return Err(ErrorKind::LimitCheck.into());
    }
    ctx.gstate_stack.push(ctx.gstate.snapshot(false));
    Ok(())
}

/// `grestore` –
pub fn grestore(ctx: &mut Context) -> PsResult<()> {
    match ctx.gstate_stack.last() {
        // A save-created state restores but stays on the stack.
        Some(state) if state.saved_by_save => {
            ctx.gstate = state.clone();
            ctx.gstate.saved_by_save = false;
        }
        Some(_) => {
            let state = ctx.gstate_stack.pop().expect("checked non-empty");
            ctx.gstate = state;
        }
        None => {}
    }
    Ok(())
}

/// `grestoreall` –
pub fn grestoreall(ctx: &mut Context) -> PsResult<()> {
    do_grestoreall(ctx);
    Ok(())
}

/// Pop gsave-created states until a save-created state (restored but
/// kept), or the bottom of the stack.
pub fn do_grestoreall(ctx: &mut Context) {
    if ctx.gstate_stack.is_empty() {
        return;
    }
    let has_save_state = ctx.gstate_stack.iter().any(|g| g.saved_by_save);
    if has_save_state {
        while matches!(ctx.gstate_stack.last(), Some(g) if !g.saved_by_save) {
            ctx.gstate_stack.pop();
        }
        if let Some(top) = ctx.gstate_stack.last() {
            ctx.gstate = top.clone();
            ctx.gstate.saved_by_save = false;
        }
    } else {
        // Unencapsulated job: reset from the bottommost state.
        let bottom = ctx.gstate_stack[0].clone();
        ctx.gstate_stack.clear();
        ctx.gstate = bottom;
        ctx.gstate.saved_by_save = false;
    }
}

/// `initgraphics` –
pub fn initgraphics(ctx: &mut Context) -> PsResult<()> {
    let m = default_matrix(ctx);
    ctx.gstate.init_graphics(m);
    Ok(())
}

/// `gstate` gstate — snapshot the current state into a gstate object.
pub fn gstate(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let id = ctx.next_gstate_id();
    let snapshot = ctx.gstate.snapshot(false);
    ctx.gstate_objects.insert(id, snapshot);
    ctx.push(Object::new(Value::GState(GStateId(id))))
}

/// gstate `currentgstate` gstate — copy the current state into the
/// operand.
pub fn currentgstate(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let id = match ctx.peek(0)?.value {
        Value::GState(id) => id,
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    let snapshot = ctx.gstate.snapshot(false);
    ctx.gstate_objects.insert(id.0, snapshot);
    Ok(())
}

/// gstate `setgstate` –
pub fn setgstate(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let id = match ctx.peek(0)?.value {
        Value::GState(id) => id,
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    let state = ctx
        .gstate_objects
        .get(&id.0)
        .cloned()
        .ok_or(ErrorKind::Undefined)?;
    ctx.pop()?;
    ctx.gstate = state;
    ctx.gstate.saved_by_save = false;
    Ok(())
}

// ---------------------------------------------------------------------------
// Line parameters
// ---------------------------------------------------------------------------

pub fn setlinewidth(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let w = ctx.peek_number(0)?;
    ctx.pop()?;
    ctx.gstate.line_width = w.abs();
    Ok(())
}

pub fn currentlinewidth(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let w = ctx.gstate.line_width;
    ctx.push(Object::real(w))
}

pub fn setlinecap(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let code = ctx.peek_int(0)?;
    let cap = LineCap::from_code(code).ok_or(ErrorKind::RangeCheck)?;
    ctx.pop()?;
    ctx.gstate.line_cap = cap;
    Ok(())
}

pub fn currentlinecap(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let cap = ctx.gstate.line_cap as i32;
    ctx.push(Object::integer(cap))
}

pub fn setlinejoin(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let code = ctx.peek_int(0)?;
    let join = LineJoin::from_code(code).ok_or(ErrorKind::RangeCheck)?;
    ctx.pop()?;
    ctx.gstate.line_join = join;
    Ok(())
}

pub fn currentlinejoin(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let join = ctx.gstate.line_join as i32;
    ctx.push(Object::integer(join))
}

pub fn setmiterlimit(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let limit = ctx.peek_number(0)?;
    if limit < 1.0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    ctx.gstate.miter_limit = limit;
    Ok(())
}

pub fn currentmiterlimit(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let limit = ctx.gstate.miter_limit;
    ctx.push(Object::real(limit))
}

/// array offset `setdash` –
pub fn setdash(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let offset = ctx.peek_number(0)?;
    let r = ctx.peek_array(1)?;
    ctx.require_access(ctx.peek(1)?, Access::ReadOnly)?;
    let mut dashes = smallvec::SmallVec::new();
    let mut sum = 0.0;
    for elem in ctx.memory.array(r)? {
        let v = elem.number().ok_or(ErrorKind::TypeCheck)?;
        if v < 0.0 {
            return Err(ErrorKind::RangeCheck.into());
        }
        sum += v;
        dashes.push(v);
    }
    if !dashes.is_empty() && sum == 0.0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    ctx.pop()?;
    ctx.gstate.dash = DashPattern { dashes, offset };
    Ok(())
}

/// `currentdash` array offset
pub fn currentdash(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(2)?;
    let dashes: Vec<Object> = ctx
        .gstate
        .dash
        .dashes
        .iter()
        .map(|&v| Object::real(v))
        .collect();
    let offset = ctx.gstate.dash.offset;
    let arr = ctx.new_array(dashes);
    ctx.push(arr)?;
    ctx.push(Object::real(offset))
}

pub fn setflat(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let f = ctx.peek_number(0)?;
    ctx.pop()?;
    ctx.gstate.flatness = f.clamp(0.2, 100.0);
    Ok(())
}

pub fn currentflat(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let f = ctx.gstate.flatness;
    ctx.push(Object::real(f))
}

pub fn setstrokeadjust(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let on = ctx.peek_bool(0)?;
    ctx.pop()?;
    ctx.gstate.stroke_adjust = on;
    Ok(())
}

pub fn currentstrokeadjust(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let on = ctx.gstate.stroke_adjust;
    ctx.push(Object::boolean(on))
}

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

pub fn setgray(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let g = ctx.peek_number(0)?;
    ctx.pop()?;
    ctx.gstate.color_space = ColorSpace::DeviceGray;
    ctx.gstate.color = Components::from_slice(&[color::clamp01(g)]);
    ctx.gstate.pattern = None;
    Ok(())
}

pub fn currentgray(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let rgb = crate::color_driver::current_rgb(ctx)?;
    ctx.push(Object::real(color::rgb_to_gray(rgb.r, rgb.g, rgb.b)))
}

pub fn setrgbcolor(ctx: &mut Context) -> PsResult<()> {
    ctx.need(3)?;
    let b = ctx.peek_number(0)?;
    let g = ctx.peek_number(1)?;
    let r = ctx.peek_number(2)?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.gstate.color_space = ColorSpace::DeviceRgb;
    ctx.gstate.color =
        Components::from_slice(&[color::clamp01(r), color::clamp01(g), color::clamp01(b)]);
    ctx.gstate.pattern = None;
    Ok(())
}

pub fn currentrgbcolor(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(3)?;
    let rgb = crate::color_driver::current_rgb(ctx)?;
    ctx.push(Object::real(rgb.r))?;
    ctx.push(Object::real(rgb.g))?;
    ctx.push(Object::real(rgb.b))
}

pub fn sethsbcolor(ctx: &mut Context) -> PsResult<()> {
    ctx.need(3)?;
    let b = ctx.peek_number(0)?;
    let s = ctx.peek_number(1)?;
    let h = ctx.peek_number(2)?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.pop()?;
    let rgb = color::hsb_to_rgb(h, s, b);
    ctx.gstate.color_space = ColorSpace::DeviceRgb;
    ctx.gstate.color = Components::from_slice(&[rgb.r, rgb.g, rgb.b]);
    ctx.gstate.pattern = None;
    Ok(())
}

pub fn currenthsbcolor(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(3)?;
    let rgb = crate::color_driver::current_rgb(ctx)?;
    let (h, s, b) = color::rgb_to_hsb(rgb.r, rgb.g, rgb.b);
    ctx.push(Object::real(h))?;
    ctx.push(Object::real(s))?;
    ctx.push(Object::real(b))
}

pub fn setcmykcolor(ctx: &mut Context) -> PsResult<()> {
    ctx.need(4)?;
    let k = ctx.peek_number(0)?;
    let y = ctx.peek_number(1)?;
    let m = ctx.peek_number(2)?;
    let c = ctx.peek_number(3)?;
    for _ in 0..4 {
        ctx.pop()?;
    }
    ctx.gstate.color_space = ColorSpace::DeviceCmyk;
    ctx.gstate.color = Components::from_slice(&[
        color::clamp01(c),
        color::clamp01(m),
        color::clamp01(y),
        color::clamp01(k),
    ]);
    ctx.gstate.pattern = None;
    Ok(())
}

pub fn currentcmykcolor(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(4)?;
    if let ColorSpace::DeviceCmyk = ctx.gstate.color_space {
        let c = ctx.gstate.color.clone();
        for v in c.iter() {
            ctx.push(Object::real(*v))?;
        }
        return Ok(());
    }
    let rgb = crate::color_driver::current_rgb(ctx)?;
    let (c, m, y, k) = color::rgb_to_cmyk(rgb.r, rgb.g, rgb.b);
    ctx.push(Object::real(c))?;
    ctx.push(Object::real(m))?;
    ctx.push(Object::real(y))?;
    ctx.push(Object::real(k))
}

/// comp1 … compn `setcolor` – | pattern `setcolor` –
pub fn setcolor(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    // Pattern space takes a pattern dictionary (plus underlying
    // components for uncolored patterns).
    if let ColorSpace::Pattern { base } = ctx.gstate.color_space.clone() {
        let pat = *ctx.peek(0)?;
        if pat.as_dict().is_none() {
            return Err(ErrorKind::TypeCheck.into());
        }
        let n = base.as_ref().map(|b| b.components()).unwrap_or(0);
        ctx.need(n + 1)?;
        let mut comps = Components::new();
        for i in 0..n {
            comps.push(ctx.peek_number(n - i)?);
        }
        for _ in 0..n + 1 {
            ctx.pop()?;
        }
        ctx.gstate.color = comps;
        ctx.gstate.pattern = Some(pat);
        return Ok(());
    }

    let n = ctx.gstate.color_space.components();
    ctx.need(n)?;
    let mut comps = Components::new();
    for i in 0..n {
        comps.push(ctx.peek_number(n - 1 - i)?);
    }
    for _ in 0..n {
        ctx.pop()?;
    }
    ctx.gstate.color = comps;
    Ok(())
}

/// `currentcolor` comp1 … compn
pub fn currentcolor(ctx: &mut Context) -> PsResult<()> {
    let comps = ctx.gstate.color.clone();
    ctx.reserve(comps.len())?;
    for v in comps.iter() {
        ctx.push(Object::real(*v))?;
    }
    if let Some(pat) = ctx.gstate.pattern {
        ctx.push(pat)?;
    }
    Ok(())
}

/// array|name `setcolorspace` –
pub fn setcolorspace(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    let space = crate::color_driver::parse_color_space(ctx, &obj)?;
    ctx.pop()?;
    ctx.gstate.color = space.initial_components();
    ctx.gstate.color_space = space;
    ctx.gstate.pattern = None;
    Ok(())
}

/// `currentcolorspace` array
pub fn currentcolorspace(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let family = Name::from_str(ctx.gstate.color_space.family());
    let elems = vec![Object::literal_name(family)];
    let arr = ctx.new_array(elems);
    ctx.push(arr)
}

/// pattern `setpattern` – | comp1 … compn pattern `setpattern` –
pub fn setpattern(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    if !matches!(ctx.gstate.color_space, ColorSpace::Pattern { .. }) {
        let base = match ctx.gstate.color_space.clone() {
            ColorSpace::Pattern { base } => base,
            other => Some(Box::new(other)),
        };
        ctx.gstate.color_space = ColorSpace::Pattern { base };
    }
    setcolor(ctx)
}

// ---------------------------------------------------------------------------
// Stored-only device-dependent state
// ---------------------------------------------------------------------------

/// proc `settransfer` – — stored, never applied at paint time.
pub fn settransfer(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let proc = *ctx.peek_proc(0)?;
    ctx.pop()?;
    ctx.gstate.transfer = Some(proc);
    Ok(())
}

pub fn currenttransfer(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    match ctx.gstate.transfer {
        Some(proc) => ctx.push(proc),
        None => {
            let empty = ctx.new_array(Vec::new()).executable();
            ctx.push(empty)
        }
    }
}

/// r g b gray `setcolortransfer` –
pub fn setcolortransfer(ctx: &mut Context) -> PsResult<()> {
    ctx.need(4)?;
    let gray = *ctx.peek_proc(0)?;
    let b = *ctx.peek_proc(1)?;
    let g = *ctx.peek_proc(2)?;
    let r = *ctx.peek_proc(3)?;
    for _ in 0..4 {
        ctx.pop()?;
    }
    ctx.gstate.color_transfer = Some([r, g, b, gray]);
    Ok(())
}

pub fn currentcolortransfer(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(4)?;
    match ctx.gstate.color_transfer {
        Some(procs) => {
            for p in procs {
                ctx.push(p)?;
            }
            Ok(())
        }
        None => {
            for _ in 0..4 {
                let empty = ctx.new_array(Vec::new()).executable();
                ctx.push(empty)?;
            }
            Ok(())
        }
    }
}

pub fn setblackgeneration(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let proc = *ctx.peek_proc(0)?;
    ctx.pop()?;
    ctx.gstate.black_generation = Some(proc);
    Ok(())
}

pub fn currentblackgeneration(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    match ctx.gstate.black_generation {
        Some(proc) => ctx.push(proc),
        None => {
            let empty = ctx.new_array(Vec::new()).executable();
            ctx.push(empty)
        }
    }
}

pub fn setundercolorremoval(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let proc = *ctx.peek_proc(0)?;
    ctx.pop()?;
    ctx.gstate.undercolor_removal = Some(proc);
    Ok(())
}

pub fn currentundercolorremoval(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    match ctx.gstate.undercolor_removal {
        Some(proc) => ctx.push(proc),
        None => {
            let empty = ctx.new_array(Vec::new()).executable();
            ctx.push(empty)
        }
    }
}

/// halftone `sethalftone` – — Types 1–5 accepted and stored; only the
/// parameters persist (acceptance-without-effect).
pub fn sethalftone(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let ht = *ctx.peek(0)?;
    if ht.as_dict().is_none() {
        return Err(ErrorKind::TypeCheck.into());
    }
    ctx.pop()?;
    ctx.gstate.halftone = Some(ht);
    Ok(())
}

pub fn currenthalftone(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    match ctx.gstate.halftone {
        Some(ht) => ctx.push(ht),
        None => {
            let d = ctx.new_dict(1);
            ctx.push(d)
        }
    }
}

/// freq angle proc `setscreen` –
pub fn setscreen(ctx: &mut Context) -> PsResult<()> {
    ctx.need(3)?;
    let proc = *ctx.peek(0)?;
    let angle = ctx.peek_number(1)?;
    let freq = ctx.peek_number(2)?;
    if freq <= 0.0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.gstate.screen = Some((freq, angle, proc));
    Ok(())
}

/// `currentscreen` freq angle proc
pub fn currentscreen(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(3)?;
    match ctx.gstate.screen {
        Some((freq, angle, proc)) => {
            ctx.push(Object::real(freq))?;
            ctx.push(Object::real(angle))?;
            ctx.push(proc)
        }
        None => {
            ctx.push(Object::real(60.0))?;
            ctx.push(Object::real(45.0))?;
            let empty = ctx.new_array(Vec::new()).executable();
            ctx.push(empty)
        }
    }
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "gsave", gsave);
    super::define_op(ctx, "grestore", grestore);
    super::define_op(ctx, "grestoreall", grestoreall);
    super::define_op(ctx, "initgraphics", initgraphics);
    super::define_op(ctx, "gstate", gstate);
    super::define_op(ctx, "currentgstate", currentgstate);
    super::define_op(ctx, "setgstate", setgstate);
    super::define_op(ctx, "setlinewidth", setlinewidth);
    super::define_op(ctx, "currentlinewidth", currentlinewidth);
    super::define_op(ctx, "setlinecap", setlinecap);
    super::define_op(ctx, "currentlinecap", currentlinecap);
    super::define_op(ctx, "setlinejoin", setlinejoin);
    super::define_op(ctx, "currentlinejoin", currentlinejoin);
    super::define_op(ctx, "setmiterlimit", setmiterlimit);
    super::define_op(ctx, "currentmiterlimit", currentmiterlimit);
    super::define_op(ctx, "setdash", setdash);
    super::define_op(ctx, "currentdash", currentdash);
    super::define_op(ctx, "setflat", setflat);
    super::define_op(ctx, "currentflat", currentflat);
    super::define_op(ctx, "setstrokeadjust", setstrokeadjust);
    super::define_op(ctx, "currentstrokeadjust", currentstrokeadjust);
    super::define_op(ctx, "setgray", setgray);
    super::define_op(ctx, "currentgray", currentgray);
    super::define_op(ctx, "setrgbcolor", setrgbcolor);
    super::define_op(ctx, "currentrgbcolor", currentrgbcolor);
    super::define_op(ctx, "sethsbcolor", sethsbcolor);
    super::define_op(ctx, "currenthsbcolor", currenthsbcolor);
    super::define_op(ctx, "setcmykcolor", setcmykcolor);
    super::define_op(ctx, "currentcmykcolor", currentcmykcolor);
    super::define_op(ctx, "setcolor", setcolor);
    super::define_op(ctx, "currentcolor", currentcolor);
    super::define_op(ctx, "setcolorspace", setcolorspace);
    super::define_op(ctx, "currentcolorspace", currentcolorspace);
    super::define_op(ctx, "setpattern", setpattern);
    super::define_op(ctx, "settransfer", settransfer);
    super::define_op(ctx, "currenttransfer", currenttransfer);
    super::define_op(ctx, "setcolortransfer", setcolortransfer);
    super::define_op(ctx, "currentcolortransfer", currentcolortransfer);
    super::define_op(ctx, "setblackgeneration", setblackgeneration);
    super::define_op(ctx, "currentblackgeneration", currentblackgeneration);
    super::define_op(ctx, "setundercolorremoval", setundercolorremoval);
    super::define_op(ctx, "currentundercolorremoval", currentundercolorremoval);
    super::define_op(ctx, "sethalftone", sethalftone);
    super::define_op(ctx, "currenthalftone", currenthalftone);
    super::define_op(ctx, "setscreen", setscreen);
    super::define_op(ctx, "currentscreen", currentscreen);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gsave_grestore_round_trips_line_state() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"5 setlinewidth gsave 9 setlinewidth grestore currentlinewidth")
            .unwrap();
        assert_eq!(ctx.pop().unwrap().number(), Some(5.0));
    }

    #[test]
    fn setgray_selects_devicegray() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"0.25 setgray currentgray").unwrap();
        assert_eq!(ctx.pop().unwrap().number(), Some(0.25));
        assert!(matches!(
            ctx.gstate.color_space,
            ColorSpace::DeviceGray
        ));
    }

    #[test]
    fn rgb_to_gray_via_ntsc() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"1 0 0 setrgbcolor currentgray").unwrap();
        let g = ctx.pop().unwrap().number().unwrap();
        assert!((g - 0.3).abs() < 1e-9);
    }

    #[test]
    fn cmyk_round_trip() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"0.1 0.2 0.3 0.4 setcmykcolor currentcmykcolor")
            .unwrap();
        assert_eq!(ctx.pop().unwrap().number(), Some(0.4));
        assert_eq!(ctx.pop().unwrap().number(), Some(0.3));
        assert_eq!(ctx.pop().unwrap().number(), Some(0.2));
        assert_eq!(ctx.pop().unwrap().number(), Some(0.1));
    }

    #[test]
    fn dash_pattern_round_trips() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"[4 2] 1 setdash currentdash").unwrap();
        assert_eq!(ctx.pop().unwrap().number(), Some(1.0));
        let arr = ctx.pop().unwrap().as_array().unwrap();
        assert_eq!(arr.len, 2);
    }

    #[test]
    fn all_zero_dashes_rejected() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{ [0 0] 0 setdash } stopped").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }

    #[test]
    fn gstate_objects_round_trip() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"3 setlinewidth gstate 7 setlinewidth setgstate currentlinewidth")
            .unwrap();
        assert_eq!(ctx.pop().unwrap().number(), Some(3.0));
    }

    #[test]
    fn transfer_is_stored_not_applied() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{1 exch sub} settransfer 0.5 setgray currentgray")
            .unwrap();
        // The transfer function does not participate in color readback.
        assert_eq!(ctx.pop().unwrap().number(), Some(0.5));
        assert!(ctx.gstate.transfer.is_some());
    }
}

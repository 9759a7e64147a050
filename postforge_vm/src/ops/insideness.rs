//! Insideness-testing operators (`infill`, `ineofill`, `instroke`).
//!
//! Each tests whether a device-space point (or any point of an aperture
//! path) would be painted by the corresponding painting operator.

use crate::context::Context;
use postforge_core::{Object, PsResult};
use postforge_graphics::Path;

fn pop_point(ctx: &mut Context) -> PsResult<(f64, f64)> {
    ctx.need(2)?;
    let y = ctx.peek_number(0)?;
    let x = ctx.peek_number(1)?;
    ctx.pop()?;
    ctx.pop()?;
    Ok(ctx.gstate.ctm.apply(x, y))
}

fn test_fill(ctx: &mut Context, even_odd: bool) -> PsResult<()> {
    let (dx, dy) = pop_point(ctx)?;
    let inside = ctx.gstate.path.contains(dx, dy, even_odd);
    ctx.push(Object::boolean(inside))
}

/// x y `infill` bool
pub fn infill(ctx: &mut Context) -> PsResult<()> {
    test_fill(ctx, false)
}

/// x y `ineofill` bool
pub fn ineofill(ctx: &mut Context) -> PsResult<()> {
    test_fill(ctx, true)
}

/// x y `instroke` bool — tests against the stroke outline of the current
/// path under the current pen.
pub fn instroke(ctx: &mut Context) -> PsResult<()> {
    let (dx, dy) = pop_point(ctx)?;
    let outline = stroke_outline(ctx);
    let inside = outline.contains(dx, dy, false);
    ctx.push(Object::boolean(inside))
}

/// The same per-segment quad outline `strokepath` produces.
fn stroke_outline(ctx: &mut Context) -> Path {
    let saved = ctx.gstate.path.clone();
    let saved_cp = ctx.gstate.current_point;
    // strokepath computes in place; run it against a scratch copy.
    let _ = crate::ops::path::strokepath(ctx);
    let outline = std::mem::replace(&mut ctx.gstate.path, saved);
    ctx.gstate.current_point = saved_cp;
    outline
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "infill", infill);
    super::define_op(ctx, "ineofill", ineofill);
    super::define_op(ctx, "instroke", instroke);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infill_detects_interior_points() {
        let mut ctx = Context::new();
        ctx.run_bytes(
            b"0 0 moveto 100 0 lineto 100 100 lineto 0 100 lineto closepath 50 50 infill 150 50 infill",
        )
        .unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }

    #[test]
    fn ineofill_uses_even_odd() {
        let mut ctx = Context::new();
        // Two nested squares wound the same way: even-odd excludes the
        // inner region, nonzero includes it.
        ctx.run_bytes(
            b"0 0 moveto 100 0 lineto 100 100 lineto 0 100 lineto closepath \
              25 25 moveto 75 25 lineto 75 75 lineto 25 75 lineto closepath \
              50 50 ineofill 50 50 infill",
        )
        .unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
    }

    #[test]
    fn instroke_hugs_the_outline() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"4 setlinewidth 0 0 moveto 100 0 lineto 50 0 instroke 50 30 instroke")
            .unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }
}
